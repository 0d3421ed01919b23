use comfy_table::Cell;

use kyrian_core::app::RuntimeConfig;

use super::CmdResult;
use crate::table::CliTableTheme;

pub(crate) fn run_profiles(runtime: &mut RuntimeConfig, use_profile: Option<&str>) -> CmdResult {
    if let Some(name) = use_profile {
        runtime.use_profile(name)?;
        println!("Active profile: {name}");
        return Ok(());
    }

    let active = runtime.profile_name().ok().map(str::to_string);
    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&["", "Profile", "Source", "Target"]);
    for (name, profile) in &runtime.document.profiles {
        let marker = if active.as_deref() == Some(name.as_str()) { "*" } else { "" };
        table.add_row(vec![
            Cell::new(marker),
            Cell::new(name),
            Cell::new(profile.source.as_deref().unwrap_or("-")),
            Cell::new(profile.target.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
    println!("Configuration: {}", runtime.source);
    Ok(())
}
