use comfy_table::Cell;

use kyrian_core::coordinator::TaskCoordinator;

use super::{refresh_chains, CmdResult};
use crate::table::CliTableTheme;

pub(crate) fn run_chains(coord: &TaskCoordinator) -> CmdResult {
    let chains = refresh_chains(coord)?;
    if chains.is_empty() {
        println!("No backup chains found.");
        return Ok(());
    }

    let theme = CliTableTheme::detect();
    let mut table = theme.new_data_table(&["Time", "Type", "Volumes", "Timestamp"]);
    for entry in chains.values().rev() {
        table.add_row(vec![
            Cell::new(&entry.pretty_time),
            Cell::new(entry.kind),
            Cell::new(entry.file_count),
            Cell::new(entry.timestamp),
        ]);
    }
    println!("{table}");
    Ok(())
}
