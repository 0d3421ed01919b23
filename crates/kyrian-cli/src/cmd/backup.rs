use kyrian_core::config::Settings;
use kyrian_core::coordinator::{newest_chain, Event, Outcome, TaskCoordinator};

use super::{next_event, CmdResult};
use crate::format::format_timestamp;
use crate::progress::BackupProgressRenderer;

pub(crate) fn run_backup(coord: &TaskCoordinator, settings: &Settings) -> CmdResult {
    let (source, target) = coord.profile().source_and_target()?;
    eprintln!("==> Backing up {source} to {target}");
    if !coord.start_backup()? {
        return Err("a backup or recovery is already running".into());
    }

    let mut renderer = BackupProgressRenderer::new();
    let mut newest = None;
    let outcome = loop {
        match next_event(coord) {
            Ok(Event::Progress(report)) => renderer.on_report(&report),
            Ok(Event::ChainsRefreshed(Outcome::Succeeded(chains))) => newest = newest_chain(&chains),
            Ok(Event::BackupFinished(outcome)) => break outcome,
            Ok(_) => {}
            Err(e) => {
                renderer.finish();
                return Err(e);
            }
        }
    };
    renderer.finish();

    match outcome {
        Outcome::Succeeded(()) => {}
        Outcome::Failed(e) => return Err(e.into()),
        Outcome::Cancelled => return Err("backup cancelled".into()),
    }
    match newest {
        Some(time) => println!("Backup complete. Newest snapshot: {}", format_timestamp(time)),
        None => println!("Backup complete."),
    }

    if let (true, Some(time)) = (settings.build_tree, newest) {
        let highlight = settings.highlight_diffs;
        match super::tree::build(coord, time, highlight)? {
            Some(snapshot) => {
                let entries = snapshot.tree.len() - 1;
                print!("Snapshot lists {entries} entries");
                if highlight {
                    print!(", {} differ from the source", snapshot.tree.highlighted().count());
                }
                println!(".");
            }
            None => eprintln!("Tree build cancelled."),
        }
    }
    Ok(())
}
