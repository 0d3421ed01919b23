use comfy_table::Cell;

use kyrian_core::coordinator::{Event, Outcome, TaskCoordinator, TreeSnapshot};
use kyrian_core::engine::{pretty_time, Timestamp};

use super::{next_event, resolve_time, CmdResult};
use crate::format::format_timestamp;
use crate::table::CliTableTheme;

pub(crate) fn run_tree(
    coord: &TaskCoordinator,
    time: Option<Timestamp>,
    highlight: bool,
    depth: Option<usize>,
) -> CmdResult {
    let time = resolve_time(coord, time)?;
    let snapshot = build(coord, time, highlight)?;
    let Some(snapshot) = snapshot else {
        println!("Tree build cancelled.");
        return Ok(());
    };

    println!("Snapshot {}", format_timestamp(snapshot.time));
    print_tree(&snapshot, depth);
    if highlight {
        let changed = snapshot.tree.highlighted().count();
        println!("{changed} entries differ from the live source.");
    }
    Ok(())
}

/// Run one tree build to completion. `None` when it was cancelled.
pub(crate) fn build(
    coord: &TaskCoordinator,
    time: Timestamp,
    highlight: bool,
) -> Result<Option<TreeSnapshot>, Box<dyn std::error::Error>> {
    let Some(request) = coord.start_tree_build(time, highlight)? else {
        return Err("a backup or recovery is running".into());
    };
    loop {
        if let Event::TreeBuilt {
            request: done,
            outcome,
            ..
        } = next_event(coord)?
        {
            if done != request {
                continue;
            }
            return match outcome {
                Outcome::Succeeded(snapshot) => Ok(Some(snapshot)),
                Outcome::Failed(e) => Err(e.into()),
                Outcome::Cancelled => Ok(None),
            };
        }
    }
}

fn print_tree(snapshot: &TreeSnapshot, max_depth: Option<usize>) {
    let theme = CliTableTheme::detect();
    let tree = &snapshot.tree;
    let mut table = theme.new_data_table(&["Name", "Type", "Modified"]);
    for (depth, id) in tree.walk() {
        if max_depth.is_some_and(|max| depth > max) {
            continue;
        }
        let node = tree.node(id);
        let name = format!(
            "{}{}{}",
            theme.indent(depth),
            node.name,
            if node.is_dir() && depth > 0 { "/" } else { "" }
        );
        let name_cell = if node.highlighted {
            theme.changed_cell(&format!("{name} *"))
        } else {
            Cell::new(name)
        };
        let kind = if node.is_dir() { "dir" } else { "file" };
        table.add_row(vec![name_cell, Cell::new(kind), Cell::new(pretty_time(node.timestamp))]);
    }
    println!("{table}");
}
