use std::time::Duration;

use crate::config::Profile;
use crate::coordinator::{CoordinatorOptions, Event, TaskCoordinator};
use crate::engine::EngineGateway;
use crate::testutil::ScriptedEngine;

pub const WAIT: Duration = Duration::from_secs(10);

pub fn profile() -> Profile {
    Profile {
        target: Some("file:///backups/docs".into()),
        source: Some("/home/me/docs".into()),
        encrypt_key: Some("ABCD1234".into()),
        use_agent: true,
        selection_flags: vec!["--exclude".into(), "**/.cache".into()],
        ..Profile::default()
    }
}

pub fn gateway(engine: &ScriptedEngine, profile: Profile) -> EngineGateway {
    EngineGateway::new(profile, Box::new(engine.clone()))
}

pub fn coordinator(engine: &ScriptedEngine) -> TaskCoordinator {
    coordinator_with(engine, profile())
}

pub fn coordinator_with(engine: &ScriptedEngine, profile: Profile) -> TaskCoordinator {
    TaskCoordinator::new(
        gateway(engine, profile),
        CoordinatorOptions {
            poll_interval: Duration::from_millis(10),
            grace_period: Duration::from_millis(100),
        },
    )
}

/// Receive events until one matches `want`. Returns it with everything
/// received before it.
pub fn wait_for(coord: &TaskCoordinator, mut want: impl FnMut(&Event) -> bool) -> (Event, Vec<Event>) {
    let mut seen = Vec::new();
    loop {
        let event = coord
            .events()
            .recv_timeout(WAIT)
            .expect("timed out waiting for coordinator event");
        if want(&event) {
            return (event, seen);
        }
        seen.push(event);
    }
}

pub fn is_backup_finished(e: &Event) -> bool {
    matches!(e, Event::BackupFinished(_))
}

pub fn is_recovery_finished(e: &Event) -> bool {
    matches!(e, Event::RecoveryFinished { .. })
}

pub fn is_tree_built(e: &Event) -> bool {
    matches!(e, Event::TreeBuilt { .. })
}

/// Progress percentages among `events`, in order.
pub fn percents(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Progress(r) => Some(r.percent),
            _ => None,
        })
        .collect()
}

pub fn is_chains_refreshed(e: &Event) -> bool {
    matches!(e, Event::ChainsRefreshed(_))
}
