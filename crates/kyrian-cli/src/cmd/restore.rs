use kyrian_core::config::expand_tilde;
use kyrian_core::coordinator::{Event, Outcome, RecoveryRequest, TaskCoordinator};
use kyrian_core::engine::Timestamp;
use kyrian_core::platform::fs::absolutize;

use super::{next_event, CmdResult};

/// Recover one path from a snapshot.
pub(crate) fn run_recover(
    coord: &TaskCoordinator,
    path: String,
    time: Option<Timestamp>,
    dest: &str,
    force: bool,
) -> CmdResult {
    let destination = absolutize(&expand_tilde(dest))?;
    run(
        coord,
        RecoveryRequest {
            file: Some(path.trim_start_matches('/').as_bytes().to_vec()),
            time,
            destination,
            force,
        },
    )
}

/// Restore the whole snapshot.
pub(crate) fn run_restore(
    coord: &TaskCoordinator,
    time: Option<Timestamp>,
    dest: &str,
    force: bool,
) -> CmdResult {
    let destination = absolutize(&expand_tilde(dest))?;
    run(
        coord,
        RecoveryRequest {
            file: None,
            time,
            destination,
            force,
        },
    )
}

fn run(coord: &TaskCoordinator, request: RecoveryRequest) -> CmdResult {
    if !coord.start_recovery(request)? {
        return Err("a backup or recovery is already running".into());
    }
    loop {
        if let Event::RecoveryFinished { request, outcome } = next_event(coord)? {
            return match outcome {
                Outcome::Succeeded(()) => {
                    let what = match &request.file {
                        Some(file) => String::from_utf8_lossy(file),
                        None => "snapshot".into(),
                    };
                    println!("Restored {what} to {}", request.destination.display());
                    Ok(())
                }
                Outcome::Failed(e) => Err(e.into()),
                Outcome::Cancelled => Err("recovery cancelled".into()),
            };
        }
    }
}
