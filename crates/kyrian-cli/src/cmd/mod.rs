pub(crate) mod backup;
pub(crate) mod chains;
pub(crate) mod profiles;
pub(crate) mod restore;
pub(crate) mod tree;

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use kyrian_core::coordinator::{newest_chain, Event, Outcome, TaskCoordinator};
use kyrian_core::engine::{ChainMap, Timestamp};

use crate::signal::shutdown_requested;

pub(crate) type CmdResult = Result<(), Box<dyn std::error::Error>>;

const SIGNAL_POLL: Duration = Duration::from_millis(200);

/// Block until the coordinator reports something. On the first interrupt the
/// coordinator is shut down, which cancels tree builds; backup and recovery
/// still run to completion and report as usual.
pub(crate) fn next_event(coord: &TaskCoordinator) -> Result<Event, Box<dyn std::error::Error>> {
    let mut interrupted = false;
    loop {
        match coord.events().recv_timeout(SIGNAL_POLL) {
            Ok(event) => return Ok(event),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Err("coordinator stopped".into()),
        }
        if shutdown_requested() && !interrupted {
            interrupted = true;
            eprintln!("Interrupted; waiting for the running task to stop...");
            coord.shutdown();
        }
    }
}

/// `time`, or the newest chain when absent.
pub(crate) fn resolve_time(
    coord: &TaskCoordinator,
    time: Option<Timestamp>,
) -> Result<Timestamp, Box<dyn std::error::Error>> {
    if let Some(time) = time {
        return Ok(time);
    }
    let chains = refresh_chains(coord)?;
    newest_chain(&chains).ok_or_else(|| "no backup chains found at the target".into())
}

/// Ask the engine for the chain list and wait for the answer.
pub(crate) fn refresh_chains(coord: &TaskCoordinator) -> Result<ChainMap, Box<dyn std::error::Error>> {
    coord.start_chain_refresh()?;
    loop {
        if let Event::ChainsRefreshed(outcome) = next_event(coord)? {
            return match outcome {
                Outcome::Succeeded(chains) => Ok(chains),
                Outcome::Failed(e) => Err(e.into()),
                Outcome::Cancelled => Err("chain listing cancelled".into()),
            };
        }
    }
}
