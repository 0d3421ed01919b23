mod driver;
mod duplicity;
mod gateway;
pub mod parse;
mod types;

pub use self::driver::{AbortHandle, EngineDriver};
pub use self::duplicity::DuplicityDriver;
pub use self::gateway::{CallOwner, EngineGateway, FileListing, ForceGuard};
pub use self::types::{
    engine_time_arg, parse_pretty_time, pretty_time, BackupKind, ChainEntry, ChainMap, DiffMap,
    DiffStatus, EntryType, FileRecord, FileRecordStream, Timestamp,
};
