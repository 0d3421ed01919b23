//! Readers for the engine's textual output: the collection-status table and
//! the `--log-fd` machine log.

use super::types::{
    parse_engine_time, parse_pretty_time, BackupKind, ChainEntry, DiffStatus, EntryType,
    FileRecord,
};
use crate::error::{KyrianError, Result};
use crate::progress::TransferSample;

const FILE_LIST: &[u8] = b"INFO 10 ";
const DIFF_FILE: &[u8] = b"INFO 13 ";
const PROGRESS: &str = "NOTICE 16 ";

fn parse_err(what: &str, line: impl AsRef<[u8]>) -> KyrianError {
    KyrianError::Parse(format!("{what}: {:?}", String::from_utf8_lossy(line.as_ref())))
}

/// Backup-set rows of a collection-status report, e.g.
/// `   Full   Tue Jan  1 00:00:00 2019   2`. Other lines are ignored.
pub fn collection_status(text: &str) -> Result<Vec<ChainEntry>> {
    let mut entries = Vec::new();
    for line in text.lines() {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let kind = match tokens.first() {
            Some(&"Full") => BackupKind::Full,
            Some(&"Incremental") => BackupKind::Incremental,
            _ => continue,
        };
        if tokens.len() != 7 {
            return Err(parse_err("malformed backup set row", line));
        }
        let timestamp = parse_pretty_time(&tokens[1..6].join(" "))
            .ok_or_else(|| parse_err("bad backup set time", line))?;
        let count = tokens[6]
            .parse()
            .map_err(|_| parse_err("bad backup set count", line))?;
        entries.push(ChainEntry::new(timestamp, kind, count));
    }
    Ok(entries)
}

fn trim_start(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| !b.is_ascii_whitespace()).unwrap_or(bytes.len());
    &bytes[start..]
}

/// Split `'quoted path' rest` into the unescaped path bytes and `rest`.
/// Paths are kept byte-exact.
fn quoted_path(text: &[u8]) -> Option<(Vec<u8>, &[u8])> {
    let inner = text.strip_prefix(b"'")?;
    let mut path = Vec::new();
    let mut bytes = inner.iter().enumerate();
    while let Some((i, &b)) = bytes.next() {
        match b {
            b'\\' => path.push(*bytes.next()?.1),
            b'\'' => return Some((path, trim_start(&inner[i + 1..]))),
            other => path.push(other),
        }
    }
    None
}

/// `INFO 10 <timestring> '<path>' <type>`
pub fn file_list_line(line: &[u8]) -> Option<Result<FileRecord>> {
    let body = line.strip_prefix(FILE_LIST)?;
    Some(
        (|| {
            let space = body.iter().position(|&b| b == b' ')?;
            let mtime = parse_engine_time(std::str::from_utf8(&body[..space]).ok()?)?;
            let (path, kind) = quoted_path(&body[space + 1..])?;
            let entry_type = match kind {
                b"dir" => EntryType::Directory,
                _ => EntryType::RegularFile,
            };
            Some(FileRecord::new(path, mtime, entry_type))
        })()
        .ok_or_else(|| parse_err("malformed file list line", line)),
    )
}

/// `INFO 13 '<path>' <status>`
pub fn diff_line(line: &[u8]) -> Option<Result<(Vec<u8>, DiffStatus)>> {
    let body = line.strip_prefix(DIFF_FILE)?;
    Some(
        (|| {
            let (path, status) = quoted_path(body)?;
            let status = match status {
                b"unchanged" => DiffStatus::Unchanged,
                b"new" | b"added" => DiffStatus::Added,
                b"changed" => DiffStatus::Changed,
                b"deleted" => DiffStatus::Deleted,
                _ => return None,
            };
            Some((path, status))
        })()
        .ok_or_else(|| parse_err("malformed diff line", line)),
    )
}

/// `NOTICE 16 <volume> <full|inc> <processed> <expected> <delta> <sent>`
pub fn progress_line(line: &str) -> Option<Result<TransferSample>> {
    let body = line.strip_prefix(PROGRESS)?;
    Some(
        (|| {
            let mut it = body.split_whitespace();
            let volume = it.next()?.parse().ok()?;
            let full = match it.next()? {
                "full" => true,
                "inc" => false,
                _ => return None,
            };
            let mut num = || it.next().and_then(|t| t.parse::<u64>().ok());
            Some(TransferSample {
                full,
                volume,
                processed: num()?,
                expected: num()?,
                delta: num()?,
                sent: num()?,
            })
        })()
        .ok_or_else(|| parse_err("malformed progress line", line)),
    )
}
