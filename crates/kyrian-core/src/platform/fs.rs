use std::ffi::OsString;
use std::io;
use std::path::Path;

/// True when `path` can receive a restore without overwriting anything:
/// it does not exist, or it is a directory with no entries.
pub fn is_vacant(path: &Path) -> io::Result<bool> {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => Ok(std::fs::read_dir(path)?.next().is_none()),
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(true),
        Err(e) => Err(e),
    }
}

/// Best-effort absolute form of `path` without requiring it to exist.
pub fn absolutize(path: &Path) -> io::Result<std::path::PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

/// Raw path bytes as a command-line argument. Non-Unix platforms cannot
/// carry arbitrary bytes and get a lossy decode.
#[cfg(unix)]
pub fn os_arg(bytes: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStringExt;
    OsString::from_vec(bytes.to_vec())
}

#[cfg(not(unix))]
pub fn os_arg(bytes: &[u8]) -> OsString {
    String::from_utf8_lossy(bytes).into_owned().into()
}
