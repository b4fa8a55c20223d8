use std::io;
use std::path::Path;

/// Create `path` and any missing parents.
pub fn ensure_dir_exists(path: &Path) -> io::Result<()> {
    if !path.is_dir() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Create the parent directory of `path`, if it has one.
pub fn ensure_parent_exists(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_dir_exists(parent),
        _ => Ok(()),
    }
}

/// Remove a file, treating "already gone" as success. Returns whether a file
/// was removed.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Set the permission bits of `path`. File type bits in `mode` are ignored.
#[cfg(unix)]
pub fn apply_unix_mode(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode & 0o7777))
}

#[cfg(not(unix))]
pub fn apply_unix_mode(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Give the owner write access to an existing `path` so it can be
/// overwritten or have entries created in it. Missing paths are left alone.
#[cfg(unix)]
pub fn ensure_owner_writable(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mode = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata.permissions().mode(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if mode & 0o200 == 0 {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o200))?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn ensure_owner_writable(path: &Path) -> io::Result<()> {
    let mut permissions = match std::fs::metadata(path) {
        Ok(metadata) => metadata.permissions(),
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    if permissions.readonly() {
        permissions.set_readonly(false);
        std::fs::set_permissions(path, permissions)?;
    }
    Ok(())
}
