//! Machine identifiers reported at login.
//!
//! On Linux the disk UUID is the name of the `/dev/disk/by-uuid` link that
//! resolves to the device holding the executable. Other targets report a
//! fixed string.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing::debug;

/// Reported when the disk UUID cannot be determined.
pub const UNKNOWN_DISK_UUID: &str = "error getting disk UUID";

/// Reported on targets without a disk UUID lookup.
pub const UNSUPPORTED_DISK_UUID: &str = "error getting disk uuid (unsupported platform)";

/// Source of the identifiers hashed into the login body.
pub trait HardwareId: Send + Sync {
    fn exe_path(&self) -> String;

    fn disk_uuid(&self) -> String;

    /// Install identifier; the disk UUID unless a platform has something better.
    fn install_id(&self) -> String {
        self.disk_uuid()
    }
}

/// [`HardwareId`] of the running machine, resolved once.
#[derive(Debug, Default)]
pub struct SystemHardwareId {
    disk_uuid: OnceLock<String>,
}

impl SystemHardwareId {
    pub fn new() -> Self {
        Self::default()
    }

    fn exe() -> PathBuf {
        std::env::current_exe().unwrap_or_default()
    }
}

impl HardwareId for SystemHardwareId {
    fn exe_path(&self) -> String {
        Self::exe().to_string_lossy().into_owned()
    }

    fn disk_uuid(&self) -> String {
        self.disk_uuid
            .get_or_init(|| {
                let uuid = lookup_disk_uuid(&Self::exe());
                debug!(%uuid, "resolved disk uuid");
                uuid
            })
            .clone()
    }
}

#[cfg(target_os = "linux")]
fn lookup_disk_uuid(exe: &Path) -> String {
    disk_uuid_in(Path::new("/dev/disk/by-uuid"), exe).unwrap_or_else(|| UNKNOWN_DISK_UUID.to_string())
}

#[cfg(not(target_os = "linux"))]
fn lookup_disk_uuid(_exe: &Path) -> String {
    UNSUPPORTED_DISK_UUID.to_string()
}

/// Name of the entry in `by_uuid_dir` whose device holds `file`.
#[cfg(target_os = "linux")]
fn disk_uuid_in(by_uuid_dir: &Path, file: &Path) -> Option<String> {
    use std::os::unix::fs::MetadataExt;

    let device = std::fs::metadata(file).ok()?.dev();
    std::fs::read_dir(by_uuid_dir)
        .ok()?
        .flatten()
        .find(|entry| {
            std::fs::metadata(entry.path()).is_ok_and(|meta| meta.rdev() == device)
        })
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_uuid_is_cached_and_non_empty() {
        let hw = SystemHardwareId::new();
        let first = hw.disk_uuid();
        assert!(!first.is_empty());
        assert_eq!(hw.disk_uuid(), first);
        assert_eq!(hw.install_id(), first);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_missing_uuid_dir_yields_none() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f");
        std::fs::write(&file, b"x").unwrap();
        assert!(disk_uuid_in(&dir.path().join("missing"), &file).is_none());
        assert!(disk_uuid_in(dir.path(), &dir.path().join("nope")).is_none());
    }
}
