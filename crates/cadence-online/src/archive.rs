//! Beatmap set archive (`.osz`) extraction.

use std::io::{Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("archive I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive is empty")]
    Empty,
}

/// `BeatmapSetID` from the `[Metadata]` section of an `.osu` file.
pub fn beatmapset_id_from_osu_file(contents: &str) -> Option<i32> {
    let mut in_metadata = false;
    for line in contents.lines().map(str::trim) {
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if line.contains("[Metadata]") {
            in_metadata = true;
            continue;
        }
        if !in_metadata {
            continue;
        }
        if line.starts_with('[') {
            break;
        }
        if let Some((key, value)) = line.split_once(':')
            && key.trim() == "BeatmapSetID"
        {
            return value.trim().parse().ok();
        }
    }
    None
}

/// Set id declared by the first `.osu` file in the archive that has one.
pub fn extract_beatmapset_id(data: &[u8]) -> Result<Option<i32>, ArchiveError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    if archive.is_empty() {
        return Err(ArchiveError::Empty);
    }
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() || !entry.name().to_ascii_lowercase().ends_with(".osu") {
            continue;
        }
        let mut contents = String::new();
        if entry.read_to_string(&mut contents).is_err() {
            continue;
        }
        if let Some(set_id) = beatmapset_id_from_osu_file(&contents) {
            return Ok(Some(set_id));
        }
    }
    Ok(None)
}

/// Path of `name` under `dir`, or `None` if it tries to leave `dir`.
fn entry_path(dir: &Path, name: &str) -> Option<PathBuf> {
    let mut path = dir.to_path_buf();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => path.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(path)
}

/// Extract every file of an archive into `dir`.
///
/// Entries containing `..` are skipped. Files that fail to extract are logged
/// and skipped; only an unreadable or empty archive is an error. Returns the
/// number of files written.
pub fn extract_beatmapset(data: &[u8], dir: &Path) -> Result<usize, ArchiveError> {
    debug!(bytes = data.len(), dir = %dir.display(), "extracting beatmap set");
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    if archive.is_empty() {
        return Err(ArchiveError::Empty);
    }
    std::fs::create_dir_all(dir)?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let Some(path) = entry_path(dir, &name) else {
            warn!(%name, "skipping archive entry outside the target directory");
            continue;
        };

        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::File::create(&path)?;
            std::io::copy(&mut entry, &mut file)?;
            Ok(())
        })();
        match result {
            Ok(()) => written += 1,
            Err(err) => warn!(%name, error = %err, "failed to extract file"),
        }
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::build_zip;

    const OSU_FILE: &str = "osu file format v14\n\n[General]\nAudioFilename: a.mp3\n\n\
                            [Metadata]\nTitle:Song\nBeatmapSetID:4242\n\n[Difficulty]\nHPDrainRate:5\n";

    #[test]
    fn test_set_id_from_osu_file() {
        assert_eq!(beatmapset_id_from_osu_file(OSU_FILE), Some(4242));
        assert_eq!(beatmapset_id_from_osu_file("[General]\nBeatmapSetID:1\n"), None);
        assert_eq!(
            beatmapset_id_from_osu_file("[Metadata]\nTitle:x\n[Events]\nBeatmapSetID:1\n"),
            None
        );
    }

    #[test]
    fn test_extract_skips_parent_dir_entries() {
        let data = build_zip(&[
            ("map.osu", OSU_FILE),
            ("sb/bg.txt", "bg"),
            ("../evil.txt", "nope"),
            ("sb/../../evil2.txt", "nope"),
        ]);
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("maps").join("4242");

        let written = extract_beatmapset(&data, &dir).unwrap();
        assert_eq!(written, 2);
        assert_eq!(std::fs::read_to_string(dir.join("sb/bg.txt")).unwrap(), "bg");
        assert!(!root.path().join("maps").join("evil.txt").exists());
        assert!(!root.path().join("evil2.txt").exists());
    }

    #[test]
    fn test_failed_entry_does_not_stop_extraction() {
        // "audio.mp3" is a file, so "audio.mp3/x" cannot be created under it.
        let data = build_zip(&[
            ("audio.mp3", "mp3"),
            ("audio.mp3/x", "blocked"),
            ("map.osu", OSU_FILE),
        ]);
        let root = tempfile::tempdir().unwrap();

        let written = extract_beatmapset(&data, root.path()).unwrap();
        assert_eq!(written, 2);
        assert!(root.path().join("map.osu").exists());
        assert_eq!(std::fs::read_to_string(root.path().join("audio.mp3")).unwrap(), "mp3");
    }

    #[test]
    fn test_extract_set_id_from_archive() {
        let data = build_zip(&[("readme.txt", "hi"), ("a.osu", OSU_FILE)]);
        assert_eq!(extract_beatmapset_id(&data).unwrap(), Some(4242));
    }

    #[test]
    fn test_invalid_and_empty_archives() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            extract_beatmapset(b"not a zip", dir.path()),
            Err(ArchiveError::Zip(_))
        ));
        let empty = build_zip(&[]);
        assert!(matches!(
            extract_beatmapset(&empty, dir.path()),
            Err(ArchiveError::Empty)
        ));
    }
}
