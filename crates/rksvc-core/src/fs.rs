//! Filesystem primitives shared across lifecycle steps.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use anyhow::Context;

fn tmp_sibling(path: &Path) -> anyhow::Result<PathBuf> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("Path has no parent: {}", path.display()))?;
    let name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Path has no file name: {}", path.display()))?
        .to_string_lossy();
    Ok(parent.join(format!(".{}.{}.tmp", name, std::process::id())))
}

/// Write `bytes` to `path` through a temp file and rename.
///
/// The temp file is created in the same directory with `mode` already applied,
/// so readers only ever observe the old or the new complete file.
pub fn write_atomic(path: &Path, bytes: &[u8], mode: u32) -> anyhow::Result<()> {
    write_atomic_with(path, bytes, mode, |_| Ok(()))
}

/// [`write_atomic`], running `before_rename` on the complete temp file first.
///
/// Ownership set there is in effect the moment the file appears at `path`.
pub fn write_atomic_with(
    path: &Path,
    bytes: &[u8],
    mode: u32,
    before_rename: impl FnOnce(&Path) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let tmp_path = tmp_sibling(path)?;
    let result = (|| -> anyhow::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp_path)
            .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;
        // open(2) honours the umask; set the exact mode explicitly.
        file.set_permissions(fs::Permissions::from_mode(mode))?;
        file.sync_all()?;
        before_rename(&tmp_path)?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                tmp_path.display(),
                path.display()
            )
        })
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Copy `src` over `dst` through a temp file and rename.
pub fn copy_atomic(src: &Path, dst: &Path, mode: u32) -> anyhow::Result<()> {
    let tmp_path = tmp_sibling(dst)?;
    let result = (|| -> anyhow::Result<()> {
        let mut reader =
            File::open(src).with_context(|| format!("Failed to open {}", src.display()))?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(mode)
            .open(&tmp_path)
            .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;
        io::copy(&mut reader, &mut file)
            .with_context(|| format!("Failed to copy {} into temp file", src.display()))?;
        file.set_permissions(fs::Permissions::from_mode(mode))?;
        file.sync_all()?;
        fs::rename(&tmp_path, dst).with_context(|| {
            format!(
                "Failed to move {} into place at {}",
                tmp_path.display(),
                dst.display()
            )
        })
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

/// Remove a file, symlink (dangling or not) or directory tree.
///
/// Returns `false` when nothing was there.
pub fn remove_path_if_exists(path: &Path) -> anyhow::Result<bool> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(err).with_context(|| format!("Failed to read metadata: {}", path.display()));
        }
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
            .with_context(|| format!("Failed to remove directory: {}", path.display()))?;
    } else {
        fs::remove_file(path)
            .with_context(|| format!("Failed to remove file: {}", path.display()))?;
    }
    Ok(true)
}

/// Remove `path` only if it is an empty directory.
pub fn remove_dir_if_empty(path: &Path) -> bool {
    match fs::read_dir(path) {
        Ok(mut entries) => entries.next().is_none() && fs::remove_dir(path).is_ok(),
        Err(_) => false,
    }
}

/// Permission bits (`0o7777` mask), following symlinks.
pub fn mode_of(path: &Path) -> Option<u32> {
    fs::metadata(path)
        .ok()
        .map(|meta| meta.permissions().mode() & 0o7777)
}

pub fn set_mode(path: &Path, mode: u32) -> anyhow::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(mode))
        .with_context(|| format!("Failed to chmod {:o} {}", mode, path.display()))
}

pub fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

pub fn file_digest(path: &Path) -> anyhow::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    io::copy(&mut file, &mut hasher)
        .with_context(|| format!("Failed to hash {}", path.display()))?;
    Ok(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_applies_mode_and_leaves_no_temp_file() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("config.toml");

        write_atomic(&target, b"a = 1\n", 0o640).unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "a = 1\n");
        assert_eq!(mode_of(&target), Some(0o640));
        let leftovers: Vec<_> = fs::read_dir(temp.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn hook_sees_the_temp_file_and_can_abort() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("config.toml");
        write_atomic(&target, b"old", 0o640).unwrap();

        let mut seen = None;
        write_atomic_with(&target, b"new", 0o640, |tmp| {
            seen = Some(fs::read_to_string(tmp)?);
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.as_deref(), Some("new"));

        let err = write_atomic_with(&target, b"newer", 0o640, |_| anyhow::bail!("chown refused"));
        assert!(err.is_err());
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 1);
    }

    #[test]
    fn write_atomic_replaces_existing_content() {
        let temp = TempDir::new().unwrap();
        let target = temp.path().join("unit");
        write_atomic(&target, b"old", 0o644).unwrap();
        write_atomic(&target, b"new", 0o644).unwrap();
        assert_eq!(fs::read_to_string(&target).unwrap(), "new");
    }

    #[test]
    fn remove_path_handles_dangling_symlink() {
        let temp = TempDir::new().unwrap();
        let link = temp.path().join("link");
        std::os::unix::fs::symlink(temp.path().join("missing"), &link).unwrap();

        assert!(remove_path_if_exists(&link).unwrap());
        assert!(!remove_path_if_exists(&link).unwrap());
    }

    #[test]
    fn remove_dir_if_empty_keeps_populated_dirs() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("bin");
        fs::create_dir(&dir).unwrap();
        fs::write(dir.join("keep"), b"x").unwrap();

        assert!(!remove_dir_if_empty(&dir));
        fs::remove_file(dir.join("keep")).unwrap();
        assert!(remove_dir_if_empty(&dir));
    }

    #[test]
    fn digest_tracks_content() {
        let temp = TempDir::new().unwrap();
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::write(&a, b"same").unwrap();
        fs::write(&b, b"same").unwrap();
        assert_eq!(file_digest(&a).unwrap(), file_digest(&b).unwrap());
        fs::write(&b, b"different").unwrap();
        assert_ne!(file_digest(&a).unwrap(), file_digest(&b).unwrap());
    }
}
