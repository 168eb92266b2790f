//! Sequential identifiers on the shared filesystem
//!
//! Ids are human-legible zero-padded counters (`a001`, `0001`). The next value comes
//! from scanning the directory for the highest existing suffix; the claim itself is an
//! exclusive create, so two processes racing for the same number cannot both win.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::core::{ConvoyError, Result};

/// Collisions tolerated before giving up on one allocation
const MAX_ATTEMPTS: u32 = 64;

/// Distinguishes temp files of concurrent publishers within one process
static TEMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Prefix of agent ids
pub const AGENT_PREFIX: &str = "a";
/// Digits in an agent id
pub const AGENT_WIDTH: usize = 3;
/// Digits in a message id
pub const MESSAGE_WIDTH: usize = 4;

/// Highest numeric value among entries named `<prefix><digits><suffix>`; 0 when none
pub fn scan_max(dir: &Path, prefix: &str, suffix: &str) -> u32 {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };

    entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let digits = name.strip_prefix(prefix)?.strip_suffix(suffix)?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse::<u32>().ok()
        })
        .max()
        .unwrap_or(0)
}

/// Format a counter as an id
pub fn format_id(prefix: &str, value: u32, width: usize) -> String {
    format!("{}{:0width$}", prefix, value, width = width)
}

/// Claim the next `<prefix>NNN` subdirectory of `root`, returning its id and path
pub fn allocate_dir(root: &Path, prefix: &str, width: usize) -> Result<(String, PathBuf)> {
    fs::create_dir_all(root)?;
    let mut next = scan_max(root, prefix, "") + 1;

    for _ in 0..MAX_ATTEMPTS {
        let id = format_id(prefix, next, width);
        let path = root.join(&id);
        match fs::create_dir(&path) {
            Ok(()) => return Ok((id, path)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                tracing::debug!(id = %id, "id already claimed, trying the next one");
                next = next.max(scan_max(root, prefix, "")) + 1;
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(ConvoyError::storage(format!(
        "Could not allocate an id under {}",
        root.display()
    )))
}

/// Publish the next `NNNN<suffix>` file in `root`, returning its id and path.
///
/// `render` produces the file body for a candidate id. The body is written to a
/// hidden temp file first and then hard-linked to the numbered name, so the claim
/// and the complete content become visible together. Readers never see an empty
/// or half-written entry.
pub fn publish_file<F>(root: &Path, suffix: &str, width: usize, mut render: F) -> Result<(String, PathBuf)>
where
    F: FnMut(&str) -> Result<Vec<u8>>,
{
    fs::create_dir_all(root)?;
    let mut next = scan_max(root, "", suffix) + 1;
    let nonce = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let seq = TEMP_SEQ.fetch_add(1, Ordering::Relaxed);
    let temp_path = root.join(format!(
        ".{}-{}-{}{}.tmp",
        std::process::id(),
        nonce,
        seq,
        suffix
    ));

    let result = (|| -> Result<(String, PathBuf)> {
        for _ in 0..MAX_ATTEMPTS {
            let id = format_id("", next, width);
            let path = root.join(format!("{}{}", id, suffix));

            let mut temp = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&temp_path)?;
            temp.write_all(&render(&id)?)?;
            temp.sync_all()?;
            drop(temp);

            match fs::hard_link(&temp_path, &path) {
                Ok(()) => return Ok((id, path)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    next = next.max(scan_max(root, "", suffix)) + 1;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(ConvoyError::storage(format!(
            "Could not allocate an id under {}",
            root.display()
        )))
    })();

    let _ = fs::remove_file(&temp_path);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;

    #[test]
    fn test_scan_max_ignores_foreign_names() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("a002")).unwrap();
        fs::create_dir(dir.path().join("a010")).unwrap();
        fs::create_dir(dir.path().join("abc")).unwrap();
        fs::write(dir.path().join(".a099.tmp"), "").unwrap();

        assert_eq!(scan_max(dir.path(), "a", ""), 10);
        assert_eq!(scan_max(&dir.path().join("missing"), "a", ""), 0);
    }

    #[test]
    fn test_allocate_dir_is_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = allocate_dir(dir.path(), AGENT_PREFIX, AGENT_WIDTH).unwrap();
        let (second, path) = allocate_dir(dir.path(), AGENT_PREFIX, AGENT_WIDTH).unwrap();

        assert_eq!(first, "a001");
        assert_eq!(second, "a002");
        assert!(path.is_dir());
    }

    #[test]
    fn test_publish_file_skips_existing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("0007.json"), "{}").unwrap();
        let (id, path) =
            publish_file(dir.path(), ".json", MESSAGE_WIDTH, |id| Ok(id.as_bytes().to_vec())).unwrap();

        assert_eq!(id, "0008");
        assert!(path.ends_with("0008.json"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "0008");
    }

    #[test]
    fn test_publish_file_leaves_no_temp_behind() {
        let dir = tempfile::tempdir().unwrap();
        publish_file(dir.path(), ".json", MESSAGE_WIDTH, |_| Ok(b"{}".to_vec())).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["0001.json".to_string()]);
    }

    #[test]
    fn test_publish_file_surfaces_render_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = publish_file(dir.path(), ".json", MESSAGE_WIDTH, |_| {
            Err(ConvoyError::storage("no body"))
        })
        .unwrap_err();

        assert!(matches!(err, ConvoyError::Storage(_)));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_concurrent_allocations_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let ids = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..5 {
                        let (id, _) = allocate_dir(dir.path(), AGENT_PREFIX, AGENT_WIDTH).unwrap();
                        ids.lock().unwrap().push(id);
                    }
                });
            }
        });

        let ids = ids.into_inner().unwrap();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(ids.len(), 40);
        assert_eq!(unique.len(), 40);
    }

    #[test]
    fn test_concurrent_message_files_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let ids = Mutex::new(Vec::new());

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..5 {
                        let (id, _) =
                            publish_file(dir.path(), ".json", MESSAGE_WIDTH, |_| Ok(b"{}".to_vec()))
                                .unwrap();
                        ids.lock().unwrap().push(id);
                    }
                });
            }
        });

        let ids = ids.into_inner().unwrap();
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 40);
    }
}
