//! Per-request working directories.
//!
//! Every dubbing request gets its own directory like
//! `autodub-output/2026-02-19-3f9c2a1b`, holding the downloaded media,
//! intermediate tracks, the dubbed video and `manifest.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// Generate a session ID like "2026-02-19-3f9c2a1b".
pub fn generate_session_id() -> String {
    let uuid = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", today(), &uuid[..8])
}

/// Create a fresh session directory inside `root`.
///
/// Returns the session ID and the directory path. Handles collisions by
/// appending -2, -3, etc.
pub fn create_session_dir(root: &Path) -> Result<(String, PathBuf)> {
    std::fs::create_dir_all(root)
        .with_context(|| format!("Failed to create work directory: {}", root.display()))?;

    let base = generate_session_id();
    let mut id = base.clone();
    let mut counter = 2u32;
    loop {
        let candidate = root.join(&id);
        // create_dir (not create_dir_all) fails if another run got there first
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok((id, candidate)),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                id = format!("{}-{}", base, counter);
                counter += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to create session directory: {}", candidate.display())
                })
            }
        }
    }
}

/// Today's date as YYYY-MM-DD (UTC).
fn today() -> String {
    let since_epoch = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let (year, month, day) = days_to_date((since_epoch.as_secs() / 86400) as i64);
    format!("{:04}-{:02}-{:02}", year, month, day)
}

/// Convert days since Unix epoch to (year, month, day).
fn days_to_date(days: i64) -> (i32, u32, u32) {
    // Howard Hinnant's civil_from_days
    let z = days + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u32;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let m = if mp < 10 { mp + 3 } else { mp - 9 };
    let y = if m <= 2 { y + 1 } else { y };
    (y as i32, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!("autodub_session_{}_{}", name, std::process::id()));
        std::fs::remove_dir_all(&root).ok();
        root
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0].len(), 4);
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2].len(), 2);
        assert_eq!(parts[3].len(), 8);
        assert!(parts[3].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_session_ids_differ() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn test_create_session_dir() {
        let root = temp_root("basic");
        let (id, dir) = create_session_dir(&root).unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir, root.join(&id));

        let (id2, dir2) = create_session_dir(&root).unwrap();
        assert_ne!(id, id2);
        assert_ne!(dir, dir2);

        std::fs::remove_dir_all(&root).ok();
    }

    #[test]
    fn test_days_to_date() {
        assert_eq!(days_to_date(0), (1970, 1, 1));
        // 2024-01-01 = 19723 days since epoch
        assert_eq!(days_to_date(19723), (2024, 1, 1));
        assert_eq!(days_to_date(19782), (2024, 2, 29));
    }
}
