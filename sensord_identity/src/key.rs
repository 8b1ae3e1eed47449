//! Persisted HMAC key (§3 "Global HMAC key", §4.9).

use rand::RngCore;
use sensord_common::consts::HMAC_KEY_LEN;
use std::fs::OpenOptions;
use std::io::{Read, Write};
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

/// Load the persisted key, or generate and persist a fresh one.
///
/// Persistence failure is non-fatal: the service continues with the
/// freshly generated key in memory, which only means derived dynamic-sensor
/// IDs will not survive a restart (§4.9).
pub fn load_or_generate(path: &Path) -> [u8; HMAC_KEY_LEN] {
    if let Some(key) = try_read(path) {
        return key;
    }

    let mut key = [0u8; HMAC_KEY_LEN];
    rand::rng().fill_bytes(&mut key);

    if let Err(err) = persist(path, &key) {
        tracing::warn!(%err, path = %path.display(), "failed to persist HMAC key, dynamic IDs will not survive a restart");
    }

    key
}

fn try_read(path: &Path) -> Option<[u8; HMAC_KEY_LEN]> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut buf = [0u8; HMAC_KEY_LEN];
    file.read_exact(&mut buf).ok()?;
    Some(buf)
}

fn persist(path: &Path, key: &[u8; HMAC_KEY_LEN]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut opts = OpenOptions::new();
    opts.create(true).write(true).truncate(true);
    #[cfg(unix)]
    opts.mode(0o400);

    let mut file = opts.open(path)?;
    file.write_all(key)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn generates_and_persists_on_first_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hmac.key");

        let first = load_or_generate(&path);
        assert!(path.exists());

        let second = load_or_generate(&path);
        assert_eq!(first, second, "second load must read back the persisted key");
    }

    #[cfg(unix)]
    #[test]
    fn persisted_key_is_owner_read_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let path = dir.path().join("hmac.key");
        load_or_generate(&path);

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o400);
    }
}
