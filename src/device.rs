//! Stable per-installation device identity.
//!
//! The identity is generated once from the host name and a nanosecond
//! timestamp, then persisted as raw hex in `<data_dir>/.device_id`. Later
//! runs read the file back instead of generating a new one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::checksum::sha256_hex;
use crate::error::SyncResult;

/// File name of the persisted identity inside the data directory
pub const DEVICE_ID_FILE: &str = ".device_id";

/// Length of a generated identity in hex characters (16 bytes)
pub const DEVICE_ID_LEN: usize = 32;

/// Path of the identity file for a data directory
pub fn device_id_path(storage_dir: &Path) -> PathBuf {
    storage_dir.join(DEVICE_ID_FILE)
}

fn host_name() -> String {
    #[cfg(feature = "desktop")]
    {
        match hostname::get() {
            Ok(name) => name.to_string_lossy().into_owned(),
            Err(_) => "localhost".to_string(),
        }
    }
    #[cfg(not(feature = "desktop"))]
    {
        std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
    }
}

/// Generate a fresh identity without persisting it
pub fn generate_device_id() -> String {
    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| Utc::now().timestamp_micros() * 1000);
    let seed = format!("{}{}", host_name(), nanos);
    let mut id = sha256_hex(seed.as_bytes());
    id.truncate(DEVICE_ID_LEN);
    id
}

/// Read the identity stored under `storage_dir`, creating it on first use.
///
/// An existing identity is returned verbatim. A missing or blank file is
/// replaced by a newly generated identity; `storage_dir` is created if
/// needed. Filesystem failures are returned, never papered over with an
/// unsaved identity.
pub fn get_or_create_device_id(storage_dir: &Path) -> SyncResult<String> {
    let path = device_id_path(storage_dir);

    if path.exists() {
        let existing = fs::read_to_string(&path)?;
        if !existing.trim().is_empty() {
            return Ok(existing);
        }
        tracing::warn!(path = %path.display(), "Device id file is empty, regenerating");
    }

    fs::create_dir_all(storage_dir)?;
    let device_id = generate_device_id();
    fs::write(&path, &device_id)?;

    tracing::info!(device_id = %device_id, "Generated new device id");
    Ok(device_id)
}
