pub mod credential_file;
pub mod link_cache;

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

pub use credential_file::CredentialFile;
pub use link_cache::LinkCache;

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Sibling temp name, unique per process and per call
fn tmp_path(path: &Path) -> PathBuf {
    let seq = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = path.as_os_str().to_owned();
    name.push(format!(".{}.{}.tmp", std::process::id(), seq));
    PathBuf::from(name)
}

/// Replace the file at `path` with `bytes`.
///
/// Writes a uniquely named sibling temp file and renames it over the target, so a crash
/// mid-write leaves the previous file intact.
fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let tmp = tmp_path(path);
    let result = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&tmp)
        .and_then(|mut file| {
            file.write_all(bytes)?;
            file.sync_all()
        })
        .and_then(|_| fs::rename(&tmp, path));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
