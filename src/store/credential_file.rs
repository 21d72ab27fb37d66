use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::app::Result;
use crate::domain::Credential;
use crate::store::write_atomic;

/// Durable home of a network's bearer token between runs.
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential; `Ok(None)` if there is none yet.
    ///
    /// A loaded credential is always tagged as cached.
    pub fn load(&self) -> Result<Option<Credential>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let credential: Credential = serde_json::from_slice(&bytes)?;
        if credential.token.is_empty() {
            return Ok(None);
        }
        Ok(Some(credential))
    }

    pub fn save(&self, credential: &Credential) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(credential)?;
        write_atomic(&self.path, &bytes)?;
        Ok(())
    }
}
