//! Environment-keyed address registry backed by a single JSON document.
//!
//! ```json
//! {
//!   "local":   { "main": { "FRAX": "0x..." }, "weth": "0x...", ... },
//!   "testnet": { ... }
//! }
//! ```
//!
//! Writes replace only the active environment's entry and go through a
//! temporary file in the destination directory followed by an atomic rename.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use frax_deploy_protocol::Environment;
use serde_json::{Map, Value as Json};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::errors::RegistryError;
use crate::manifest::Manifest;

#[derive(Debug, Clone)]
pub struct AddressRegistry {
    path: PathBuf,
}

impl AddressRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored manifest for `environment`.
    pub fn load(&self, environment: Environment) -> Result<Manifest, RegistryError> {
        let document = self.read_document()?.ok_or_else(|| self.not_found(environment))?;
        let entry = document
            .get(environment.as_str())
            .cloned()
            .ok_or_else(|| self.not_found(environment))?;
        Manifest::from_json(entry).map_err(|reason| RegistryError::Malformed {
            path: self.path.clone(),
            reason: format!("{}: {}", environment, reason),
        })
    }

    /// Stored manifest for `environment` with `partial` merged on top. Nothing
    /// is written.
    pub fn merge(&self, environment: Environment, partial: &Manifest) -> Result<Manifest, RegistryError> {
        let mut manifest = match self.load(environment) {
            Ok(manifest) => manifest,
            Err(RegistryError::NotFound { .. }) => Manifest::new(),
            Err(other) => return Err(other),
        };
        manifest.merge(partial);
        Ok(manifest)
    }

    /// Replace the stored manifest for `environment`. Returns `false` when the
    /// stored manifest is already identical and nothing was written.
    pub fn persist(&self, environment: Environment, manifest: &Manifest) -> Result<bool, RegistryError> {
        let mut document = self.read_document()?.unwrap_or_default();
        let incoming = manifest.to_json();
        if document.get(environment.as_str()) == Some(&incoming) {
            debug!(environment = %environment, path = %self.path.display(), "manifest unchanged");
            return Ok(false);
        }
        document.insert(environment.as_str().to_string(), incoming);
        self.write_atomic(&self.path, &Json::Object(document))?;
        info!(environment = %environment, path = %self.path.display(), "manifest persisted");
        Ok(true)
    }

    /// Sibling file a failed run's report for `environment` is written to.
    pub fn diagnostics_path(&self, environment: Environment) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("addresses");
        self.path
            .with_file_name(format!("{}.{}.failed.json", stem, environment))
    }

    pub fn write_diagnostics(&self, environment: Environment, report: &Json) -> Result<PathBuf, RegistryError> {
        let path = self.diagnostics_path(environment);
        self.write_atomic(&path, report)?;
        Ok(path)
    }

    fn not_found(&self, environment: Environment) -> RegistryError {
        RegistryError::NotFound {
            environment,
            path: self.path.clone(),
        }
    }

    fn io_error(&self, path: &Path, source: io::Error) -> RegistryError {
        RegistryError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn read_document(&self) -> Result<Option<Map<String, Json>>, RegistryError> {
        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(&self.path, e)),
        };
        if contents.trim().is_empty() {
            return Ok(Some(Map::new()));
        }
        match serde_json::from_str(&contents) {
            Ok(Json::Object(document)) => Ok(Some(document)),
            Ok(_) => Err(RegistryError::Malformed {
                path: self.path.clone(),
                reason: "top level is not an object".to_string(),
            }),
            Err(e) => Err(RegistryError::Malformed {
                path: self.path.clone(),
                reason: e.to_string(),
            }),
        }
    }

    fn write_atomic(&self, path: &Path, value: &Json) -> Result<(), RegistryError> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_error(dir, e))?;

        let mut contents = serde_json::to_string_pretty(value).map_err(|e| RegistryError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        contents.push('\n');

        // The temporary file is removed on drop if anything below fails.
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(dir, e))?;
        tmp.write_all(contents.as_bytes())
            .map_err(|e| self.io_error(tmp.path(), e))?;
        tmp.as_file().sync_all().map_err(|e| self.io_error(tmp.path(), e))?;
        tmp.persist(path).map_err(|e| self.io_error(path, e.error))?;
        Ok(())
    }
}
