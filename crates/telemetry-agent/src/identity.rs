// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Anonymous installation identity.
//!
//! A random UUID is generated on first run and persisted in an INI file so
//! crash events from the same installation can be grouped:
//!
//! ```text
//! [Sentry]
//! Id=0f8fad5b-d9cb-469f-a165-70867728950e
//! ```

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::dispatch::LOCAL_ECHO_TARGET;

const SECTION: &str = "Sentry";
const KEY: &str = "Id";

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("invalid telemetry config file {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },
    #[error("invalid telemetry config {path}: missing [Sentry] Id")]
    MissingId { path: PathBuf },
    #[error("invalid telemetry config {path}: {source}")]
    InvalidId {
        path: PathBuf,
        #[source]
        source: uuid::Error,
    },
    #[error("failed to write telemetry config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `<config home>/et/telemetry.ini`, falling back to the working directory
/// when the platform has no config home.
#[must_use]
pub fn default_identity_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_default()
        .join("et")
        .join("telemetry.ini")
}

/// Reads the installation id from `path`, creating the file on first run.
///
/// The first run announces the collection to the user, naming `application`.
pub fn load_or_create(path: &Path, application: &str) -> Result<Uuid, IdentityError> {
    if path.exists() {
        load(path)
    } else {
        create(path, application)
    }
}

fn load(path: &Path) -> Result<Uuid, IdentityError> {
    let conf = Ini::load_from_file(path).map_err(|source| IdentityError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let id = conf
        .section(Some(SECTION))
        .and_then(|section| section.get(KEY))
        .ok_or_else(|| IdentityError::MissingId {
            path: path.to_path_buf(),
        })?;
    Uuid::parse_str(id.trim()).map_err(|source| IdentityError::InvalidId {
        path: path.to_path_buf(),
        source,
    })
}

fn create(path: &Path, application: &str) -> Result<Uuid, IdentityError> {
    let write_err = |source| IdentityError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(write_err)?;
    }

    let id = Uuid::new_v4();
    let mut conf = Ini::new();
    conf.with_section(Some(SECTION)).set(KEY, id.to_string());
    conf.write_to_file(path).map_err(write_err)?;

    info!(
        target: LOCAL_ECHO_TARGET,
        "{application} collects crashes and errors in order to help us improve your experience.\n\
         The data collected is anonymous.\n\
         You can opt-out of telemetry by setting the environment variable \
         {} to any non-empty value.",
        crate::config::NO_TELEMETRY_ENV_VAR
    );
    Ok(id)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_first_run_creates_file_with_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("et").join("telemetry.ini");

        let id = load_or_create(&path, "test-app").unwrap();

        assert!(path.exists());
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[Sentry]"));
        assert!(contents.contains(&id.to_string()));
    }

    #[test]
    fn test_second_run_returns_same_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.ini");

        let first = load_or_create(&path, "test-app").unwrap();
        let second = load_or_create(&path, "test-app").unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn test_reads_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.ini");
        std::fs::write(&path, "[Sentry]\nId = 0f8fad5b-d9cb-469f-a165-70867728950e\n").unwrap();

        let id = load_or_create(&path, "test-app").unwrap();

        assert_eq!(id.to_string(), "0f8fad5b-d9cb-469f-a165-70867728950e");
    }

    #[test]
    fn test_missing_key_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.ini");
        std::fs::write(&path, "[Sentry]\nOther=1\n").unwrap();

        let err = load_or_create(&path, "test-app").unwrap_err();

        assert!(matches!(err, IdentityError::MissingId { .. }));
        assert!(err.to_string().contains("missing [Sentry] Id"));
    }

    #[test]
    fn test_malformed_id_is_config_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.ini");
        std::fs::write(&path, "[Sentry]\nId=not-a-uuid\n").unwrap();

        let err = load_or_create(&path, "test-app").unwrap_err();

        assert!(matches!(err, IdentityError::InvalidId { .. }));
    }

    #[test]
    fn test_default_path_ends_with_et_telemetry_ini() {
        assert!(default_identity_path().ends_with("et/telemetry.ini"));
    }
}
