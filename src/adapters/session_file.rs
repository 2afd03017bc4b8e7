use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::adapters::cloud::CloudApi;
use crate::domain::session_record::{SessionRecord, SessionUpdate, login_hash};

#[derive(Debug, Error)]
pub enum SessionFileError {
    #[error("session file io failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("session file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Single-writer JSON cache of the client identity and cloud token.
#[derive(Debug, Clone)]
pub struct SessionCache {
    path: PathBuf,
    login_hash: String,
    serial_number_length: usize,
}

impl SessionCache {
    pub fn new(
        path: impl Into<PathBuf>,
        username: &str,
        password: &str,
        serial_number_length: usize,
    ) -> Self {
        Self {
            path: path.into(),
            login_hash: login_hash(username, password),
            serial_number_length,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn login_hash(&self) -> &str {
        &self.login_hash
    }

    /// Never fails: an unreadable file counts as empty.
    pub fn load(&self) -> SessionRecord {
        let mut record = match self.read() {
            Ok(record) => record,
            Err(SessionFileError::Io(error)) if error.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %self.path.display(), "no stored session data found");
                SessionRecord::default()
            }
            Err(error) => {
                tracing::debug!(
                    path = %self.path.display(),
                    error = %error,
                    "failed to load stored session data"
                );
                SessionRecord::default()
            }
        };

        let invalidated = record.invalidate_if_credentials_changed(&self.login_hash);
        if invalidated {
            tracing::info!("authentication properties changed, invalidated cached cloud token");
        }

        let generated = record.ensure_identity(self.serial_number_length);

        if invalidated || generated {
            self.write_logged(&record);
        }

        record
    }

    /// Merges `update` into the current record and rewrites the whole file.
    pub fn save(&self, update: SessionUpdate) -> SessionRecord {
        let mut record = self.load();
        record.apply(update);
        self.write_logged(&record);
        record
    }

    pub fn save_from_api(&self, api: &dyn CloudApi) -> SessionRecord {
        let mut update = SessionUpdate::default();

        if let Some(api_base) = api.api_base() {
            tracing::debug!(api_base = %api_base, "saving api base");
            update.api_base = Some(api_base);
        }

        if let (Some(token), Some(expiration)) = (api.token(), api.token_expiration()) {
            tracing::debug!(token_expiration = %expiration, "saving cloud token");
            update.cloud_token = Some(token);
            update.cloud_token_expiration = Some(expiration.timestamp_millis());
            update.login_hash = Some(self.login_hash.clone());
        }

        self.save(update)
    }

    fn read(&self) -> Result<SessionRecord, SessionFileError> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write(&self, record: &SessionRecord) -> Result<(), SessionFileError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        fs::write(&self.path, serde_json::to_string(record)?)?;
        Ok(())
    }

    fn write_logged(&self, record: &SessionRecord) {
        if let Err(error) = self.write(record) {
            tracing::warn!(
                path = %self.path.display(),
                error = %error,
                "failed to write session data"
            );
        }
    }
}

impl From<&SessionRecord> for SessionUpdate {
    fn from(record: &SessionRecord) -> Self {
        Self {
            api_base: record.api_base.clone(),
            cloud_token: record.cloud_token.clone(),
            cloud_token_expiration: record.cloud_token_expiration,
            login_hash: record.login_hash.clone(),
        }
    }
}
