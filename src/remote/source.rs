use std::fmt;

use async_trait::async_trait;

use crate::error::SyncError;
use crate::models::PhotoRecord;

/// Connection details for the remote folder.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub folder_id: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>, folder_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            folder_id: folder_id.into(),
        }
    }

    /// Rejects empty values. The format itself is not checked here.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.api_key.trim().is_empty() {
            return Err(SyncError::Configuration("API key is not set".into()));
        }
        if self.folder_id.trim().is_empty() {
            return Err(SyncError::Configuration("folder id is not set".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let key = if self.api_key.is_empty() {
            "<empty>"
        } else {
            "<redacted>"
        };
        f.debug_struct("Credentials")
            .field("api_key", &key)
            .field("folder_id", &self.folder_id)
            .finish()
    }
}

/// Something that can list every image in a folder.
///
/// Implementations must be all-or-nothing: either the complete listing, or an
/// error with nothing partial returned.
#[async_trait]
pub trait PhotoSource: Send + Sync {
    async fn list_photos(&self, credentials: &Credentials) -> Result<Vec<PhotoRecord>, SyncError>;
}
