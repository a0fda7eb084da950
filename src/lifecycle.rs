//! Remote version lifecycle.
//!
//! The provider holds exactly one live version, tagged with the fixed
//! version id from config. Lookups and deletes never fail the sync: a
//! transport error turns into a [`VersionLookup::Degraded`] or
//! [`StepOutcome::Degraded`] value the caller can inspect. App metadata is
//! the exception; without it no payload can be built, so it propagates.

use anyhow::{Context, Result};

use crate::models::{AppInfo, RemoteVersion};
use crate::traits::RemoteGateway;

/// Result of looking up the tracked remote version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionLookup {
    Found(RemoteVersion),
    Absent,
    /// The lookup failed; treated as absent.
    Degraded(String),
}

impl VersionLookup {
    pub fn version(&self) -> Option<&RemoteVersion> {
        match self {
            Self::Found(v) => Some(v),
            _ => None,
        }
    }
}

/// Result of a best-effort remote step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    Degraded(String),
}

/// Version lifecycle operations bound to one app and version id.
pub struct RemoteLifecycle<'a> {
    gateway: &'a dyn RemoteGateway,
    app_id: &'a str,
    version_id: &'a str,
}

impl<'a> RemoteLifecycle<'a> {
    pub fn new(gateway: &'a dyn RemoteGateway, app_id: &'a str, version_id: &'a str) -> Self {
        Self {
            gateway,
            app_id,
            version_id,
        }
    }

    pub async fn get_remote_version(&self) -> VersionLookup {
        match self.gateway.list_versions(self.app_id).await {
            Ok(versions) => versions
                .into_iter()
                .find(|v| v.version_id == self.version_id)
                .map(VersionLookup::Found)
                .unwrap_or(VersionLookup::Absent),
            Err(e) => {
                tracing::warn!(
                    app_id = self.app_id,
                    version_id = self.version_id,
                    error = %format!("{:#}", e),
                    "version lookup failed, treating remote version as absent"
                );
                VersionLookup::Degraded(format!("{:#}", e))
            }
        }
    }

    pub async fn delete_version(&self) -> StepOutcome {
        match self
            .gateway
            .delete_version(self.app_id, self.version_id)
            .await
        {
            Ok(()) => {
                tracing::info!(version_id = self.version_id, "deleted remote version");
                StepOutcome::Done
            }
            Err(e) => {
                tracing::warn!(
                    app_id = self.app_id,
                    version_id = self.version_id,
                    error = %format!("{:#}", e),
                    "failed to delete remote version, continuing"
                );
                StepOutcome::Degraded(format!("{:#}", e))
            }
        }
    }

    pub async fn get_app_info(&self) -> Result<AppInfo> {
        self.gateway
            .get_app_info(self.app_id)
            .await
            .with_context(|| format!("App '{}' could not be loaded", self.app_id))
    }
}
