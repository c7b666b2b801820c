use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::wc::{ClientError, ClientManager, SvnCliManager};
use crate::{ClientOptions, QueryFailure, Result, WorkingCopyInfo};

/// Runs working-copy queries in the current process.
///
/// Each call acquires its own client handle and drops it before returning;
/// nothing is shared between calls except the manager.
#[derive(Clone, Debug)]
pub struct Inspector {
    manager: Arc<dyn ClientManager>,
}

impl Default for Inspector {
    fn default() -> Self {
        Self::from_options(ClientOptions::default())
    }
}

impl Inspector {
    /// Creates an inspector backed by a custom client manager.
    pub fn new(manager: impl ClientManager + 'static) -> Self {
        Self {
            manager: Arc::new(manager),
        }
    }

    /// Creates an inspector that runs the `svn` command-line client.
    pub fn from_options(options: ClientOptions) -> Self {
        Self::new(SvnCliManager::new(options))
    }

    /// Returns working-copy info for `path` at its WORKING state.
    ///
    /// Every failure, including failure to acquire a client, is reported as a
    /// [`QueryFailure`] naming `path`.
    pub async fn inspect(&self, path: &Path) -> Result<WorkingCopyInfo> {
        match self.query(path).await {
            Ok(info) => {
                debug!(path = %path.display(), revision = info.revision(), "svn info done");
                Ok(info)
            }
            Err(err) => {
                debug!(path = %path.display(), error = %err, "svn info failed");
                Err(QueryFailure::new(path, err).into())
            }
        }
    }

    // The client handle is dropped before this returns, on every path.
    async fn query(&self, path: &Path) -> std::result::Result<WorkingCopyInfo, ClientError> {
        let mut client = self.manager.open()?;
        let entry = client.info(path).await?;
        entry.into_info()
    }
}
