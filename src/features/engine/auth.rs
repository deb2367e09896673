//! Single refresh path for expired credentials.
//!
//! Every in-flight request that hits `AuthInvalid` funnels through one
//! [`AuthGate`]. The first caller refreshes; callers that failed on the token
//! that was just replaced see the generation move and retry without a second
//! refresh.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::RemoteError;
use crate::features::sync::{dispatch, OperationExecutor, SyncOperation};
use crate::remote::{RemoteWriter, TokenRefresher};

#[derive(Debug)]
struct GateState {
    generation: u64,
    last_refresh_ok: bool,
}

/// Serializes token refreshes across concurrent requests.
pub struct AuthGate {
    refresher: Option<Arc<dyn TokenRefresher>>,
    state: Mutex<GateState>,
}

impl AuthGate {
    #[must_use]
    pub fn new(refresher: Option<Arc<dyn TokenRefresher>>) -> Self {
        Self {
            refresher,
            state: Mutex::new(GateState {
                generation: 0,
                last_refresh_ok: true,
            }),
        }
    }

    /// Token generation in use. Waits for a running refresh to finish.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Refresh the token unless it was already replaced since `seen`.
    ///
    /// # Errors
    ///
    /// Returns `RemoteError::AuthInvalid` when no refresher is configured, or
    /// the refresher's error when the refresh this caller depends on failed.
    pub async fn refresh_since(&self, seen: u64) -> Result<(), RemoteError> {
        let Some(refresher) = &self.refresher else {
            return Err(RemoteError::AuthInvalid);
        };

        let mut state = self.state.lock().await;
        if state.generation != seen {
            return if state.last_refresh_ok {
                Ok(())
            } else {
                Err(RemoteError::AuthInvalid)
            };
        }

        let result = refresher.refresh().await;
        state.generation += 1;
        state.last_refresh_ok = result.is_ok();
        match &result {
            Ok(()) => info!(generation = state.generation, "Access token refreshed"),
            Err(err) => warn!(error = %err, "Token refresh failed"),
        }
        result
    }
}

/// Executes queued operations, refreshing credentials once on `AuthInvalid`
/// and retrying the operation a single time.
pub struct AuthExecutor<'a> {
    pub writer: &'a dyn RemoteWriter,
    pub gate: &'a AuthGate,
}

#[async_trait]
impl OperationExecutor for AuthExecutor<'_> {
    async fn execute(&self, operation: &SyncOperation) -> Result<(), RemoteError> {
        let seen = self.gate.generation().await;
        match dispatch(self.writer, operation).await {
            Err(RemoteError::AuthInvalid) => {
                if self.gate.refresh_since(seen).await.is_err() {
                    return Err(RemoteError::AuthInvalid);
                }
                dispatch(self.writer, operation).await
            }
            other => other,
        }
    }
}
