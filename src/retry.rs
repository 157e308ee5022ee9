use std::future::Future;
use std::sync::Arc;

use crate::api::{CallKind, CallOutcome, Payload};
use crate::credentials::{Credential, CredentialPool};
use crate::error::{Error, Result};
use crate::log::ProjectLog;

/// Runs generative calls under the key-rotation protocol.
///
/// Quota and empty-content outcomes rotate to the next key and try again, up
/// to one attempt per key. Any other failure is returned on the spot.
#[derive(Clone)]
pub struct RetryingCaller {
    pool: Arc<CredentialPool>,
    log: Arc<ProjectLog>,
}

impl RetryingCaller {
    pub fn new(pool: Arc<CredentialPool>, log: Arc<ProjectLog>) -> Self {
        Self { pool, log }
    }

    pub fn pool(&self) -> &CredentialPool {
        &self.pool
    }

    pub async fn execute<T, F, Fut>(&self, kind: CallKind, target: &str, mut call: F) -> Result<T>
    where
        T: Payload,
        F: FnMut(Credential) -> Fut,
        Fut: Future<Output = anyhow::Result<CallOutcome<T>>>,
    {
        let max_attempts = self.pool.len();
        for attempt in 1..=max_attempts {
            let key = self.pool.current()?;
            let label = key.fingerprint();

            let transient = match call(key).await {
                Ok(CallOutcome::Ready(payload)) if !payload.is_empty_payload() => {
                    return Ok(payload);
                }
                Ok(CallOutcome::Ready(_)) => Error::EmptyContent(format!(
                    "{kind} call for {target} returned an empty payload"
                )),
                Ok(CallOutcome::EmptyContent(detail)) => Error::EmptyContent(detail),
                Ok(CallOutcome::QuotaExhausted(detail)) => Error::QuotaExceeded(detail),
                Err(err) => {
                    self.log.error_with(
                        format!("A non-retriable error occurred during the {kind} call: {err:#}"),
                        serde_json::json!({ "target": target, "key": label, "attempt": attempt }),
                    );
                    return Err(Error::Service(err));
                }
            };

            self.log.warn_with(
                format!("{kind} call hit a transient failure with {label}: {transient}"),
                serde_json::json!({
                    "target": target,
                    "attempt": attempt,
                    "max_attempts": max_attempts,
                }),
            );

            if attempt == max_attempts {
                break;
            }
            let next = self.pool.advance()?;
            self.log
                .warn(format!("Switched API key from {label} to {}.", next.fingerprint()));
        }

        Err(Error::PoolExhausted {
            total: self.pool.len(),
        })
    }
}
