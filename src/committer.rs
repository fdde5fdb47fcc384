//! Turns one expired debounce key into one durable write.
//!
//! The ordering is the whole design: commit to Postgres first, delete the
//! staged value only after the commit succeeds. A crash or failure between
//! the two leaves the staged code in Redis, where the sweep or the next
//! expiry picks it up again — user code is never dropped, at worst
//! re-committed (a harmless upsert).
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::{
    keys::{self, DebounceKey},
    repository::{CodeRepository, IdentityResolver},
    staging::StagingStore,
};

/// What became of one expiry event. Informational: the consumer loop
/// continues regardless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Key belongs to another subsystem or does not parse. No store calls.
    Ignored,
    /// Staged value already consumed or never written. Valid no-op.
    Empty,
    Committed,
    /// Identity lookup or durable write failed. Staged value retained for a
    /// later trigger.
    Failed,
}

pub struct Committer {
    prefix: String,
    staging: Arc<dyn StagingStore>,
    codes: Arc<dyn CodeRepository>,
    identity: Arc<dyn IdentityResolver>,
}

impl Committer {
    pub fn new(
        prefix: &str,
        staging: Arc<dyn StagingStore>,
        codes: Arc<dyn CodeRepository>,
        identity: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            prefix: prefix.to_string(),
            staging,
            codes,
            identity,
        }
    }

    /// Entry point for raw key names off the expiry channel.
    pub async fn handle_expired(&self, raw_key: &str) -> CommitOutcome {
        let Some(key) = keys::decode(&self.prefix, raw_key) else {
            return CommitOutcome::Ignored;
        };

        self.commit(&key).await
    }

    /// Persist whatever is staged for the triple, then release the staging
    /// key. Also called directly by the reconciliation sweep.
    pub async fn commit(&self, key: &DebounceKey) -> CommitOutcome {
        let data_key = keys::data_key(&self.prefix, key);

        let code = match self.staging.get(&data_key).await {
            Ok(Some(code)) => code,
            Ok(None) => {
                debug!("nothing staged under {data_key}, skipping");
                return CommitOutcome::Empty;
            }
            Err(e) => {
                error!(
                    user_id = key.user_id,
                    problem_id = key.problem_id,
                    language = %key.language,
                    "staged code unreadable: {e}"
                );
                return CommitOutcome::Failed;
            }
        };

        let username = match self.identity.resolve(key.user_id).await {
            Ok(Some(username)) => username,
            Ok(None) => {
                error!(
                    user_id = key.user_id,
                    problem_id = key.problem_id,
                    language = %key.language,
                    "no username for staged code, keeping it staged"
                );
                return CommitOutcome::Failed;
            }
            Err(e) => {
                error!(
                    user_id = key.user_id,
                    problem_id = key.problem_id,
                    language = %key.language,
                    "identity lookup failed: {e}"
                );
                return CommitOutcome::Failed;
            }
        };

        if let Err(e) = self
            .codes
            .upsert(key.problem_id, &username, &key.language, &code)
            .await
        {
            error!(
                user_id = key.user_id,
                problem_id = key.problem_id,
                language = %key.language,
                "autosave persist failed: {e}"
            );
            return CommitOutcome::Failed;
        }

        // Only now is the staged copy redundant.
        if let Err(e) = self.staging.delete(&data_key).await {
            warn!("persisted but could not delete {data_key}: {e}");
        }

        debug!(
            user_id = key.user_id,
            problem_id = key.problem_id,
            language = %key.language,
            "autosave persisted"
        );
        CommitOutcome::Committed
    }
}
