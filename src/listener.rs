//! Expiry event consumption.
//!
//! Redis publishes `__keyevent@{db}__:expired` for every key whose TTL
//! elapses naturally in that database. One async task subscribes to that
//! channel and feeds each key name to the committer, strictly one at a time
//! in delivery order.
//!
//! Pub/sub is fire-and-forget: anything published while the subscriber is
//! reconnecting is gone. The subscription is therefore supervised (capped
//! exponential backoff between attempts), and a periodic reconciliation
//! sweep commits any staged code whose debounce key has already expired
//! without us hearing about it.
use std::{sync::Arc, time::Duration};

use futures_util::StreamExt;
use redis::{Client, aio::ConnectionManager};
use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

use crate::{
    committer::{CommitOutcome, Committer},
    config::Config,
    error::AutosaveError,
    keys,
    staging::StagingStore,
};

/// Capped exponential delay between resubscribe attempts. Kept free of any
/// sleeping so the schedule itself is unit-testable.
pub struct Backoff {
    base: Duration,
    max: Duration,
    attempt: u32,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            attempt: 0,
        }
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn next_delay(&mut self) -> Duration {
        let shift = self.attempt.min(16);
        self.attempt = self.attempt.saturating_add(1);

        self.base.saturating_mul(1u32 << shift).min(self.max)
    }
}

/// Best effort: on a self-hosted Redis this turns expiry events on; managed
/// offerings often lock the config down and want it set out of band.
pub async fn enable_keyspace_events(connection: &ConnectionManager) {
    let mut connection = connection.clone();
    let result: Result<(), redis::RedisError> = redis::cmd("CONFIG")
        .arg("SET")
        .arg("notify-keyspace-events")
        .arg("Ex")
        .query_async(&mut connection)
        .await;

    if let Err(e) = result {
        warn!("could not enable keyspace notifications, expiry events may never arrive: {e}");
    }
}

pub struct ExpiryListener {
    client: Client,
    channel: String,
    committer: Arc<Committer>,
    backoff: Backoff,
}

impl ExpiryListener {
    pub fn new(client: Client, config: &Config, committer: Arc<Committer>) -> Self {
        Self {
            client,
            channel: format!("__keyevent@{}__:expired", config.redis_db),
            committer,
            backoff: Backoff::new(
                Duration::from_millis(config.reconnect_base_ms),
                Duration::from_millis(config.reconnect_max_ms),
            ),
        }
    }

    /// Runs for the lifetime of the process, resubscribing whenever the
    /// connection drops.
    pub async fn run(mut self) {
        loop {
            match self.subscribe_once().await {
                Ok(()) => warn!("expiry subscription ended, resubscribing"),
                Err(e) => warn!("expiry subscription failed: {e}"),
            }

            let delay = self.backoff.next_delay();
            debug!("resubscribing in {delay:?}");
            sleep(delay).await;
        }
    }

    async fn subscribe_once(&mut self) -> Result<(), redis::RedisError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(&self.channel).await?;
        self.backoff.reset();
        info!("listening for expiry events on {}", self.channel);

        // One event fully handled before the next is dequeued; throughput is
        // bounded by one durable write per event, which is plenty here.
        let mut stream = pubsub.on_message();
        while let Some(message) = stream.next().await {
            let key: String = match message.get_payload() {
                Ok(key) => key,
                Err(e) => {
                    warn!("unreadable expiry payload: {e}");
                    continue;
                }
            };

            self.committer.handle_expired(&key).await;
        }

        Ok(())
    }
}

/// Safety net for missed notifications: any staged code whose debounce key
/// is already gone gets committed on the next pass.
pub struct Sweeper {
    prefix: String,
    staging: Arc<dyn StagingStore>,
    committer: Arc<Committer>,
    period: Duration,
}

impl Sweeper {
    pub fn new(config: &Config, staging: Arc<dyn StagingStore>, committer: Arc<Committer>) -> Self {
        Self {
            prefix: config.code_save_prefix.clone(),
            staging,
            committer,
            period: Duration::from_secs(config.sweep_interval_secs),
        }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.sweep_once().await {
                Ok(0) => {}
                Ok(committed) => info!("reconciliation sweep committed {committed} stale saves"),
                Err(e) => warn!("reconciliation sweep failed: {e}"),
            }
        }
    }

    pub async fn sweep_once(&self) -> Result<usize, AutosaveError> {
        let pattern = format!("{}:data:*", self.prefix);
        let mut committed = 0;

        for data_key in self.staging.scan(&pattern).await? {
            let Some(key) = keys::decode_data_key(&self.prefix, &data_key) else {
                continue;
            };

            // A live debounce key means the user is still editing; the
            // expiry event will handle it.
            if self
                .staging
                .get(&keys::encode(&self.prefix, &key))
                .await?
                .is_some()
            {
                continue;
            }

            if self.committer.commit(&key).await == CommitOutcome::Committed {
                committed += 1;
            }
        }

        Ok(committed)
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{Backoff, Sweeper};
    use crate::{
        committer::Committer,
        config::Config,
        repository::mock::{MockCodeRepository, MockIdentityResolver},
        staging::mock::MockStagingStore,
    };

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let mut backoff = Backoff::new(Duration::from_millis(500), Duration::from_secs(30));

        let delays: Vec<u64> = (0..8).map(|_| backoff.next_delay().as_millis() as u64).collect();
        assert_eq!(delays, [500, 1000, 2000, 4000, 8000, 16000, 30000, 30000]);

        backoff.reset();
        assert_eq!(backoff.next_delay(), Duration::from_millis(500));
    }

    #[test]
    fn test_backoff_never_overflows() {
        let mut backoff = Backoff::new(Duration::from_secs(3600), Duration::from_secs(7200));

        for _ in 0..1000 {
            assert!(backoff.next_delay() <= Duration::from_secs(7200));
        }
    }

    fn test_config() -> Config {
        Config {
            redis_url: "redis://127.0.0.1:6379".into(),
            redis_db: 10,
            database_url: "postgres://localhost/autosave".into(),
            code_save_prefix: "autosave".into(),
            debounce_ttl_secs: 5,
            data_ttl_secs: 86400,
            sweep_interval_secs: 300,
            reconnect_base_ms: 500,
            reconnect_max_ms: 30000,
            token_cookie_name: "token".into(),
        }
    }

    fn sweeper(staging: Arc<MockStagingStore>, codes: Arc<MockCodeRepository>) -> Sweeper {
        let identity = Arc::new(MockIdentityResolver::with(&[(7, "alice"), (8, "bob")]));
        let committer = Arc::new(Committer::new(
            "autosave",
            staging.clone(),
            codes,
            identity,
        ));
        Sweeper::new(&test_config(), staging, committer)
    }

    #[tokio::test]
    async fn test_sweep_commits_orphaned_code() {
        // Staged code whose debounce key has already expired unnoticed.
        let staging = Arc::new(MockStagingStore::with(&[(
            "autosave:data:problem:42:lang:python:user:7",
            "print(1)",
        )]));
        let codes = Arc::new(MockCodeRepository::default());
        let sweeper = sweeper(staging.clone(), codes.clone());

        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert!(!staging.contains("autosave:data:problem:42:lang:python:user:7"));
        assert_eq!(codes.write_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_skips_live_debounce_windows() {
        let staging = Arc::new(MockStagingStore::with(&[
            ("autosave:data:problem:42:lang:python:user:7", "print(1)"),
            ("autosave:debounce:user:7:problem:42:lang:python", "1"),
            ("autosave:data:problem:9:lang:rust:user:8", "fn main() {}"),
        ]));
        let codes = Arc::new(MockCodeRepository::default());
        let sweeper = sweeper(staging.clone(), codes.clone());

        // Only the orphaned rust save goes through; the python one is still
        // inside its debounce window.
        assert_eq!(sweeper.sweep_once().await.unwrap(), 1);
        assert!(staging.contains("autosave:data:problem:42:lang:python:user:7"));
        assert!(!staging.contains("autosave:data:problem:9:lang:rust:user:8"));
        assert_eq!(codes.write_count(), 1);
    }

    #[tokio::test]
    async fn test_sweep_ignores_foreign_keys() {
        let staging = Arc::new(MockStagingStore::with(&[(
            "autosave:data:unrelated",
            "x",
        )]));
        let codes = Arc::new(MockCodeRepository::default());
        let sweeper = sweeper(staging.clone(), codes.clone());

        assert_eq!(sweeper.sweep_once().await.unwrap(), 0);
        assert_eq!(codes.write_count(), 0);
    }
}
