//! # Redis
//!
//! RAM database, used strictly as a staging area.
//!
//! Holds at most two keys per in-flight autosave: the staged code itself and
//! a TTL-bearing debounce key whose natural expiry is what triggers
//! persistence. Postgres stays the system of record; losing Redis loses only
//! saves made inside the current debounce window.
//!
//! The debounce design requires `notify-keyspace-events` to include expired
//! events (`Ex`) on the staging database, otherwise no expiry notification is
//! ever published and staged code only reaches Postgres through the
//! reconciliation sweep.
//!
//! # Postgres
//!
//! Durable store for persisted code, one row per (problem, username,
//! language). The schema is embedded and applied at startup with
//! `IF NOT EXISTS` guards so a fresh database comes up without a separate
//! migration step.
use std::time::Duration;

use redis::{
    Client,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use sqlx::{PgPool, postgres::PgPoolOptions};

const SCHEMA: &str = include_str!("schema.sql");

pub async fn init_redis(staging_url: &str) -> (Client, ConnectionManager) {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(staging_url).unwrap();
    let connection_manager = client
        .get_connection_manager_with_config(config)
        .await
        .unwrap();

    // The listener opens its own pub/sub connection from the client; the
    // manager handle serves everything else.
    (client, connection_manager)
}

pub async fn init_postgres(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await?;

    for statement in schema_statements(SCHEMA) {
        sqlx::query(statement).execute(&pool).await?;
    }

    Ok(pool)
}

fn schema_statements(schema: &str) -> Vec<&str> {
    schema
        .split(';')
        .filter_map(|statement| {
            let trimmed = statement.trim();
            let has_sql = trimmed.lines().any(|line| {
                let line = line.trim();
                !line.is_empty() && !line.starts_with("--")
            });
            has_sql.then_some(trimmed)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{SCHEMA, schema_statements};

    #[test]
    fn schema_splits_into_clean_statements() {
        let statements = schema_statements(SCHEMA);

        assert_eq!(statements.len(), 2);
        for statement in &statements {
            assert!(statement.contains("CREATE TABLE IF NOT EXISTS"));
        }
    }

    #[test]
    fn comment_only_fragments_are_dropped() {
        let statements = schema_statements("-- nothing here\n;\n-- or here");
        assert!(statements.is_empty());
    }
}
