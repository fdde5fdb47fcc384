use std::sync::Arc;

use redis::{Client, aio::ConnectionManager};
use sqlx::PgPool;

use super::{
    config::Config,
    database::{init_postgres, init_redis},
};

pub struct State {
    pub config: Config,
    pub redis_client: Client,
    pub redis_connection: ConnectionManager,
    pub pg_pool: PgPool,
}

impl State {
    pub async fn new() -> Arc<Self> {
        let config = Config::load();

        let (redis_client, redis_connection) = init_redis(&config.staging_url()).await;
        let pg_pool = init_postgres(&config.database_url)
            .await
            .expect("Database misconfigured!");

        Arc::new(Self {
            config,
            redis_client,
            redis_connection,
            pg_pool,
        })
    }
}
