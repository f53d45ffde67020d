use std::time::Duration;

#[cfg(feature = "postgres")]
use sea_orm::{ConnectOptions, Database, DbConn, DbErr};

/// Configuration for the article database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: Duration,
}

impl DatabaseConfig {
    /// Read `DATABASE_URL` and pool sizes. `None` when no database is configured.
    pub fn from_env() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok().filter(|u| !u.is_empty())?;

        Some(Self {
            url,
            max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(20),
            min_connections: std::env::var("DB_MIN_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            connect_timeout: Duration::from_secs(10),
        })
    }

    /// Open the connection pool.
    #[cfg(feature = "postgres")]
    pub async fn connect(&self) -> Result<DbConn, DbErr> {
        let opts = ConnectOptions::new(&self.url)
            .max_connections(self.max_connections)
            .min_connections(self.min_connections)
            .connect_timeout(self.connect_timeout)
            .idle_timeout(Duration::from_secs(300))
            .sqlx_logging(true)
            .to_owned();

        let conn = Database::connect(opts).await?;
        tracing::info!(pool = self.max_connections, "Article database connected");
        Ok(conn)
    }
}
