mod app;
mod shutdown;

use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};
use waypoint_config::ServerConfig;
use waypoint_query::{HitStreamProvider, InMemoryHitStore, PostgresHitStream};

pub use app::build_application;
use shutdown::shutdown_signal;

#[derive(Args)]
pub struct ServeCommand {
    /// TOML configuration file
    #[arg(long, env = "WAYPOINT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Address to bind the server to
    #[arg(long, env = "WAYPOINT_ADDRESS")]
    pub address: Option<String>,

    /// Postgres URL of the hits warehouse
    #[arg(long, env = "WAYPOINT_DATABASE_URL")]
    pub database_url: Option<String>,

    /// JSON array of raw hits to serve from memory instead of a database
    #[arg(long, env = "WAYPOINT_FIXTURE_PATH")]
    pub fixture_path: Option<PathBuf>,
}

impl ServeCommand {
    fn load_config(&self) -> anyhow::Result<ServerConfig> {
        let mut config = ServerConfig::load(self.config.as_deref())?;
        if let Some(address) = &self.address {
            config.address = address.clone();
        }
        if let Some(database_url) = &self.database_url {
            config.database_url = Some(database_url.clone());
        }
        if let Some(fixture_path) = &self.fixture_path {
            config.fixture_path = Some(fixture_path.clone());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn execute(self) -> anyhow::Result<()> {
        let config = Arc::new(self.load_config()?);
        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(serve(config))
    }
}

/// Connects the configured hit source. A fixture file wins over a database.
async fn connect_provider(
    config: &ServerConfig,
) -> anyhow::Result<(
    Option<Arc<dyn HitStreamProvider>>,
    Option<Arc<sea_orm::DatabaseConnection>>,
)> {
    if let Some(path) = &config.fixture_path {
        let store = InMemoryHitStore::from_json_file(path, config.provider_limits()).await?;
        info!("Serving {} hits from fixture {}", store.len(), path.display());
        return Ok((Some(Arc::new(store)), None));
    }

    if let Some(url) = &config.database_url {
        debug!("Initializing database connection...");
        let db = Arc::new(sea_orm::Database::connect(url.as_str()).await?);
        let provider = PostgresHitStream::new(db.clone(), config.provider_limits())?;
        info!("Reading hits from table {}", config.hits_table);
        return Ok((Some(Arc::new(provider)), Some(db)));
    }

    warn!("No database_url or fixture_path configured; analyses will answer 503");
    Ok((None, None))
}

async fn serve(config: Arc<ServerConfig>) -> anyhow::Result<()> {
    let (provider, db) = connect_provider(&config).await?;
    let app = build_application(config.clone(), provider, db).await?;

    let address = config.socket_addr()?;
    let listener = TcpListener::bind(address).await?;
    info!("Waypoint listening on {}", address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Waypoint server exited");
    Ok(())
}
