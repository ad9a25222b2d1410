//! odbcache - Dev-server enum metadata cache with config watch and live reload

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use odbcache_core::{
    ConfigPropagator, DevServerConfig, EnvironmentTable, EventBus, FileWatcher, MetadataCache,
};
use odbcache_web::{AppState, WebConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_PORT: u16 = 8080;

#[derive(Parser)]
#[command(
    name = "odbcache",
    version,
    about = "Dev-server enum metadata cache with config watch and live reload",
    long_about = "Serves the ODB enum metadata module through a one-hour in-memory cache and\n\
                  keeps the served conf.json in sync with local.conf.json / conf/dev.conf.json.\n\
                  \n\
                  Examples:\n\
                    odbcache                              # Serve on port 8080 (default)\n\
                    odbcache --port 5173                  # Custom port\n\
                    odbcache serve --no-watch             # Serve without watching config\n\
                    odbcache resolve local.lucuma.xyz     # Print the upstream metadata URL\n\
                    odbcache sync                         # Refresh public/conf.json once\n\
                  \n\
                  Environment Variables:\n\
                    ODBCACHE_ROOT                         # Project root (default: .)\n\
                    ODBCACHE_CONFIG                       # Settings file (TOML)\n\
                    ODBCACHE_PORT                         # Dev server port (default: 8080)\n\
                    RUST_LOG                              # Log filter (default: info)"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Serve options used when no subcommand is given
    #[command(flatten)]
    serve: ServeArgs,

    /// Project root; relative paths in settings resolve against it
    #[arg(long, env = "ODBCACHE_ROOT", default_value = ".", global = true)]
    root: PathBuf,

    /// Settings file (TOML)
    #[arg(long, env = "ODBCACHE_CONFIG", global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Run the dev server (default)
    Serve(ServeArgs),
    /// Print the upstream metadata URL for a host
    Resolve {
        /// Host name as seen in the browser
        host: String,
    },
    /// Copy the authoritative config into place and exit
    Sync,
}

#[derive(Args, Debug, Clone, PartialEq)]
struct ServeArgs {
    /// Port for the dev server
    #[arg(long, env = "ODBCACHE_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Route prefix answered by the metadata cache
    #[arg(long, default_value = odbcache_web::router::DEFAULT_METADATA_PREFIX)]
    prefix: String,

    /// Do not watch config files
    #[arg(long)]
    no_watch: bool,
}

impl Cli {
    /// Selected command; bare invocation serves with the top-level options
    fn into_command(self) -> Command {
        self.command.unwrap_or(Command::Serve(self.serve))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("Project root not found: {}", cli.root.display()))?;

    let config = DevServerConfig::load(cli.config.as_deref())
        .context("Failed to load settings")?
        .rooted_at(&root);

    match cli.into_command() {
        Command::Serve(args) => run_serve(config, args).await,
        Command::Resolve { host } => run_resolve(config, &host).await,
        Command::Sync => run_sync(config).await,
    }
}

async fn run_serve(config: DevServerConfig, args: ServeArgs) -> Result<()> {
    let prefix = odbcache_web::normalize_prefix(&args.prefix)?;
    let port = args.port;

    let cache = Arc::new(
        MetadataCache::new(config.paths.environments.clone(), config.cache.clone())
            .context("Failed to create metadata cache")?,
    );
    let event_bus = EventBus::default_capacity();
    event_bus.on_publish(|event| debug!(?event, "Dev event published"));
    let propagator = Arc::new(ConfigPropagator::new(
        &config.paths,
        Arc::clone(&cache),
        event_bus.clone(),
    ));

    // Working copy must be current before the first client connects
    match propagator.sync_now().await {
        Ok(source) => info!(source = %source.display(), "Working config installed"),
        Err(e) => warn!(error = %e, "Serving without a fresh working config"),
    }

    let watcher = if args.no_watch {
        None
    } else {
        Some(
            FileWatcher::start(Arc::clone(&propagator), config.watcher.clone())
                .await
                .context("Failed to start config watcher")?,
        )
    };

    let state = AppState { cache, event_bus };
    let web_config = WebConfig {
        metadata_prefix: prefix,
        public_dir: Some(config.paths.public_dir.clone()),
    };

    println!("Dev server: http://localhost:{}", port);
    println!("   Enum metadata: http://localhost:{}{}", port, web_config.metadata_prefix);
    println!("   Live reload:   <script src=\"/__reload.js\"></script>");

    let result = odbcache_web::run(state, web_config, port).await;

    if let Some(watcher) = watcher {
        watcher.stop().await;
    }
    result
}

async fn run_resolve(config: DevServerConfig, host: &str) -> Result<()> {
    let table = EnvironmentTable::load(&config.paths.environments)
        .await
        .context("Failed to load environment table")?;
    let upstream = table
        .resolve(host)
        .with_context(|| format!("Cannot resolve upstream for {}", host))?;

    println!(
        "{}",
        odbcache_core::cache::metadata_url(upstream, &config.cache.metadata_path)
    );
    Ok(())
}

async fn run_sync(config: DevServerConfig) -> Result<()> {
    let cache = Arc::new(
        MetadataCache::new(config.paths.environments.clone(), config.cache.clone())
            .context("Failed to create metadata cache")?,
    );
    let propagator = ConfigPropagator::new(&config.paths, cache, EventBus::default_capacity());

    let source = propagator
        .sync_now()
        .await
        .context("Failed to copy authoritative config")?;

    println!(
        "{} -> {}",
        source.display(),
        propagator.working_config().display()
    );
    Ok(())
}
