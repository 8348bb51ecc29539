use anyhow::Context;
use caching_proxy::cache::{CacheKey, CacheStore};
use caching_proxy::fetcher::ReqwestFetcher;
use caching_proxy::server::{start_server, AppState};
use caching_proxy::{logging, metrics, Proxy, Settings};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "caching-proxy")]
#[command(about = "Caching web proxy that keeps navigation inside the proxy")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct CommonArgs {
    /// TOML configuration file (missing file means defaults)
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,
    /// Cache root directory, overrides the configuration
    #[arg(long)]
    cache_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP proxy
    Serve {
        #[command(flatten)]
        common: CommonArgs,
        /// Port to listen on, overrides the configuration
        #[arg(long)]
        port: Option<u16>,
    },
    /// Fetch one URL through the proxy (warms the cache) and print a summary
    Fetch {
        url: String,
        #[command(flatten)]
        common: CommonArgs,
    },
    /// Print the cache file path a URL maps to
    CachePath {
        url: String,
        /// Upstream content type, e.g. image/png
        #[arg(long)]
        content_type: Option<String>,
        #[command(flatten)]
        common: CommonArgs,
    },
}

fn load_settings(common: &CommonArgs) -> anyhow::Result<Settings> {
    let mut settings = Settings::load(&common.config)
        .and_then(Settings::apply_env)
        .with_context(|| format!("loading settings from {}", common.config.display()))?;
    if let Some(dir) = &common.cache_dir {
        settings.cache_dir = dir.clone();
    }
    Ok(settings)
}

async fn build_proxy(settings: &Settings) -> anyhow::Result<Arc<Proxy>> {
    let store = CacheStore::new(&settings.cache_dir);
    store
        .init()
        .await
        .with_context(|| format!("creating cache directory {}", settings.cache_dir.display()))?;
    let fetcher = ReqwestFetcher::new(&settings.proxy)?;
    Ok(Arc::new(Proxy::new(
        Arc::new(settings.proxy.clone()),
        store,
        Arc::new(fetcher),
    )))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { common, port } => {
            let mut settings = load_settings(&common)?;
            if let Some(port) = port {
                settings.port = port;
            }
            metrics::init_metrics();
            info!(
                cache_dir = %settings.cache_dir.display(),
                origins = ?settings.proxy.allowed_origins,
                "Starting caching proxy"
            );
            let proxy = build_proxy(&settings).await?;
            start_server(AppState::new(proxy), settings.port).await?;
        }
        Commands::Fetch { url, common } => {
            let settings = load_settings(&common)?;
            let proxy = build_proxy(&settings).await?;
            match proxy.serve(&url).await {
                Ok(served) => {
                    println!("URL:          {}", served.url);
                    println!("Content-Type: {}", served.content_type);
                    println!("Bytes:        {}", served.body.len());
                    println!("Cache:        {}", if served.from_cache { "hit" } else { "miss" });
                }
                Err(e) => {
                    error!("Fetch failed: {}", e);
                    println!("Fetch failed: {}", e);
                    std::process::exit(1);
                }
            }
        }
        Commands::CachePath {
            url,
            content_type,
            common,
        } => {
            let settings = load_settings(&common)?;
            let url = caching_proxy::allowlist::normalize_scheme(&url);
            let key = CacheKey::resolve(&settings.cache_dir, &url, content_type.as_deref())?;
            println!("{}", key.path().display());
        }
    }

    Ok(())
}
