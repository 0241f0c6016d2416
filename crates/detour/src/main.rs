use anyhow::Context;
use clap::Parser;
use detour::admin_api::AdminApiServer;
use detour::config::Config;
use detour::interceptor::InterceptorServer;
use detour::maintainer::IndexMaintainer;
use detour::snapshot;
use detour::source::FileRuleSource;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Detour - redirect-resolving reverse proxy
#[derive(Parser, Debug)]
#[command(name = "detour")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "DETOUR_CONFIG", default_value = "detour.yaml")]
    config: PathBuf,

    /// Override the proxy listener port
    #[arg(short, long, env = "DETOUR_PORT")]
    port: Option<u16>,

    /// Override the admin API port
    #[arg(long, env = "DETOUR_ADMIN_PORT")]
    admin_port: Option<u16>,

    /// Emit logs as JSON lines
    #[arg(long, env = "DETOUR_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "detour=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;
    if let Some(port) = args.port {
        config.listen.port = port;
    }
    if let Some(port) = args.admin_port {
        config.admin.port = port;
    }
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        rules_dir = ?config.rules.dir,
        sites = config.sites.len(),
        "detour starting"
    );

    let source = Arc::new(FileRuleSource::new(config.rules.dir.clone()));
    let maintainer = Arc::new(IndexMaintainer::new(
        config.maintainer_config(),
        source,
        config.site_specs(),
    )?);

    if let Some(snap) = config.snapshot.as_ref().filter(|s| s.restore) {
        if let Err(e) = snapshot::restore(&snap.path, &maintainer) {
            warn!("Ignoring unreadable snapshot {:?}: {}", snap.path, e);
        }
    }
    let scheduled = maintainer.prewarm()?;
    info!("Scheduled bootstrap rebuild for {} sites", scheduled);

    let proxy = InterceptorServer::new(&config, Arc::clone(&maintainer))?;
    let admin = if config.admin.enabled {
        let ip: IpAddr = config
            .admin
            .host
            .parse()
            .with_context(|| format!("Invalid admin host '{}'", config.admin.host))?;
        Some(AdminApiServer::new(
            SocketAddr::new(ip, config.admin.port),
            Arc::clone(&maintainer),
            config.rules.keep_source_params,
        ))
    } else {
        None
    };

    let admin_task = async move {
        match admin {
            Some(admin) => admin.run().await,
            None => std::future::pending::<Result<(), anyhow::Error>>().await,
        }
    };

    tokio::select! {
        result = proxy.run() => {
            if let Err(e) = result {
                error!("Proxy server stopped: {:#}", e);
            }
        }
        result = admin_task => {
            if let Err(e) = result {
                error!("Admin API stopped: {:#}", e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    if let Some(snap) = &config.snapshot {
        if let Err(e) = snapshot::save(&snap.path, &maintainer) {
            warn!("Failed to save snapshot to {:?}: {}", snap.path, e);
        }
    }
    maintainer.shutdown();
    info!("detour stopped");
    Ok(())
}
