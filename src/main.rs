use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use edgeguard::{
    GatewayService, GracefulShutdown, HttpClientAdapter, HttpHandler, MemoryCacheStore,
    config::{GatewayConfig, GatewayConfigValidator, loader::load_config},
    core::RouteTable,
    metrics, tracing_setup,
};

/// How often idle rate limiter keys and expired cache entries are dropped.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    /// Configuration file (YAML, JSON or TOML); environment variables are
    /// layered on top
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,

    #[clap(long, value_enum, default_value_t = LogFormat::Json, global = true)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server (default)
    Serve,
    /// Load and validate the configuration, then exit
    Validate,
    /// Print the resolved route table
    Routes {
        /// Environment to print; defaults to the configured one
        #[clap(short, long)]
        environment: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    let config_path = args.config.as_deref();

    match args.command.unwrap_or(Commands::Serve) {
        Commands::Validate => validate_config_command(config_path),
        Commands::Routes { environment } => routes_command(config_path, environment.as_deref()),
        Commands::Serve => {
            match args.log_format {
                LogFormat::Json => tracing_setup::init_tracing(),
                LogFormat::Pretty => tracing_setup::init_console_tracing(),
            }
            .map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
            serve(config_path.map(PathBuf::from)).await
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    metrics::init_metrics();

    let config = load_config(config_path.as_deref()).context("Failed to load configuration")?;
    GatewayConfigValidator::validate(&config)
        .map_err(|e| eyre!("Configuration validation failed:\n{}", e))?;
    let config = Arc::new(config);

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let client = Arc::new(
        HttpClientAdapter::new(config.upstream_timeout()?)
            .context("Failed to create upstream HTTP client")?,
    );
    let store = Arc::new(MemoryCacheStore::new());
    let gateway = Arc::new(
        GatewayService::new(config.clone(), client, store.clone())
            .context("Failed to build gateway pipeline")?,
    );

    for route in gateway.routes().descriptors(&config.environment)? {
        tracing::info!(
            prefix = %route.prefix,
            backend = %route.kind,
            endpoint = %route.service_endpoint,
            "Configured route"
        );
    }

    let graceful_shutdown = GracefulShutdown::new();
    {
        let shutdown = graceful_shutdown.clone();
        tokio::spawn(async move { shutdown.run_signal_handler().await });
    }

    {
        let gateway = gateway.clone();
        let shutdown = graceful_shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        gateway.rate_limiter().retain_recent();
                        let purged = store.purge_expired().await;
                        tracing::debug!(
                            limiter_keys = gateway.rate_limiter().len(),
                            cache_entries = store.len(),
                            purged,
                            "Swept rate limiter and cache state"
                        );
                    }
                    _ = shutdown.wait() => break,
                }
            }
        });
    }

    let app = HttpHandler::new(gateway).router();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    tracing::info!(
        environment = %config.environment,
        listen_addr = %addr,
        "Edgeguard gateway listening"
    );

    let shutdown = graceful_shutdown.clone();
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let reason = shutdown.wait().await;
        tracing::info!(?reason, "Shutdown signal received, draining connections");
    })
    .await
    .context("Server error")?;

    tracing::info!("Graceful shutdown completed");
    Ok(())
}

/// Validate configuration and exit
fn validate_config_command(config_path: Option<&std::path::Path>) -> Result<()> {
    let source = config_path.map_or_else(
        || "environment only".to_string(),
        |p| p.display().to_string(),
    );
    println!("Validating configuration ({source})");

    let config = match load_config(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration parsing failed:\n   {e:?}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            print_summary(&config);
            println!("Configuration is valid");
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:\n{e}");
            std::process::exit(1);
        }
    }
}

fn print_summary(config: &GatewayConfig) {
    let table = config.route_table();
    println!("   Environment: {}", config.environment);
    println!("   Listen address: {}", config.listen_addr);
    println!("   Max body size: {} bytes", config.max_body_size);
    println!(
        "   Rate limit: {} requests per {}",
        config.rate_limit.requests, config.rate_limit.period
    );
    println!(
        "   Routes: {}",
        table.get(&config.environment).map_or(0, Vec::len)
    );
    println!("   Allowed origins: {}", config.cors.allowed_origins.join(", "));
}

/// Print the route table for one environment
fn routes_command(config_path: Option<&std::path::Path>, environment: Option<&str>) -> Result<()> {
    let config = load_config(config_path).context("Failed to load configuration")?;
    let environment = environment.unwrap_or(&config.environment);
    let table = RouteTable::from_config(&config.route_table());

    println!("Routes for environment '{environment}' (first match wins):");
    for route in table.descriptors(environment)? {
        println!(
            "   {:<16} {:<26} {}  cacheable={} challenge={} access_token={}",
            route.prefix,
            route.kind.as_str(),
            route.service_endpoint,
            route.cacheable,
            route.requires_challenge_token,
            route.requires_access_token
        );
    }
    for rule in config
        .route_table()
        .get(environment)
        .into_iter()
        .flatten()
        .flat_map(|entry| entry.path_rules.iter())
    {
        let resolved = table.resolve(&rule.path, environment)?;
        println!(
            "   {:<16} override                   cacheable={} challenge={} access_token={}",
            rule.path,
            resolved.cacheable,
            resolved.requires_challenge_token,
            resolved.requires_access_token
        );
    }
    Ok(())
}
