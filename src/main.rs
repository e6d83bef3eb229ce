mod cli;

use readly::{
    analytics::Analytics,
    config::{self, Config},
    retention,
    server::{self, auth::AdminGuard},
};
use readly_db::pool::{init_pool, DbPool};

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands};
use std::path::Path;

fn open_pool(config: &Config) -> Result<DbPool> {
    let data_dir = &config.storage.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

    let db_path = config.storage.db_path();
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Opening database at {}", db_path_str);
    Ok(init_pool(&db_path_str)?)
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config::validate_config(&config)?;

    tracing::info!("Starting Readly ({})", config.server.environment);
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    let pool = open_pool(&config)?;
    server::start_server(config, pool).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "readly=trace,readly_db=debug,readly_common=debug,tower_http=debug".to_string()
        } else {
            "readly=debug,readly_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Cleanup { days } => cleanup(cli.config.as_deref(), days),
        Commands::Stats => print_stats(cli.config.as_deref()),
        Commands::AdminToken => admin_token(cli.config.as_deref()),
        Commands::GenerateSecret => {
            println!("{}", server::auth::generate_secret());
            Ok(())
        }
        Commands::Validate { config } => validate_config(config.as_deref().or(cli.config.as_deref())),
        Commands::Version => {
            println!("readly {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn cleanup(config_path: Option<&Path>, days: Option<u32>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let max_age_days = days.unwrap_or(config.retention.max_age_days);
    if max_age_days == 0 {
        anyhow::bail!("--days must be at least 1");
    }

    let pool = open_pool(&config)?;
    let deleted = retention::run_cleanup(&pool, max_age_days, Utc::now())?;
    println!("Deleted {} conversions older than {} days", deleted, max_age_days);
    Ok(())
}

fn print_stats(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let pool = open_pool(&config)?;
    let analytics = Analytics::new(pool, config.analytics.utc_offset_hours);

    let now = Utc::now();
    let report = serde_json::json!({
        "stats": analytics.summary(now)?,
        "engagement": analytics.engagement(now)?,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn admin_token(config_path: Option<&Path>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;
    let token = AdminGuard::new(config.admin.password)
        .derive_token()
        .context("Cannot derive admin token")?;
    println!("{}", token);
    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            config::load_config(p)?
        }
        None => {
            println!("No config file specified, using defaults");
            config::load_config_or_default(None)?
        }
    };

    println!("✓ Configuration is valid");
    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Environment: {}", config.server.environment);
    println!("  Data directory: {:?}", config.storage.data_dir);
    println!("  Rate limit: {} per day", config.rate_limit.max_per_day);
    println!(
        "  Retention: {} ({} days)",
        if config.retention.enabled { "enabled" } else { "disabled" },
        config.retention.max_age_days
    );
    println!(
        "  Converter: {}",
        config
            .converter
            .program
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "not configured".to_string())
    );
    println!("  Admin password set: {}", config.admin.password.is_some());

    Ok(())
}
