use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inflow::config::Config;
use inflow::limiter::RedisRateLimiter;
use inflow::poller::{
    BehaviorRegistry, ConversationsBehavior, GenericBehavior, JobScheduler, RequestBuilder,
    SchedulerOptions,
};
use inflow::publish::RedisStreamPublisher;
use inflow::sources::PostgresConfigSource;
use inflow::state::{RedisStateStore, StateStore};

#[derive(Parser)]
#[command(
    name = "inflow",
    version,
    about = "Multi-source feedback polling daemon with distributed rate limiting and circuit breaking",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the polling scheduler until interrupted
    Run,

    /// Show the persisted polling state for one job
    State {
        /// Tenant identifier
        #[arg(long)]
        tenant: String,

        /// Source type
        #[arg(long)]
        source_type: String,

        /// Instance URL
        #[arg(long)]
        instance_url: String,
    },

    /// Reset a job's failure count so it is scheduled again
    Reset {
        /// Tenant identifier
        #[arg(long)]
        tenant: String,

        /// Source type
        #[arg(long)]
        source_type: String,

        /// Instance URL
        #[arg(long)]
        instance_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };
    config.validate()?;

    match cli.command {
        Commands::Run => {
            run(config).await?;
        }

        Commands::State {
            tenant,
            source_type,
            instance_url,
        } => {
            show_state(config, &tenant, &source_type, &instance_url).await?;
        }

        Commands::Reset {
            tenant,
            source_type,
            instance_url,
        } => {
            reset(config, &tenant, &source_type, &instance_url).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("inflow=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("inflow=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

fn redis_pool(config: &Config) -> Result<deadpool_redis::Pool> {
    deadpool_redis::Config::from_url(&config.redis.url)
        .builder()
        .context("Invalid Redis configuration")?
        .max_size(config.redis.pool_size)
        .runtime(deadpool_redis::Runtime::Tokio1)
        .build()
        .context("Failed to build Redis pool")
}

fn postgres_pool(config: &Config) -> Result<deadpool_postgres::Pool> {
    let pg_config: tokio_postgres::Config = config
        .database
        .postgres_url
        .parse()
        .context("Invalid PostgreSQL connection string")?;

    let manager = deadpool_postgres::Manager::from_config(
        pg_config,
        tokio_postgres::NoTls,
        deadpool_postgres::ManagerConfig {
            recycling_method: deadpool_postgres::RecyclingMethod::Fast,
        },
    );

    deadpool_postgres::Pool::builder(manager)
        .max_size(config.database.pool_size)
        .build()
        .context("Failed to build PostgreSQL pool")
}

fn build_registry(config: &Config) -> Result<BehaviorRegistry> {
    let timeout = config.request_timeout();
    let mut registry = BehaviorRegistry::new(Arc::new(GenericBehavior::new(
        RequestBuilder::with_timeout(timeout)?,
    )));
    registry.register(Arc::new(ConversationsBehavior::new(
        RequestBuilder::with_timeout(timeout)?,
    )));
    Ok(registry)
}

async fn run(config: Config) -> Result<()> {
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "inflow starting");

    let redis = redis_pool(&config)?;
    let postgres = postgres_pool(&config)?;

    let scheduler = JobScheduler::new(
        Arc::new(PostgresConfigSource::new(postgres)),
        Arc::new(RedisStateStore::new(
            redis.clone(),
            config.redis.key_prefix.clone(),
        )),
        Arc::new(RedisRateLimiter::new(
            redis.clone(),
            config.redis.key_prefix.clone(),
        )),
        Arc::new(RedisStreamPublisher::new(
            redis,
            config.redis.publish_stream.clone(),
        )),
        build_registry(&config)?,
        SchedulerOptions {
            reconcile_interval: config.reconcile_interval(),
            min_poll_interval_secs: config.scheduler.min_poll_interval_secs,
        },
    )?;

    scheduler.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, stopping scheduler");

    scheduler.stop().await;
    tracing::info!("inflow stopped");
    Ok(())
}

async fn show_state(
    config: Config,
    tenant: &str,
    source_type: &str,
    instance_url: &str,
) -> Result<()> {
    let redis = redis_pool(&config)?;
    let store = RedisStateStore::new(redis, config.redis.key_prefix.clone());

    let state = store.get_state(tenant, source_type, instance_url).await;

    println!("Polling state for {tenant}:{source_type}:{instance_url}");
    println!(
        "  Last successful poll: {}",
        state
            .last_successful_poll
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| String::from("never"))
    );
    println!(
        "  Last attempt:         {}",
        state
            .last_poll_attempt
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| String::from("never"))
    );
    println!("  Consecutive failures: {}", state.consecutive_failures);
    if let Some(error) = &state.last_error {
        println!("  Last error:           {error}");
        if let Some(at) = state.last_error_at {
            println!("  Last error at:        {}", at.to_rfc3339());
        }
    }
    Ok(())
}

async fn reset(config: Config, tenant: &str, source_type: &str, instance_url: &str) -> Result<()> {
    let redis = redis_pool(&config)?;
    let store = RedisStateStore::new(redis, config.redis.key_prefix.clone());

    store
        .reset_failure_count(tenant, source_type, instance_url)
        .await;

    tracing::info!(
        tenant = %tenant,
        source_type = %source_type,
        instance_url = %instance_url,
        "Failure count reset"
    );
    println!("Failure count reset for {tenant}:{source_type}:{instance_url}");
    Ok(())
}
