use anyhow::{Context, Result};
use clap::Parser;
use taskguild_server::config::Config;
use taskguild_server::setup::{ensure_database_directory_from_config, initialize_app};
use taskguild_server::telemetry::{init_telemetry, log_config_validation, log_startup_info};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "taskguild")]
#[command(about = "Task-orchestration daemon")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Start the daemon.
    #[arg(long)]
    start: bool,

    /// Port to listen on.
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Configuration file path.
    #[arg(short, long, env = "CONFIG_FILE")]
    config: Option<String>,

    /// Database URL override.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Listen address override.
    #[arg(long, env = "LISTEN_ADDR")]
    listen_addr: Option<String>,

    /// Log level override.
    #[arg(long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// Task definition YAML path override.
    #[arg(long, env = "TASK_DEFINITION_PATH")]
    task_definition: Option<String>,
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(config_file) => {
            info!("Loading configuration from file: {}", config_file);
            Config::from_file(config_file)?
        }
        None => {
            info!("Loading configuration from environment");
            Config::from_env()?
        }
    };

    if let Some(ref database_url) = cli.database_url {
        info!("Overriding database URL from CLI");
        config.database.url = Some(database_url.clone());
    }

    if let Some(ref listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr.clone();
    }
    config.server.port = cli.port;

    if let Some(ref log_level) = cli.log_level {
        info!("Overriding log level from CLI");
        config.logging.level = log_level.clone();
    }

    if let Some(ref task_definition) = cli.task_definition {
        config.daemon.task_definition_path = task_definition.clone();
    }

    info!("Server will listen on: {}", config.server_address());
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    if !cli.start {
        println!("taskguild - task-orchestration daemon");
        println!();
        println!("Usage:");
        println!("  taskguild --start --port=3000 --config=taskguild.toml");
        println!();
        println!("For more options, use: taskguild --help");
        return Ok(());
    }

    let config = match load_config(&cli).context("Failed to load configuration") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            std::process::exit(1);
        }
    };

    init_telemetry(&config.logging).context("Failed to initialize telemetry")?;
    log_config_validation(&config);

    if let Err(e) = config.validate() {
        error!(error = %e, "Configuration validation failed");
        std::process::exit(1);
    }

    log_startup_info(&config);

    if let Err(e) = ensure_database_directory_from_config(&config) {
        error!(error = %e, "Failed to create database directory");
        std::process::exit(1);
    }

    let app = match initialize_app(&config).await {
        Ok(app) => app,
        Err(e) => {
            error!(error = %e, "Failed to initialize application");
            std::process::exit(1);
        }
    };

    if let Err(e) = app.agent_pool.start() {
        error!(error = %e, "Failed to start agent pool");
        std::process::exit(1);
    }
    let _scaling_loop = app.agent_pool.spawn_scaling_loop();

    let addr = config.server_address();
    info!("taskguild daemon listening on http://{}", addr);
    println!("taskguild daemon ready on http://{addr}");
    println!("Press Ctrl+C to shutdown");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to register SIGTERM handler");
            let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
                .expect("Failed to register SIGINT handler");

            tokio::select! {
                _ = sigterm.recv() => info!("Received SIGTERM, initiating graceful shutdown"),
                _ = sigint.recv() => info!("Received SIGINT, initiating graceful shutdown"),
            }
        }

        #[cfg(windows)]
        {
            tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        let _ = shutdown_tx.send(());
    });

    let result = tokio::select! {
        result = taskguild_protocol::serve(app.handler.clone(), &addr) => result.context("server error"),
        _ = shutdown_rx => {
            info!("Shutdown signal received, stopping server");
            Ok(())
        }
    };

    let drain_window = config.shutdown_drain_window();
    app.agent_pool.stop(drain_window).await;
    app.domain_events.stop(drain_window).await;

    match result {
        Ok(()) => {
            info!("taskguild daemon shut down cleanly");
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "taskguild daemon error");
            std::process::exit(2);
        }
    }
}
