use clap::Parser;
use log::{error, info, warn};
use server::config::Config;
use server::dispatcher::Bancho;
use server::services::{FileJournal, Services};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;

/// Main-method of the application.
/// Loads the configuration, then runs the HTTP tunnel and the idle sweeper until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Command line arguments
    #[derive(Parser, Debug)]
    #[clap(author, version, about)]
    struct Args {
        /// Path to the TOML configuration file
        #[clap(short, long, default_value = "bancho.toml")]
        config: PathBuf,
        /// Overrides the configured bind address
        #[clap(short = 'H', long)]
        host: Option<String>,
        /// Overrides the configured port
        #[clap(short, long)]
        port: Option<u16>,
    }

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        warn!(
            "{} not found, running with the default configuration",
            args.config.display()
        );
        Config::default()
    };
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // Collaborators, with the journal file if one is configured
    let mut services = Services::from_config(&config);
    let journal_task = match &config.server.journal_path {
        Some(path) => {
            let (journal, handle) = FileJournal::open(path).await?;
            services = services.with_journal(Arc::new(journal));
            Some(handle)
        }
        None => None,
    };

    let bancho = Bancho::new(&config, services);
    let mut sweeper = bancho.spawn_idle_sweeper();

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address).await?;
    info!("Listening on {}", address);

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("Received Ctrl+C, shutting down gracefully...");
    };

    let sweeper_running = tokio::select! {
        result = server::http::serve(listener, bancho.clone(), shutdown) => {
            if let Err(e) = result {
                error!("HTTP server failed: {}", e);
            }
            true
        }
        result = &mut sweeper => {
            if let Err(e) = result {
                error!("Idle sweeper panicked: {}", e);
            }
            false
        }
    };

    if sweeper_running {
        Bancho::stop_idle_sweeper(sweeper).await;
    }
    drop(bancho);

    // The writer drains once every journal handle is gone
    if let Some(handle) = journal_task {
        if let Err(e) = handle.await {
            error!("Journal writer panicked: {}", e);
        }
    }

    Ok(())
}
