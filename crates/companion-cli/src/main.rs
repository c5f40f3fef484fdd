//! remap-companion CLI: per-login-session companion of the input remapper.

use clap::{Parser, Subcommand};
use companion_daemon::components::UnixComponents;
use companion_daemon::config::Config;
use companion_daemon::{setup, Supervisor};
use companion_observers::{Signal, VersionChanged};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "remap-companion",
    about = "Session companion for the input remapper",
    version,
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the companion for the current login session.
    Run {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Print the resolved file and socket paths.
    Paths {
        /// Path to configuration file.
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config } => {
            let config = setup::load_config(config.as_deref())?;
            init_tracing(&config.daemon.log_level);
            info!(version = env!("CARGO_PKG_VERSION"), "starting remap-companion");

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(run(config))?;
        }
        Commands::Config { config } => {
            let config = setup::load_config(config.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Paths { config } => {
            let config_path = config
                .as_deref()
                .map_or_else(setup::default_config_path, std::path::PathBuf::from);
            let config = setup::load_config(config.as_deref())?;
            let paths = &config.paths;
            println!("config file:            {}", config_path.display());
            println!("configuration directory: {}", paths.configuration_directory.display());
            println!("core configuration:     {}", paths.core_configuration_file.display());
            println!("alerts file:            {}", paths.alerts_file.display());
            println!("version file:           {}", paths.version_file.display());
            println!("console:                {}", paths.console_path.display());
            println!("session directory:      {}", paths.session_directory.display());
            println!("endpoint socket:        {}", paths.endpoint_socket().display());
            println!("remapper socket:        {}", config.remapper.socket.display());
        }
    }

    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .init();
}

/// Supervise until interrupted or until the installed version changes; the
/// service manager restarts us in the latter case.
async fn run(config: Config) -> anyhow::Result<()> {
    let (version_tx, mut version_rx) = mpsc::unbounded_channel();
    let version_changed = Signal::new();
    version_changed.connect(move |changed: &VersionChanged| {
        let _ = version_tx.send(changed.clone());
    });

    let components = UnixComponents::new(config, setup::effective_uid(), version_changed)?;
    let settings = components.settings();
    info!(
        uid = %settings.self_uid,
        alerts = %settings.alerts_file.display(),
        "supervisor starting"
    );
    let supervisor = Supervisor::new(Box::new(components), settings)?;

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("interrupted, shutting down");
        }
        _ = terminate.recv() => {
            info!("terminated, shutting down");
        }
        Some(changed) = version_rx.recv() => {
            info!(
                running = %changed.running,
                installed = %changed.installed,
                "installed version changed, exiting for restart"
            );
        }
    }

    // Teardown joins the supervisor worker.
    tokio::task::spawn_blocking(move || supervisor.shutdown()).await?;
    info!("remap-companion stopped");
    Ok(())
}
