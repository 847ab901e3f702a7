mod config_commands;

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    deskgram_config::DeskgramConfig,
    deskgram_host::{HostApp, HostEvent, LocalHost, PluginRegistry, main_thread},
    deskgram_telegram::{PLUGIN_ID, TelegramGatewayPlugin},
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

/// How long the main loop waits for queued host calls before checking for
/// plugin events and the stop flag.
const MAIN_LOOP_TICK: Duration = Duration::from_millis(100);

#[derive(Parser)]
#[command(name = "deskgram", about = "deskgram: Telegram gateway for a desktop chat host")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to use instead of searching the standard locations.
    #[arg(long, global = true, env = "DESKGRAM_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host with the Telegram gateway (default when no subcommand is provided).
    Run,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_names(true)
                    .with_ansi(true),
            )
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => run(cli.config.as_deref()),
        Some(Commands::Config { action }) => {
            config_commands::handle_config(action, cli.config.as_deref())
        },
    }
}

/// Load the config from `path` or the standard locations, then apply the
/// `DESKGRAM_*` environment overrides.
pub(crate) fn load(path: Option<&Path>) -> anyhow::Result<DeskgramConfig> {
    let mut config = match path {
        Some(path) => deskgram_config::load_config(path)?,
        None => deskgram_config::discover_and_load(),
    };
    deskgram_config::apply_env_overrides(&mut config);
    Ok(config)
}

/// Serve an in-memory host on this thread with the gateway plugin enabled,
/// until Ctrl-C.
fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "deskgram starting");
    let config = load(config_path)?;

    let mut host = LocalHost::from_config(&config.host);
    host.register_plugin(PLUGIN_ID, false);
    host.set_plugin_options(
        PLUGIN_ID,
        serde_json::to_value(&config.gateway).context("serialize gateway settings")?,
    );

    let (handle, queue) = main_thread::channel();
    let mut registry = PluginRegistry::new();
    registry.register(Box::new(TelegramGatewayPlugin::new(
        handle.with_timeout(config.gateway.main_thread_timeout()),
    )));
    drop(handle);

    let stop = Arc::new(AtomicBool::new(false));
    spawn_ctrl_c_listener(Arc::clone(&stop))?;

    if config.gateway.has_token() {
        // Queues the Enable event forwarded below.
        host.enable_plugin(PLUGIN_ID)?;
    } else {
        warn!("no bot token configured; set DESKGRAM_BOT_TOKEN or gateway.bot_token");
    }

    while !stop.load(Ordering::SeqCst) {
        for event in host.take_pending_events() {
            registry.dispatch(&event, &mut host);
        }
        if let Err(e) = queue.pump_timeout(&mut host, MAIN_LOOP_TICK) {
            warn!(error = %e, "main thread queue closed");
            break;
        }
    }

    info!("shutting down");
    registry.dispatch(&HostEvent::ForceStop, &mut host);
    Ok(())
}

/// Set `stop` on Ctrl-C, from a dedicated thread so the host loop can stay
/// blocking.
fn spawn_ctrl_c_listener(stop: Arc<AtomicBool>) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    std::thread::Builder::new()
        .name("deskgram-signal".into())
        .spawn(move || {
            runtime.block_on(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "failed to listen for ctrl-c");
                    return;
                }
                info!("ctrl-c received");
                stop.store(true, Ordering::SeqCst);
            });
        })?;
    Ok(())
}
