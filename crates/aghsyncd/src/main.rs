// # aghsyncd - AdGuard Home protection sync daemon
//
// Thin integration layer: all reconciliation, timer and session logic lives
// in aghsync-core and the client crates. The daemon only:
// 1. Reads configuration (JSON file or environment variables)
// 2. Initializes logging and the runtime
// 3. Registers the protection clients
// 4. Runs one reconciliation engine until SIGTERM/SIGINT
//
// ## Configuration
//
// `AGHSYNC_CONFIG_FILE` points at an accessory JSON document
// (`{"host": ..., "isGlinet": true, "autoOnTimer": 30, ...}`). Without it,
// the endpoint is built from the environment:
//
// - `AGHSYNC_HOST`, `AGHSYNC_PORT`, `AGHSYNC_HTTPS`
// - `AGHSYNC_USERNAME`, `AGHSYNC_PASSWORD`
// - `AGHSYNC_ROUTER_MODE`: reach AdGuard Home through a GL.iNet router
// - `AGHSYNC_TYPE`: SWITCH or LOCK
// - `AGHSYNC_INTERVAL_MS`: poll interval
// - `AGHSYNC_AUTO_ON_MINUTES`: re-enable protection after this many minutes off
//   (comma-separated; the first entry is used)
// - `AGHSYNC_DEBUG`, `AGHSYNC_STATE_LOGGING`
// - `AGHSYNC_ACCESSORY_ID`, `AGHSYNC_STORAGE_DIR`: timer record location
//
// `AGHSYNC_LOG_LEVEL` (trace|debug|info|warn|error) applies in both cases.
//
// ## Example
//
// ```bash
// export AGHSYNC_HOST=192.168.8.1
// export AGHSYNC_ROUTER_MODE=true
// export AGHSYNC_USERNAME=root
// export AGHSYNC_PASSWORD=secret
// export AGHSYNC_AUTO_ON_MINUTES=30
// export AGHSYNC_STORAGE_DIR=/var/lib/aghsync
//
// aghsyncd
// ```

use aghsync_core::{
    AccessoryKind, ClientRegistry, EndpointConfig, EngineEvent, FileTimerStore, HostValue,
    ReconciliationEngine,
};
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// How long the engine gets to wind down after a signal
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum AghsyncExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<AghsyncExitCode> for ExitCode {
    fn from(code: AghsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Daemon configuration
struct Config {
    endpoint: EndpointConfig,
    log_level: String,
}

impl Config {
    /// Load configuration from the process environment
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to its value
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let log_level = lookup("AGHSYNC_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        let endpoint = match lookup("AGHSYNC_CONFIG_FILE") {
            Some(path) => {
                let json = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read AGHSYNC_CONFIG_FILE {}", path))?;
                serde_json::from_str(&json)
                    .with_context(|| format!("Failed to parse AGHSYNC_CONFIG_FILE {}", path))?
            }
            None => endpoint_from_vars(&lookup)?,
        };

        Ok(Self {
            endpoint,
            log_level,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        self.endpoint.validate()?;

        if self.endpoint.router_mode && self.endpoint.username.is_empty() {
            anyhow::bail!(
                "AGHSYNC_USERNAME is required in router mode. \
                Set it via: export AGHSYNC_USERNAME=root"
            );
        }

        if self.endpoint.poll_interval_ms < 500 {
            anyhow::bail!(
                "AGHSYNC_INTERVAL_MS must be at least 500 ms. Got: {}",
                self.endpoint.poll_interval_ms
            );
        }

        let parent = &self.endpoint.storage_dir;
        if !parent.as_os_str().is_empty() && !parent.exists() {
            anyhow::bail!(
                "AGHSYNC_STORAGE_DIR does not exist: {}. \
                Create it first: sudo mkdir -p {}",
                parent.display(),
                parent.display()
            );
        }

        if !self.endpoint.https && !self.endpoint.password.is_empty() {
            eprintln!(
                "WARNING: credentials for {} are sent over plain HTTP. \
                Consider AGHSYNC_HTTPS=true.",
                self.endpoint.host
            );
        }

        parse_log_level(&self.log_level)?;

        Ok(())
    }
}

/// Build an endpoint from `AGHSYNC_*` variables
fn endpoint_from_vars(lookup: &impl Fn(&str) -> Option<String>) -> Result<EndpointConfig> {
    let host = lookup("AGHSYNC_HOST").unwrap_or_else(|| "localhost".to_string());
    let mut endpoint = EndpointConfig::new(host).with_credentials(
        lookup("AGHSYNC_USERNAME").unwrap_or_default(),
        lookup("AGHSYNC_PASSWORD").unwrap_or_default(),
    );

    if let Some(port) = lookup("AGHSYNC_PORT") {
        endpoint.port = port
            .parse()
            .with_context(|| format!("AGHSYNC_PORT must be a port number. Got: {}", port))?;
    }
    if let Some(https) = lookup("AGHSYNC_HTTPS") {
        endpoint.https = parse_flag("AGHSYNC_HTTPS", &https)?;
    }
    if let Some(router) = lookup("AGHSYNC_ROUTER_MODE") {
        endpoint.router_mode = parse_flag("AGHSYNC_ROUTER_MODE", &router)?;
    }
    if let Some(kind) = lookup("AGHSYNC_TYPE") {
        endpoint.kind = kind.parse::<AccessoryKind>()?;
    }
    if let Some(interval) = lookup("AGHSYNC_INTERVAL_MS") {
        endpoint.poll_interval_ms = interval.parse().with_context(|| {
            format!("AGHSYNC_INTERVAL_MS must be milliseconds. Got: {}", interval)
        })?;
    }
    if let Some(minutes) = lookup("AGHSYNC_AUTO_ON_MINUTES") {
        endpoint.auto_on_minutes = minutes
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(|m| m.parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .with_context(|| {
                format!(
                    "AGHSYNC_AUTO_ON_MINUTES must be a comma-separated list of minutes. Got: {}",
                    minutes
                )
            })?;
    }
    if let Some(debug) = lookup("AGHSYNC_DEBUG") {
        endpoint.debug = parse_flag("AGHSYNC_DEBUG", &debug)?;
    }
    if let Some(logging) = lookup("AGHSYNC_STATE_LOGGING") {
        endpoint.state_logging = parse_flag("AGHSYNC_STATE_LOGGING", &logging)?;
    }
    if let Some(id) = lookup("AGHSYNC_ACCESSORY_ID") {
        endpoint.accessory_id = id;
    }
    if let Some(dir) = lookup("AGHSYNC_STORAGE_DIR") {
        endpoint.storage_dir = PathBuf::from(dir);
    }

    Ok(endpoint)
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => anyhow::bail!("{} must be true or false. Got: {}", name, other),
    }
}

fn parse_log_level(level: &str) -> Result<Level> {
    Ok(match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => anyhow::bail!(
            "AGHSYNC_LOG_LEVEL '{}' is not valid. \
            Valid levels: trace, debug, info, warn, error",
            level
        ),
    })
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return AghsyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return AghsyncExitCode::ConfigError.into();
    }

    let log_level = parse_log_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return AghsyncExitCode::ConfigError.into();
    }

    info!("Starting aghsyncd daemon");
    info!("Configuration loaded: {:?}", config.endpoint);

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return AghsyncExitCode::RuntimeError.into();
        }
    };

    rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => AghsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                AghsyncExitCode::RuntimeError
            }
        }
    })
    .into()
}

/// Build the client registry from the compiled-in client crates
fn build_registry() -> ClientRegistry {
    let registry = ClientRegistry::new();

    #[cfg(feature = "direct")]
    aghsync_client_direct::register(&registry);

    #[cfg(feature = "router")]
    aghsync_client_router::register(&registry);

    registry
}

/// Run the daemon
async fn run_daemon(config: Config) -> Result<()> {
    let endpoint = config.endpoint;
    let registry = build_registry();

    if !registry.has_client(endpoint.client_type()) {
        anyhow::bail!(
            "No '{}' client compiled in. Available: {}",
            endpoint.client_type(),
            registry.list_clients().join(", ")
        );
    }

    let client = registry.create_client(&endpoint)?;
    let timer_store = FileTimerStore::for_endpoint(&endpoint).await?;
    info!("Timer record: {}", timer_store.path().display());

    let (engine, events) = ReconciliationEngine::new(client, Box::new(timer_store), &endpoint)?;
    let logger = tokio::spawn(log_events(events, endpoint.kind));

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let runner = {
        let engine = engine.clone();
        tokio::spawn(async move { engine.run_with_shutdown(Some(shutdown_rx)).await })
    };
    tokio::pin!(runner);

    let signal = tokio::select! {
        signal = wait_for_shutdown() => signal?,
        joined = &mut runner => {
            joined.context("Engine task panicked")??;
            anyhow::bail!("Engine stopped without a shutdown signal");
        }
    };

    info!("Received shutdown signal: {}", signal);
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(SHUTDOWN_GRACE, &mut runner).await {
        Ok(joined) => joined.context("Engine task panicked")??,
        Err(_) => anyhow::bail!("Engine did not stop within {:?}", SHUTDOWN_GRACE),
    }

    // The event sender goes away with the last engine clone
    drop(engine);
    if tokio::time::timeout(Duration::from_secs(1), logger).await.is_err() {
        warn!("Event logger still busy at exit");
    }

    info!("Daemon stopped");
    Ok(())
}

/// Log engine events the way the host would see them
async fn log_events(mut events: mpsc::Receiver<EngineEvent>, kind: AccessoryKind) {
    while let Some(event) = events.recv().await {
        match event {
            EngineEvent::StateChanged { current, target } => {
                info!(
                    "State: current={} target={}",
                    render(kind.render_current(current)),
                    render(kind.render_target(target))
                );
            }
            EngineEvent::PollFailed { error } => warn!("Poll failed: {}", error),
            EngineEvent::TimerArmed { deadline_ms } => {
                info!("Auto-on armed for epoch ms {}", deadline_ms)
            }
            EngineEvent::TimerFired { success: false } => warn!("Auto-on could not reach device"),
            other => tracing::debug!("Engine event: {:?}", other),
        }
    }
}

fn render(value: HostValue) -> String {
    serde_json::to_string(&value).unwrap_or_else(|_| format!("{:?}", value))
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
