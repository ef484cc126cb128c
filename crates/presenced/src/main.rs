// # presenced - Presence Watcher Daemon
//
// Thin integration layer: all status and notification logic lives in
// presence-core. The daemon is responsible for:
// 1. Reading configuration from environment variables (and `.env`)
// 2. Initializing logging and the runtime
// 3. Logging in to Discord and building the webhook channel
// 4. Running the watch engine and the HTTP status endpoint until a signal
//
// ## Configuration
//
// ### Required
// - `PRESENCE_BOT_TOKEN`: Discord bot token
// - `PRESENCE_USER_ID`: User to watch
// - `PRESENCE_GUILD_ID`: Guild the user and the bot share
//
// ### Optional
// - `PRESENCE_WEBHOOK_URL`: Webhook for the status message (disabled if unset)
// - `PRESENCE_HTTP_ADDR`: Listen address (default `0.0.0.0:3000`)
// - `PRESENCE_STATIC_DIR`: Static page directory (default `public`)
// - `PRESENCE_POLL_INTERVAL_SECS`: Poll interval, 1..=3600 (default 10)
// - `PRESENCE_CALL_TIMEOUT_SECS`: Timeout per outbound call, 1..=120 (default 10)
// - `PRESENCE_POLL_POLICY`: `always` or `on-change` (default `always`)
// - `PRESENCE_TIMEZONE`: IANA timezone for notifications (default `UTC`)
// - `PRESENCE_NOTIFY_TITLE`: Notification title (default `Presence update`)
// - `PRESENCE_LOG_LEVEL`: trace, debug, info, warn, error (default `info`)
//
// ## Example
//
// ```bash
// export PRESENCE_BOT_TOKEN=your_bot_token
// export PRESENCE_USER_ID=123456789012345678
// export PRESENCE_GUILD_ID=876543210987654321
// export PRESENCE_WEBHOOK_URL=https://discord.com/api/webhooks/<id>/<token>
//
// presenced
// ```

mod config;
mod http;

use anyhow::{Context, Result};
use presence_core::{NotificationChannel, WatchEngine};
use presence_notify_webhook::WebhookChannel;
use presence_source_discord::DiscordPresenceSource;
use std::process::ExitCode;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

use crate::config::Config;

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum PresenceExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure (including a rejected login)
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<PresenceExitCode> for ExitCode {
    fn from(code: PresenceExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn main() -> ExitCode {
    // A missing .env is fine; the environment may be set directly
    let _ = dotenvy::dotenv();

    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return PresenceExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return PresenceExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return PresenceExitCode::ConfigError.into();
    }

    info!("Starting presenced");
    debug!("Configuration: {:?}", config);

    // Single-threaded: the reconciler serializes work, nothing needs parallelism
    let rt = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return PresenceExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let daemon = match Daemon::start(config).await {
            Ok(daemon) => daemon,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return PresenceExitCode::ConfigError;
            }
        };

        match daemon.run().await {
            Ok(()) => PresenceExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                PresenceExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Everything built at startup, ready to run
struct Daemon {
    engine: WatchEngine,
    listener: TcpListener,
    app: axum::Router,
}

impl Daemon {
    /// Log in, build the components and bind the listener
    ///
    /// Any failure here (including a rejected bot token) is a startup error.
    async fn start(config: Config) -> Result<Self> {
        let source = DiscordPresenceSource::connect(config.discord_config())
            .await
            .context("Discord login failed")?;
        info!("Bot successfully logged in");

        let channel: Option<Box<dyn NotificationChannel>> = match &config.webhook_url {
            Some(url) => {
                let timeout = Duration::from_secs(config.call_timeout_secs);
                let webhook = WebhookChannel::with_timeout(url, timeout)
                    .context("PRESENCE_WEBHOOK_URL is not a usable webhook")?;
                Some(Box::new(webhook))
            }
            None => {
                warn!("PRESENCE_WEBHOOK_URL not set, status notifications are disabled");
                None
            }
        };

        let (engine, mut events) = WatchEngine::new(Box::new(source), channel, config.watch_config())
            .context("Failed to create watch engine")?;

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                debug!("Watch event: {:?}", event);
            }
        });

        let app = http::router(engine.status_reader(), &config.static_dir);
        let listener = TcpListener::bind(config.http_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.http_addr))?;

        Ok(Self {
            engine,
            listener,
            app,
        })
    }

    /// Run the engine and the HTTP server until a shutdown signal
    ///
    /// If either stops on its own, the other is shut down too. A fatal
    /// presence source error (token reset, revoked intents) ends the engine
    /// with an error, which the caller turns into a runtime exit.
    async fn run(self) -> Result<()> {
        let Self {
            engine,
            listener,
            app,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);

        if let Ok(addr) = listener.local_addr() {
            info!("Server is running on http://{}", addr);
        }

        let server = async {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(stopped(stop_rx.clone()))
                .await;
            let _ = stop_tx.send(true);
            result.context("HTTP server failed")
        };

        let watcher = async {
            let result = engine.run_until(stopped(stop_rx.clone())).await;
            let _ = stop_tx.send(true);
            result.context("Watch engine failed")
        };

        let signals = async {
            tokio::select! {
                received = wait_for_shutdown() => match received {
                    Ok(signal) => info!("Received shutdown signal: {}", signal),
                    Err(e) => error!("Shutdown error: {}", e),
                },
                _ = stopped(stop_rx.clone()) => {}
            }
            let _ = stop_tx.send(true);
        };

        let (server, watcher, ()) = tokio::join!(server, watcher, signals);
        info!("Shutting down daemon");

        server?;
        watcher?;
        Ok(())
    }
}

/// Resolves once shutdown has been requested
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// Returns the name of the signal received.
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
