//! Core watch engine
//!
//! The WatchEngine is responsible for:
//! - Looking up the tracked member once at startup
//! - Polling the member's presence on a fixed interval
//! - Filtering pushed presence changes down to the tracked member
//! - Feeding every observation into the [`Reconciler`]
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐  PresenceChange   ┌─────────────┐
//! │ PresenceSource │──────────────────▶│             │
//! │                │◀── fetch_member ──│ WatchEngine │◀── poll tick
//! └────────────────┘                   └─────────────┘
//!                                             │ reconcile (serialized)
//!                                             ▼
//!                                      ┌─────────────┐
//!                                      │ Reconciler  │
//!                                      └─────────────┘
//!                                        │         │
//!                                        ▼         ▼
//!                              ┌─────────────┐ ┌─────────────────────┐
//!                              │ StatusStore │ │ NotificationChannel │
//!                              └─────────────┘ └─────────────────────┘
//! ```

pub mod reconciler;

pub use reconciler::{ReconcileOutcome, Reconciler, Trigger};

use std::future::Future;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_stream::StreamExt;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::error::{Error, Result};
use crate::render::NotificationRenderer;
use crate::state::{StatusReader, StatusStore};
use crate::status::{TrackedIdentity, TrackedStatus};
use crate::traits::{
    NotificationChannel, NotificationHandle, PresenceChange, PresenceSource, Subscription,
};

/// Events emitted by the WatchEngine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    /// Engine started
    Started { user_id: String },

    /// A status observation was reconciled
    StatusObserved {
        trigger: Trigger,
        status: TrackedStatus,
        changed: bool,
    },

    /// A new notification message was created
    NotificationCreated { handle: NotificationHandle },

    /// The existing notification message was edited
    NotificationEdited { handle: NotificationHandle },

    /// Creating or editing the notification failed
    NotificationFailed { error: String },

    /// The guild or member could not be resolved
    LookupFailed { error: String },

    /// Engine stopped
    Stopped { reason: String },
}

/// Await `fut`, giving up after `timeout`
pub(crate) async fn bounded<T>(
    timeout: Duration,
    context: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::timeout(timeout.as_millis() as u64, context)),
    }
}

/// Core watch engine
///
/// ## Lifecycle
///
/// 1. Create with [`WatchEngine::new()`]
/// 2. Hand [`WatchEngine::status_reader()`] to whoever serves the status
/// 3. Start with [`WatchEngine::run_until()`] or [`WatchEngine::run_with_shutdown()`]
/// 4. The engine runs until the shutdown future resolves, or until the
///    source reports a fatal error
///
/// ## Threading
///
/// The run loop is a single task. The poll timer and the push subscription
/// are multiplexed with `select!` and both go through the reconciler's
/// serialized entry point.
pub struct WatchEngine {
    /// Presence source for lookups and push updates
    source: Box<dyn PresenceSource>,

    /// Only writer of the status store
    reconciler: Reconciler,

    /// Tracked identity; the display name is refreshed from lookups
    identity: RwLock<TrackedIdentity>,

    poll_interval: Duration,

    call_timeout: Duration,

    /// Event sender for external monitoring
    event_tx: mpsc::Sender<WatchEvent>,
}

impl WatchEngine {
    /// Create a new watch engine
    ///
    /// # Parameters
    ///
    /// - `source`: Presence source implementation
    /// - `channel`: Notification channel, or `None` to only track status
    /// - `config`: Watcher configuration
    ///
    /// # Returns
    ///
    /// A tuple of (engine, event_receiver) where event_receiver yields engine events
    pub fn new(
        source: Box<dyn PresenceSource>,
        channel: Option<Box<dyn NotificationChannel>>,
        config: WatchConfig,
    ) -> Result<(Self, mpsc::Receiver<WatchEvent>)> {
        config.validate()?;

        let (tx, rx) = mpsc::channel(config.engine.event_channel_capacity);

        let renderer = NotificationRenderer::new(&config.notification)?;
        let reconciler = Reconciler::new(
            StatusStore::new(),
            channel,
            renderer,
            config.engine.poll_policy,
            config.engine.call_timeout(),
        )
        .with_events(tx.clone());

        let engine = Self {
            source,
            reconciler,
            identity: RwLock::new(TrackedIdentity::new(config.target.user_id)),
            poll_interval: config.engine.poll_interval(),
            call_timeout: config.engine.call_timeout(),
            event_tx: tx,
        };

        Ok((engine, rx))
    }

    /// Read-only view of the current status
    pub fn status_reader(&self) -> StatusReader {
        self.reconciler.reader()
    }

    /// Run until the optional oneshot fires (or forever when `None`)
    pub async fn run_with_shutdown(&self, shutdown_rx: Option<oneshot::Receiver<()>>) -> Result<()> {
        self.run_until(async move {
            match shutdown_rx {
                Some(rx) => {
                    let _ = rx.await;
                }
                None => std::future::pending::<()>().await,
            }
        })
        .await
    }

    /// Run the poll/push loop until `shutdown` resolves
    ///
    /// Lookup failures are retried on the next tick. A fatal source error
    /// (rejected credentials, refused configuration) ends the loop and is
    /// returned.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let user_id = self.identity.read().await.user_id.clone();
        self.emit_event(WatchEvent::Started { user_id });

        // Subscribe before the startup lookup so no push is lost in between
        let mut updates = self.source.subscribe();

        match bounded(self.call_timeout, "resolve_guild", self.source.resolve_guild()).await {
            Ok(guild) => info!("Watching guild {} ({})", guild.name, guild.id),
            Err(e) => {
                warn!("Failed to resolve guild: {}", e);
                self.emit_event(WatchEvent::LookupFailed {
                    error: e.to_string(),
                });
            }
        }

        let startup = self.poll(Trigger::Startup).await;

        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        let result = match startup {
            Err(e) => Err(e),
            Ok(()) => loop {
                tokio::select! {
                    change = updates.next() => match change {
                        Some(change) => self.handle_push(change).await,
                        None => {
                            warn!("Presence subscription from {} ended, relying on polling", self.source.source_name());
                            updates = Subscription::empty();
                        }
                    },

                    _ = ticker.tick() => {
                        if let Err(e) = self.poll(Trigger::Poll).await {
                            break Err(e);
                        }
                    }

                    _ = &mut shutdown => {
                        info!("Shutdown signal received");
                        break Ok(());
                    }
                }
            },
        };

        updates.cancel();
        let reason = match &result {
            Ok(()) => "Shutdown signal".to_string(),
            Err(e) => {
                error!("Presence source failed permanently: {}", e);
                e.to_string()
            }
        };
        self.emit_event(WatchEvent::Stopped { reason });
        info!("Engine stopped");
        result
    }

    /// Look the member up and reconcile the result
    ///
    /// Only a fatal lookup error is returned; anything else is logged and
    /// left for the next tick.
    async fn poll(&self, trigger: Trigger) -> Result<()> {
        let user_id = self.identity.read().await.user_id.clone();

        let member = match bounded(
            self.call_timeout,
            "fetch_member",
            self.source.fetch_member(&user_id),
        )
        .await
        {
            Ok(member) => member,
            Err(e) => {
                warn!("Failed to fetch presence for {}: {}", user_id, e);
                self.emit_event(WatchEvent::LookupFailed {
                    error: e.to_string(),
                });
                return if e.is_fatal() { Err(e) } else { Ok(()) };
            }
        };

        let identity = self.refresh_identity(Some(member.display_name)).await;
        if trigger == Trigger::Startup {
            info!(
                "Watching user {}. Current status: {}",
                identity.display_name, member.status
            );
        }

        self.reconciler.reconcile(member.status, &identity, trigger).await;
        Ok(())
    }

    /// Reconcile a pushed change if it concerns the tracked member
    async fn handle_push(&self, change: PresenceChange) {
        let tracked = self.identity.read().await.user_id.clone();
        if change.user_id != tracked {
            debug!("Ignoring presence change for {}", change.user_id);
            return;
        }

        debug!(
            "Presence update for {}: {:?} -> {}",
            change.user_id, change.previous, change.current
        );

        let identity = self.refresh_identity(change.display_name).await;
        self.reconciler
            .reconcile(change.current, &identity, Trigger::Push)
            .await;
    }

    async fn refresh_identity(&self, display_name: Option<String>) -> TrackedIdentity {
        let mut identity = self.identity.write().await;
        if let Some(name) = display_name.filter(|n| !n.is_empty()) {
            identity.display_name = name;
        }
        identity.clone()
    }

    fn emit_event(&self, event: WatchEvent) {
        if self.event_tx.try_send(event).is_err() {
            warn!("Event channel full, dropping event");
        }
    }
}
