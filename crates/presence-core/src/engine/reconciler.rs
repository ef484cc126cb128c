//! Status reconciliation
//!
//! The [`Reconciler`] is the only writer of the [`StatusStore`] and the only
//! caller of the [`NotificationChannel`]. Every trigger (push, poll, startup)
//! funnels into [`Reconciler::reconcile`], which holds an async mutex for its
//! whole duration: a second trigger queues behind the one in flight.
//!
//! ## Decision table
//!
//! | status changed | last delivery stale | trigger | policy | action |
//! |---|---|---|---|---|
//! | yes | any | any | any | write + upsert |
//! | no | yes | any | any | write + upsert (retry) |
//! | no | no | poll/startup | `AlwaysUpsert` | write + upsert (refresh) |
//! | no | no | otherwise | | write only |
//!
//! ## Upsert
//!
//! No handle yet → create. Handle present → edit; an edit that fails with
//! `NotFound` falls back to create and replaces the handle.

use chrono::Utc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, info, warn};

use super::{WatchEvent, bounded};
use crate::config::PollPolicy;
use crate::error::Error;
use crate::render::NotificationRenderer;
use crate::state::{StatusReader, StatusStore};
use crate::status::{TrackedIdentity, TrackedStatus};
use crate::traits::{NotificationChannel, NotificationHandle, NotificationPayload};

/// What invoked a reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A presence change pushed by the source
    Push,
    /// The periodic timer
    Poll,
    /// The one-off lookup right after login
    Startup,
}

impl Trigger {
    fn is_poll(self) -> bool {
        matches!(self, Self::Poll | Self::Startup)
    }
}

/// Result of a single reconcile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to deliver
    Unchanged,
    /// Status written; no notification channel is configured
    StatusOnly,
    /// A new notification message was created
    Created { handle: NotificationHandle },
    /// The existing notification message was edited
    Edited { handle: NotificationHandle },
    /// The old message was gone; a new one replaced it
    Recreated {
        previous: NotificationHandle,
        handle: NotificationHandle,
    },
    /// The notification call failed; the next cycle retries
    DeliveryFailed { error: String },
}

impl ReconcileOutcome {
    /// Whether a notification was delivered
    pub fn delivered(&self) -> bool {
        matches!(
            self,
            Self::Created { .. } | Self::Edited { .. } | Self::Recreated { .. }
        )
    }
}

/// Serialized status reconciler
pub struct Reconciler {
    /// The store lives inside the gate: holding the lock is the only way to write
    gate: Mutex<StatusStore>,
    reader: StatusReader,
    channel: Option<Box<dyn NotificationChannel>>,
    renderer: NotificationRenderer,
    poll_policy: PollPolicy,
    call_timeout: Duration,
    event_tx: Option<mpsc::Sender<WatchEvent>>,
}

impl Reconciler {
    /// Create a reconciler that owns `store`
    ///
    /// With `channel = None` the reconciler keeps the status current but
    /// never notifies.
    pub fn new(
        store: StatusStore,
        channel: Option<Box<dyn NotificationChannel>>,
        renderer: NotificationRenderer,
        poll_policy: PollPolicy,
        call_timeout: Duration,
    ) -> Self {
        Self {
            reader: store.reader(),
            gate: Mutex::new(store),
            channel,
            renderer,
            poll_policy,
            call_timeout,
            event_tx: None,
        }
    }

    /// Report outcomes on a monitoring channel
    pub fn with_events(mut self, event_tx: mpsc::Sender<WatchEvent>) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Read-only view of the status store
    pub fn reader(&self) -> StatusReader {
        self.reader.clone()
    }

    /// Reconcile an observed status
    ///
    /// Never fails: channel errors are logged, reported as
    /// [`ReconcileOutcome::DeliveryFailed`] and retried on the next cycle.
    pub async fn reconcile(
        &self,
        observed: TrackedStatus,
        identity: &TrackedIdentity,
        trigger: Trigger,
    ) -> ReconcileOutcome {
        let store = self.gate.lock().await;
        let record = store.record().await;

        let changed = record.status != observed;
        let stale_delivery = record.notified_status != Some(observed);
        let refresh = trigger.is_poll() && self.poll_policy == PollPolicy::AlwaysUpsert;

        store.write(observed, None).await;
        self.emit_event(WatchEvent::StatusObserved {
            trigger,
            status: observed,
            changed,
        });

        if changed {
            info!(
                "{} ({}) is now {} [{:?}]",
                identity.display_name, identity.user_id, observed, trigger
            );
        } else {
            debug!("{} still {} [{:?}]", identity.user_id, observed, trigger);
        }

        let Some(channel) = self.channel.as_deref() else {
            return if changed {
                ReconcileOutcome::StatusOnly
            } else {
                ReconcileOutcome::Unchanged
            };
        };

        if !(changed || stale_delivery || refresh) {
            return ReconcileOutcome::Unchanged;
        }

        let payload = self.renderer.render(observed, identity, Utc::now());
        let outcome = self.upsert(channel, record.handle, &payload).await;

        match &outcome {
            ReconcileOutcome::Created { handle } => {
                info!("Created notification {} via {}", handle, channel.channel_name());
                store.mark_notified(observed, handle.clone()).await;
                self.emit_event(WatchEvent::NotificationCreated {
                    handle: handle.clone(),
                });
            }
            ReconcileOutcome::Edited { handle } => {
                debug!("Edited notification {} via {}", handle, channel.channel_name());
                store.mark_notified(observed, handle.clone()).await;
                self.emit_event(WatchEvent::NotificationEdited {
                    handle: handle.clone(),
                });
            }
            ReconcileOutcome::Recreated { previous, handle } => {
                info!(
                    "Notification {} was deleted, replaced by {}",
                    previous, handle
                );
                store.mark_notified(observed, handle.clone()).await;
                self.emit_event(WatchEvent::NotificationCreated {
                    handle: handle.clone(),
                });
            }
            ReconcileOutcome::DeliveryFailed { error } => {
                warn!("Notification delivery failed, will retry next cycle: {}", error);
                self.emit_event(WatchEvent::NotificationFailed {
                    error: error.clone(),
                });
            }
            ReconcileOutcome::Unchanged | ReconcileOutcome::StatusOnly => {}
        }

        outcome
    }

    /// Create-if-absent-else-edit, with a create fallback for deleted messages
    async fn upsert(
        &self,
        channel: &dyn NotificationChannel,
        handle: Option<NotificationHandle>,
        payload: &NotificationPayload,
    ) -> ReconcileOutcome {
        let Some(handle) = handle else {
            return match self.create(channel, payload).await {
                Ok(handle) => ReconcileOutcome::Created { handle },
                Err(e) => ReconcileOutcome::DeliveryFailed {
                    error: e.to_string(),
                },
            };
        };

        let edited = bounded(
            self.call_timeout,
            "edit_message",
            channel.edit_message(&handle, payload),
        )
        .await;

        match edited {
            Ok(()) => ReconcileOutcome::Edited { handle },
            Err(Error::NotFound(reason)) => {
                debug!("Edit of {} failed ({}), creating a new message", handle, reason);
                match self.create(channel, payload).await {
                    Ok(new_handle) => ReconcileOutcome::Recreated {
                        previous: handle,
                        handle: new_handle,
                    },
                    Err(e) => ReconcileOutcome::DeliveryFailed {
                        error: e.to_string(),
                    },
                }
            }
            Err(e) => ReconcileOutcome::DeliveryFailed {
                error: e.to_string(),
            },
        }
    }

    async fn create(
        &self,
        channel: &dyn NotificationChannel,
        payload: &NotificationPayload,
    ) -> Result<NotificationHandle, Error> {
        bounded(
            self.call_timeout,
            "create_message",
            channel.create_message(payload),
        )
        .await
    }

    fn emit_event(&self, event: WatchEvent) {
        if let Some(tx) = &self.event_tx
            && tx.try_send(event).is_err()
        {
            warn!("Event channel full, dropping event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NotificationConfig;

    fn reconciler(policy: PollPolicy) -> Reconciler {
        Reconciler::new(
            StatusStore::new(),
            None,
            NotificationRenderer::new(&NotificationConfig::default()).unwrap(),
            policy,
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn without_channel_only_tracks_status() {
        let r = reconciler(PollPolicy::AlwaysUpsert);
        let identity = TrackedIdentity::new("1");

        let outcome = r.reconcile(TrackedStatus::Online, &identity, Trigger::Push).await;
        assert_eq!(outcome, ReconcileOutcome::StatusOnly);
        assert_eq!(r.reader().read().await, TrackedStatus::Online);

        let outcome = r.reconcile(TrackedStatus::Online, &identity, Trigger::Poll).await;
        assert_eq!(outcome, ReconcileOutcome::Unchanged);
        assert!(r.reader().record().await.handle.is_none());
    }

    #[test]
    fn startup_counts_as_poll() {
        assert!(Trigger::Startup.is_poll());
        assert!(Trigger::Poll.is_poll());
        assert!(!Trigger::Push.is_poll());
    }
}
