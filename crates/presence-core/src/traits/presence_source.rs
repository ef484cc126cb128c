// # Presence Source Trait
//
// Defines the interface for looking up and monitoring member presence.
//
// ## Implementations
//
// - Discord gateway + REST: `presence-source-discord` crate
//
// ## Usage
//
// ```rust,ignore
// use presence_core::PresenceSource;
// use tokio_stream::StreamExt;
//
// #[tokio::main]
// async fn main() -> presence_core::Result<()> {
//     let source = /* PresenceSource implementation */;
//
//     // Current presence of one member
//     let member = source.fetch_member("123456789").await?;
//
//     // Push updates
//     let mut updates = source.subscribe();
//     while let Some(change) = updates.next().await {
//         println!("presence changed: {:?}", change);
//     }
//
//     Ok(())
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;
use tokio_stream::Stream;

use crate::status::TrackedStatus;

/// A presence change pushed by the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    /// Member the change belongs to
    pub user_id: String,
    /// Display name, when the event carried enough user data to resolve one
    pub display_name: Option<String>,
    /// Previously observed status (if the source saw one)
    pub previous: Option<TrackedStatus>,
    /// Newly observed status
    pub current: TrackedStatus,
}

impl PresenceChange {
    /// Create a presence change event
    pub fn new(
        user_id: impl Into<String>,
        previous: Option<TrackedStatus>,
        current: TrackedStatus,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            previous,
            current,
        }
    }

    /// Attach a display name
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }
}

/// Current presence of a single member, as returned by an on-demand lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberPresence {
    pub user_id: String,
    pub display_name: String,
    pub status: TrackedStatus,
}

/// Basic information about the watched community
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuildInfo {
    pub id: String,
    pub name: String,
}

/// A cancellable stream of [`PresenceChange`] events
///
/// Cancelling (or dropping) the subscription releases the underlying stream
/// and notifies the producer, if it registered interest via
/// [`Subscription::with_cancel_signal`].
pub struct Subscription {
    inner: Option<Pin<Box<dyn Stream<Item = PresenceChange> + Send + 'static>>>,
    on_cancel: Option<oneshot::Sender<()>>,
}

impl Subscription {
    /// Wrap an event stream
    pub fn new(stream: impl Stream<Item = PresenceChange> + Send + 'static) -> Self {
        Self {
            inner: Some(Box::pin(stream)),
            on_cancel: None,
        }
    }

    /// Wrap an event stream whose producer wants to be told about cancellation
    pub fn with_cancel_signal(
        stream: impl Stream<Item = PresenceChange> + Send + 'static,
        on_cancel: oneshot::Sender<()>,
    ) -> Self {
        Self {
            inner: Some(Box::pin(stream)),
            on_cancel: Some(on_cancel),
        }
    }

    /// A subscription that never yields anything
    pub fn empty() -> Self {
        Self::new(tokio_stream::pending())
    }

    /// Stop receiving events. Subsequent polls return `None`.
    pub fn cancel(&mut self) {
        self.inner = None;
        if let Some(tx) = self.on_cancel.take() {
            let _ = tx.send(());
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_none()
    }
}

impl Stream for Subscription {
    type Item = PresenceChange;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.get_mut().inner.as_mut() {
            Some(stream) => stream.as_mut().poll_next(cx),
            None => Poll::Ready(None),
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Trait for presence source implementations
///
/// A presence source answers two questions: "what is this member's presence
/// right now?" and "tell me whenever any presence changes".
///
/// # Responsibilities
///
/// Sources are **observers**, not decision-makers:
/// - They resolve the guild and members on demand
/// - They push every presence change they see, for every member
/// - They do not filter for the tracked identity (owned by `WatchEngine`)
/// - They do not touch the status store or the notification channel
/// - They do not retry failed lookups (the next poll tick retries)
#[async_trait]
pub trait PresenceSource: Send + Sync {
    /// Resolve the configured guild
    ///
    /// # Returns
    ///
    /// - `Ok(GuildInfo)`: The guild exists and is visible to the bot
    /// - `Err(Error::Lookup)`: The guild cannot be resolved
    async fn resolve_guild(&self) -> Result<GuildInfo, crate::Error>;

    /// Fetch a member's current presence
    ///
    /// # Returns
    ///
    /// - `Ok(MemberPresence)`: Current collapsed status and display name
    /// - `Err(Error::Lookup)`: Guild or member cannot be resolved
    async fn fetch_member(&self, user_id: &str) -> Result<MemberPresence, crate::Error>;

    /// Subscribe to pushed presence changes
    ///
    /// The subscription yields changes for every member of the guild; callers
    /// filter for the identities they care about.
    fn subscribe(&self) -> Subscription;

    /// Source name (for logging)
    fn source_name(&self) -> &'static str;
}
