//! Test doubles and common utilities for the contract tests
//!
//! This module provides scriptable stand-ins for the presence source and the
//! notification channel that record every call made to them.

#![allow(dead_code)]

use presence_core::config::{PollPolicy, WatchConfig};
use presence_core::error::{Error, Result};
use presence_core::{
    GuildInfo, MemberPresence, NotificationChannel, NotificationConfig, NotificationHandle,
    NotificationPayload, NotificationRenderer, PresenceChange, PresenceSource, Reconciler,
    StatusStore, Subscription, TrackedIdentity, TrackedStatus,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const GUILD_ID: &str = "1000";
pub const USER_ID: &str = "2000";
pub const DISPLAY_NAME: &str = "Welcomer";

pub fn tracked_identity() -> TrackedIdentity {
    TrackedIdentity::new(USER_ID).with_display_name(DISPLAY_NAME)
}

/// One call received by [`RecordingChannel`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCall {
    Create,
    Edit(NotificationHandle),
}

#[derive(Default)]
struct ChannelState {
    calls: Vec<ChannelCall>,
    payloads: Vec<NotificationPayload>,
    next_id: usize,
    create_failures: VecDeque<Error>,
    edit_failures: VecDeque<Error>,
}

/// A notification channel that records calls and can be told to fail
#[derive(Clone, Default)]
pub struct RecordingChannel {
    state: Arc<Mutex<ChannelState>>,
    delay: Duration,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call take `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn boxed(&self) -> Option<Box<dyn NotificationChannel>> {
        Some(Box::new(self.clone()))
    }

    pub fn calls(&self) -> Vec<ChannelCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn payloads(&self) -> Vec<NotificationPayload> {
        self.state.lock().unwrap().payloads.clone()
    }

    pub fn create_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChannelCall::Create))
            .count()
    }

    pub fn edit_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, ChannelCall::Edit(_)))
            .count()
    }

    /// Highest number of calls observed running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_next_create(&self, error: Error) {
        self.state.lock().unwrap().create_failures.push_back(error);
    }

    pub fn fail_next_edit(&self, error: Error) {
        self.state.lock().unwrap().edit_failures.push_back(error);
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl NotificationChannel for RecordingChannel {
    async fn create_message(&self, payload: &NotificationPayload) -> Result<NotificationHandle> {
        self.enter().await;
        let result = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(ChannelCall::Create);
            state.payloads.push(payload.clone());
            match state.create_failures.pop_front() {
                Some(error) => Err(error),
                None => {
                    state.next_id += 1;
                    Ok(NotificationHandle::new(format!("msg-{}", state.next_id)))
                }
            }
        };
        self.leave();
        result
    }

    async fn edit_message(
        &self,
        handle: &NotificationHandle,
        payload: &NotificationPayload,
    ) -> Result<()> {
        self.enter().await;
        let result = {
            let mut state = self.state.lock().unwrap();
            state.calls.push(ChannelCall::Edit(handle.clone()));
            state.payloads.push(payload.clone());
            match state.edit_failures.pop_front() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        };
        self.leave();
        result
    }

    fn channel_name(&self) -> &'static str {
        "recording"
    }
}

/// A presence source whose lookups and pushes are driven by the test
pub struct ControlledPresenceSource {
    status: Arc<Mutex<TrackedStatus>>,
    fail_lookups: Arc<AtomicBool>,
    revoked: Arc<AtomicBool>,
    fetch_count: Arc<AtomicUsize>,
    push_rx: Mutex<Option<mpsc::UnboundedReceiver<PresenceChange>>>,
}

/// Test-side handle for a [`ControlledPresenceSource`]
#[derive(Clone)]
pub struct SourceControl {
    status: Arc<Mutex<TrackedStatus>>,
    fail_lookups: Arc<AtomicBool>,
    revoked: Arc<AtomicBool>,
    fetch_count: Arc<AtomicUsize>,
    push_tx: mpsc::UnboundedSender<PresenceChange>,
}

impl ControlledPresenceSource {
    pub fn new(initial: TrackedStatus) -> (Self, SourceControl) {
        let (push_tx, push_rx) = mpsc::unbounded_channel();
        let status = Arc::new(Mutex::new(initial));
        let fail_lookups = Arc::new(AtomicBool::new(false));
        let revoked = Arc::new(AtomicBool::new(false));
        let fetch_count = Arc::new(AtomicUsize::new(0));

        let source = Self {
            status: Arc::clone(&status),
            fail_lookups: Arc::clone(&fail_lookups),
            revoked: Arc::clone(&revoked),
            fetch_count: Arc::clone(&fetch_count),
            push_rx: Mutex::new(Some(push_rx)),
        };
        let control = SourceControl {
            status,
            fail_lookups,
            revoked,
            fetch_count,
            push_tx,
        };

        (source, control)
    }
}

impl SourceControl {
    /// Status returned by subsequent lookups
    pub fn set_status(&self, status: TrackedStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn fail_lookups(&self, fail: bool) {
        self.fail_lookups.store(fail, Ordering::SeqCst);
    }

    /// Make every lookup fail as if the bot token had been reset
    pub fn revoke_access(&self) {
        self.revoked.store(true, Ordering::SeqCst);
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }

    /// Push a presence change and make lookups agree with it
    pub fn push(&self, user_id: &str, current: TrackedStatus) {
        if user_id == USER_ID {
            self.set_status(current);
        }
        let _ = self.push_tx.send(PresenceChange::new(user_id, None, current));
    }
}

#[async_trait::async_trait]
impl PresenceSource for ControlledPresenceSource {
    async fn resolve_guild(&self) -> Result<GuildInfo> {
        Ok(GuildInfo {
            id: GUILD_ID.to_string(),
            name: "Test Guild".to_string(),
        })
    }

    async fn fetch_member(&self, user_id: &str) -> Result<MemberPresence> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.revoked.load(Ordering::SeqCst) {
            return Err(Error::auth("gateway rejected the token"));
        }
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(Error::lookup(format!("member {user_id} not found")));
        }
        Ok(MemberPresence {
            user_id: user_id.to_string(),
            display_name: DISPLAY_NAME.to_string(),
            status: *self.status.lock().unwrap(),
        })
    }

    fn subscribe(&self) -> Subscription {
        let rx = self
            .push_rx
            .lock()
            .unwrap()
            .take()
            .expect("subscribe() can only be called once");
        Subscription::new(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &'static str {
        "controlled"
    }
}

/// A reconciler over a fresh store
pub fn reconciler(channel: &RecordingChannel, policy: PollPolicy) -> Reconciler {
    Reconciler::new(
        StatusStore::new(),
        channel.boxed(),
        NotificationRenderer::new(&NotificationConfig::default()).expect("default renderer"),
        policy,
        Duration::from_secs(1),
    )
}

/// Helper to create a minimal WatchConfig for testing
pub fn minimal_config(poll_interval_ms: u64, policy: PollPolicy) -> WatchConfig {
    let mut config = WatchConfig::new(GUILD_ID, USER_ID);
    config.engine.poll_interval_ms = poll_interval_ms;
    config.engine.call_timeout_ms = 500;
    config.engine.poll_policy = policy;
    config.engine.event_channel_capacity = 100;
    config
}
