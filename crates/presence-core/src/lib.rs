// # presence-core
//
// Core library for the single-user presence watcher.
//
// ## Architecture Overview
//
// This library provides the core functionality for mirroring one member's
// presence into a status endpoint and a notification message:
// - **PresenceSource**: Trait for looking up and monitoring member presence
// - **NotificationChannel**: Trait for creating and editing the notification
// - **StatusStore**: In-memory record of (status, notification handle)
// - **Reconciler**: Serialized status comparison and notification upsert
// - **WatchEngine**: Drives the reconciler from a poll timer and push events
//
// ## Design Principles
//
// 1. **Single Writer**: Only the reconciler writes the status store
// 2. **Serialized Reconciliation**: Push and poll never interleave
// 3. **Upsert, Not Spam**: One persistent message, created once and edited
// 4. **Failures Are Per-Cycle**: Lookup and delivery errors never stop the loop

pub mod config;
pub mod engine;
pub mod error;
pub mod render;
pub mod state;
pub mod status;
pub mod traits;

// Re-export core types for convenience
pub use config::{EngineConfig, NotificationConfig, PollPolicy, TargetConfig, WatchConfig};
pub use engine::{ReconcileOutcome, Reconciler, Trigger, WatchEngine, WatchEvent};
pub use error::{Error, Result};
pub use render::NotificationRenderer;
pub use state::{StatusReader, StatusRecord, StatusStore};
pub use status::{TrackedIdentity, TrackedStatus};
pub use traits::{
    GuildInfo, MemberPresence, NotificationChannel, NotificationHandle, NotificationPayload,
    PayloadField, PresenceChange, PresenceSource, Subscription,
};
