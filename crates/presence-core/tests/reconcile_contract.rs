//! Contract Test: Reconciliation & Notification Upsert
//!
//! Constraints verified:
//! - The stored status always equals the latest observation
//! - The first delivery creates a message, later ones edit it
//! - A deleted message is replaced by a fresh one
//! - "on-change" polling never re-notifies an unchanged status
//! - "always" polling refreshes the message on every tick
//! - A failed delivery leaves the handle alone and is retried

mod common;

use common::*;
use presence_core::config::PollPolicy;
use presence_core::error::Error;
use presence_core::{NotificationHandle, ReconcileOutcome, TrackedStatus, Trigger};

use TrackedStatus::{Offline, Online};

#[tokio::test]
async fn store_tracks_latest_observation_for_any_sequence() {
    let sequences: &[&[TrackedStatus]] = &[
        &[Online],
        &[Offline, Offline],
        &[Online, Offline, Online],
        &[Online, Online, Offline, Offline, Online],
    ];
    let triggers = [Trigger::Push, Trigger::Poll, Trigger::Startup];

    for policy in [PollPolicy::AlwaysUpsert, PollPolicy::OnChange] {
        for sequence in sequences {
            let channel = RecordingChannel::new();
            let reconciler = reconciler(&channel, policy);
            let identity = tracked_identity();

            for (i, status) in sequence.iter().enumerate() {
                if i % 2 == 1 {
                    channel.fail_next_create(Error::delivery("flaky"));
                    channel.fail_next_edit(Error::delivery("flaky"));
                }
                reconciler
                    .reconcile(*status, &identity, triggers[i % triggers.len()])
                    .await;
                assert_eq!(
                    reconciler.reader().read().await,
                    *status,
                    "sequence {sequence:?} policy {policy:?} step {i}"
                );
            }
        }
    }
}

#[tokio::test]
async fn first_delivery_creates_then_edits_same_handle() {
    let channel = RecordingChannel::new();
    let reconciler = reconciler(&channel, PollPolicy::OnChange);
    let identity = tracked_identity();

    let first = reconciler.reconcile(Online, &identity, Trigger::Push).await;
    let second = reconciler.reconcile(Offline, &identity, Trigger::Push).await;
    let third = reconciler.reconcile(Online, &identity, Trigger::Push).await;

    let handle = NotificationHandle::new("msg-1");
    assert_eq!(first, ReconcileOutcome::Created { handle: handle.clone() });
    assert_eq!(second, ReconcileOutcome::Edited { handle: handle.clone() });
    assert_eq!(third, ReconcileOutcome::Edited { handle: handle.clone() });
    assert_eq!(
        channel.calls(),
        vec![
            ChannelCall::Create,
            ChannelCall::Edit(handle.clone()),
            ChannelCall::Edit(handle.clone()),
        ]
    );
    assert_eq!(reconciler.reader().record().await.handle, Some(handle));
}

#[tokio::test]
async fn deleted_message_is_recreated_and_handle_replaced() {
    let channel = RecordingChannel::new();
    let reconciler = reconciler(&channel, PollPolicy::OnChange);
    let identity = tracked_identity();

    reconciler.reconcile(Online, &identity, Trigger::Push).await;
    channel.fail_next_edit(Error::not_found("Unknown Message"));

    let outcome = reconciler.reconcile(Offline, &identity, Trigger::Push).await;

    assert_eq!(
        outcome,
        ReconcileOutcome::Recreated {
            previous: NotificationHandle::new("msg-1"),
            handle: NotificationHandle::new("msg-2"),
        }
    );
    assert_eq!(
        channel.calls(),
        vec![
            ChannelCall::Create,
            ChannelCall::Edit(NotificationHandle::new("msg-1")),
            ChannelCall::Create,
        ]
    );

    // Later deliveries edit the replacement
    reconciler.reconcile(Online, &identity, Trigger::Push).await;
    assert_eq!(
        channel.calls().last(),
        Some(&ChannelCall::Edit(NotificationHandle::new("msg-2")))
    );
}

#[tokio::test]
async fn on_change_policy_notifies_once_for_repeated_status() {
    let channel = RecordingChannel::new();
    let reconciler = reconciler(&channel, PollPolicy::OnChange);
    let identity = tracked_identity();

    reconciler.reconcile(Online, &identity, Trigger::Poll).await;
    let repeat = reconciler.reconcile(Online, &identity, Trigger::Poll).await;

    assert_eq!(repeat, ReconcileOutcome::Unchanged);
    assert_eq!(channel.calls().len(), 1);
}

#[tokio::test]
async fn always_policy_refreshes_on_poll_but_not_on_push() {
    let channel = RecordingChannel::new();
    let reconciler = reconciler(&channel, PollPolicy::AlwaysUpsert);
    let identity = tracked_identity();

    reconciler.reconcile(Online, &identity, Trigger::Push).await;

    let poll = reconciler.reconcile(Online, &identity, Trigger::Poll).await;
    assert_eq!(
        poll,
        ReconcileOutcome::Edited {
            handle: NotificationHandle::new("msg-1")
        }
    );

    let push = reconciler.reconcile(Online, &identity, Trigger::Push).await;
    assert_eq!(push, ReconcileOutcome::Unchanged);
    assert_eq!(channel.create_count(), 1);
    assert_eq!(channel.edit_count(), 1);
}

#[tokio::test]
async fn failed_create_keeps_handle_absent_and_retries_next_cycle() {
    let channel = RecordingChannel::new();
    let reconciler = reconciler(&channel, PollPolicy::OnChange);
    let identity = tracked_identity();

    channel.fail_next_create(Error::delivery("503 Service Unavailable"));
    let failed = reconciler.reconcile(Online, &identity, Trigger::Push).await;

    assert!(matches!(failed, ReconcileOutcome::DeliveryFailed { .. }));
    let record = reconciler.reader().record().await;
    assert_eq!(record.status, Online);
    assert!(record.handle.is_none());

    // Same status again, but the delivery is still owed
    let retried = reconciler.reconcile(Online, &identity, Trigger::Poll).await;
    assert_eq!(
        retried,
        ReconcileOutcome::Created {
            handle: NotificationHandle::new("msg-1")
        }
    );
    assert_eq!(channel.create_count(), 2);
}

#[tokio::test]
async fn failed_edit_keeps_previous_handle() {
    let channel = RecordingChannel::new();
    let reconciler = reconciler(&channel, PollPolicy::OnChange);
    let identity = tracked_identity();

    reconciler.reconcile(Online, &identity, Trigger::Push).await;
    channel.fail_next_edit(Error::delivery("429 Too Many Requests"));

    let outcome = reconciler.reconcile(Offline, &identity, Trigger::Push).await;

    assert!(matches!(outcome, ReconcileOutcome::DeliveryFailed { .. }));
    let record = reconciler.reader().record().await;
    assert_eq!(record.status, Offline);
    assert_eq!(record.handle, Some(NotificationHandle::new("msg-1")));
    assert_eq!(record.notified_status, Some(Online));
    assert_eq!(channel.create_count(), 1);
}

#[tokio::test]
async fn payload_carries_identity_and_new_status() {
    let channel = RecordingChannel::new();
    let reconciler = reconciler(&channel, PollPolicy::OnChange);

    reconciler
        .reconcile(Online, &tracked_identity(), Trigger::Push)
        .await;

    let payload = channel.payloads().pop().expect("one payload");
    assert_eq!(payload.field("User"), Some(DISPLAY_NAME));
    assert_eq!(payload.field("User ID"), Some(USER_ID));
    assert!(payload.description.contains("online"));
    assert!(payload.field("Last updated").is_some());
}

#[tokio::test]
async fn scenario_push_poll_push() {
    for (policy, poll_edits) in [(PollPolicy::AlwaysUpsert, 1), (PollPolicy::OnChange, 0)] {
        let channel = RecordingChannel::new();
        let reconciler = reconciler(&channel, policy);
        let identity = tracked_identity();

        assert_eq!(reconciler.reader().read().await, Offline);

        // Push: online
        reconciler.reconcile(Online, &identity, Trigger::Push).await;
        assert_eq!(reconciler.reader().read().await, Online);
        assert_eq!(channel.calls(), vec![ChannelCall::Create]);

        // Tick: still online
        reconciler.reconcile(Online, &identity, Trigger::Poll).await;
        assert_eq!(channel.edit_count(), poll_edits, "{policy:?}");

        // Push: offline
        reconciler.reconcile(Offline, &identity, Trigger::Push).await;
        assert_eq!(reconciler.reader().read().await, Offline);
        assert_eq!(channel.create_count(), 1);
        assert_eq!(channel.edit_count(), poll_edits + 1);
        assert_eq!(
            channel.calls().last(),
            Some(&ChannelCall::Edit(NotificationHandle::new("msg-1")))
        );
    }
}
