//! Checkpoint lifecycle across runs and the resume offer built from it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use shotqueue::checkpoint::{CheckpointStore, RecoveryController};
use shotqueue::queue::{QueueStatus, RunOutcome};
use shotqueue::shot::ShotStatus;

use crate::integration::support::{shots, Harness};

const WINDOW_MS: u64 = 5 * 60 * 1000;

fn manual_clock(start: u64) -> (Arc<AtomicU64>, CheckpointStore) {
    let now = Arc::new(AtomicU64::new(start));
    let reader = now.clone();
    let store = CheckpointStore::in_memory().with_clock(Arc::new(move || reader.load(Ordering::SeqCst)));
    (now, store)
}

/// Run five shots and pause once the second has finished.
async fn paused_after_two(h: &Harness) -> shotqueue::queue::GenerationQueue {
    let queue = h.queue_over(&["s0", "s1", "s2", "s3", "s4"]).await;
    let handle = h.orchestrator.start(queue.clone()).unwrap();
    let control = handle.control();
    h.backend.on_dispatch(move |prompt| {
        if prompt == "b" {
            control.pause();
        }
    });
    let report = handle.run().await;
    assert_eq!(report.outcome, RunOutcome::Paused);
    h.queue(&queue.id).await
}

#[tokio::test]
async fn resume_dispatches_only_remaining_shots() {
    let h = Harness::new(shots(&["a", "b", "c", "d", "e"]));
    let paused = paused_after_two(&h).await;
    assert_eq!(paused.current_shot_index, 2);

    let recovery = RecoveryController::new(h.orchestrator.clone());
    let offer = recovery.inspect(&paused.id).unwrap().expect("fresh checkpoint");
    assert_eq!(
        offer.message,
        "Resume incomplete generation? (2/5 shots completed, 40%)"
    );
    assert_eq!(offer.checkpoint.remaining_shot_ids(), ["s2", "s3", "s4"]);

    let handle = recovery.resume(&offer).await.unwrap();
    assert_ne!(handle.queue_id(), paused.id);
    assert_eq!(handle.queue().shot_ids, vec!["s2", "s3", "s4"]);
    let report = handle.run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(h.backend.prompts(), vec!["a", "b", "c", "d", "e"]);
    for id in ["s0", "s1", "s2", "s3", "s4"] {
        assert_eq!(h.shot(id).await.status, ShotStatus::Completed);
    }
    // The interrupted queue keeps its paused record.
    assert_eq!(h.queue(&paused.id).await.status, QueueStatus::Paused);
    assert!(h.checkpoints.load_checkpoint().unwrap().is_none());
}

#[tokio::test]
async fn stale_checkpoint_is_not_offered() {
    let (now, store) = manual_clock(1_000_000);
    let h = Harness::with_checkpoints(shots(&["a", "b", "c", "d", "e"]), store);
    let paused = paused_after_two(&h).await;

    now.fetch_add(WINDOW_MS + 1, Ordering::SeqCst);
    let recovery = RecoveryController::new(h.orchestrator.clone());

    assert!(recovery.inspect(&paused.id).unwrap().is_none());
    assert!(h.checkpoints.peek().unwrap().is_none());
}

#[tokio::test]
async fn checkpoint_at_window_edge_is_still_fresh() {
    let (now, store) = manual_clock(1_000_000);
    let h = Harness::with_checkpoints(shots(&["a", "b", "c", "d", "e"]), store);
    let paused = paused_after_two(&h).await;

    now.fetch_add(WINDOW_MS, Ordering::SeqCst);
    let recovery = RecoveryController::new(h.orchestrator.clone());

    assert!(recovery.inspect(&paused.id).unwrap().is_some());
}

#[tokio::test]
async fn checkpoint_for_another_queue_is_ignored() {
    let h = Harness::new(shots(&["a", "b", "c", "d", "e"]));
    let paused = paused_after_two(&h).await;
    let recovery = RecoveryController::new(h.orchestrator.clone());

    assert!(recovery.inspect("some-other-queue").unwrap().is_none());
    // Still there for the queue it belongs to.
    assert!(recovery.inspect(&paused.id).unwrap().is_some());
}

#[tokio::test]
async fn discard_clears_and_leaves_queue_untouched() {
    let h = Harness::new(shots(&["a", "b", "c", "d", "e"]));
    let paused = paused_after_two(&h).await;
    let recovery = RecoveryController::new(h.orchestrator.clone());

    recovery.discard().unwrap();

    assert!(recovery.inspect(&paused.id).unwrap().is_none());
    let queue = h.queue(&paused.id).await;
    assert_eq!(queue.status, QueueStatus::Paused);
    assert_eq!(queue.current_shot_index, 2);
    // Discarding twice is harmless.
    recovery.discard().unwrap();
}

#[tokio::test]
async fn each_attempted_shot_refreshes_the_checkpoint() {
    let (now, store) = manual_clock(1_000_000);
    let h = Harness::with_checkpoints(shots(&["a", "b", "c"]), store);
    let queue = h.queue_over(&["s0", "s1", "s2"]).await;
    let handle = h.orchestrator.start(queue.clone()).unwrap();
    let control = handle.control();
    let clock = now.clone();
    h.backend.on_dispatch(move |prompt| {
        // Every shot takes almost a full window.
        clock.fetch_add(WINDOW_MS - 1, Ordering::SeqCst);
        if prompt == "b" {
            control.pause();
        }
    });

    handle.run().await;

    let checkpoint = h.checkpoints.load_checkpoint().unwrap().expect("refreshed after each shot");
    assert_eq!(checkpoint.current_shot_index, 2);
    assert_eq!(checkpoint.timestamp, now.load(Ordering::SeqCst));
}

#[tokio::test]
async fn long_shot_keeps_checkpoint_alive() {
    let (now, store) = manual_clock(1_000_000);
    let h = Harness::with_checkpoints(shots(&["a", "b", "c", "d", "e"]), store);
    let queue = h.queue_over(&["s0", "s1", "s2", "s3", "s4"]).await;
    let handle = h.orchestrator.start(queue.clone()).unwrap();
    let control = handle.control();
    h.backend.on_dispatch(move |prompt| match prompt {
        "a" => {
            now.fetch_add(WINDOW_MS + 60_000, Ordering::SeqCst);
        }
        "b" => control.pause(),
        _ => {}
    });

    let report = handle.run().await;

    assert_eq!(report.outcome, RunOutcome::Paused);
    let checkpoint = h.checkpoints.load_checkpoint().unwrap().expect("checkpoint after pause");
    assert_eq!(checkpoint.queue_id, queue.id);
    assert_eq!(checkpoint.current_shot_index, 2);
    let recovery = RecoveryController::new(h.orchestrator.clone());
    let offer = recovery.inspect(&queue.id).unwrap().expect("resumable");
    assert_eq!(offer.checkpoint.remaining_shot_ids(), ["s2", "s3", "s4"]);
}
