//! Queue orchestrator behavior: ordering, progress, failure isolation, pause and cancel.

use std::time::Duration;

use shotqueue::error::QueueError;
use shotqueue::persistence::Persistence;
use shotqueue::queue::{QueuePatch, QueueStatus, RunOutcome, ShotOutcome};
use shotqueue::shot::ShotStatus;
use shotqueue::variation::{total_outputs_for, GrammarConfig};

use crate::integration::support::{shots, Harness, PROJECT};

#[tokio::test]
async fn progress_counts_outputs_not_shots() {
    let h = Harness::new(shots(&["a", "b [1, 2, 3]", "c"]));
    let queue = h.queue_over(&["s0", "s1", "s2"]).await;

    let report = h.orchestrator.start(queue.clone()).unwrap().run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.total_outputs, 5);
    assert_eq!(h.persistence.progress_history(), vec![20.0, 80.0, 100.0]);
    let stored = h.queue(&queue.id).await;
    assert_eq!(stored.status, QueueStatus::Completed);
    assert_eq!(stored.progress, 100.0);
    assert_eq!(stored.current_shot_index, 3);
}

#[tokio::test]
async fn variants_dispatch_in_expansion_order() {
    let h = Harness::new(shots(&["@hero at [dawn, dusk] in [the forest, the city]", "plain"]));
    let queue = h.queue_over(&["s0", "s1"]).await;

    h.orchestrator.start(queue).unwrap().run().await;

    assert_eq!(
        h.backend.prompts(),
        vec![
            "@hero at dawn in the forest",
            "@hero at dawn in the city",
            "@hero at dusk in the forest",
            "@hero at dusk in the city",
            "plain",
        ]
    );
    let shot = h.shot("s0").await;
    assert_eq!(shot.status, ShotStatus::Completed);
    assert_eq!(shot.result_refs.len(), 4);
}

#[tokio::test]
async fn failed_shot_does_not_stop_the_queue() {
    let h = Harness::new(shots(&["a", "b", "c", "d", "e"]));
    h.backend.fail_on("c");
    let queue = h.queue_over(&["s0", "s1", "s2", "s3", "s4"]).await;

    let report = h.orchestrator.start(queue.clone()).unwrap().run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(h.backend.prompts(), vec!["a", "b", "c", "d", "e"]);
    let failed = h.shot("s2").await;
    assert_eq!(failed.status, ShotStatus::Failed);
    assert!(failed.error_message.unwrap().contains("cannot render"));
    assert!(failed.result_refs.is_empty());
    for id in ["s0", "s1", "s3", "s4"] {
        assert_eq!(h.shot(id).await.status, ShotStatus::Completed);
    }

    let stored = h.queue(&queue.id).await;
    assert_eq!(stored.status, QueueStatus::Completed);
    assert_eq!(stored.progress, 100.0);
    assert_eq!(stored.error_message, None);
    assert_eq!(report.outputs_failed, 1);
    assert_eq!(report.failed_shots().count(), 1);
    assert!(h.checkpoints.load_checkpoint().unwrap().is_none());
}

#[tokio::test]
async fn first_failing_variant_fails_the_shot() {
    let h = Harness::new(shots(&["[x, y, z]"]));
    h.backend.fail_on("y");
    let queue = h.queue_over(&["s0"]).await;

    let report = h.orchestrator.start(queue).unwrap().run().await;

    assert_eq!(h.backend.prompts(), vec!["x", "y"]);
    assert_eq!(
        report.shots[0].outcome,
        ShotOutcome::Failed {
            error: "Variant 2 of 3 failed: Generation rejected: cannot render 'y'".to_string(),
            succeeded: 1,
        }
    );
    assert_eq!(report.outputs_succeeded, 1);
    assert_eq!(report.outputs_failed, 2);
    assert_eq!(report.progress, 100.0);
}

#[tokio::test]
async fn invalid_template_dispatches_literal_prompt_once() {
    let h = Harness::new(shots(&["@hero [dawn", "[a, b]"]));
    let queue = h.queue_over(&["s0", "s1"]).await;

    let report = h.orchestrator.start(queue).unwrap().run().await;

    assert_eq!(h.backend.prompts(), vec!["@hero [dawn", "a", "b"]);
    assert_eq!(report.total_outputs, 3);
    assert_eq!(h.shot("s0").await.status, ShotStatus::Completed);
}

#[tokio::test]
async fn estimate_matches_dispatched_units() {
    let specs = shots(&["[a, b] [c, d, e]", "@hero [dawn, ]", "[[x]]", "plain", "[1,2]"]);
    let estimate = total_outputs_for(&specs, &GrammarConfig::default());
    let h = Harness::new(specs);
    let queue = h.queue_over(&["s0", "s1", "s2", "s3", "s4"]).await;

    h.orchestrator.start(queue).unwrap().run().await;

    assert_eq!(h.backend.prompts().len(), estimate);
}

#[tokio::test]
async fn pause_waits_for_the_current_shot() {
    let h = Harness::new(shots(&["a", "[b1, b2, b3]", "c", "d"]));
    let queue = h.queue_over(&["s0", "s1", "s2", "s3"]).await;
    let handle = h.orchestrator.start(queue.clone()).unwrap();
    let control = handle.control();
    h.backend.on_dispatch(move |prompt| {
        if prompt == "b2" {
            control.pause();
        }
    });

    let report = handle.run().await;

    assert_eq!(report.outcome, RunOutcome::Paused);
    assert_eq!(h.backend.prompts(), vec!["a", "b1", "b2", "b3"]);
    assert_eq!(h.shot("s1").await.status, ShotStatus::Completed);
    assert_eq!(h.shot("s2").await.status, ShotStatus::Ready);

    let stored = h.queue(&queue.id).await;
    assert_eq!(stored.status, QueueStatus::Paused);
    assert_eq!(stored.current_shot_index, 2);
    assert_eq!(stored.progress, 4.0 / 6.0 * 100.0);
    let checkpoint = h.checkpoints.load_checkpoint().unwrap().unwrap();
    assert_eq!(checkpoint.current_shot_index, 2);

    // A paused queue picks up where it stopped.
    let resumed = h.orchestrator.start(stored).unwrap().run().await;
    assert_eq!(resumed.outcome, RunOutcome::Completed);
    assert_eq!(h.backend.prompts(), vec!["a", "b1", "b2", "b3", "c", "d"]);
    assert_eq!(h.persistence.progress_history().last().copied(), Some(100.0));
    assert!(h.checkpoints.load_checkpoint().unwrap().is_none());
}

#[tokio::test]
async fn cancel_interrupts_the_in_flight_dispatch() {
    let h = Harness::new(shots(&["a", "b", "c"]));
    h.backend.hang_on("b");
    let queue = h.queue_over(&["s0", "s1", "s2"]).await;
    let handle = h.orchestrator.start(queue.clone()).unwrap();
    let control = handle.control();

    let run = tokio::spawn(handle.run());
    tokio::time::timeout(Duration::from_secs(5), h.backend.hanging.notified())
        .await
        .expect("backend never reached the hanging prompt");
    control.cancel();
    let report = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("run did not stop after cancel")
        .unwrap();

    assert_eq!(report.outcome, RunOutcome::Cancelled);
    assert_eq!(report.next_shot_index, 1);
    let interrupted = h.shot("s1").await;
    assert_eq!(interrupted.status, ShotStatus::Ready);
    assert!(interrupted.result_refs.is_empty());
    assert_eq!(interrupted.error_message, None);
    assert_eq!(h.shot("s2").await.status, ShotStatus::Ready);
    assert_eq!(h.backend.prompts(), vec!["a", "b"]);

    let stored = h.queue(&queue.id).await;
    assert_eq!(stored.status, QueueStatus::Paused);
    assert_eq!(stored.current_shot_index, 1);
    assert!(h.checkpoints.load_checkpoint().unwrap().is_some());
}

#[tokio::test]
async fn persistence_failure_fails_queue_and_keeps_checkpoint() {
    let h = Harness::new(shots(&["a", "b", "c"]));
    h.persistence.fail_updates_of("s1");
    let queue = h.queue_over(&["s0", "s1", "s2"]).await;

    let report = h.orchestrator.start(queue.clone()).unwrap().run().await;

    match &report.outcome {
        RunOutcome::Failed { message } => assert!(message.contains("database offline")),
        other => panic!("expected failure, got {other:?}"),
    }
    let stored = h.queue(&queue.id).await;
    assert_eq!(stored.status, QueueStatus::Failed);
    assert!(stored.error_message.unwrap().contains("database offline"));
    let checkpoint = h.checkpoints.load_checkpoint().unwrap().unwrap();
    assert_eq!(checkpoint.queue_id, queue.id);
    assert_eq!(checkpoint.current_shot_index, 1);
    assert_eq!(h.backend.prompts(), vec!["a"]);
}

#[tokio::test]
async fn reference_fault_returns_shot_to_ready() {
    let h = Harness::new(shots(&["a", "b"]));
    h.persistence.fail_reference_lookups();
    let queue = h.queue_over(&["s0", "s1"]).await;

    let report = h.orchestrator.start(queue.clone()).unwrap().run().await;

    match &report.outcome {
        RunOutcome::Failed { message } => assert!(message.contains("reference index offline")),
        other => panic!("expected failure, got {other:?}"),
    }
    assert!(h.backend.prompts().is_empty());
    assert_eq!(h.shot("s0").await.status, ShotStatus::Ready);
    assert_eq!(h.shot("s1").await.status, ShotStatus::Ready);
    assert_eq!(h.queue(&queue.id).await.status, QueueStatus::Failed);
    let checkpoint = h.checkpoints.load_checkpoint().unwrap().unwrap();
    assert_eq!(checkpoint.current_shot_index, 0);
}

#[tokio::test]
async fn over_limit_template_dispatches_once() {
    let group = format!("[{}]", vec!["x"; 10].join(","));
    let huge = vec![group; 19].join(" ");
    let h = Harness::new(shots(&["a", huge.as_str(), huge.as_str()]));
    let queue = h.queue_over(&["s0", "s1", "s2"]).await;

    let report = h.orchestrator.start(queue.clone()).unwrap().run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(report.total_outputs, 3);
    assert_eq!(report.outputs_succeeded, 3);
    assert_eq!(h.backend.prompts(), vec!["a".to_string(), huge.clone(), huge]);
    assert_eq!(h.persistence.progress_history().last(), Some(&100.0));
}

#[tokio::test]
async fn second_run_is_rejected_while_one_is_live() {
    let h = Harness::new(shots(&["a", "b"]));
    let first = h.queue_over(&["s0"]).await;
    let second = h.queue_over(&["s1"]).await;

    let handle = h.orchestrator.start(first.clone()).unwrap();
    match h.orchestrator.start(second.clone()) {
        Err(QueueError::RunActive(active)) => assert_eq!(active, first.id),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("second run must be rejected"),
    }
    assert!(matches!(
        h.orchestrator.retry_shot(PROJECT, "s1").await,
        Err(QueueError::RunActive(_))
    ));

    handle.run().await;
    assert_eq!(h.orchestrator.active_queue(), None);
    let report = h.orchestrator.start(second).unwrap().run().await;
    assert_eq!(report.outcome, RunOutcome::Completed);
}

#[tokio::test]
async fn dropping_a_handle_releases_the_slot() {
    let h = Harness::new(shots(&["a"]));
    let queue = h.queue_over(&["s0"]).await;
    let handle = h.orchestrator.start(queue.clone()).unwrap();
    assert_eq!(h.orchestrator.active_queue(), Some(queue.id.clone()));
    drop(handle);
    assert!(h.orchestrator.start(queue).is_ok());
}

#[tokio::test]
async fn terminal_queues_cannot_start() {
    let h = Harness::new(shots(&["a"]));
    let queue = h.queue_over(&["s0"]).await;
    h.orchestrator.start(queue.clone()).unwrap().run().await;

    let completed = h.queue(&queue.id).await;
    assert!(matches!(
        h.orchestrator.start(completed),
        Err(QueueError::InvalidTransition {
            from: QueueStatus::Completed,
            to: QueueStatus::Processing
        })
    ));

    let failed = h
        .persistence
        .update_queue(&queue.id, QueuePatch::failed("boom"))
        .await
        .unwrap();
    assert!(h.orchestrator.start(failed).is_err());
}

#[tokio::test]
async fn references_are_resolved_per_shot() {
    let specs = vec![
        shotqueue::shot::ShotSpec::new("s0", 0.0, "hero shot").with_tags(["@hero", "@city"]),
    ];
    let h = Harness::new(specs);
    h.persistence
        .put_references(PROJECT, "@hero", vec!["https://assets/hero.png".into()])
        .await
        .unwrap();
    h.persistence
        .put_references(PROJECT, "@city", vec!["https://assets/city.png".into()])
        .await
        .unwrap();
    let queue = h.queue_over(&["s0"]).await;

    h.orchestrator.start(queue).unwrap().run().await;

    assert_eq!(
        h.backend.assets_for("hero shot"),
        Some(vec![
            "https://assets/hero.png".to_string(),
            "https://assets/city.png".to_string()
        ])
    );
}

#[tokio::test]
async fn retry_single_shot_reuses_dispatch() {
    let h = Harness::new(shots(&["a", "[b1, b2]"]));
    h.backend.fail_on("b2");
    let queue = h.queue_over(&["s0", "s1"]).await;
    h.orchestrator.start(queue).unwrap().run().await;
    assert_eq!(h.shot("s1").await.status, ShotStatus::Failed);

    h.backend.heal();
    let outcome = h.orchestrator.retry_shot(PROJECT, "s1").await.unwrap();

    assert!(matches!(outcome, ShotOutcome::Completed { ref result_refs } if result_refs.len() == 2));
    let shot = h.shot("s1").await;
    assert_eq!(shot.status, ShotStatus::Completed);
    assert_eq!(shot.error_message, None);
    assert_eq!(h.orchestrator.active_queue(), None);
}

#[tokio::test]
async fn retry_failed_builds_a_new_queue_in_sequence_order() {
    let h = Harness::new(shots(&["a", "b", "c", "d"]));
    h.backend.fail_on("b");
    h.backend.fail_on("d");
    let queue = h.queue_over(&["s0", "s1", "s2", "s3"]).await;
    h.orchestrator.start(queue.clone()).unwrap().run().await;

    h.backend.heal();
    let handle = h.orchestrator.retry_failed(PROJECT).await.unwrap();
    assert_ne!(handle.queue_id(), queue.id);
    assert_eq!(handle.queue().shot_ids, vec!["s1", "s3"]);
    let report = handle.run().await;

    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(h.shot("s1").await.status, ShotStatus::Completed);
    assert_eq!(h.shot("s3").await.status, ShotStatus::Completed);
    assert!(matches!(
        h.orchestrator.retry_failed(PROJECT).await,
        Err(QueueError::NothingToRetry(_))
    ));
}

#[tokio::test]
async fn empty_queue_completes_immediately() {
    let h = Harness::new(Vec::new());
    let queue = h.queue_over(&[]).await;
    let report = h.orchestrator.start(queue.clone()).unwrap().run().await;
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(h.queue(&queue.id).await.progress, 100.0);
}
