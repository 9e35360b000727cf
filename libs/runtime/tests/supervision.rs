mod harness;

use ember_runtime::{ActorError, AskError, DeliveryError, SupervisorStrategy};
use harness::{eventually, fast, test_system, Flaky, RecordingScheduler};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn third_failure_removes_after_two_restarts() {
    let system = test_system();
    let supervisor = system
        .supervisor(
            "flaky-sup",
            fast(SupervisorStrategy::one_for_one().with_max_retries(2)),
            None,
        )
        .unwrap();
    let recording = RecordingScheduler::wrap(system.scheduler().clone());
    supervisor.set_scheduler(recording.clone());

    let flaky = system
        .actor_of("flaky", 0, Some(&supervisor), |_, _| Flaky)
        .await
        .unwrap();
    for _ in 0..3 {
        flaky.send("fail".to_string()).await.unwrap();
    }

    let sup = &supervisor;
    eventually("actor removed", move || async move {
        sup.status().await.unwrap().removals == 1
    })
    .await;

    let status = supervisor.status().await.unwrap();
    assert_eq!(status.restarts, 2);
    assert!(status.children.is_empty());
    assert_eq!(recording.removed(), vec![flaky.id().clone()]);
    assert!(!system.contains("flaky"));
    assert!(matches!(
        flaky.send("hello".to_string()).await,
        Err(DeliveryError::NotFound(_))
    ));
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn state_survives_restart() {
    let system = test_system();
    let supervisor = system
        .supervisor("sup", fast(SupervisorStrategy::one_for_one()), None)
        .unwrap();
    let flaky = system
        .actor_of("flaky", 0, Some(&supervisor), |_, _| Flaky)
        .await
        .unwrap();

    assert_eq!(flaky.ask("a".to_string()).await.unwrap(), 1);
    assert_eq!(flaky.ask("b".to_string()).await.unwrap(), 2);
    let before = system.executor("flaky").unwrap().incarnation();

    let err = flaky.ask("fail".to_string()).await.unwrap_err();
    assert_eq!(
        err,
        AskError::Failed(ActorError::Handler("requested failure".into()))
    );

    // Queued until the replacement is running.
    assert_eq!(flaky.ask("c".to_string()).await.unwrap(), 3);
    assert_ne!(system.executor("flaky").unwrap().incarnation(), before);
    assert_eq!(supervisor.status().await.unwrap().restarts, 1);
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panic_is_a_failure() {
    let system = test_system();
    let supervisor = system
        .supervisor("sup", fast(SupervisorStrategy::one_for_one()), None)
        .unwrap();
    let flaky = system
        .actor_of("flaky", 0, Some(&supervisor), |_, _| Flaky)
        .await
        .unwrap();

    let err = flaky.ask("panic".to_string()).await.unwrap_err();
    assert_eq!(
        err,
        AskError::Failed(ActorError::Panicked("requested panic".into()))
    );
    assert_eq!(flaky.ask("after".to_string()).await.unwrap(), 1);
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn all_for_one_restarts_siblings() {
    let system = test_system();
    let supervisor = system
        .supervisor("pair", fast(SupervisorStrategy::all_for_one()), None)
        .unwrap();
    let failing = system
        .actor_of("failing", 0, Some(&supervisor), |_, _| Flaky)
        .await
        .unwrap();
    let sibling = system
        .actor_of("sibling", 0, Some(&supervisor), |_, _| Flaky)
        .await
        .unwrap();

    assert_eq!(sibling.ask("x".to_string()).await.unwrap(), 1);
    let sibling_before = system.executor("sibling").unwrap().incarnation();

    failing.send("fail".to_string()).await.unwrap();
    let sup = &supervisor;
    eventually("both children restarted", move || async move {
        sup.status().await.unwrap().restarts == 2
    })
    .await;

    assert_ne!(system.executor("sibling").unwrap().incarnation(), sibling_before);
    assert_eq!(sibling.ask("y".to_string()).await.unwrap(), 2);
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn escalation_is_handled_by_parent() {
    let system = test_system();
    let parent = system
        .supervisor(
            "parent",
            fast(SupervisorStrategy::one_for_one().with_max_retries(1)),
            None,
        )
        .unwrap();
    let escalating = system
        .supervisor("escalating", fast(SupervisorStrategy::escalate()), Some(&parent))
        .unwrap();
    let flaky = system
        .actor_of("flaky", 0, Some(&escalating), |_, _| Flaky)
        .await
        .unwrap();

    assert_eq!(flaky.ask("a".to_string()).await.unwrap(), 1);
    flaky.send("fail".to_string()).await.unwrap();
    assert_eq!(flaky.ask("b".to_string()).await.unwrap(), 2);

    let status = escalating.status().await.unwrap();
    assert_eq!(status.escalations, 1);
    assert_eq!(status.restarts, 1);
    assert!(status.failure_counts.is_empty());

    // The parent allows one retry; the second escalation stops the children.
    flaky.send("fail".to_string()).await.unwrap();
    let probe = &system;
    eventually("escalating children stopped", move || async move {
        !probe.contains("flaky")
    })
    .await;
    assert_eq!(parent.status().await.unwrap().removals, 1);
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn removal_fails_queued_asks() {
    let system = test_system();
    let supervisor = system
        .supervisor(
            "strict",
            fast(SupervisorStrategy::one_for_one().with_max_retries(0)),
            None,
        )
        .unwrap();
    let flaky = system
        .actor_of("flaky", 0, Some(&supervisor), |_, _| Flaky)
        .await
        .unwrap();

    flaky.send("fail".to_string()).await.unwrap();
    let outcome = flaky.ask("never".to_string()).await;

    // Either the ask was queued and drained, or it arrived after removal.
    match outcome {
        Err(AskError::Failed(ActorError::Removed)) => {}
        Err(AskError::Delivery(DeliveryError::NotFound(_))) => {}
        other => panic!("unexpected ask outcome: {other:?}"),
    }
    system.shutdown().await;
}
