mod harness;

use std::time::Duration;

use ember_runtime::{AskError, DeliveryError, Priority, SpawnOptions};
use harness::{eventually, test_system, Counter, Echo, Recorder, Sleeper};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn counter_counts_fifty_hellos() {
    let system = test_system();
    let counter = system
        .actor_of("counter", 0, None, |_, _| Counter)
        .await
        .unwrap();

    let mut last = String::new();
    for _ in 0..50 {
        last = counter.ask("Hello".to_string()).await.unwrap();
    }

    assert_eq!(last, "Processed: Hello");
    assert_eq!(counter.last_known_state().unwrap(), 50);
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn sends_are_handled_in_order() {
    let system = test_system();
    let recorder = system
        .actor_of("recorder", Vec::new(), None, |_, _| Recorder)
        .await
        .unwrap();

    for n in 0..300 {
        recorder.send(n).await.unwrap();
    }

    let probe = &recorder;
    eventually("all messages recorded", move || async move {
        probe.last_known_state().unwrap().len() == 300
    })
    .await;
    assert_eq!(recorder.last_known_state().unwrap(), (0..300).collect::<Vec<_>>());
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_asks_never_cross() {
    let system = test_system();
    let mut pointers = Vec::new();
    for n in 0..3 {
        let pointer = system
            .actor_of(&format!("echo-{n}"), (), None, |_, _| Echo)
            .await
            .unwrap();
        pointers.push(pointer);
    }

    let asks: Vec<_> = (0..150u64)
        .map(|value| {
            let pointer = pointers[(value % 3) as usize].clone();
            tokio::spawn(async move { (value, pointer.ask(value).await) })
        })
        .collect();

    for ask in asks {
        let (value, reply) = ask.await.unwrap();
        assert_eq!(reply.unwrap(), value);
    }
    assert_eq!(system.pending_requests(), 0);
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn ask_times_out_and_frees_its_slot() {
    let system = test_system();
    let sleeper = system
        .actor_of("sleeper", (), None, |_, _| Sleeper)
        .await
        .unwrap();

    let err = sleeper
        .ask_with_timeout(300, Duration::from_millis(30))
        .await
        .unwrap_err();

    assert_eq!(err, AskError::Timeout(Duration::from_millis(30)));
    assert_eq!(system.pending_requests(), 0);

    // The late reply is dropped and the actor keeps working.
    sleeper.ask(1).await.unwrap();
    system.shutdown().await;
}

#[tokio::test]
async fn unknown_actor_is_not_found() {
    let system = test_system();
    let counter = system
        .actor_of("counter", 0, None, |_, _| Counter)
        .await
        .unwrap();
    system.shutdown().await;

    assert!(matches!(
        counter.send("late".to_string()).await,
        Err(DeliveryError::NotFound(_))
    ));
}

#[tokio::test]
async fn address_is_lowercased_id() {
    let system = test_system();
    let pointer = system
        .actor_of("Thermostat-1", 0, None, |_, _| Counter)
        .await
        .unwrap();

    assert_eq!(pointer.address(), "<thermostat-1>");
    assert_eq!(pointer.id().as_str(), "Thermostat-1");
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn high_priority_actor_is_served() {
    let system = test_system();
    let urgent = system
        .actor_of_with(
            "urgent",
            0,
            SpawnOptions {
                priority: Priority::High,
                ..SpawnOptions::default()
            },
            |_, _| Counter,
        )
        .await
        .unwrap();

    assert_eq!(urgent.ask("now".to_string()).await.unwrap(), "Processed: now");
    assert_eq!(system.executor("urgent").unwrap().priority(), Priority::High);
    system.shutdown().await;
}
