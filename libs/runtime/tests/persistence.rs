mod harness;

use ember_runtime::{ActorSystem, Config, MailboxKind, StoreKind};
use harness::{Counter, Recorder};

fn file_config(dir: &std::path::Path) -> Config {
    Config {
        store: StoreKind::File {
            dir: dir.to_path_buf(),
        },
        ..Config::for_testing()
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn file_store_rehydrates_across_systems() {
    let dir = tempfile::tempdir().unwrap();

    let first = ActorSystem::create(file_config(dir.path())).unwrap();
    let counter = first
        .actor_of("durable", 0, None, |_, _| Counter)
        .await
        .unwrap();
    for _ in 0..3 {
        counter.ask("tick".to_string()).await.unwrap();
    }
    first.shutdown().await;

    let second = ActorSystem::create(file_config(dir.path())).unwrap();
    let counter = second
        .actor_of("durable", 0, None, |_, _| Counter)
        .await
        .unwrap();

    assert_eq!(counter.last_known_state().unwrap(), 3);
    counter.ask("tock".to_string()).await.unwrap();
    assert_eq!(counter.last_known_state().unwrap(), 4);
    second.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn without_store_state_starts_from_initial() {
    let config = Config {
        store: StoreKind::None,
        ..Config::for_testing()
    };

    let first = ActorSystem::create(config.clone()).unwrap();
    let counter = first
        .actor_of("ephemeral", 10, None, |_, _| Counter)
        .await
        .unwrap();
    counter.ask("tick".to_string()).await.unwrap();
    assert_eq!(counter.last_known_state().unwrap(), 11);
    first.shutdown().await;

    let second = ActorSystem::create(config).unwrap();
    let counter = second
        .actor_of("ephemeral", 10, None, |_, _| Counter)
        .await
        .unwrap();
    assert_eq!(counter.last_known_state().unwrap(), 10);
    second.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn serialized_mailbox_delivers_in_order() {
    let system = ActorSystem::create(Config {
        mailbox: MailboxKind::Serialized,
        ..Config::for_testing()
    })
    .unwrap();
    let recorder = system
        .actor_of("recorder", Vec::new(), None, |_, _| Recorder)
        .await
        .unwrap();

    for n in 0..20 {
        recorder.send(n).await.unwrap();
    }
    assert_eq!(recorder.ask(20).await.unwrap(), 21);
    assert_eq!(recorder.last_known_state().unwrap(), (0..=20).collect::<Vec<_>>());
    system.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bounded_mailbox_applies_backpressure_without_loss() {
    let system = ActorSystem::create(Config {
        mailbox: MailboxKind::Bounded { capacity: 2 },
        ..Config::for_testing()
    })
    .unwrap();
    let recorder = system
        .actor_of("recorder", Vec::new(), None, |_, _| Recorder)
        .await
        .unwrap();

    for n in 0..50 {
        recorder.send(n).await.unwrap();
    }
    assert_eq!(recorder.ask(50).await.unwrap(), 51);
    system.shutdown().await;
}
