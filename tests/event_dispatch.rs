use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use proptest::prelude::*;
use testloader::events::{EventDispatcher, OutputStream, TestEvent};
use testloader_test_utils::{init_tracing, EventRecorder};

fn loading(path: &str) -> TestEvent {
    TestEvent::ProjectLoading {
        path: PathBuf::from(path),
    }
}

fn output(text: &str) -> TestEvent {
    TestEvent::TestOutput {
        stream: OutputStream::Stdout,
        text: text.to_string(),
    }
}

#[test]
fn failing_and_panicking_subscribers_do_not_affect_others() {
    init_tracing();
    let dispatcher = EventDispatcher::new();

    dispatcher.subscribe_fn(|_| Err(anyhow!("subscriber is broken")));
    dispatcher.subscribe_fn(|event| {
        if event.name() == "ProjectLoading" {
            panic!("subscriber blew up");
        }
        Ok(())
    });
    let recorder = EventRecorder::attach(&dispatcher);

    dispatcher.emit(loading("/a.toml"));
    dispatcher.emit(output("after the panic"));

    assert_eq!(recorder.names(), vec!["ProjectLoading", "TestOutput"]);
    assert_eq!(dispatcher.subscriber_count(), 3);
}

#[test]
fn unsubscribed_clients_stop_receiving() {
    init_tracing();
    let dispatcher = EventDispatcher::new();
    let seen = Arc::new(Mutex::new(0usize));

    let counter = Arc::clone(&seen);
    let id = dispatcher.subscribe_fn(move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    dispatcher.emit(output("one"));
    assert!(dispatcher.unsubscribe(id));
    assert!(!dispatcher.unsubscribe(id));
    dispatcher.emit(output("two"));

    assert_eq!(*seen.lock().unwrap(), 1);
    assert_eq!(dispatcher.subscriber_count(), 0);
}

#[test]
fn handlers_may_subscribe_during_delivery() {
    init_tracing();
    let dispatcher = Arc::new(EventDispatcher::new());
    let late = EventRecorder::default();
    let late = Arc::new(late);

    let hub = Arc::clone(&dispatcher);
    let to_add = Arc::clone(&late);
    let added = Arc::new(Mutex::new(false));
    let flag = Arc::clone(&added);
    dispatcher.subscribe_fn(move |_| {
        let mut done = flag.lock().unwrap();
        if !*done {
            hub.subscribe(to_add.clone());
            *done = true;
        }
        Ok(())
    });

    dispatcher.emit(output("first"));
    dispatcher.emit(output("second"));

    // Joined after the snapshot for "first" was taken.
    let texts: Vec<String> = late
        .events()
        .into_iter()
        .filter_map(|e| match e {
            TestEvent::TestOutput { text, .. } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["second".to_string()]);
}

#[tokio::test]
async fn channel_subscribers_receive_events_in_order() {
    init_tracing();
    let dispatcher = EventDispatcher::new();
    let mut rx = dispatcher.subscribe_channel();
    let dropped = dispatcher.subscribe_channel();
    drop(dropped);
    let recorder = EventRecorder::attach(&dispatcher);

    dispatcher.emit(loading("/a.toml"));
    dispatcher.emit(output("x"));

    assert_eq!(rx.recv().await.map(|e| e.name()), Some("ProjectLoading"));
    assert_eq!(rx.recv().await.map(|e| e.name()), Some("TestOutput"));
    assert_eq!(recorder.names().len(), 2);
}

#[test]
fn concurrent_emitters_are_seen_in_one_order() {
    init_tracing();
    let dispatcher = Arc::new(EventDispatcher::new());
    let first = EventRecorder::attach(&dispatcher);
    let second = EventRecorder::attach(&dispatcher);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let dispatcher = Arc::clone(&dispatcher);
            std::thread::spawn(move || {
                for i in 0..50 {
                    dispatcher.emit(output(&format!("{t}-{i}")));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let texts = |r: &EventRecorder| -> Vec<String> {
        r.events()
            .into_iter()
            .filter_map(|e| match e {
                TestEvent::TestOutput { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    };
    let a = texts(&first);
    assert_eq!(a.len(), 200);
    assert_eq!(a, texts(&second));
}

proptest! {
    #[test]
    fn every_subscriber_sees_emission_order(
        texts in proptest::collection::vec("[a-z]{1,8}", 0..40),
        subscribers in 1usize..5,
    ) {
        let dispatcher = EventDispatcher::new();
        let recorders: Vec<Arc<EventRecorder>> =
            (0..subscribers).map(|_| EventRecorder::attach(&dispatcher)).collect();

        for text in &texts {
            dispatcher.emit(output(text));
        }

        for recorder in &recorders {
            let seen: Vec<String> = recorder
                .events()
                .into_iter()
                .filter_map(|e| match e {
                    TestEvent::TestOutput { text, .. } => Some(text),
                    _ => None,
                })
                .collect();
            prop_assert_eq!(&seen, &texts);
        }
    }
}
