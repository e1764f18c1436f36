//! Concurrency tests: parallel publishers, churn, and teardown under load.

use herald::{PushDispatch, Session, SessionConfig, SessionError, SubscriptionOptions};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

const THREADS: usize = 8;
const PER_THREAD: usize = 1000;

#[test]
fn test_parallel_publishers_single_reliable_subscriber() {
    let session = Session::open(SessionConfig::default()).unwrap();
    let sub = session
        .subscribe("load/**", SubscriptionOptions::pull(), None)
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let session = session.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..PER_THREAD {
                    session
                        .publish(&format!("load/{}", t), format!("{}:{}", t, i))
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let samples = sub.drain().unwrap();
    assert_eq!(samples.len(), THREADS * PER_THREAD);

    // Each publication appears exactly once
    let stamps: HashSet<_> = samples.iter().map(|s| s.timestamp).collect();
    assert_eq!(stamps.len(), THREADS * PER_THREAD);

    // Per-thread relative order is preserved
    let mut next = vec![0usize; THREADS];
    for sample in &samples {
        let text = String::from_utf8(sample.payload.to_vec()).unwrap();
        let (t, i) = text.split_once(':').unwrap();
        let (t, i): (usize, usize) = (t.parse().unwrap(), i.parse().unwrap());
        assert_eq!(sample.key.as_str(), format!("load/{}", t));
        assert_eq!(i, next[t], "thread {} out of order", t);
        next[t] += 1;
    }
    assert!(next.iter().all(|&n| n == PER_THREAD));
    assert_eq!(session.stats().published, (THREADS * PER_THREAD) as u64);
}

#[test]
fn test_subscribe_churn_during_publish() {
    let session = Session::open(SessionConfig::default()).unwrap();
    let stable = session
        .subscribe("churn/*", SubscriptionOptions::pull(), None)
        .unwrap();
    let stop = Arc::new(AtomicBool::new(false));

    let churner = {
        let session = session.clone();
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut cycles = 0;
            loop {
                let sub = session
                    .subscribe("churn/**", SubscriptionOptions::pull().best_effort(), None)
                    .unwrap();
                sub.undeclare().unwrap();
                cycles += 1;
                if stop.load(Ordering::Relaxed) {
                    break cycles;
                }
            }
        })
    };

    for i in 0..2000 {
        session.publish("churn/x", format!("{}", i)).unwrap();
    }
    stop.store(true, Ordering::Relaxed);
    let cycles = churner.join().unwrap();

    assert!(cycles > 0);
    assert_eq!(stable.drain().unwrap().len(), 2000);
    assert_eq!(session.stats().subscriptions, 1);
}

#[test]
fn test_slow_push_subscriber_does_not_block_others() {
    let session = Session::open(SessionConfig {
        push_dispatch: PushDispatch::Worker,
        ..Default::default()
    })
    .unwrap();

    let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
    session
        .subscribe_with("shared", SubscriptionOptions::push(), move |_| {
            // Blocks until the test lets it go
            let _ = release_rx.recv();
        })
        .unwrap();
    let fast = session
        .subscribe("shared", SubscriptionOptions::pull(), None)
        .unwrap();

    for _ in 0..100 {
        session.publish("shared", "x").unwrap();
    }
    assert_eq!(fast.pending(), 100);

    drop(release_tx);
    session.close().unwrap();
}

#[test]
fn test_close_while_publishing() {
    let session = Session::open(SessionConfig::default()).unwrap();
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    session
        .subscribe_with("hot", SubscriptionOptions::push(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

    let publishers: Vec<_> = (0..4)
        .map(|_| {
            let session = session.clone();
            thread::spawn(move || loop {
                match session.publish("hot", "x") {
                    Ok(_) => {}
                    Err(SessionError::SessionClosed) => break,
                    Err(e) => panic!("unexpected error: {}", e),
                }
            })
        })
        .collect();

    thread::sleep(Duration::from_millis(20));
    session.close().unwrap();
    let at_close = delivered.load(Ordering::SeqCst);

    for publisher in publishers {
        publisher.join().unwrap();
    }
    assert_eq!(delivered.load(Ordering::SeqCst), at_close);
}

#[test]
fn test_inline_callbacks_publishing_to_each_other() {
    let session = Session::open(SessionConfig::default()).unwrap();
    let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

    // Each callback answers a ping on its own key with a pong on the other
    for (own, other) in [("x", "y"), ("y", "x")] {
        let responder = session.clone();
        let seen = Arc::clone(&seen);
        session
            .subscribe_with(own, SubscriptionOptions::push(), move |s| {
                if &s.payload[..] == b"ping" {
                    thread::sleep(Duration::from_millis(100));
                    responder.publish(other, "pong").unwrap();
                }
                seen.lock().push(format!(
                    "{}:{}",
                    s.key,
                    String::from_utf8_lossy(&s.payload)
                ));
            })
            .unwrap();
    }

    let (done_tx, done_rx) = crossbeam_channel::unbounded();
    let barrier = Arc::new(Barrier::new(2));
    let publishers: Vec<_> = ["x", "y"]
        .into_iter()
        .map(|key| {
            let session = session.clone();
            let barrier = Arc::clone(&barrier);
            let done_tx = done_tx.clone();
            thread::spawn(move || {
                barrier.wait();
                session.publish(key, "ping").unwrap();
                done_tx.send(key).unwrap();
            })
        })
        .collect();

    for _ in 0..2 {
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("publishers stalled on each other's callbacks");
    }
    for publisher in publishers {
        publisher.join().unwrap();
    }

    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(seen, vec!["x:ping", "x:pong", "y:ping", "y:pong"]);
    session.close().unwrap();
}
