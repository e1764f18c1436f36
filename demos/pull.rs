//! Subscribe in pull mode and drain received samples on demand.
//!
//! Usage: `cargo run --example pull -- [PATTERN]`
//!
//! A background publisher writes a counter under `demo/example/counter` every
//! 500ms. Press <enter> to pull what has arrived, `q` to quit.

use herald::{Session, SessionConfig, SubscriptionOptions};
use std::io::BufRead;
use std::thread;
use std::time::Duration;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let expr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "demo/example/**".to_string());

    println!("Opening session...");
    let session = Session::open(SessionConfig::default())?;

    println!("Creating Subscriber on '{}'...", expr);
    let subscriber = session.subscribe(&expr, SubscriptionOptions::pull(), None)?;

    let publisher = session.declare_publisher("demo/example/counter")?;
    thread::spawn(move || {
        let mut counter = 0u64;
        while publisher.put(counter.to_string()).is_ok() {
            counter += 1;
            thread::sleep(Duration::from_millis(500));
        }
    });

    println!("Press <enter> to pull data...");
    for line in std::io::stdin().lock().lines() {
        if line?.trim() == "q" {
            break;
        }
        subscriber.pull_with(|sample| {
            println!(
                ">> [Subscriber] Received ('{}': '{}')",
                sample.key,
                String::from_utf8_lossy(&sample.payload)
            );
        })?;
    }

    subscriber.undeclare()?;
    session.close()?;
    Ok(())
}
