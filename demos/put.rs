//! Publish a single keyed value.
//!
//! Usage: `cargo run --example put -- [KEY] [VALUE] [CONFIG_JSON]`
//!
//! `CONFIG_JSON` is a JSON object merged into the session configuration,
//! for instance `'{"best_effort_capacity": 16}'`.

use herald::{Session, SessionConfig, SubscriptionOptions};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let key = args.next().unwrap_or_else(|| "demo/example/herald-put".to_string());
    let value = args.next().unwrap_or_else(|| "Put from Rust!".to_string());
    let config: SessionConfig = match args.next() {
        Some(json) => serde_json::from_str(&json)?,
        None => SessionConfig::default(),
    };

    println!("Opening session...");
    let session = Session::open(config)?;

    // A local observer so the put has somewhere to go
    session.subscribe_with("demo/example/**", SubscriptionOptions::push(), |sample| {
        println!(
            ">> [Subscriber] Received ('{}': '{}')",
            sample.key,
            String::from_utf8_lossy(&sample.payload)
        );
    })?;

    let publisher = session.declare_publisher(&key)?;
    println!(
        "Putting Data ('{}': '{}')... (matching subscribers: {})",
        key,
        value,
        publisher.matching_status()?
    );
    publisher.put(value)?;

    session.close()?;
    Ok(())
}
