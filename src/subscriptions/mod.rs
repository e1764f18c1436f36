//! Subscriptions: registry, delivery queues and caller handles.
//!
//! Every subscription owns one [`DeliveryQueue`]:
//! - Reliable queues never drop (optionally bounded in bytes, which makes the
//!   publisher see `ResourceExhausted`)
//! - Best-effort queues evict their oldest sample past a sample capacity
//!
//! Push subscriptions drain their queue into a callback as soon as a sample
//! lands; pull subscriptions wait for the consumer.
//!
//! # Example
//!
//! ```ignore
//! let sub = session.subscribe("demo/example/**", SubscriptionOptions::pull(), None)?;
//! session.publish("demo/example/put", "hello")?;
//!
//! while let Some(sample) = sub.try_pull()? {
//!     println!("{}: {:?}", sample.key, sample.payload);
//! }
//! ```

mod handle;
mod queue;
mod registry;
mod types;

pub use handle::Subscriber;
pub use queue::{CloseReason, DeliveryQueue, Enqueued};
pub use registry::{QueueLimits, Subscription, SubscriptionRegistry};
pub use types::{callback, Callback, SubscriptionOptions};
