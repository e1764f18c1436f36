//! # Herald
//!
//! An in-process publish/subscribe session core built around hierarchical
//! key expressions.
//!
//! ## Core Concepts
//!
//! - **Keys**: `/`-separated topics such as `demo/example/put`
//! - **Patterns**: keys with `*` (one segment) and `**` (any number) wildcards
//! - **Subscriptions**: a pattern plus a reliability (drop policy) and a
//!   delivery mode (push callback or explicit pull)
//! - **Session**: routes every publication to the queues of all matching
//!   subscriptions
//!
//! ## Example
//!
//! ```ignore
//! use herald::{Session, SessionConfig, SubscriptionOptions};
//!
//! let session = Session::open(SessionConfig::default())?;
//!
//! // Reliable pull subscriber
//! let sub = session.subscribe("demo/example/**", SubscriptionOptions::pull(), None)?;
//!
//! // Publish a value
//! session.publish("demo/example/put", "Put from Rust!")?;
//!
//! // Drain what arrived
//! sub.pull_with(|sample| println!("{} => {:?}", sample.key, sample.payload))?;
//!
//! session.close()?;
//! ```

pub mod error;
pub mod keyexpr;
pub mod publication;
pub mod session;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use error::{Result, SessionError};
pub use keyexpr::{Key, KeyPattern};
pub use publication::{MatchingListener, MatchingStatus, Publisher};
pub use session::{PushDispatch, Session, SessionConfig, DEFAULT_BEST_EFFORT_CAPACITY};
pub use subscriptions::{callback, Callback, Subscriber, SubscriptionOptions};
pub use types::*;
