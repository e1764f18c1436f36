//! Key expressions: hierarchical keys and wildcard patterns.
//!
//! A key is a `/`-separated list of non-empty segments such as
//! `demo/example/put`. Patterns may also use two wildcard segments:
//!
//! - `*` matches exactly one segment (`a/*/c` matches `a/b/c`)
//! - `**` matches zero or more segments (`a/**/d` matches `a/d` and `a/b/c/d`)
//!
//! Keys are opaque: `.` and `..` are ordinary segments.
//!
//! # Example
//!
//! ```ignore
//! let pattern = KeyPattern::new("demo/example/**")?;
//! assert!(pattern.matches(&Key::new("demo/example/zenoh-put")?));
//! ```

mod expr;
mod matcher;

pub use expr::{Key, KeyPattern};
pub use matcher::{includes, intersects, match_segments, matches};

pub(crate) const SINGLE_WILD: &str = "*";
pub(crate) const DOUBLE_WILD: &str = "**";
