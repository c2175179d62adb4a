//! Bridging for callback-driven text generation.
//!
//! A model generation loop reports progress through a callback; a consumer
//! wants to pull tokens one at a time. [`StreamBridge`] connects the two over
//! a single-slot channel, and the [`stop`] module supplies the criteria the
//! loop polls to decide when to halt.

pub mod bridge;
mod error;
pub mod stop;

pub use bridge::{Emitter, StreamBridge};
pub use error::{Error, Result};
pub use stop::{SentinelMatcher, StoppingCriteria, TokenRelay};
