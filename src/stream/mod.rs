// src/stream/mod.rs

//! Push channels.

pub mod multiplexer;

pub use multiplexer::{Multiplexer, StreamError, Subscription};
