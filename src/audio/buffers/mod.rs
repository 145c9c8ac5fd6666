//! Audio buffer implementations.
//!
//! - [`AudioRingBuffer`] - Fixed-capacity sample ring, overwrites the oldest audio when full
//! - [`JitterBuffer`] - Starvation-aware playout on top of the ring

pub mod jitter_buffer;
pub mod ring_buffer;

pub use jitter_buffer::JitterBuffer;
pub use ring_buffer::{AudioRingBuffer, ReadSlices};
