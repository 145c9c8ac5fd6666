//! Audio sample types and buffers.

pub mod buffers;
pub mod sample;

pub use buffers::{AudioRingBuffer, JitterBuffer, ReadSlices};
pub use sample::AudioSample;
