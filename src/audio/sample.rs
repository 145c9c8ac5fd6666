use std::fmt::Debug;

use num_traits::{Bounded, FromPrimitive, Num, ToPrimitive};

/// A PCM sample type the inbound ring buffer can store.
///
/// `silence()` is the value written for synthesized gap filler; it is the
/// midpoint of the range for unsigned formats.
pub trait AudioSample:
    Num + Copy + Send + Sync + PartialOrd + ToPrimitive + FromPrimitive + Bounded + Debug + 'static
{
    fn silence() -> Self;

    fn to_f64_normalized(self) -> f64;

    fn from_f64_normalized(value: f64) -> Self;

    /// Converts a 16-bit PCM wire sample.
    fn from_wire_i16(sample: i16) -> Self;

    fn is_silence(self) -> bool {
        self == Self::silence()
    }
}

impl AudioSample for f32 {
    fn silence() -> Self {
        0.0
    }

    fn to_f64_normalized(self) -> f64 {
        self as f64
    }

    fn from_f64_normalized(value: f64) -> Self {
        value.clamp(-1.0, 1.0) as f32
    }

    fn from_wire_i16(sample: i16) -> Self {
        sample as f32 / i16::MAX as f32
    }
}

impl AudioSample for i16 {
    fn silence() -> Self {
        0
    }

    fn to_f64_normalized(self) -> f64 {
        self as f64 / i16::MAX as f64
    }

    fn from_f64_normalized(value: f64) -> Self {
        (value.clamp(-1.0, 1.0) * i16::MAX as f64) as i16
    }

    fn from_wire_i16(sample: i16) -> Self {
        sample
    }
}

impl AudioSample for i32 {
    fn silence() -> Self {
        0
    }

    fn to_f64_normalized(self) -> f64 {
        self as f64 / i32::MAX as f64
    }

    fn from_f64_normalized(value: f64) -> Self {
        (value.clamp(-1.0, 1.0) * i32::MAX as f64) as i32
    }

    fn from_wire_i16(sample: i16) -> Self {
        (sample as i32) << 16
    }
}

impl AudioSample for u8 {
    fn silence() -> Self {
        128
    }

    fn to_f64_normalized(self) -> f64 {
        (self as f64 - 128.0) / 128.0
    }

    fn from_f64_normalized(value: f64) -> Self {
        ((value.clamp(-1.0, 1.0) * 128.0) + 128.0) as u8
    }

    fn from_wire_i16(sample: i16) -> Self {
        ((sample >> 8) + 128) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_values() {
        assert!(0i16.is_silence());
        assert!(0.0f32.is_silence());
        assert!(128u8.is_silence());
        assert!(!0u8.is_silence());
    }

    #[test]
    fn test_normalized_conversion_clamps() {
        assert_eq!(i16::from_f64_normalized(2.0), i16::MAX);
        assert_eq!(f32::from_f64_normalized(-3.0), -1.0);
        assert!((i16::MAX.to_f64_normalized() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_from_wire_sample() {
        assert_eq!(i16::from_wire_i16(-2), -2);
        assert_eq!(u8::from_wire_i16(0), 128);
        assert_eq!(i32::from_wire_i16(1), 1 << 16);
        assert_eq!(f32::from_wire_i16(i16::MAX), 1.0);
    }
}
