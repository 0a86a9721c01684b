//! Weibull frame-size sampler.
//!
//! Video frame payloads follow a heavy-tailed Weibull distribution. Six
//! quality presets fix the scale; the shape is the same for all of them.
//!
//! # Determinism
//!
//! Each sampler owns a seeded ChaCha8 RNG, so the sequence of frame sizes is
//! reproducible for a given seed.

use crate::error::ConfigError;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Weibull};
use serde::Serialize;
use statrs::function::gamma::gamma;
use std::fmt;

/// Shape parameter shared by every quality preset.
pub const DEFAULT_SHAPE: f64 = 0.8099;

/// Frames at or above this size are redrawn.
pub const DEFAULT_MAX_FRAME_BYTES: u32 = 1_500_000;

/// Upper bound on redraws before a sample is clamped.
const MAX_REDRAWS: usize = 1000;

/// Named video quality presets, `bv1` through `bv6`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoQuality {
    Bv1,
    Bv2,
    Bv3,
    Bv4,
    Bv5,
    Bv6,
}

impl VideoQuality {
    /// Weibull scale in bytes for this preset.
    pub fn scale(self) -> f64 {
        match self {
            VideoQuality::Bv1 => 6950.0,
            VideoQuality::Bv2 => 13900.0,
            VideoQuality::Bv3 => 20850.0,
            VideoQuality::Bv4 => 27800.0,
            VideoQuality::Bv5 => 34750.0,
            VideoQuality::Bv6 => 54210.0,
        }
    }

    pub fn shape(self) -> f64 {
        DEFAULT_SHAPE
    }
}

impl TryFrom<u8> for VideoQuality {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(VideoQuality::Bv1),
            2 => Ok(VideoQuality::Bv2),
            3 => Ok(VideoQuality::Bv3),
            4 => Ok(VideoQuality::Bv4),
            5 => Ok(VideoQuality::Bv5),
            6 => Ok(VideoQuality::Bv6),
            other => Err(ConfigError::InvalidQuality(other)),
        }
    }
}

impl fmt::Display for VideoQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = match self {
            VideoQuality::Bv1 => 1,
            VideoQuality::Bv2 => 2,
            VideoQuality::Bv3 => 3,
            VideoQuality::Bv4 => 4,
            VideoQuality::Bv5 => 5,
            VideoQuality::Bv6 => 6,
        };
        write!(f, "bv{n}")
    }
}

/// Draws frame sizes in bytes from a Weibull distribution.
pub struct FrameSizeSampler {
    weibull: Weibull<f64>,
    scale: f64,
    shape: f64,
    max_frame_bytes: u32,
    rng: ChaCha8Rng,
}

impl FrameSizeSampler {
    /// Create a sampler with explicit parameters.
    ///
    /// # Errors
    /// `ConfigError::InvalidWeibull` unless both parameters are positive and
    /// finite; `ConfigError::Zero` if `max_frame_bytes` is zero.
    pub fn new(scale: f64, shape: f64, max_frame_bytes: u32, seed: u64) -> Result<Self, ConfigError> {
        let valid = |v: f64| v.is_finite() && v > 0.0;
        if !valid(scale) || !valid(shape) {
            return Err(ConfigError::InvalidWeibull { scale, shape });
        }
        if max_frame_bytes == 0 {
            return Err(ConfigError::Zero("maximum frame size"));
        }
        let weibull = Weibull::new(scale, shape).map_err(|_| ConfigError::InvalidWeibull { scale, shape })?;

        Ok(Self {
            weibull,
            scale,
            shape,
            max_frame_bytes,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Create a sampler for a quality preset.
    pub fn for_quality(quality: VideoQuality, seed: u64) -> Result<Self, ConfigError> {
        Self::new(quality.scale(), quality.shape(), DEFAULT_MAX_FRAME_BYTES, seed)
    }

    /// Draw one frame size.
    ///
    /// Small draws, including zero, are returned as-is.
    pub fn sample(&mut self) -> u32 {
        for _ in 0..MAX_REDRAWS {
            let value = self.weibull.sample(&mut self.rng).floor();
            if value < f64::from(self.max_frame_bytes) {
                return value as u32;
            }
        }
        self.max_frame_bytes - 1
    }

    /// Closed-form mean, `scale * Γ(1 + 1/shape)`.
    pub fn mean(&self) -> f64 {
        self.scale * gamma(1.0 + 1.0 / self.shape)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn shape(&self) -> f64 {
        self.shape
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_form_mean() {
        // Shape 1 is exponential: the mean equals the scale
        let sampler = FrameSizeSampler::new(1000.0, 1.0, 1_500_000, 1).unwrap();
        assert!((sampler.mean() - 1000.0).abs() < 1e-9);

        // Shape 0.5: Γ(3) = 2
        let sampler = FrameSizeSampler::new(1000.0, 0.5, 1_500_000, 1).unwrap();
        assert!((sampler.mean() - 2000.0).abs() < 1e-6);
    }

    #[test]
    fn test_preset_scales() {
        let scales: Vec<f64> = (1..=6)
            .map(|q| VideoQuality::try_from(q).unwrap().scale())
            .collect();
        assert_eq!(scales, vec![6950.0, 13900.0, 20850.0, 27800.0, 34750.0, 54210.0]);
    }

    #[test]
    fn test_invalid_preset() {
        assert_eq!(VideoQuality::try_from(0), Err(ConfigError::InvalidQuality(0)));
        assert_eq!(VideoQuality::try_from(7), Err(ConfigError::InvalidQuality(7)));
    }

    #[test]
    fn test_shape_is_fixed() {
        assert!((1..=6).all(|q| VideoQuality::try_from(q).unwrap().shape() == DEFAULT_SHAPE));
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(FrameSizeSampler::new(0.0, 0.8, 100, 1).is_err());
        assert!(FrameSizeSampler::new(100.0, -1.0, 100, 1).is_err());
        assert!(FrameSizeSampler::new(f64::NAN, 0.8, 100, 1).is_err());
        assert!(FrameSizeSampler::new(100.0, 0.8, 0, 1).is_err());
    }

    #[test]
    fn test_empirical_mean_converges() {
        let mut sampler = FrameSizeSampler::for_quality(VideoQuality::Bv1, 7).unwrap();
        let n = 20_000;

        let total: u64 = (0..n).map(|_| u64::from(sampler.sample())).sum();
        let empirical = total as f64 / n as f64;
        let expected = sampler.mean();

        // Expected mean for bv1 is about 7.8 kB; allow 5%
        assert!(expected > 7500.0 && expected < 8100.0, "closed form {expected}");
        assert!(
            (empirical - expected).abs() / expected < 0.05,
            "empirical {empirical} vs closed form {expected}"
        );
    }

    #[test]
    fn test_samples_respect_cap() {
        let mut sampler = FrameSizeSampler::new(50_000.0, 0.5, 20_000, 3).unwrap();
        assert!((0..5000).all(|_| sampler.sample() < 20_000));
    }

    #[test]
    fn test_determinism() {
        let mut a = FrameSizeSampler::for_quality(VideoQuality::Bv3, 99).unwrap();
        let mut b = FrameSizeSampler::for_quality(VideoQuality::Bv3, 99).unwrap();

        let xs: Vec<_> = (0..100).map(|_| a.sample()).collect();
        let ys: Vec<_> = (0..100).map(|_| b.sample()).collect();
        assert_eq!(xs, ys);
    }
}
