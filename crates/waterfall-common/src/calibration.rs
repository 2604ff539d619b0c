//! Numeric parameters that change rendered pixels.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{SchedulerError, SchedulerResult};

/// Nominal speed of sound in sea water (m/s).
pub const DEFAULT_SOUND_SPEED: f64 = 1500.0;

/// Digest of every parameter that affects pixel output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StateHash(pub u32);

impl fmt::Display for StateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// One sample of a sound-speed profile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProfilePoint {
    pub depth_m: f64,
    pub speed_m_s: f64,
}

/// Propagation-speed profile over depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropagationProfile {
    points: Vec<ProfilePoint>,
}

impl Default for PropagationProfile {
    fn default() -> Self {
        Self::uniform(DEFAULT_SOUND_SPEED)
    }
}

impl PropagationProfile {
    /// Constant speed at all depths.
    pub fn uniform(speed_m_s: f64) -> Self {
        Self {
            points: vec![ProfilePoint {
                depth_m: 0.0,
                speed_m_s,
            }],
        }
    }

    /// Build a profile from measured points, sorted by depth.
    pub fn new(mut points: Vec<ProfilePoint>) -> SchedulerResult<Self> {
        if points.is_empty() {
            return Err(SchedulerError::InvalidCalibration(
                "propagation profile has no points".to_string(),
            ));
        }
        for p in &points {
            if !p.depth_m.is_finite() || !p.speed_m_s.is_finite() || p.speed_m_s <= 0.0 {
                return Err(SchedulerError::InvalidCalibration(format!(
                    "invalid profile point depth={} speed={}",
                    p.depth_m, p.speed_m_s
                )));
            }
        }
        points.sort_by(|a, b| a.depth_m.total_cmp(&b.depth_m));
        Ok(Self { points })
    }

    pub fn points(&self) -> &[ProfilePoint] {
        &self.points
    }

    /// Linearly interpolated speed at `depth_m`, clamped at the ends.
    pub fn speed_at(&self, depth_m: f64) -> f64 {
        let first = self.points[0];
        if depth_m <= first.depth_m || self.points.len() == 1 {
            return first.speed_m_s;
        }
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if depth_m <= b.depth_m {
                let span = b.depth_m - a.depth_m;
                if span <= 0.0 {
                    return b.speed_m_s;
                }
                let t = (depth_m - a.depth_m) / span;
                return a.speed_m_s + t * (b.speed_m_s - a.speed_m_s);
            }
        }
        self.points[self.points.len() - 1].speed_m_s
    }

    /// Harmonic mean speed over the water column down to `depth_m`.
    ///
    /// Travel time is what the sonar measures, so the effective speed over a
    /// column is the harmonic mean of the layer speeds.
    pub fn mean_speed(&self, depth_m: f64) -> f64 {
        const STEPS: usize = 32;
        if depth_m <= 0.0 {
            return self.speed_at(0.0);
        }
        let dz = depth_m / STEPS as f64;
        let slowness: f64 = (0..STEPS)
            .map(|i| 1.0 / self.speed_at((i as f64 + 0.5) * dz))
            .sum();
        STEPS as f64 / slowness
    }
}

/// Snapshot of the processing parameters a render is configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Platform speed over ground (m/s).
    pub platform_velocity: f64,
    pub profile: PropagationProfile,
    /// Bumped whenever the source factory configuration changes.
    pub accessor_generation: u64,
    pub fingerprint: StateHash,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            platform_velocity: 0.0,
            profile: PropagationProfile::default(),
            accessor_generation: 0,
            fingerprint: StateHash::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layered() -> PropagationProfile {
        PropagationProfile::new(vec![
            ProfilePoint {
                depth_m: 100.0,
                speed_m_s: 1480.0,
            },
            ProfilePoint {
                depth_m: 0.0,
                speed_m_s: 1520.0,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_profile_sorted_by_depth() {
        let profile = layered();
        assert_eq!(profile.points()[0].depth_m, 0.0);
        assert_eq!(profile.points()[1].depth_m, 100.0);
    }

    #[test]
    fn test_speed_interpolation() {
        let profile = layered();
        assert_eq!(profile.speed_at(-5.0), 1520.0);
        assert!((profile.speed_at(50.0) - 1500.0).abs() < 1e-9);
        assert_eq!(profile.speed_at(500.0), 1480.0);
    }

    #[test]
    fn test_mean_speed_uniform() {
        let profile = PropagationProfile::uniform(1500.0);
        assert!((profile.mean_speed(80.0) - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_rejects_invalid_points() {
        assert!(PropagationProfile::new(vec![]).is_err());
        let bad = vec![ProfilePoint {
            depth_m: 0.0,
            speed_m_s: f64::NAN,
        }];
        assert!(PropagationProfile::new(bad).is_err());
    }

    #[test]
    fn test_state_hash_display() {
        assert_eq!(StateHash(0xbeef).to_string(), "0000beef");
    }
}
