//! Desired and current processing state.
//!
//! Setters only ever touch the desired copy. The dispatcher promotes it to
//! current once every slot has drained, replacing the shared
//! `Arc<Calibration>` wholesale so a render holds one consistent snapshot.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;

use waterfall_common::{
    Calibration, PropagationProfile, SchedulerError, SchedulerResult, SourceFactory, StateHash,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
struct DesiredParams {
    platform_velocity: f64,
    profile: PropagationProfile,
    accessor_generation: u64,
}

struct Inner {
    desired: DesiredParams,
    desired_fingerprint: StateHash,
    changed: bool,
    current: Arc<Calibration>,
}

/// Result of promoting desired state to current.
pub(crate) struct AppliedState {
    pub calibration: Arc<Calibration>,
    /// The source factory changed since the last promotion.
    pub accessors_changed: bool,
}

/// Versioned calibration shared by the scheduler's threads.
pub struct ProcessingState {
    inner: Mutex<Inner>,
    sources: Arc<dyn SourceFactory>,
}

impl ProcessingState {
    pub fn new(sources: Arc<dyn SourceFactory>) -> Self {
        let desired = DesiredParams {
            platform_velocity: 0.0,
            profile: PropagationProfile::default(),
            accessor_generation: 0,
        };
        let fingerprint = fingerprint(&desired, &sources.token());
        let current = Arc::new(calibration(&desired, fingerprint));
        Self {
            inner: Mutex::new(Inner {
                desired,
                desired_fingerprint: fingerprint,
                changed: false,
                current,
            }),
            sources,
        }
    }

    /// Returns the new desired fingerprint, or `None` if nothing changed.
    pub fn set_platform_velocity(&self, velocity: f64) -> SchedulerResult<Option<StateHash>> {
        check_velocity(velocity)?;
        Ok(self.update(|d| d.platform_velocity = velocity))
    }

    pub fn set_propagation_profile(
        &self,
        profile: PropagationProfile,
    ) -> SchedulerResult<Option<StateHash>> {
        check_profile(&profile)?;
        Ok(self.update(|d| d.profile = profile))
    }

    /// Set velocity and profile in one update.
    pub fn set_calibration(
        &self,
        velocity: f64,
        profile: PropagationProfile,
    ) -> SchedulerResult<Option<StateHash>> {
        check_velocity(velocity)?;
        check_profile(&profile)?;
        Ok(self.update(|d| {
            d.platform_velocity = velocity;
            d.profile = profile;
        }))
    }

    /// Record that the source factory's configuration changed. Always
    /// produces a new desired state.
    pub fn notify_accessor_factory_changed(&self) -> StateHash {
        let mut inner = self.inner.lock();
        inner.desired.accessor_generation += 1;
        self.refresh(&mut inner)
    }

    pub fn is_changed(&self) -> bool {
        self.inner.lock().changed
    }

    pub fn desired_fingerprint(&self) -> StateHash {
        self.inner.lock().desired_fingerprint
    }

    pub fn current_fingerprint(&self) -> StateHash {
        self.inner.lock().current.fingerprint
    }

    /// Snapshot renders are configured with.
    pub fn current(&self) -> Arc<Calibration> {
        Arc::clone(&self.inner.lock().current)
    }

    /// Promote desired to current. Only called with every slot drained.
    pub(crate) fn apply(&self) -> AppliedState {
        let mut inner = self.inner.lock();
        let accessors_changed =
            inner.desired.accessor_generation != inner.current.accessor_generation;
        let next = Arc::new(calibration(&inner.desired, inner.desired_fingerprint));
        inner.current = Arc::clone(&next);
        inner.changed = false;
        AppliedState {
            calibration: next,
            accessors_changed,
        }
    }

    fn update(&self, f: impl FnOnce(&mut DesiredParams)) -> Option<StateHash> {
        let mut inner = self.inner.lock();
        let mut next = inner.desired.clone();
        f(&mut next);
        if next == inner.desired {
            return None;
        }
        inner.desired = next;
        Some(self.refresh(&mut inner))
    }

    fn refresh(&self, inner: &mut Inner) -> StateHash {
        inner.desired_fingerprint = fingerprint(&inner.desired, &self.sources.token());
        inner.changed = true;
        inner.desired_fingerprint
    }
}

/// CRC-32 over the serialized parameters and the factory token.
fn fingerprint(params: &DesiredParams, token: &str) -> StateHash {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&serde_json::to_vec(params).unwrap_or_default());
    hasher.update(token.as_bytes());
    StateHash(hasher.finalize())
}

fn calibration(params: &DesiredParams, fingerprint: StateHash) -> Calibration {
    Calibration {
        platform_velocity: params.platform_velocity,
        profile: params.profile.clone(),
        accessor_generation: params.accessor_generation,
        fingerprint,
    }
}

fn check_velocity(velocity: f64) -> SchedulerResult<()> {
    if !velocity.is_finite() {
        return Err(SchedulerError::InvalidCalibration(format!(
            "platform velocity {velocity} is not finite"
        )));
    }
    Ok(())
}

fn check_profile(profile: &PropagationProfile) -> SchedulerResult<()> {
    // Re-run the constructor checks; deserialized profiles bypass them
    PropagationProfile::new(profile.points().to_vec()).map(|_| ())
}
