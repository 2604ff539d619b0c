//! Generator slots.
//!
//! A slot is one unit of render concurrency. Its status is an atomic so any
//! thread can sample it; only the dispatcher changes it. The slot's
//! workspace (renderer plus opened accessors) is moved out into the job while
//! a render runs and comes back with the completion.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tracing::debug;

use waterfall_common::{
    AmplitudeAccessor, CancelFlag, DepthAccessor, RenderAccessors, Renderer, SchedulerResult,
    SourceFactory, SourceId, TileRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum SlotStatus {
    Idle = 0,
    Busy = 1,
    Retireable = 2,
}

impl SlotStatus {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SlotStatus::Busy,
            2 => SlotStatus::Retireable,
            _ => SlotStatus::Idle,
        }
    }
}

/// Renderer and accessors owned by one slot.
pub struct SlotWorkspace {
    pub(crate) renderer: Box<dyn Renderer>,
    accessors: HashMap<SourceId, Arc<dyn AmplitudeAccessor>>,
    depth: Option<Arc<dyn DepthAccessor>>,
}

impl SlotWorkspace {
    pub fn new(renderer: Box<dyn Renderer>) -> Self {
        Self {
            renderer,
            accessors: HashMap::new(),
            depth: None,
        }
    }

    /// Accessors for `request`, opening and caching them on first use.
    /// Depth is only resolved for ground-range tiles.
    pub fn resolve(
        &mut self,
        sources: &dyn SourceFactory,
        request: &TileRequest,
    ) -> SchedulerResult<RenderAccessors> {
        let amplitude = match self.accessors.get(&request.source) {
            Some(acc) => Arc::clone(acc),
            None => {
                let acc = sources.amplitude_accessor(request.source)?;
                debug!(source = %request.source, "Opened amplitude accessor");
                self.accessors.insert(request.source, Arc::clone(&acc));
                acc
            }
        };

        let depth = if request.flags.ground_range() {
            match &self.depth {
                Some(d) => Some(Arc::clone(d)),
                None => {
                    let d = sources.depth_accessor()?;
                    self.depth = Some(Arc::clone(&d));
                    Some(d)
                }
            }
        } else {
            None
        };

        Ok(RenderAccessors { amplitude, depth })
    }

    /// Drop every cached accessor.
    pub fn clear_accessors(&mut self) {
        self.accessors.clear();
        self.depth = None;
    }

    pub fn cached_sources(&self) -> usize {
        self.accessors.len()
    }
}

pub struct GeneratorSlot {
    index: usize,
    status: AtomicU8,
    cancel: CancelFlag,
    workspace: Mutex<Option<SlotWorkspace>>,
}

impl GeneratorSlot {
    pub fn new(index: usize, renderer: Box<dyn Renderer>) -> Self {
        Self {
            index,
            status: AtomicU8::new(SlotStatus::Idle as u8),
            cancel: CancelFlag::new(),
            workspace: Mutex::new(Some(SlotWorkspace::new(renderer))),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn status(&self) -> SlotStatus {
        SlotStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Idle -> Busy. On success the workspace and a re-armed cancel flag
    /// are handed to the caller.
    pub fn try_claim(&self) -> Option<(SlotWorkspace, CancelFlag)> {
        let mut workspace = self.workspace.lock();
        if workspace.is_none() {
            return None;
        }
        self.status
            .compare_exchange(
                SlotStatus::Idle as u8,
                SlotStatus::Busy as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()?;
        self.cancel.reset();
        let ws = workspace.take()?;
        Some((ws, self.cancel.clone()))
    }

    /// Busy -> Retireable, taking the workspace back.
    pub fn finish(&self, workspace: SlotWorkspace) {
        *self.workspace.lock() = Some(workspace);
        self.status
            .store(SlotStatus::Retireable as u8, Ordering::Release);
    }

    /// Retireable -> Idle.
    pub fn reclaim(&self) -> bool {
        self.status
            .compare_exchange(
                SlotStatus::Retireable as u8,
                SlotStatus::Idle as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn request_cancel(&self) {
        self.cancel.request();
    }

    /// Drop cached accessors. Only effective while the workspace is home.
    pub fn clear_accessors(&self) -> bool {
        match self.workspace.lock().as_mut() {
            Some(ws) => {
                ws.clear_accessors();
                true
            }
            None => false,
        }
    }

    pub fn cached_sources(&self) -> usize {
        self.workspace
            .lock()
            .as_ref()
            .map_or(0, |ws| ws.cached_sources())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::{ground_tile, tile, CountingSourceFactory, RenderScript};

    fn slot() -> GeneratorSlot {
        GeneratorSlot::new(0, Box::new(RenderScript::new().renderer(0)))
    }

    #[test]
    fn test_claim_finish_reclaim() {
        let slot = slot();
        assert_eq!(slot.status(), SlotStatus::Idle);

        let (ws, _cancel) = slot.try_claim().unwrap();
        assert_eq!(slot.status(), SlotStatus::Busy);
        assert!(slot.try_claim().is_none());
        assert!(!slot.reclaim());

        slot.finish(ws);
        assert_eq!(slot.status(), SlotStatus::Retireable);
        assert!(slot.reclaim());
        assert_eq!(slot.status(), SlotStatus::Idle);
    }

    #[test]
    fn test_claim_rearms_cancel() {
        let slot = slot();
        slot.request_cancel();
        let (ws, cancel) = slot.try_claim().unwrap();
        assert!(!cancel.is_cancelled());
        assert_eq!(cancel.request_count(), 1);
        slot.finish(ws);
    }

    #[test]
    fn test_accessors_cached_per_source() {
        let sources = CountingSourceFactory::new();
        let mut ws = SlotWorkspace::new(Box::new(RenderScript::new().renderer(0)));

        let acc = ws.resolve(sources.as_ref(), &tile(0)).unwrap();
        assert!(acc.depth.is_none());
        ws.resolve(sources.as_ref(), &tile(8)).unwrap();
        assert_eq!(sources.amplitude_opens(SourceId(0)), 1);

        let acc = ws
            .resolve(sources.as_ref(), &ground_tile(0, SourceId(1)))
            .unwrap();
        assert!(acc.depth.is_some());
        assert_eq!(sources.amplitude_opens(SourceId(1)), 1);
        assert_eq!(sources.depth_opens(), 1);
        assert_eq!(ws.cached_sources(), 2);

        ws.clear_accessors();
        ws.resolve(sources.as_ref(), &tile(0)).unwrap();
        assert_eq!(sources.amplitude_opens(SourceId(0)), 2);
    }

    #[test]
    fn test_clear_only_when_home() {
        let slot = slot();
        let (ws, _) = slot.try_claim().unwrap();
        assert!(!slot.clear_accessors());
        slot.finish(ws);
        assert!(slot.clear_accessors());
    }
}
