//! # Terrain Streaming
//!
//! Client-held streaming handles and the background prefetch worker.
//!
//! A handle declares a world position and a chunk radius. Whenever either
//! makes the handle dirty, the next worker pass prefetches the surrounding
//! rectangular region into the store's cache and clears the flag. Handles
//! are shared records: the store's registry keeps weak references, so
//! dropping a handle ends its servicing and the worker prunes the dead
//! entry on its next pass.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::warn;

use crate::biome::BiomeSettings;
use crate::coord::Vec2;
use crate::store::StoreShared;

/// Default prefetch radius for new streaming handles.
pub const DEFAULT_STREAMING_RADIUS: u8 = 8;

/// Handle state shared between the client and the worker.
pub(crate) struct HandleShared {
    position: Mutex<Vec2>,
    radius: AtomicU8,
    dirty: AtomicBool,
}

impl HandleShared {
    pub(crate) fn position(&self) -> Vec2 {
        *self.position.lock()
    }

    pub(crate) fn radius(&self) -> u8 {
        self.radius.load(Ordering::Acquire)
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

/// Client-held declaration of a streaming position and radius.
///
/// Setters mark the handle dirty when they change what the worker should
/// prefetch: any position change, or a radius increase. Shrinking the
/// radius never triggers a load.
pub struct StreamingHandle {
    shared: Arc<HandleShared>,
}

impl StreamingHandle {
    /// Creates a handle at the origin. Handles start dirty so their first
    /// region is prefetched without waiting for a position update.
    pub(crate) fn new(radius: u8) -> Self {
        Self {
            shared: Arc::new(HandleShared {
                position: Mutex::new(Vec2::ZERO),
                radius: AtomicU8::new(radius),
                dirty: AtomicBool::new(true),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<HandleShared> {
        Arc::downgrade(&self.shared)
    }

    /// Returns the declared world position.
    #[must_use]
    pub fn position(&self) -> Vec2 {
        self.shared.position()
    }

    /// Declares a new world position, dirtying the handle iff it changed.
    pub fn set_position(&self, pos: Vec2) {
        let mut current = self.shared.position.lock();
        if *current != pos {
            *current = pos;
            self.shared.dirty.store(true, Ordering::Release);
        }
    }

    /// Returns the declared prefetch radius.
    #[must_use]
    pub fn radius(&self) -> u8 {
        self.shared.radius()
    }

    /// Declares a new prefetch radius, dirtying the handle iff it grew.
    pub fn set_radius(&self, radius: u8) {
        if radius > self.shared.radius.load(Ordering::Acquire) {
            self.shared.dirty.store(true, Ordering::Release);
        }
        self.shared.radius.store(radius, Ordering::Release);
    }

    /// True iff the worker has a pending region load for this handle.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.shared.is_dirty()
    }
}

/// Background worker: scans live handles each pass, services the dirty
/// ones, prunes the dead, then sleeps.
///
/// A pass in progress completes its current region loads even if a stop is
/// requested mid-pass. I/O failures are logged and the handle stays dirty,
/// so the load is retried on the next pass.
pub(crate) fn worker_loop<S: BiomeSettings>(shared: &StoreShared<S>, interval: Duration) {
    while !shared.stop.load(Ordering::Relaxed) {
        let live: Vec<Arc<HandleShared>> = {
            let mut handles = shared.handles.lock();
            handles.retain(|weak| weak.strong_count() > 0);
            handles.iter().filter_map(Weak::upgrade).collect()
        };

        for handle in live {
            if handle.radius() >= 1 && handle.is_dirty() {
                match shared.load_region(handle.position(), handle.radius()) {
                    Ok(()) => handle.clear_dirty(),
                    Err(error) => {
                        warn!(%error, "streaming prefetch failed, retrying next pass");
                    }
                }
            }
        }

        thread::sleep(interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_starts_dirty() {
        let handle = StreamingHandle::new(DEFAULT_STREAMING_RADIUS);
        assert!(handle.is_dirty());
        assert_eq!(handle.radius(), 8);
    }

    #[test]
    fn test_position_dirties_only_on_change() {
        let handle = StreamingHandle::new(4);
        handle.shared.clear_dirty();

        handle.set_position(Vec2::ZERO); // unchanged
        assert!(!handle.is_dirty());

        handle.set_position(Vec2::new(10.0, 5.0));
        assert!(handle.is_dirty());
    }

    #[test]
    fn test_radius_dirties_only_on_growth() {
        let handle = StreamingHandle::new(4);
        handle.shared.clear_dirty();

        handle.set_radius(2);
        assert!(!handle.is_dirty());
        assert_eq!(handle.radius(), 2);

        handle.set_radius(2); // unchanged
        assert!(!handle.is_dirty());

        handle.set_radius(8);
        assert!(handle.is_dirty());
        assert_eq!(handle.radius(), 8);
    }
}
