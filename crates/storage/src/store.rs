//! Cache capability consumed by the scheduler.

use bytes::Bytes;

/// Key/value tile storage with separately addressable metadata.
///
/// Keys are opaque byte strings. Implementations must be safe to call from
/// any worker thread; the scheduler adds no locking around them.
pub trait TileStore: Send + Sync {
    /// Metadata of an entry without transferring its payload.
    fn header(&self, key: &[u8]) -> Option<Bytes>;

    /// Metadata and payload of an entry.
    fn fetch(&self, key: &[u8]) -> Option<(Bytes, Bytes)>;

    /// Insert or replace an entry. Best effort; may drop the write.
    fn store(&self, key: &[u8], header: Bytes, payload: Bytes);
}
