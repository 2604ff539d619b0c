//! Content-addressed tile cache keys and the adapter used by render workers.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use waterfall_common::{StateHash, TileDescriptor, TileRequest};

use crate::TileStore;

/// Cache key for a rendered tile.
///
/// Covers every request field that affects pixels plus the processing-state
/// fingerprint. Floats are encoded by bit pattern so distinct values never
/// collapse onto one key.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheKey {
    pub request: TileRequest,
    pub fingerprint: StateHash,
}

impl CacheKey {
    pub fn new(request: &TileRequest, fingerprint: StateHash) -> Self {
        Self {
            request: *request,
            fingerprint,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let r = &self.request;
        write!(
            f,
            "wf:{}:{}:{:016x}:{:016x}:u{}:f{}:{}",
            r.source,
            r.bounds.cache_key(),
            r.scale.to_bits(),
            r.density.to_bits(),
            r.upsample,
            r.flags.bits(),
            self.fingerprint
        )
    }
}

/// Metadata stored in the header half of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CachedDescriptor {
    pub descriptor: TileDescriptor,
    pub fingerprint: StateHash,
    pub byte_len: usize,
}

/// Wraps an optional [`TileStore`] with key derivation.
///
/// Without a store every operation is a silent no-op, so rendering works the
/// same whether or not caching is configured.
#[derive(Clone, Default)]
pub struct TileCacheAdapter {
    store: Option<Arc<dyn TileStore>>,
}

impl TileCacheAdapter {
    pub fn new(store: Option<Arc<dyn TileStore>>) -> Self {
        Self { store }
    }

    /// Adapter with no backing store.
    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    /// Derive the storage key for a request under a fingerprint.
    pub fn key(request: &TileRequest, fingerprint: StateHash) -> Vec<u8> {
        CacheKey::new(request, fingerprint).to_bytes()
    }

    /// Look up only the header of a cached tile.
    pub fn check(&self, request: &TileRequest, fingerprint: StateHash) -> Option<CachedDescriptor> {
        let store = self.store.as_ref()?;
        let header = store.header(&Self::key(request, fingerprint))?;
        decode_header(&header)
    }

    /// Fetch a cached tile.
    pub fn get(
        &self,
        request: &TileRequest,
        fingerprint: StateHash,
    ) -> Option<(CachedDescriptor, Bytes)> {
        let store = self.store.as_ref()?;
        let (header, payload) = store.fetch(&Self::key(request, fingerprint))?;
        let descriptor = decode_header(&header)?;
        if descriptor.byte_len != payload.len() {
            debug!(
                expected = descriptor.byte_len,
                actual = payload.len(),
                "Cached payload length mismatch, treating as miss"
            );
            return None;
        }
        Some((descriptor, payload))
    }

    /// Write a rendered tile through to the store.
    pub fn put(
        &self,
        request: &TileRequest,
        fingerprint: StateHash,
        descriptor: TileDescriptor,
        payload: Bytes,
    ) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        let header = CachedDescriptor {
            descriptor,
            fingerprint,
            byte_len: payload.len(),
        };
        match serde_json::to_vec(&header) {
            Ok(header) => store.store(&Self::key(request, fingerprint), Bytes::from(header), payload),
            Err(e) => debug!(error = %e, "Failed to encode cache header"),
        }
    }
}

fn decode_header(header: &[u8]) -> Option<CachedDescriptor> {
    match serde_json::from_slice(header) {
        Ok(descriptor) => Some(descriptor),
        Err(e) => {
            debug!(error = %e, "Undecodable cache header, treating as miss");
            None
        }
    }
}
