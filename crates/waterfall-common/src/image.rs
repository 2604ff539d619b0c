//! Rendered tile images.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::TileRequest;

/// Single-channel float image, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl ImageBuffer {
    /// Zero-filled image.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn from_data(width: u32, height: u32, data: Vec<f32>) -> Option<Self> {
        if data.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    /// Size of the encoded pixel payload in bytes.
    pub fn byte_len(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    pub fn row(&self, y: u32) -> &[f32] {
        let w = self.width as usize;
        let start = y as usize * w;
        &self.data[start..start + w]
    }

    /// Encode pixels as little-endian f32.
    pub fn to_bytes(&self) -> Bytes {
        let mut out = Vec::with_capacity(self.byte_len());
        for v in &self.data {
            out.extend_from_slice(&v.to_le_bytes());
        }
        Bytes::from(out)
    }

    /// Decode a payload written by [`ImageBuffer::to_bytes`].
    pub fn from_bytes(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.len() % 4 != 0 {
            return None;
        }
        let data = bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        Self::from_data(width, height, data)
    }
}

/// Metadata describing a rendered tile.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    pub request: TileRequest,
    pub width: u32,
    pub height: u32,
}

impl TileDescriptor {
    pub fn for_image(request: TileRequest, image: &ImageBuffer) -> Self {
        Self {
            request,
            width: image.width,
            height: image.height,
        }
    }
}

/// Output of a successful render.
#[derive(Debug, Clone)]
pub struct RenderedTile {
    pub descriptor: TileDescriptor,
    pub image: Arc<ImageBuffer>,
}

impl RenderedTile {
    pub fn new(request: TileRequest, image: ImageBuffer) -> Self {
        Self {
            descriptor: TileDescriptor::for_image(request, &image),
            image: Arc::new(image),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_roundtrip() {
        let image = ImageBuffer::from_data(2, 2, vec![0.0, 1.5, -2.25, 1e-3]).unwrap();
        let bytes = image.to_bytes();
        assert_eq!(bytes.len(), image.byte_len());
        assert_eq!(ImageBuffer::from_bytes(2, 2, &bytes), Some(image));
    }

    #[test]
    fn test_from_data_rejects_wrong_length() {
        assert!(ImageBuffer::from_data(3, 3, vec![0.0; 8]).is_none());
        assert!(ImageBuffer::from_bytes(1, 1, &[0, 0, 0]).is_none());
    }
}
