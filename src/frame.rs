//! Decoded frame buffers handed to the detectors.
//!
//! A [`Frame`] is a packed, row-major `height × width × 3` byte array with
//! channels in **BGR** order, which is what OpenCV's decoders produce. The
//! frame source is responsible for converting into this layout.

use crate::common::{Result, SceneDetectError};

/// Number of interleaved channels per pixel.
pub const CHANNELS: usize = 3;

/// A single decoded BGR video frame
#[derive(Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wrap a packed BGR buffer.
    ///
    /// # Errors
    /// * `InvalidConfig` - zero width/height, or `data` is not exactly
    ///   `width * height * 3` bytes long
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SceneDetectError::config_error(format!(
                "Frame dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(SceneDetectError::config_error(format!(
                "Frame buffer holds {} bytes, expected {} for {}x{} BGR",
                data.len(),
                expected,
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame where every pixel has the same BGR value.
    ///
    /// # Panics
    /// Panics if either dimension is zero.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        assert!(width > 0 && height > 0, "Frame dimensions must be non-zero");
        let data = bgr
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * CHANNELS)
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Build a frame pixel by pixel; `pixel(x, y)` returns the BGR value.
    ///
    /// # Panics
    /// Panics if either dimension is zero.
    pub fn from_fn(width: u32, height: u32, mut pixel: impl FnMut(u32, u32) -> [u8; 3]) -> Self {
        assert!(width > 0 && height > 0, "Frame dimensions must be non-zero");
        let mut data = Vec::with_capacity(width as usize * height as usize * CHANNELS);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&pixel(x, y));
            }
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Raw packed BGR bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Total number of channel samples (`width * height * 3`)
    pub fn sample_count(&self) -> usize {
        self.data.len()
    }

    /// Bytes of one row of pixels.
    pub fn row_len(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// Iterate over `[b, g, r]` pixel triples in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = &[u8]> {
        self.data.chunks_exact(CHANNELS)
    }
}

impl AsRef<Frame> for Frame {
    fn as_ref(&self) -> &Frame {
        self
    }
}

// Keep the pixel buffer out of debug output
impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_new_validates_length() {
        assert!(Frame::new(2, 2, vec![0; 12]).is_ok());
        assert!(matches!(
            Frame::new(2, 2, vec![0; 11]),
            Err(SceneDetectError::InvalidConfig { .. })
        ));
        assert!(Frame::new(0, 2, vec![]).is_err());
    }

    #[test]
    fn test_frame_filled() {
        let frame = Frame::filled(3, 2, [1, 2, 3]);
        assert_eq!(frame.dimensions(), (3, 2));
        assert_eq!(frame.sample_count(), 18);
        assert_eq!(frame.pixel_count(), 6);
        assert!(frame.pixels().all(|p| p == [1, 2, 3]));
    }

    #[test]
    fn test_frame_from_fn_layout() {
        let frame = Frame::from_fn(2, 2, |x, y| [x as u8, y as u8, 9]);
        assert_eq!(frame.row_len(), 6);
        assert_eq!(frame.data(), &[0, 0, 9, 1, 0, 9, 0, 1, 9, 1, 1, 9]);
    }

    #[test]
    fn test_frame_debug_omits_pixels() {
        let frame = Frame::filled(4, 4, [7, 7, 7]);
        let debug_str = format!("{:?}", frame);
        assert!(debug_str.contains("Frame"));
        assert!(debug_str.contains("bytes: 48"));
    }
}
