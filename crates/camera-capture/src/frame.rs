//! Video frame types and processing

use crate::CameraError;
use image::imageops::{self, FilterType};
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};

/// Width of the blank frame returned for degenerate input
pub const DEFAULT_WIDTH: u32 = 640;
/// Height of the blank frame returned for degenerate input
pub const DEFAULT_HEIGHT: u32 = 480;

/// Decoded RGB video frame
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// All-black frame of the given size
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; (width * height * 3) as usize], width, height, 0, 0)
    }

    /// Solid-color frame, mostly useful for synthetic sources
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, 0)
    }

    /// Wrap an `RgbImage`
    pub fn from_image(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, 0, 0)
    }

    /// True when the frame carries no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// True when the buffer length matches width * height * 3
    pub fn is_consistent(&self) -> bool {
        self.data.len() == (self.width as usize) * (self.height as usize) * 3
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data.get(idx..idx + 3).map(|p| [p[0], p[1], p[2]])
    }

    /// Copy into an `RgbImage`
    pub fn to_image(&self) -> Result<RgbImage, CameraError> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            CameraError::Format(format!(
                "buffer of {} bytes does not hold a {}x{} RGB frame",
                self.data.len(),
                self.width,
                self.height
            ))
        })
    }

    /// Resize frame to exactly `new_width` x `new_height` (bilinear)
    pub fn resize(&self, new_width: u32, new_height: u32) -> Result<VideoFrame, CameraError> {
        if new_width == 0 || new_height == 0 {
            return Err(CameraError::Format(format!(
                "cannot resize to {}x{}",
                new_width, new_height
            )));
        }
        if self.width == new_width && self.height == new_height {
            return Ok(self.clone());
        }

        let resized = imageops::resize(&self.to_image()?, new_width, new_height, FilterType::Triangle);
        Ok(VideoFrame {
            data: resized.into_raw(),
            width: new_width,
            height: new_height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }

    /// Aspect-preserving resize into a black `target_width` x `target_height` canvas
    pub fn letterbox(&self, target_width: u32, target_height: u32) -> Result<VideoFrame, CameraError> {
        if self.is_empty() {
            return Err(CameraError::Format("cannot letterbox an empty frame".to_string()));
        }

        let aspect = self.width as f64 / self.height as f64;
        let target_aspect = target_width as f64 / target_height as f64;
        let (new_width, new_height) = if aspect > target_aspect {
            (target_width, ((target_width as f64 / aspect) as u32).max(1))
        } else {
            (((target_height as f64 * aspect) as u32).max(1), target_height)
        };

        let resized = self.resize(new_width, new_height)?.to_image()?;
        let mut canvas = RgbImage::from_pixel(target_width, target_height, Rgb([0, 0, 0]));
        let left = (target_width - new_width) / 2;
        let top = (target_height - new_height) / 2;
        imageops::replace(&mut canvas, &resized, left as i64, top as i64);

        Ok(VideoFrame {
            data: canvas.into_raw(),
            width: target_width,
            height: target_height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }

    /// Compress to JPEG at the given quality (1-100)
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        let image = self.to_image()?;
        let mut buffer = Vec::with_capacity(self.data.len() / 8);
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&image)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(buffer)
    }
}

/// Decode a compressed image (JPEG, PNG) into an RGB frame
pub fn decode_image(bytes: &[u8]) -> Result<VideoFrame, CameraError> {
    let image = image::load_from_memory(bytes).map_err(|e| CameraError::Decode(e.to_string()))?;
    Ok(VideoFrame::from_image(image.to_rgb8()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_frame() {
        let frame = VideoFrame::blank(4, 2);
        assert_eq!(frame.data.len(), 24);
        assert!(frame.is_consistent());
        assert!(!frame.is_empty());
        assert_eq!(frame.get_pixel(3, 1), Some([0, 0, 0]));
        assert_eq!(frame.get_pixel(4, 1), None);
    }

    #[test]
    fn test_empty_frame() {
        let frame = VideoFrame::new(Vec::new(), 0, 0, 0, 0);
        assert!(frame.is_empty());
    }

    #[test]
    fn test_resize_keeps_metadata() {
        let mut frame = VideoFrame::filled(64, 48, [10, 20, 30]);
        frame.sequence = 7;

        let resized = frame.resize(32, 24).unwrap();
        assert_eq!((resized.width, resized.height), (32, 24));
        assert_eq!(resized.sequence, 7);
        assert_eq!(resized.get_pixel(5, 5), Some([10, 20, 30]));
    }

    #[test]
    fn test_resize_rejects_zero() {
        let frame = VideoFrame::blank(8, 8);
        assert!(frame.resize(0, 8).is_err());
    }

    #[test]
    fn test_letterbox_pads_with_black() {
        // 2:1 source into 4:3 canvas: bars top and bottom
        let frame = VideoFrame::filled(200, 100, [255, 255, 255]);
        let boxed = frame.letterbox(640, 480).unwrap();

        assert_eq!((boxed.width, boxed.height), (640, 480));
        assert_eq!(boxed.get_pixel(320, 0), Some([0, 0, 0]));
        assert_eq!(boxed.get_pixel(320, 240), Some([255, 255, 255]));
    }

    #[test]
    fn test_jpeg_roundtrip_dimensions() {
        let frame = VideoFrame::filled(32, 16, [200, 100, 50]);
        let jpeg = frame.encode_jpeg(90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);

        let decoded = decode_image(&jpeg).unwrap();
        assert_eq!((decoded.width, decoded.height), (32, 16));
    }

    #[test]
    fn test_encode_inconsistent_frame_fails() {
        let frame = VideoFrame::new(vec![0; 5], 4, 4, 0, 0);
        assert!(matches!(frame.encode_jpeg(90), Err(CameraError::Format(_))));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(decode_image(b"not an image"), Err(CameraError::Decode(_))));
    }
}
