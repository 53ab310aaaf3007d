//! Frame Capture Library
//!
//! Provides the frame-read contract the detection pipeline depends on:
//! - RGB video frames with resize, letterbox, and JPEG encode/decode
//! - The `FrameSource` trait (read / release)
//! - An image-sequence source backed by files on disk
//! - Scripted sources for tests (`testing`)

pub mod frame;
pub mod source;
pub mod testing;

pub use frame::{decode_image, VideoFrame, DEFAULT_HEIGHT, DEFAULT_WIDTH};
pub use source::{open_source, FrameSource, ImageSequenceSource, SourceConfig};

use thiserror::Error;

/// Capture error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Frame read failed: {0}")]
    Read(String),

    #[error("End of stream")]
    EndOfStream,

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Image encode failed: {0}")]
    Encode(String),

    #[error("Source not initialized")]
    NotInitialized,
}
