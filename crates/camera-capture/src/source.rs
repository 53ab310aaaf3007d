//! Frame sources

use crate::frame::{decode_image, VideoFrame};
use crate::CameraError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Extensions accepted by the image-sequence source
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Frame-read contract consumed by the pipeline
///
/// `read` blocks until a frame is available or fails. Failures are expected to
/// be transient from the caller's point of view; the pipeline decides when
/// enough of them make the run fatal.
pub trait FrameSource: Send {
    /// Read the next frame
    fn read(&mut self) -> Result<VideoFrame, CameraError>;

    /// Whether the source is still open
    fn is_opened(&self) -> bool;

    /// Release the underlying device or files; further reads fail
    fn release(&mut self);

    /// Total number of frames, when the source knows it up front
    fn frame_count_hint(&self) -> Option<usize> {
        None
    }
}

/// Source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Image file or directory of images
    pub path: String,
    /// Restart from the first image after the last one
    pub looping: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            path: "./frames".to_string(),
            looping: true,
        }
    }
}

/// Open the source described by `config`
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    let source = ImageSequenceSource::open(&config.path, config.looping)?;
    Ok(Box::new(source))
}

/// Reads frames from an image file or a sorted directory of image files
pub struct ImageSequenceSource {
    files: Vec<PathBuf>,
    position: usize,
    looping: bool,
    opened: bool,
    sequence: u32,
}

impl ImageSequenceSource {
    /// Open a single image or every image inside a directory (sorted by name)
    pub fn open(path: impl AsRef<Path>, looping: bool) -> Result<Self, CameraError> {
        let path = path.as_ref();
        let files = if path.is_dir() {
            let entries = std::fs::read_dir(path)
                .map_err(|e| CameraError::Open(format!("{}: {}", path.display(), e)))?;
            let mut files: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| is_image_file(p))
                .collect();
            files.sort();
            files
        } else if path.is_file() && is_image_file(path) {
            vec![path.to_path_buf()]
        } else {
            return Err(CameraError::Open(format!(
                "{} is neither an image nor a directory",
                path.display()
            )));
        };

        if files.is_empty() {
            return Err(CameraError::Open(format!("no images found in {}", path.display())));
        }

        info!("Opened image sequence {} ({} frames)", path.display(), files.len());
        Ok(Self {
            files,
            position: 0,
            looping,
            opened: true,
            sequence: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn read(&mut self) -> Result<VideoFrame, CameraError> {
        if !self.opened {
            return Err(CameraError::NotInitialized);
        }
        if self.position >= self.files.len() {
            if !self.looping {
                return Err(CameraError::EndOfStream);
            }
            self.position = 0;
        }

        let path = &self.files[self.position];
        self.position += 1;

        let bytes = std::fs::read(path).map_err(|e| CameraError::Read(format!("{}: {}", path.display(), e)))?;
        let mut frame = decode_image(&bytes)?;
        frame.sequence = self.sequence;
        frame.timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.sequence = self.sequence.wrapping_add(1);

        debug!("Read frame {} from {}", frame.sequence, path.display());
        Ok(frame)
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn release(&mut self) {
        if self.opened {
            debug!("Releasing image sequence source");
        }
        self.opened = false;
    }

    fn frame_count_hint(&self) -> Option<usize> {
        if self.looping {
            None
        } else {
            Some(self.files.len())
        }
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
