//! Scripted frame sources for tests and demos

use crate::frame::VideoFrame;
use crate::source::FrameSource;
use crate::CameraError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// One scripted read outcome
#[derive(Debug, Clone)]
pub enum Step {
    Frame(VideoFrame),
    Fail(String),
}

/// What the source does once its script is exhausted
#[derive(Debug, Clone)]
pub enum Exhausted {
    /// Report end of stream on every further read
    EndOfStream,
    /// Repeat the given frame forever
    Repeat(VideoFrame),
    /// Fail every further read
    Fail,
}

/// Observable handles into a scripted source
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    released: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

/// Frame source that replays a fixed script
pub struct ScriptedSource {
    steps: VecDeque<Step>,
    exhausted: Exhausted,
    opened: bool,
    sequence: u32,
    probe: SourceProbe,
}

impl ScriptedSource {
    pub fn new(steps: impl IntoIterator<Item = Step>, exhausted: Exhausted) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            exhausted,
            opened: true,
            sequence: 0,
            probe: SourceProbe::default(),
        }
    }

    /// Yield the given frames in order, then end of stream
    pub fn frames(frames: impl IntoIterator<Item = VideoFrame>) -> Self {
        Self::new(frames.into_iter().map(Step::Frame), Exhausted::EndOfStream)
    }

    /// Yield the same frame forever
    pub fn repeating(frame: VideoFrame) -> Self {
        Self::new(Vec::new(), Exhausted::Repeat(frame))
    }

    /// Fail every read
    pub fn failing() -> Self {
        Self::new(Vec::new(), Exhausted::Fail)
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

impl FrameSource for ScriptedSource {
    fn read(&mut self) -> Result<VideoFrame, CameraError> {
        self.probe.reads.fetch_add(1, Ordering::SeqCst);
        if !self.opened {
            return Err(CameraError::NotInitialized);
        }

        let step = match self.steps.pop_front() {
            Some(step) => step,
            None => match &self.exhausted {
                Exhausted::EndOfStream => return Err(CameraError::EndOfStream),
                Exhausted::Repeat(frame) => Step::Frame(frame.clone()),
                Exhausted::Fail => Step::Fail("scripted failure".to_string()),
            },
        };

        match step {
            Step::Frame(mut frame) => {
                frame.sequence = self.sequence;
                self.sequence = self.sequence.wrapping_add(1);
                Ok(frame)
            }
            Step::Fail(reason) => Err(CameraError::Read(reason)),
        }
    }

    fn is_opened(&self) -> bool {
        self.opened
    }

    fn release(&mut self) {
        self.opened = false;
        self.probe.released.store(true, Ordering::SeqCst);
    }

    fn frame_count_hint(&self) -> Option<usize> {
        match self.exhausted {
            Exhausted::EndOfStream => Some(self.steps.len()),
            _ => None,
        }
    }
}
