//! Track Manager
//!
//! Keeps a bounded history of center points per track id so trajectories can
//! be drawn across frames. Track ids come from the external tracking
//! capability; this crate never assigns them.

mod manager;

pub use manager::{Point, Track, TrackManager, TrackerConfig};
