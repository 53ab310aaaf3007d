//! Track Manager Implementation

use ring_buffer::RollingWindow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// Pixel coordinate of a box center
pub type Point = (i32, i32);

/// Tracker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Center points kept per track (default: 30)
    pub history_capacity: usize,
    /// Frames a track may go unseen before it is dropped (default: 300)
    pub max_missed_frames: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_capacity: 30,
            max_missed_frames: 300,
        }
    }
}

/// Trajectory of one tracked object
#[derive(Debug, Clone)]
pub struct Track {
    /// Id assigned by the tracking capability
    pub id: i64,
    /// Recent centers, oldest first; `None` marks a break in the line
    history: RollingWindow<Option<Point>>,
    /// Frame clock value at the last sighting
    pub last_seen_frame: u64,
}

impl Track {
    fn new(id: i64, capacity: usize, frame: u64) -> Self {
        Self {
            id,
            history: RollingWindow::new(capacity),
            last_seen_frame: frame,
        }
    }

    /// Recent centers, oldest first
    pub fn points(&self) -> Vec<Option<Point>> {
        self.history.to_vec()
    }

    /// Most recent known center
    pub fn last_point(&self) -> Option<Point> {
        self.history.iter().rev().find_map(|p| *p)
    }
}

/// Per-track bounded trajectory store
pub struct TrackManager {
    config: TrackerConfig,
    tracks: HashMap<i64, Track>,
    /// Frames observed since creation or the last clear
    frame: u64,
}

impl TrackManager {
    /// Create a new track manager
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: HashMap::new(),
            frame: 0,
        }
    }

    /// Start a new frame and drop tracks that went stale
    pub fn advance_frame(&mut self) {
        self.frame += 1;
        let frame = self.frame;
        let max_missed = self.config.max_missed_frames;
        let before = self.tracks.len();
        self.tracks
            .retain(|_, track| frame.saturating_sub(track.last_seen_frame) <= max_missed);

        let evicted = before - self.tracks.len();
        if evicted > 0 {
            debug!("Evicted {} stale tracks at frame {}", evicted, frame);
        }
    }

    /// Append a center point to a track's history, creating the track on first sighting
    pub fn update(&mut self, track_id: i64, center: Point) {
        let capacity = self.config.history_capacity;
        let frame = self.frame;
        let track = self
            .tracks
            .entry(track_id)
            .or_insert_with(|| Track::new(track_id, capacity, frame));
        track.history.push(Some(center));
        track.last_seen_frame = frame;
    }

    /// Ordered points of a track (empty for unknown ids)
    pub fn trajectory(&self, track_id: i64) -> Vec<Option<Point>> {
        self.tracks
            .get(&track_id)
            .map(Track::points)
            .unwrap_or_default()
    }

    /// Line segments connecting consecutive known points of a track
    pub fn segments(&self, track_id: i64) -> Vec<(Point, Point)> {
        self.trajectory(track_id)
            .windows(2)
            .filter_map(|pair| match (pair[0], pair[1]) {
                (Some(a), Some(b)) => Some((a, b)),
                _ => None,
            })
            .collect()
    }

    pub fn get(&self, track_id: i64) -> Option<&Track> {
        self.tracks.get(&track_id)
    }

    /// Number of live tracks
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Drop every track and reset the frame clock
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.frame = 0;
    }
}

impl Default for TrackManager {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_trajectory_grows_per_sighting() {
        let mut manager = TrackManager::default();

        manager.advance_frame();
        manager.update(7, (100, 100));
        manager.advance_frame();
        manager.update(7, (110, 100));

        assert_eq!(manager.trajectory(7), vec![Some((100, 100)), Some((110, 100))]);
        assert_eq!(manager.segments(7), vec![((100, 100), (110, 100))]);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut manager = TrackManager::default();
        for i in 0..45 {
            manager.advance_frame();
            manager.update(1, (i, 0));
        }

        let points = manager.trajectory(1);
        assert_eq!(points.len(), 30);
        assert_eq!(points.first(), Some(&Some((15, 0))));
        assert_eq!(points.last(), Some(&Some((44, 0))));
    }

    #[test]
    fn test_gap_breaks_the_line() {
        let mut manager = TrackManager::default();
        manager.update(3, (0, 0));
        manager.update(3, (10, 0));
        if let Some(track) = manager.tracks.get_mut(&3) {
            track.history.push(None);
        }
        manager.update(3, (20, 0));
        manager.update(3, (30, 0));

        assert_eq!(
            manager.segments(3),
            vec![((0, 0), (10, 0)), ((20, 0), (30, 0))]
        );
        assert_eq!(manager.get(3).and_then(Track::last_point), Some((30, 0)));
    }

    #[test]
    fn test_unknown_track_is_empty() {
        let manager = TrackManager::default();
        assert!(manager.trajectory(42).is_empty());
        assert!(manager.segments(42).is_empty());
    }

    #[test]
    fn test_stale_tracks_are_evicted() {
        let mut manager = TrackManager::new(TrackerConfig {
            history_capacity: 30,
            max_missed_frames: 2,
        });

        manager.advance_frame();
        manager.update(1, (0, 0));
        manager.update(2, (5, 5));

        for _ in 0..2 {
            manager.advance_frame();
            manager.update(2, (5, 5));
        }
        assert_eq!(manager.len(), 2);

        manager.advance_frame();
        assert!(manager.get(1).is_none());
        assert!(manager.get(2).is_some());
    }

    #[test]
    fn test_clear() {
        let mut manager = TrackManager::default();
        manager.update(1, (1, 1));
        manager.clear();
        assert!(manager.is_empty());
    }

    proptest! {
        #[test]
        fn prop_trajectory_never_exceeds_capacity(capacity in 1usize..40, sightings in 0usize..120) {
            let mut manager = TrackManager::new(TrackerConfig { history_capacity: capacity, max_missed_frames: 10 });
            for i in 0..sightings {
                manager.advance_frame();
                manager.update(9, (i as i32, 0));
            }
            prop_assert!(manager.trajectory(9).len() <= capacity);
        }
    }
}
