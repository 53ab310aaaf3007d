//! Detection records and raw box validation

use crate::classes::class_name;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Box as reported by a detection backend, in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub class_id: i64,
    pub confidence: f32,
    /// Persistent id, only present for tracking-mode results
    pub track_id: Option<i64>,
}

impl RawBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, class_id: i64, confidence: f32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            class_id,
            confidence,
            track_id: None,
        }
    }

    pub fn with_track(mut self, track_id: i64) -> Self {
        self.track_id = Some(track_id);
        self
    }
}

/// One validated object in a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    #[serde(rename = "class")]
    pub class_name: String,
    pub class_id: usize,
    pub confidence: f64,
    /// (x1, y1, x2, y2), clamped to the frame with x1 < x2 and y1 < y2
    pub bbox: [i32; 4],
    pub track_id: Option<i64>,
    pub area: i64,
    pub aspect_ratio: f64,
}

impl Detection {
    /// Validate a raw box against a `width` x `height` frame
    ///
    /// Returns `None` when the box must be dropped: non-finite coordinates,
    /// confidence outside [0, 1], a negative class id, or a box that is
    /// empty after clamping.
    pub fn from_raw(raw: &RawBox, width: u32, height: u32) -> Option<Self> {
        let confidence = raw.confidence as f64;
        if !(0.0..=1.0).contains(&confidence) {
            debug!("Dropping box with confidence {}", raw.confidence);
            return None;
        }
        if raw.class_id < 0 {
            debug!("Dropping box with class id {}", raw.class_id);
            return None;
        }
        let coords = [raw.x1, raw.y1, raw.x2, raw.y2];
        if coords.iter().any(|c| !c.is_finite()) {
            debug!("Dropping box with non-finite coordinates {:?}", coords);
            return None;
        }

        let max_x = width.min(i32::MAX as u32) as i32;
        let max_y = height.min(i32::MAX as u32) as i32;
        let x1 = (raw.x1 as i32).clamp(0, max_x);
        let y1 = (raw.y1 as i32).clamp(0, max_y);
        let x2 = (raw.x2 as i32).clamp(0, max_x);
        let y2 = (raw.y2 as i32).clamp(0, max_y);

        if x1 >= x2 || y1 >= y2 {
            debug!("Dropping degenerate box ({}, {}, {}, {})", x1, y1, x2, y2);
            return None;
        }

        let box_width = (x2 - x1) as i64;
        let box_height = (y2 - y1) as i64;
        let class_id = raw.class_id as usize;

        Some(Self {
            class_name: class_name(class_id),
            class_id,
            confidence,
            bbox: [x1, y1, x2, y2],
            track_id: raw.track_id,
            area: box_width * box_height,
            aspect_ratio: box_width as f64 / box_height as f64,
        })
    }

    /// Integer center of the box
    pub fn center(&self) -> (i32, i32) {
        let [x1, y1, x2, y2] = self.bbox;
        ((x1 + x2) / 2, (y1 + y2) / 2)
    }

    pub fn width(&self) -> i32 {
        self.bbox[2] - self.bbox[0]
    }

    pub fn height(&self) -> i32 {
        self.bbox[3] - self.bbox[1]
    }
}

/// Keep detections meeting a confidence floor, an optional class allow-list,
/// and an optional minimum area
pub fn filter_detections(
    detections: &[Detection],
    min_confidence: f64,
    classes: Option<&[String]>,
    min_area: Option<i64>,
) -> Vec<Detection> {
    detections
        .iter()
        .filter(|d| d.confidence >= min_confidence)
        .filter(|d| classes.map_or(true, |allowed| allowed.iter().any(|c| *c == d.class_name)))
        .filter(|d| min_area.map_or(true, |area| d.area >= area))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_valid_box() {
        let raw = RawBox::new(10.7, 20.2, 110.9, 70.0, 0, 0.9).with_track(3);
        let det = Detection::from_raw(&raw, 640, 480).unwrap();

        assert_eq!(det.class_name, "person");
        assert_eq!(det.bbox, [10, 20, 110, 70]);
        assert_eq!(det.area, 100 * 50);
        assert!((det.aspect_ratio - 2.0).abs() < 1e-9);
        assert_eq!(det.track_id, Some(3));
        assert_eq!(det.center(), (60, 45));
    }

    #[test]
    fn test_out_of_range_confidence_is_dropped() {
        let raw = RawBox::new(10.0, 10.0, 50.0, 50.0, 0, 1.5);
        assert!(Detection::from_raw(&raw, 640, 480).is_none());

        let raw = RawBox::new(10.0, 10.0, 50.0, 50.0, 0, f32::NAN);
        assert!(Detection::from_raw(&raw, 640, 480).is_none());
    }

    #[test]
    fn test_box_is_clamped_to_frame() {
        let raw = RawBox::new(-20.0, -5.0, 700.0, 500.0, 2, 0.5);
        let det = Detection::from_raw(&raw, 640, 480).unwrap();
        assert_eq!(det.bbox, [0, 0, 640, 480]);
    }

    #[test]
    fn test_box_outside_frame_is_dropped() {
        let raw = RawBox::new(650.0, 10.0, 700.0, 50.0, 2, 0.5);
        assert!(Detection::from_raw(&raw, 640, 480).is_none());
    }

    #[test]
    fn test_negative_class_is_dropped() {
        let raw = RawBox::new(10.0, 10.0, 50.0, 50.0, -1, 0.5);
        assert!(Detection::from_raw(&raw, 640, 480).is_none());
    }

    #[test]
    fn test_unknown_class_name() {
        let raw = RawBox::new(10.0, 10.0, 50.0, 50.0, 95, 0.5);
        let det = Detection::from_raw(&raw, 640, 480).unwrap();
        assert_eq!(det.class_name, "class_95");
    }

    #[test]
    fn test_serializes_class_key() {
        let raw = RawBox::new(10.0, 10.0, 50.0, 50.0, 2, 0.5);
        let det = Detection::from_raw(&raw, 640, 480).unwrap();
        let json = serde_json::to_value(&det).unwrap();
        assert_eq!(json["class"], "car");
        assert_eq!(json["bbox"][2], 50);
    }

    #[test]
    fn test_filter_detections() {
        let dets: Vec<Detection> = [
            RawBox::new(0.0, 0.0, 10.0, 10.0, 0, 0.9),
            RawBox::new(0.0, 0.0, 100.0, 100.0, 2, 0.4),
            RawBox::new(0.0, 0.0, 100.0, 100.0, 0, 0.2),
        ]
        .iter()
        .filter_map(|r| Detection::from_raw(r, 640, 480))
        .collect();

        assert_eq!(filter_detections(&dets, 0.35, None, None).len(), 2);

        let people = vec!["person".to_string()];
        let filtered = filter_detections(&dets, 0.0, Some(&people), Some(1000));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].confidence as f32, 0.2);
    }

    proptest! {
        #[test]
        fn prop_accepted_boxes_are_within_bounds(
            x1 in -1000.0f32..2000.0,
            y1 in -1000.0f32..2000.0,
            x2 in -1000.0f32..2000.0,
            y2 in -1000.0f32..2000.0,
            confidence in -0.5f32..1.5,
            width in 1u32..1920,
            height in 1u32..1080,
        ) {
            let raw = RawBox::new(x1, y1, x2, y2, 0, confidence);
            if let Some(det) = Detection::from_raw(&raw, width, height) {
                let [bx1, by1, bx2, by2] = det.bbox;
                prop_assert!((0.0..=1.0).contains(&det.confidence));
                prop_assert!(0 <= bx1 && bx1 < bx2 && bx2 <= width as i32);
                prop_assert!(0 <= by1 && by1 < by2 && by2 <= height as i32);
                prop_assert!(det.area > 0);
            }
        }
    }
}
