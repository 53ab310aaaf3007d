//! Class table and per-class colors

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// COCO class names, indexed by model class id
pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Seed for the class palette; fixed so colors are stable across runs
const PALETTE_SEED: u64 = 42;

/// Color for classes outside the table
pub const FALLBACK_COLOR: [u8; 3] = [0, 255, 0];

/// Human-readable name for a class id (`class_<id>` outside the table)
pub fn class_name(class_id: usize) -> String {
    COCO_CLASSES
        .get(class_id)
        .map(|name| name.to_string())
        .unwrap_or_else(|| format!("class_{}", class_id))
}

/// Deterministic RGB color per class
#[derive(Debug, Clone)]
pub struct ClassPalette {
    colors: Vec<[u8; 3]>,
}

impl ClassPalette {
    pub fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(PALETTE_SEED);
        let colors = COCO_CLASSES
            .iter()
            .map(|_| [rng.gen::<u8>(), rng.gen::<u8>(), rng.gen::<u8>()])
            .collect();
        Self { colors }
    }

    /// Color for a class name; unknown names get green
    pub fn color(&self, class_name: &str) -> [u8; 3] {
        COCO_CLASSES
            .iter()
            .position(|name| *name == class_name)
            .and_then(|idx| self.colors.get(idx).copied())
            .unwrap_or(FALLBACK_COLOR)
    }
}

impl Default for ClassPalette {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_name_lookup() {
        assert_eq!(class_name(0), "person");
        assert_eq!(class_name(7), "truck");
        assert_eq!(class_name(79), "toothbrush");
        assert_eq!(class_name(80), "class_80");
    }

    #[test]
    fn test_palette_is_deterministic() {
        let a = ClassPalette::new();
        let b = ClassPalette::new();
        for name in COCO_CLASSES {
            assert_eq!(a.color(name), b.color(name));
        }
    }

    #[test]
    fn test_unknown_class_is_green() {
        let palette = ClassPalette::default();
        assert_eq!(palette.color("class_123"), FALLBACK_COLOR);
    }
}
