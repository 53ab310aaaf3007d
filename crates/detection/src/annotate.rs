//! Frame annotation: boxes, labels, trajectories, and the summary overlay

use crate::classes::ClassPalette;
use crate::object::Detection;
use crate::DetectionError;
use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
    text_size,
};
use imageproc::rect::Rect;
use tracing::info;
use tracking::Point;

const LABEL_SCALE: f32 = 18.0;
const SUMMARY_SCALE: f32 = 20.0;
const SUMMARY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const CENTER_RADIUS: i32 = 4;

/// Draws detection results onto frames
pub struct Annotator {
    palette: ClassPalette,
    font: Option<FontVec>,
}

impl Annotator {
    /// Annotator without a font; labels and summary text are skipped
    pub fn new() -> Self {
        Self {
            palette: ClassPalette::new(),
            font: None,
        }
    }

    /// Load the label font, if one is configured
    pub fn load(font_path: Option<&str>) -> Result<Self, DetectionError> {
        let mut annotator = Self::new();
        if let Some(path) = font_path {
            let bytes = std::fs::read(path).map_err(|e| DetectionError::Config(format!("font {}: {}", path, e)))?;
            let font = FontVec::try_from_vec(bytes)
                .map_err(|e| DetectionError::Config(format!("font {}: {}", path, e)))?;
            info!("Loaded label font from {}", path);
            annotator.font = Some(font);
        }
        Ok(annotator)
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn palette(&self) -> &ClassPalette {
        &self.palette
    }

    /// Box outline (thicker for higher confidence) and label
    pub fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let color = Rgb(self.palette.color(&detection.class_name));
        let [x1, y1, x2, y2] = detection.bbox;
        let thickness = ((detection.confidence * 3.0) as i32).max(1);

        for inset in 0..thickness {
            let w = x2 - x1 - 2 * inset;
            let h = y2 - y1 - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let rect = Rect::at(x1 + inset, y1 + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(image, rect, color);
        }

        let Some(font) = &self.font else {
            return;
        };

        let mut label = format!("{}: {:.2}", detection.class_name, detection.confidence);
        if let Some(id) = detection.track_id {
            label.push_str(&format!(" (ID:{})", id));
        }

        let scale = PxScale::from(LABEL_SCALE);
        let (text_w, text_h) = text_size(scale, font, &label);
        let background = Rect::at(x1, y1 - text_h as i32 - 10).of_size(text_w.max(1), text_h + 10);
        draw_filled_rect_mut(image, background, color);
        draw_text_mut(image, LABEL_TEXT_COLOR, x1, y1 - text_h as i32 - 5, scale, font, &label);
    }

    /// Trajectory polyline (2px) and a dot at the current center
    pub fn draw_trajectory(&self, image: &mut RgbImage, class_name: &str, segments: &[(Point, Point)], center: Point) {
        let color = Rgb(self.palette.color(class_name));

        for &((ax, ay), (bx, by)) in segments {
            for offset in 0..2 {
                draw_line_segment_mut(
                    image,
                    (ax as f32, (ay + offset) as f32),
                    (bx as f32, (by + offset) as f32),
                    color,
                );
            }
        }

        draw_filled_circle_mut(image, center, CENTER_RADIUS, color);
    }

    /// Summary lines in the top-left corner
    pub fn draw_summary(&self, image: &mut RgbImage, lines: &[String]) {
        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(SUMMARY_SCALE);
        for (i, line) in lines.iter().enumerate() {
            draw_text_mut(image, SUMMARY_COLOR, 10, 10 + i as i32 * 25, scale, font, line);
        }
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}
