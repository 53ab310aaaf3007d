//! YOLOv8 ONNX backend on tract
//!
//! Expects the standard export layout: input `[1, 3, S, S]` RGB in [0, 1],
//! output `[1, 4 + classes, anchors]` with center/size boxes in input pixels.

use crate::backend::{DetectionBackend, InferenceRequest};
use crate::object::RawBox;
use crate::DetectionError;
use camera_capture::VideoFrame;
use std::path::Path;
use tracing::info;
use tract_onnx::prelude::*;

pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
}

impl TractBackend {
    /// Load and optimize an ONNX model for a square input of `input_size`
    pub fn load(model_path: impl AsRef<Path>, input_size: u32) -> Result<Self, DetectionError> {
        let model_path = model_path.as_ref();
        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .and_then(|m| m.with_input_fact(0, f32::fact([1, 3, size, size]).into()))
            .and_then(|m| m.into_optimized())
            .and_then(|m| m.into_runnable())
            .map_err(|e| DetectionError::ModelLoad(format!("{}: {}", model_path.display(), e)))?;

        info!("Loaded ONNX model {} ({}x{})", model_path.display(), input_size, input_size);
        Ok(Self { model, input_size })
    }

    fn build_input(&self, boxed: &VideoFrame) -> Tensor {
        let size = self.input_size as usize;
        let pixels = &boxed.data;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            pixels[(y * size + x) * 3 + channel] as f32 / 255.0
        })
        .into_tensor()
    }
}

/// Mapping from letterboxed input coordinates back to the source frame
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale_x: f32,
    scale_y: f32,
    left: f32,
    top: f32,
}

impl Letterbox {
    /// Mirrors `VideoFrame::letterbox` into a square canvas
    fn new(width: u32, height: u32, size: u32) -> Self {
        let aspect = width as f64 / height as f64;
        let (new_w, new_h) = if aspect > 1.0 {
            (size, ((size as f64 / aspect) as u32).max(1))
        } else {
            (((size as f64 * aspect) as u32).max(1), size)
        };
        Self {
            scale_x: new_w as f32 / width as f32,
            scale_y: new_h as f32 / height as f32,
            left: ((size - new_w) / 2) as f32,
            top: ((size - new_h) / 2) as f32,
        }
    }

    fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.left) / self.scale_x, (y - self.top) / self.scale_y)
    }
}

impl DetectionBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn infer(&mut self, frame: &VideoFrame, request: &InferenceRequest) -> Result<Vec<RawBox>, DetectionError> {
        if request.tracking {
            return Err(DetectionError::TrackingUnsupported(self.name()));
        }

        let boxed = frame
            .letterbox(self.input_size, self.input_size)
            .map_err(|e| DetectionError::InvalidFrame(e.to_string()))?;
        let input = self.build_input(&boxed);

        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| DetectionError::Inference(e.to_string()))?;
        let output = outputs
            .first()
            .ok_or_else(|| DetectionError::Inference("model produced no outputs".to_string()))?;
        let preds = output
            .to_array_view::<f32>()
            .map_err(|e| DetectionError::Inference(e.to_string()))?;

        let shape = preds.shape();
        if shape.len() != 3 || shape[1] <= 4 {
            return Err(DetectionError::Inference(format!("unexpected output shape {:?}", shape)));
        }
        let (num_classes, anchors) = (shape[1] - 4, shape[2]);
        let letterbox = Letterbox::new(frame.width, frame.height, self.input_size);

        let mut candidates = Vec::new();
        for anchor in 0..anchors {
            let (class_id, confidence) = (0..num_classes)
                .map(|c| (c, preds[[0, 4 + c, anchor]]))
                .fold((0, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });
            if confidence < request.confidence_threshold {
                continue;
            }

            let cx = preds[[0, 0, anchor]];
            let cy = preds[[0, 1, anchor]];
            let w = preds[[0, 2, anchor]];
            let h = preds[[0, 3, anchor]];
            let (x1, y1) = letterbox.unmap(cx - w / 2.0, cy - h / 2.0);
            let (x2, y2) = letterbox.unmap(cx + w / 2.0, cy + h / 2.0);
            candidates.push(RawBox::new(x1, y1, x2, y2, class_id as i64, confidence));
        }

        let mut kept = non_max_suppression(candidates, request.iou_threshold, request.agnostic_nms);
        kept.truncate(request.max_detections);
        Ok(kept)
    }
}

fn iou(a: &RawBox, b: &RawBox) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;
    let union = (a.x2 - a.x1) * (a.y2 - a.y1) + (b.x2 - b.x1) * (b.y2 - b.y1) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy NMS, highest confidence first
fn non_max_suppression(mut boxes: Vec<RawBox>, iou_threshold: f32, agnostic: bool) -> Vec<RawBox> {
    boxes.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<RawBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        let suppressed = kept
            .iter()
            .filter(|k| agnostic || k.class_id == candidate.class_id)
            .any(|k| iou(k, &candidate) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}
