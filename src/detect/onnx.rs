use std::collections::HashMap;

use anyhow::{anyhow, bail, Context, Result};
use candle_core::{DType, Device, Tensor};
use candle_onnx::onnx::ModelProto;
use image::imageops::{self, FilterType};
use prost::Message;
use tracing::{debug, instrument, trace};

use super::{Detection, DetectorConfig, PersonDetector};
use crate::crop::NormalizedFrame;

/// Output row holding the COCO "person" score (after cx, cy, w, h).
const PERSON_CLASS_ROW: usize = 4;

/// YOLOv8-style detector evaluated on the CPU through candle.
pub struct OnnxDetector {
    model: ModelProto,
    input_name: String,
    output_name: String,
    input_size: u32,
    iou_threshold: f32,
}

impl OnnxDetector {
    #[instrument(level = "debug", skip_all)]
    pub fn new(config: &DetectorConfig) -> Result<Self> {
        let data = std::fs::read(&config.model_path)
            .with_context(|| format!("reading model {}", config.model_path))?;
        let model = ModelProto::decode(&*data)?;
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| anyhow!("model has no graph"))?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("model has no inputs"))?;
        let output_name = graph
            .output
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("model has no outputs"))?;
        debug!(
            model_path = %config.model_path,
            input = %input_name,
            output = %output_name,
            "yolo model loaded"
        );
        Ok(Self {
            model,
            input_name,
            output_name,
            input_size: config.input_size,
            iou_threshold: config.iou_threshold,
        })
    }

    fn to_tensor(&self, frame: &NormalizedFrame) -> Result<Tensor> {
        let side = self.input_size;
        let resized = imageops::resize(frame.image(), side, side, FilterType::Triangle);
        let plane = (side * side) as usize;
        let mut data = vec![0f32; 3 * plane];
        for (i, px) in resized.pixels().enumerate() {
            for c in 0..3 {
                data[c * plane + i] = f32::from(px[c]) / 255.0;
            }
        }
        Ok(Tensor::from_vec(
            data,
            (1, 3, side as usize, side as usize),
            &Device::Cpu,
        )?)
    }
}

impl PersonDetector for OnnxDetector {
    #[instrument(level = "debug", skip(self, frame))]
    fn detect(&self, frame: &NormalizedFrame, confidence: f32) -> Result<Vec<Detection>> {
        let input = self.to_tensor(frame)?;
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), input);
        let mut outputs = candle_onnx::simple_eval(&self.model, inputs)?;
        let output = outputs
            .remove(&self.output_name)
            .ok_or_else(|| anyhow!("model produced no {} output", self.output_name))?;
        let rows = output.squeeze(0)?.to_dtype(DType::F32)?.to_vec2::<f32>()?;

        let boxes = decode_people(&rows, confidence, self.iou_threshold)?;
        let size = frame.size();
        let sx = size.width as f32 / self.input_size as f32;
        let sy = size.height as f32 / self.input_size as f32;
        let max_x = (size.width - 1) as f32;
        let max_y = (size.height - 1) as f32;
        let people: Vec<Detection> = boxes
            .iter()
            .map(|b| Detection {
                cx: (b.cx * sx).clamp(0.0, max_x),
                cy: (b.cy * sy).clamp(0.0, max_y),
            })
            .collect();
        debug!(people = people.len(), "detect finished");
        Ok(people)
    }
}

/// A candidate box in model-input pixels, centre-size form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub score: f32,
}

impl ScoredBox {
    fn corners(&self) -> [f32; 4] {
        [
            self.cx - self.w / 2.0,
            self.cy - self.h / 2.0,
            self.cx + self.w / 2.0,
            self.cy + self.h / 2.0,
        ]
    }

    pub fn iou(&self, other: &ScoredBox) -> f32 {
        let a = self.corners();
        let b = other.corners();
        let iw = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
        let ih = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
        let inter = iw * ih;
        let union = self.w.max(0.0) * self.h.max(0.0) + other.w.max(0.0) * other.h.max(0.0) - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Pick person boxes out of a `[4 + classes][anchors]` YOLO output.
pub fn decode_people(rows: &[Vec<f32>], confidence: f32, iou_threshold: f32) -> Result<Vec<ScoredBox>> {
    if rows.len() <= PERSON_CLASS_ROW {
        bail!("unexpected yolo output with {} rows", rows.len());
    }
    let anchors = rows[0].len();
    if rows.iter().any(|r| r.len() != anchors) {
        bail!("ragged yolo output");
    }
    let candidates: Vec<ScoredBox> = (0..anchors)
        .filter(|&a| rows[PERSON_CLASS_ROW][a] >= confidence)
        .map(|a| ScoredBox {
            cx: rows[0][a],
            cy: rows[1][a],
            w: rows[2][a],
            h: rows[3][a],
            score: rows[PERSON_CLASS_ROW][a],
        })
        .collect();
    trace!(candidates = candidates.len(), "person candidates above threshold");
    Ok(non_max_suppression(candidates, iou_threshold))
}

/// Greedy NMS, highest score first.
pub fn non_max_suppression(mut boxes: Vec<ScoredBox>, iou_threshold: f32) -> Vec<ScoredBox> {
    boxes.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<ScoredBox> = Vec::with_capacity(boxes.len());
    for candidate in boxes {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}
