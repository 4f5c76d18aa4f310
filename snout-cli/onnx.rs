//! YOLO-style snout detector run through ONNX Runtime.

use crate::detector::{non_maximum_suppression, rank_detections, DetectorError, DetectorResult, RegionDetector};
use image::{DynamicImage, GenericImageView};
use ndarray::{Array3, Axis};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use snout_core::{BoundingBox, ComputeBackend, DetectionResult};
use std::path::Path;
use std::sync::Mutex;
use std::time::Instant;

/// Candidates entering NMS are capped to bound CPU time
const MAX_NMS_INPUTS: usize = 300;
const LETTERBOX_FILL: f32 = 114.0 / 255.0;

impl From<ort::Error> for DetectorError {
    fn from(e: ort::Error) -> Self {
        DetectorError::Inference(e.to_string())
    }
}

/// Placement of the resized image on the model canvas
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
    scale: f32,
    new_w: u32,
    new_h: u32,
    /// Whole-pixel offsets; the same values place pixels and map boxes back
    pad_x: u32,
    pad_y: u32,
}

impl Letterbox {
    fn fit(orig: (u32, u32), input: (u32, u32)) -> Self {
        let (orig_w, orig_h) = orig;
        let (in_w, in_h) = input;
        let scale = (in_w as f32 / orig_w.max(1) as f32).min(in_h as f32 / orig_h.max(1) as f32);
        let new_w = ((orig_w as f32 * scale).round() as u32).clamp(1, in_w);
        let new_h = ((orig_h as f32 * scale).round() as u32).clamp(1, in_h);
        Self {
            scale,
            new_w,
            new_h,
            pad_x: (in_w - new_w) / 2,
            pad_y: (in_h - new_h) / 2,
        }
    }

    /// Canvas point back to source-image pixels
    fn to_source(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x as f32) / self.scale, (y - self.pad_y as f32) / self.scale)
    }
}

/// Loaded once and shared; inference calls are serialized on the session lock.
pub struct OnnxSnoutDetector {
    session: Mutex<Session>,
    input_width: u32,
    input_height: u32,
    output_name: String,
    confidence_floor: f32,
    nms_iou: f32,
}

impl OnnxSnoutDetector {
    pub fn from_file<P: AsRef<Path>>(
        path: P,
        backend: ComputeBackend,
        confidence_floor: f32,
        nms_iou: f32,
    ) -> DetectorResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| DetectorError::ModelLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_memory(&bytes, backend, confidence_floor, nms_iou)
    }

    pub fn from_memory(
        model_bytes: &[u8],
        backend: ComputeBackend,
        confidence_floor: f32,
        nms_iou: f32,
    ) -> DetectorResult<Self> {
        let load = |e: ort::Error| DetectorError::ModelLoad(e.to_string());
        let builder = Session::builder().map_err(load)?;
        let builder = match backend {
            ComputeBackend::Cpu => builder,
            ComputeBackend::Accelerator => builder
                .with_execution_providers([CUDAExecutionProvider::default().build()])
                .map_err(load)?,
        };
        let session = builder.commit_from_memory(model_bytes).map_err(load)?;

        let input = session
            .inputs
            .first()
            .ok_or_else(|| DetectorError::ModelMismatch("model has no inputs".into()))?;
        let dims: Vec<i64> = input
            .input_type
            .tensor_dimensions()
            .ok_or_else(|| DetectorError::ModelMismatch("input is not a tensor".into()))?
            .collect();
        if dims.len() != 4 || dims[2] <= 0 || dims[3] <= 0 {
            return Err(DetectorError::ModelMismatch(format!(
                "expected a [1, 3, H, W] input, got {:?}",
                dims
            )));
        }
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| DetectorError::ModelMismatch("model has no outputs".into()))?;

        log::debug!(
            "snout model loaded: input {}x{}, output '{}', backend {:?}",
            dims[3],
            dims[2],
            output_name,
            backend
        );

        Ok(Self {
            session: Mutex::new(session),
            input_width: dims[3] as u32,
            input_height: dims[2] as u32,
            output_name,
            confidence_floor,
            nms_iou,
        })
    }

    /// Aspect-preserving resize onto a grey canvas, as NCHW floats in `0..=1`
    fn preprocess(&self, image: &DynamicImage) -> (ndarray::Array4<f32>, Letterbox) {
        let (in_w, in_h) = (self.input_width, self.input_height);
        let lb = Letterbox::fit(image.dimensions(), (in_w, in_h));
        let rgb = image
            .resize_exact(lb.new_w, lb.new_h, image::imageops::FilterType::Triangle)
            .to_rgb8();

        let (ox, oy) = (lb.pad_x as usize, lb.pad_y as usize);
        let mut canvas = Array3::<f32>::from_elem((3, in_h as usize, in_w as usize), LETTERBOX_FILL);
        for (x, y, px) in rgb.enumerate_pixels() {
            for c in 0..3 {
                canvas[[c, oy + y as usize, ox + x as usize]] = px.0[c] as f32 / 255.0;
            }
        }
        (canvas.insert_axis(Axis(0)), lb)
    }

    fn run_inference(&self, input: ndarray::Array4<f32>) -> DetectorResult<(Vec<i64>, Vec<f32>)> {
        let input_value = ort::value::Value::from_array(input)?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectorError::Inference("session lock poisoned".into()))?;
        let outputs = session.run(ort::inputs![input_value])?;
        let output = outputs
            .get(self.output_name.as_str())
            .ok_or_else(|| DetectorError::Inference(format!("missing output '{}'", self.output_name)))?;
        let (shape, data) = output.try_extract_tensor::<f32>()?;
        Ok((shape.iter().copied().collect(), data.to_vec()))
    }
}

/// Decode `[1, 4 + classes, anchors]` or `[1, anchors, 4 + classes]` rows
/// of `cx, cy, w, h, scores...` into ranked, suppressed source-image boxes
fn decode_output(
    shape: &[i64],
    data: &[f32],
    lb: Letterbox,
    orig: (u32, u32),
    floor: f32,
    iou: f32,
) -> DetectorResult<Vec<DetectionResult>> {
    if shape.len() != 3 || shape.iter().any(|&d| d <= 0) {
        return Err(DetectorError::ModelMismatch(format!("unexpected output shape {:?}", shape)));
    }
    let (a, b) = (shape[1] as usize, shape[2] as usize);
    // features are the short axis
    let (features, anchors, transposed) = if a < b { (a, b, true) } else { (b, a, false) };
    if features < 5 || data.len() < features * anchors {
        return Err(DetectorError::ModelMismatch(format!("unexpected output shape {:?}", shape)));
    }
    let at = |anchor: usize, f: usize| {
        if transposed {
            data[f * anchors + anchor]
        } else {
            data[anchor * features + f]
        }
    };

    let (orig_w, orig_h) = orig;
    let mut candidates = Vec::new();
    for i in 0..anchors {
        let score = (4..features).map(|f| at(i, f)).fold(f32::NEG_INFINITY, f32::max);
        if !score.is_finite() || score < floor {
            continue;
        }
        let (cx, cy, w, h) = (at(i, 0), at(i, 1), at(i, 2), at(i, 3));
        if !(w > 0.0 && h > 0.0) {
            continue;
        }
        let (x1, y1) = lb.to_source(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = lb.to_source(cx + w / 2.0, cy + h / 2.0);
        let rect = BoundingBox::from_corners(x1, y1, x2, y2).clip(orig_w, orig_h);
        candidates.push(DetectionResult::new(rect, score.min(1.0)));
    }

    let mut ranked = rank_detections(candidates, floor);
    if ranked.len() > MAX_NMS_INPUTS {
        log::warn!("{} candidates truncated to {} before NMS", ranked.len(), MAX_NMS_INPUTS);
        ranked.truncate(MAX_NMS_INPUTS);
    }
    Ok(non_maximum_suppression(ranked, iou))
}

impl RegionDetector for OnnxSnoutDetector {
    fn detect(&self, image: &DynamicImage) -> DetectorResult<Vec<DetectionResult>> {
        let orig = image.dimensions();
        if orig.0 == 0 || orig.1 == 0 {
            return Ok(Vec::new());
        }
        let t0 = Instant::now();
        let (input, lb) = self.preprocess(image);
        let (shape, data) = self.run_inference(input)?;
        let detections = decode_output(&shape, &data, lb, orig, self.confidence_floor, self.nms_iou)?;
        log::debug!("{} snout proposals in {:.2?}", detections.len(), t0.elapsed());
        Ok(detections)
    }

    fn name(&self) -> &str {
        "onnx"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Row-major `[anchors, 5]` rows of `cx, cy, w, h, score`
    fn rows_to_tensor(rows: &[[f32; 5]], transposed: bool) -> (Vec<i64>, Vec<f32>) {
        let n = rows.len();
        if transposed {
            let data = (0..5).flat_map(|f| rows.iter().map(move |r| r[f])).collect();
            (vec![1, 5, n as i64], data)
        } else {
            (vec![1, n as i64, 5], rows.iter().flatten().copied().collect())
        }
    }

    fn padded_rows(mut rows: Vec<[f32; 5]>, len: usize) -> Vec<[f32; 5]> {
        rows.resize(len, [0.0, 0.0, 0.0, 0.0, 0.0]);
        rows
    }

    #[test]
    fn test_letterbox_fit() {
        let lb = Letterbox::fit((320, 200), (640, 640));
        assert_eq!(lb.scale, 2.0);
        assert_eq!((lb.new_w, lb.new_h), (640, 400));
        assert_eq!((lb.pad_x, lb.pad_y), (0, 120));
    }

    #[test]
    fn test_odd_padding_uses_whole_pixel_offset() {
        // 600x400 scales to 640x427, leaving 213 rows of padding
        let lb = Letterbox::fit((600, 400), (640, 640));
        assert_eq!(lb.new_h, 427);
        assert_eq!(lb.pad_y, 106);
        let (_, y) = lb.to_source(0.0, 106.0);
        assert_eq!(y, 0.0);
    }

    #[test]
    fn test_both_layouts_decode_the_same_box() {
        let lb = Letterbox::fit((320, 200), (640, 640));
        // canvas box 220..420 x 270..370 is source 110..210 x 75..125
        let rows = padded_rows(vec![[320.0, 320.0, 200.0, 100.0, 0.9], [10.0, 10.0, 4.0, 4.0, 0.1]], 8);
        for transposed in [false, true] {
            let (shape, data) = rows_to_tensor(&rows, transposed);
            let dets = decode_output(&shape, &data, lb, (320, 200), 0.5, 0.45).unwrap();
            assert_eq!(dets.len(), 1, "transposed={}", transposed);
            assert_eq!(dets[0].rect, BoundingBox::new(110.0, 75.0, 100.0, 50.0));
            assert_eq!(dets[0].confidence, 0.9);
        }
    }

    #[test]
    fn test_box_touching_odd_padding_maps_to_top_edge() {
        let lb = Letterbox::fit((600, 400), (640, 640));
        let rows = padded_rows(vec![[320.0, 156.0, 100.0, 100.0, 0.8]], 8);
        let (shape, data) = rows_to_tensor(&rows, true);
        let dets = decode_output(&shape, &data, lb, (600, 400), 0.5, 0.45).unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].rect.y, 0.0);
    }

    #[test]
    fn test_overlapping_boxes_are_suppressed() {
        let lb = Letterbox::fit((640, 640), (640, 640));
        let rows = padded_rows(
            vec![
                [100.0, 100.0, 50.0, 50.0, 0.7],
                [102.0, 101.0, 50.0, 50.0, 0.95],
                [400.0, 400.0, 50.0, 50.0, 0.6],
            ],
            8,
        );
        let (shape, data) = rows_to_tensor(&rows, false);
        let dets = decode_output(&shape, &data, lb, (640, 640), 0.5, 0.45).unwrap();
        let scores: Vec<f32> = dets.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.95, 0.6]);
    }

    #[test]
    fn test_candidates_are_capped_before_suppression() {
        let lb = Letterbox::fit((640, 640), (640, 640));
        let rows: Vec<[f32; 5]> = (0..400)
            .map(|i| {
                let (gx, gy) = ((i % 20) as f32, (i / 20) as f32);
                [gx * 30.0 + 10.0, gy * 30.0 + 10.0, 4.0, 4.0, 0.5 + i as f32 / 1000.0]
            })
            .collect();
        let (shape, data) = rows_to_tensor(&rows, true);
        let dets = decode_output(&shape, &data, lb, (640, 640), 0.5, 0.45).unwrap();
        assert_eq!(dets.len(), MAX_NMS_INPUTS);
        assert!(dets.iter().all(|d| d.confidence >= 0.599));
    }

    #[test]
    fn test_bad_shapes_are_rejected() {
        let lb = Letterbox::fit((64, 64), (64, 64));
        let err = decode_output(&[1, 8], &[0.0; 8], lb, (64, 64), 0.5, 0.45);
        assert!(matches!(err, Err(DetectorError::ModelMismatch(_))));
        let err = decode_output(&[1, 4, 8], &[0.0; 32], lb, (64, 64), 0.5, 0.45);
        assert!(matches!(err, Err(DetectorError::ModelMismatch(_))));
        let err = decode_output(&[1, 5, 8], &[0.0; 10], lb, (64, 64), 0.5, 0.45);
        assert!(matches!(err, Err(DetectorError::ModelMismatch(_))));
    }
}
