use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use snout_cli::codec;
use snout_cli::{AnalyzerConfig, BoundingBox, FullFrameDetector, ManualRegionDetector, SnoutAnalyzer};
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::Arc;

/// Right triangle plus L-shaped bar on a dark background, offset by `margin`
fn two_pattern_image(size: u32, margin: u32) -> GrayImage {
    let mut img = GrayImage::from_pixel(size, size, Luma([40]));
    for y in 20..44u32 {
        for x in 16..(16 + (y - 20) * 3 / 4 + 1) {
            img.put_pixel(x + margin, y + margin, Luma([230]));
        }
    }
    for y in 70..104u32 {
        for x in 70..80u32 {
            img.put_pixel(x + margin, y + margin, Luma([220]));
        }
    }
    for y in 94..104u32 {
        for x in 80..110u32 {
            img.put_pixel(x + margin, y + margin, Luma([220]));
        }
    }
    img
}

fn png_bytes(img: GrayImage) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
    buf.into_inner()
}

fn full_frame() -> SnoutAnalyzer<FullFrameDetector> {
    SnoutAnalyzer::new(FullFrameDetector::new(), &AnalyzerConfig::default()).unwrap()
}

#[test]
fn patterns_survive_analyze_and_self_compare() {
    let analyzer = full_frame();
    let result = analyzer.analyze(&png_bytes(two_pattern_image(128, 0))).unwrap().unwrap();
    assert_eq!(result.bbox, [0, 0, 128, 128]);
    assert_eq!(result.confidence, 1.0);

    let (kps, desc) = codec::decode(&result.keypoints_json, &result.descriptors_json).unwrap();
    assert!(kps.len() >= 2, "only {} keypoints", kps.len());
    assert_eq!(kps.len(), desc.len());
    assert_eq!(desc.cols(), 128);

    let compared = analyzer
        .compare_blobs(Some(&result.descriptors_json), Some(&result.descriptors_json))
        .unwrap();
    assert_eq!(compared.good_match_count, kps.len());
    assert!(compared.matches.iter().all(|m| m.query_index == m.train_index && m.distance == 0.0));
}

#[test]
fn translated_patterns_still_match() {
    let analyzer = full_frame();
    let a = analyzer.analyze(&png_bytes(two_pattern_image(128, 0))).unwrap().unwrap();
    let b = analyzer.analyze(&png_bytes(two_pattern_image(144, 16))).unwrap().unwrap();
    let result = analyzer
        .compare_blobs(Some(&a.descriptors_json), Some(&b.descriptors_json))
        .unwrap();
    assert!(result.good_match_count >= 1);
    let unrelated = DynamicImage::ImageLuma8(GrayImage::from_fn(128, 128, |x, y| Luma([((x * 7 + y * 13) % 251) as u8])));
    assert!(analyzer.analyze_image(&unrelated).is_ok());
}

#[test]
fn blank_image_never_crashes() {
    let analyzer = full_frame();
    let blank = png_bytes(GrayImage::from_pixel(96, 96, Luma([128])));
    let result = analyzer.analyze(&blank).unwrap().unwrap();
    let (kps, desc) = codec::decode(&result.keypoints_json, &result.descriptors_json).unwrap();
    assert!(kps.is_empty());
    assert!(desc.is_empty());

    let compared = analyzer
        .compare_blobs(Some(&result.descriptors_json), Some(&result.descriptors_json))
        .unwrap();
    assert_eq!(compared.good_match_count, 0);
    assert!(compared.matches.is_empty());

    let nothing = SnoutAnalyzer::new(ManualRegionDetector::new(Vec::new(), 0.5), &AnalyzerConfig::default()).unwrap();
    assert!(nothing.analyze(&blank).unwrap().is_none());
}

#[test]
fn best_detection_is_cropped_with_padding() {
    let detector = ManualRegionDetector::new(
        vec![
            snout_cli::DetectionResult::new(BoundingBox::new(60.0, 60.0, 40.0, 40.0), 0.6),
            snout_cli::DetectionResult::new(BoundingBox::new(10.0, 14.0, 30.0, 36.0), 0.93),
        ],
        0.5,
    );
    let analyzer = SnoutAnalyzer::new(detector, &AnalyzerConfig::default()).unwrap();
    let features = analyzer
        .extract(&DynamicImage::ImageLuma8(two_pattern_image(128, 0)))
        .unwrap()
        .unwrap();
    assert_eq!(features.detection.confidence, 0.93);
    assert_eq!((features.window.x, features.window.y), (0, 0));
    assert_eq!((features.window.width, features.window.height), (55, 68));
    for kp in &features.keypoints {
        assert!(kp.x < features.window.width as f32 && kp.y < features.window.height as f32);
    }
}

#[test]
fn concurrent_analyses_agree() {
    let analyzer = Arc::new(full_frame());
    let bytes = Arc::new(png_bytes(two_pattern_image(128, 0)));
    let expected = analyzer.analyze(&bytes).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let analyzer = Arc::clone(&analyzer);
            let bytes = Arc::clone(&bytes);
            std::thread::spawn(move || analyzer.analyze(&bytes).unwrap())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), expected);
    }
}

#[test]
fn legacy_blobs_compare_like_versioned_ones() {
    let analyzer = full_frame();
    let result = analyzer.analyze(&png_bytes(two_pattern_image(128, 0))).unwrap().unwrap();
    let desc = codec::decode_descriptors(&result.descriptors_json).unwrap();
    let legacy = serde_json::to_string(desc.rows()).unwrap();

    let versioned = analyzer
        .compare_blobs(Some(&result.descriptors_json), Some(&result.descriptors_json))
        .unwrap();
    let mixed = analyzer.compare_blobs(Some(&legacy), Some(&result.descriptors_json)).unwrap();
    assert_eq!(mixed, versioned);

    let seen: HashSet<usize> = mixed.matches.iter().map(|m| m.query_index).collect();
    assert_eq!(seen.len(), mixed.good_match_count);
}
