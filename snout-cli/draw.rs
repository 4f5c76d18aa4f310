use crate::analysis::SnoutFeatures;
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::drawing;
use imageproc::rect::Rect;
use snout_core::Keypoint;

const DETECTION_COLOR: Rgba<u8> = Rgba([255, 64, 64, 255]);
const CROP_COLOR: Rgba<u8> = Rgba([255, 200, 0, 255]);
/// Keypoint colours by pyramid octave, starting at the doubled base (-1)
const OCTAVE_COLORS: [Rgba<u8>; 4] = [
    Rgba([0, 255, 255, 255]),
    Rgba([0, 255, 96, 255]),
    Rgba([160, 96, 255, 255]),
    Rgba([255, 96, 200, 255]),
];

fn keypoint_color(kp: &Keypoint) -> Rgba<u8> {
    let (octave, _, _) = kp.unpack_octave();
    OCTAVE_COLORS[(octave + 1).clamp(0, OCTAVE_COLORS.len() as i32 - 1) as usize]
}

/// Overlay the detection box, crop window and keypoints on `image`.
///
/// Circles have the keypoint's scale as radius and a tick along its angle,
/// coloured by the octave the keypoint was found in.
pub fn render_features(image: &DynamicImage, features: &SnoutFeatures) -> RgbaImage {
    let mut canvas = image.to_rgba8();

    let [x, y, w, h] = features.detection.rect.to_pixels();
    if w > 0 && h > 0 {
        drawing::draw_hollow_rect_mut(&mut canvas, Rect::at(x, y).of_size(w as u32, h as u32), DETECTION_COLOR);
    }
    let win = features.window;
    drawing::draw_hollow_rect_mut(
        &mut canvas,
        Rect::at(win.x as i32, win.y as i32).of_size(win.width, win.height),
        CROP_COLOR,
    );

    for kp in &features.keypoints {
        let cx = kp.x + win.x as f32;
        let cy = kp.y + win.y as f32;
        let radius = (kp.size * 0.5).max(1.0);
        let color = keypoint_color(kp);
        drawing::draw_hollow_circle_mut(&mut canvas, (cx as i32, cy as i32), radius as i32, color);
        if kp.angle >= 0.0 {
            let (s, c) = kp.angle.to_radians().sin_cos();
            drawing::draw_line_segment_mut(&mut canvas, (cx, cy), (cx + c * radius, cy - s * radius), color);
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crop::CropWindow;
    use snout_core::{BoundingBox, DescriptorSet, DetectionResult};

    #[test]
    fn test_render_marks_boxes_and_keypoints() {
        let image = DynamicImage::new_luma8(64, 64);
        let mut kp = Keypoint::new(10.0, 10.0, 8.0);
        kp.angle = 0.0;
        let features = SnoutFeatures {
            detection: DetectionResult::new(BoundingBox::new(16.0, 16.0, 32.0, 32.0), 0.9),
            window: CropWindow {
                x: 0,
                y: 0,
                width: 64,
                height: 64,
            },
            keypoints: vec![kp],
            descriptors: DescriptorSet::empty(),
        };
        let out = render_features(&image, &features);
        assert_eq!(out.dimensions(), (64, 64));
        assert_eq!(*out.get_pixel(16, 16), DETECTION_COLOR);
        assert_eq!(*out.get_pixel(0, 0), CROP_COLOR);
        assert_eq!(*out.get_pixel(14, 10), OCTAVE_COLORS[1]);
    }

    #[test]
    fn test_keypoint_color_follows_octave() {
        let mut kp = Keypoint::new(0.0, 0.0, 2.0);
        kp.octave = 255 | (1 << 8);
        assert_eq!(keypoint_color(&kp), OCTAVE_COLORS[0]);
        kp.octave = 1 | (2 << 8);
        assert_eq!(keypoint_color(&kp), OCTAVE_COLORS[2]);
        kp.octave = 6;
        assert_eq!(keypoint_color(&kp), OCTAVE_COLORS[3]);
    }
}
