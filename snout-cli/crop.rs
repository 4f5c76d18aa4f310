use image::{DynamicImage, GenericImageView};
use snout_core::BoundingBox;

/// Padding used when none is configured: the box doubles in each dimension
pub const DEFAULT_PADDING: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CropError {
    #[error("Cannot crop a {width}x{height} image")]
    EmptyImage { width: u32, height: u32 },
    #[error("Invalid padding factor {0}: must be finite and >= 0")]
    InvalidPadding(f32),
    #[error("Region {0:?} has non-finite coordinates")]
    InvalidRegion(BoundingBox),
}

/// Pixel rectangle `(x, y, width, height)` inside the source image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Expand `rect` by `padding` of its size, split evenly between both sides,
/// and clamp to a `width x height` frame.
///
/// The window always has positive area. When the padded box collapses
/// against the frame the original box is used, and a box lying fully outside
/// the frame snaps to the nearest edge pixel.
pub fn padded_window(rect: &BoundingBox, padding: f32, width: u32, height: u32) -> Result<CropWindow, CropError> {
    if width == 0 || height == 0 {
        return Err(CropError::EmptyImage { width, height });
    }
    if !padding.is_finite() || padding < 0.0 {
        return Err(CropError::InvalidPadding(padding));
    }
    if !rect.is_finite() {
        return Err(CropError::InvalidRegion(*rect));
    }

    let pad_x = rect.width.max(0.0) * padding * 0.5;
    let pad_y = rect.height.max(0.0) * padding * 0.5;
    let (x, w) = span(rect.x, rect.right(), pad_x, width);
    let (y, h) = span(rect.y, rect.bottom(), pad_y, height);
    Ok(CropWindow {
        x,
        y,
        width: w,
        height: h,
    })
}

/// One axis of the crop window, as `(start, len)` with `len >= 1`
fn span(lo: f32, hi: f32, pad: f32, limit: u32) -> (u32, u32) {
    let max = limit as f32;
    let (lo, hi) = (lo.min(hi), lo.max(hi));
    let start = (lo - pad).floor().clamp(0.0, max);
    let end = (hi + pad).ceil().clamp(0.0, max);
    if end > start {
        return (start as u32, (end - start) as u32);
    }
    let start = lo.floor().clamp(0.0, max - 1.0);
    (start as u32, 1)
}

/// Crop the padded detection region out of `image`, returning the window
/// alongside the pixels so callers can map crop coordinates back
pub fn crop(image: &DynamicImage, rect: &BoundingBox, padding: f32) -> Result<(CropWindow, DynamicImage), CropError> {
    let (w, h) = image.dimensions();
    let win = padded_window(rect, padding, w, h)?;
    log::trace!("cropping {:?} from {}x{} (padding {})", win, w, h, padding);
    Ok((win, image.crop_imm(win.x, win.y, win.width, win.height)))
}
