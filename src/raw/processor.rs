/// Preview sizing
///
/// Applies the configured `SizeMode` to a developed image:
/// - none: keep the developed size
/// - exact: squash to a 224px square
/// - short-edge + centre crop: scale the short edge to 256px, keep the centre 224px square
use crate::job::config::{SizeMode, PREVIEW_EDGE, SHORT_EDGE};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Bicubic filter used for every resize
const FILTER: FilterType = FilterType::CatmullRom;

/// Resize an image according to the configured size mode
pub fn apply_size_mode(img: RgbImage, mode: SizeMode) -> RgbImage {
    match mode {
        SizeMode::None => img,
        SizeMode::Exact => imageops::resize(&img, PREVIEW_EDGE, PREVIEW_EDGE, FILTER),
        SizeMode::ShortEdgeCenterCrop => short_edge_center_crop(img, SHORT_EDGE, PREVIEW_EDGE),
    }
}

/// Dimensions after scaling the short edge of (width, height) to `short_edge`
pub fn scaled_dimensions(width: u32, height: u32, short_edge: u32) -> (u32, u32) {
    let scale = short_edge as f64 / width.min(height) as f64;
    let new_w = (width as f64 * scale).round().max(1.0) as u32;
    let new_h = (height as f64 * scale).round().max(1.0) as u32;
    (new_w, new_h)
}

fn short_edge_center_crop(img: RgbImage, short_edge: u32, crop: u32) -> RgbImage {
    let (w, h) = img.dimensions();
    if w.min(h) == 0 {
        return img;
    }

    let (new_w, new_h) = scaled_dimensions(w, h, short_edge);
    let resized = imageops::resize(&img, new_w, new_h, FILTER);

    let left = new_w.saturating_sub(crop) / 2;
    let top = new_h.saturating_sub(crop) / 2;
    imageops::crop_imm(&resized, left, top, crop.min(new_w), crop.min(new_h)).to_image()
}
