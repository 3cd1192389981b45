/// Preview encoding
///
/// Encodes an RGB image as JPEG or WebP and writes it to disk atomically:
/// the bytes go to a temporary file next to the destination, which is then
/// renamed over the destination. A half-written preview never carries the
/// final name, so a later run with overwrite disabled never skips it.
use crate::error::{PreviewError, Result};
use crate::job::config::OutputFormat;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::io::Write;
use std::path::Path;
use tempfile::Builder;

/// libwebp effort level (0 = fast, 6 = slowest/best)
const WEBP_METHOD: i32 = 6;

/// Encode an image into the requested container format
pub fn encode_preview(img: &RgbImage, format: OutputFormat, quality: u8, dest: &Path) -> Result<Vec<u8>> {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return Err(PreviewError::encode(dest, "image has no pixels"));
    }

    match format {
        OutputFormat::Jpeg => {
            let mut buf = Vec::new();
            JpegEncoder::new_with_quality(&mut buf, quality)
                .encode_image(img)
                .map_err(|e| PreviewError::encode(dest, format!("JPEG encode failed: {e}")))?;
            Ok(buf)
        }
        OutputFormat::Webp => {
            let encoder = webp::Encoder::from_rgb(img.as_raw(), w, h);
            let mut config = webp::WebPConfig::new()
                .map_err(|_| PreviewError::encode(dest, "failed to create WebPConfig"))?;
            config.quality = quality as f32;
            config.method = WEBP_METHOD;

            let mem = encoder
                .encode_advanced(&config)
                .map_err(|e| PreviewError::encode(dest, format!("WebP encode failed: {e:?}")))?;
            Ok(mem.to_vec())
        }
    }
}

/// Encode an image and write it to `dest`
pub fn save_preview(img: &RgbImage, dest: &Path, format: OutputFormat, quality: u8) -> Result<()> {
    let data = encode_preview(img, format, quality, dest)?;

    let output_dir = dest
        .parent()
        .ok_or_else(|| PreviewError::encode(dest, "destination has no parent directory"))?;

    let mut builder = Builder::new();
    builder.prefix(".preview-");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Created like a plain fs::write: 0o666 less the umask
        builder.permissions(std::fs::Permissions::from_mode(0o666));
    }

    // Same directory as the target so the final rename never crosses filesystems
    let mut temp_file = builder
        .tempfile_in(output_dir)
        .map_err(|e| PreviewError::io(output_dir, e))?;
    temp_file
        .write_all(&data)
        .map_err(|e| PreviewError::io(temp_file.path(), e))?;

    temp_file
        .persist(dest)
        .map_err(|e| PreviewError::io(dest, e.error))?;

    Ok(())
}
