/// RAW sensor data loader and developer
///
/// This module loads the actual sensor data from RAW files (not embedded JPEGs)
/// and develops it on the CPU into an 8-bit RGB image:
/// levels -> white balance -> demosaic -> camera to sRGB -> exposure -> BT.709 gamma.
use crate::color::{
    apply_matrix, bt709_gamma, cam_to_srgb_matrix, normalize_level, normalize_white_balance, to_u8,
    NEUTRAL_WB,
};
use crate::error::{PreviewError, Result};
use image::{Rgb, RgbImage};
use rawloader::CFA;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Anything that can turn a RAW file into RGB pixels.
///
/// The job engine only talks to this trait, so workers can be driven by
/// the rawloader pipeline below or by any other decoder.
pub trait Decode: Send + Sync {
    fn decode(&self, path: &Path) -> Result<RgbImage>;
}

/// Demosaic algorithm choice
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Demosaic {
    /// Full resolution, each missing colour averaged from the 3x3 neighbourhood
    #[default]
    Bilinear,
    /// Half resolution, one output pixel per 2x2 block
    HalfSize,
}

/// Development knobs applied to sensor data
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct DevelopSettings {
    /// Apply the as-shot camera white balance
    pub use_camera_wb: bool,
    /// Linear exposure multiplier (no auto-brightening is ever applied)
    pub bright: f32,
    pub demosaic: Demosaic,
}

impl Default for DevelopSettings {
    fn default() -> Self {
        Self {
            use_camera_wb: true,
            bright: 1.0,
            demosaic: Demosaic::Bilinear,
        }
    }
}

/// Sensor data pulled out of a RAW file
#[derive(Debug, Clone)]
pub struct SensorData {
    pub data: Vec<u16>,
    pub width: usize,
    pub height: usize,
    /// Components per pixel: 1 for mosaiced sensors, 3 for linear RGB
    pub cpp: usize,
    pub cfa: CFA,
    pub black_levels: [u16; 4],
    pub white_levels: [u16; 4],
    /// Normalised white balance multipliers [R, G, B, G2]
    pub wb_multipliers: [f32; 4],
    /// Row-major camera RGB to linear sRGB matrix
    pub cam_to_srgb: [[f32; 3]; 3],
    /// Crops in pixels: top, right, bottom, left
    pub crops: [usize; 4],
}

impl SensorData {
    /// Output window after applying the sensor crops
    fn window(&self) -> Option<(usize, usize, usize, usize)> {
        let [top, right, bottom, left] = self.crops;
        let x1 = self.width.checked_sub(right)?;
        let y1 = self.height.checked_sub(bottom)?;
        if left >= x1 || top >= y1 {
            return None;
        }
        Some((left, top, x1, y1))
    }
}

/// The default decoder: rawloader + CPU development
#[derive(Debug, Clone, Copy, Default)]
pub struct RawDecoder {
    settings: DevelopSettings,
}

impl RawDecoder {
    pub fn new(settings: DevelopSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> DevelopSettings {
        self.settings
    }
}

impl Decode for RawDecoder {
    fn decode(&self, path: &Path) -> Result<RgbImage> {
        let sensor = load_sensor_data(path)?;
        develop(&sensor, &self.settings).map_err(|message| PreviewError::decode(path, message))
    }
}

/// Load raw sensor data from a RAW file
pub fn load_sensor_data(path: &Path) -> Result<SensorData> {
    if !path.exists() {
        return Err(PreviewError::decode(path, "file not found"));
    }

    let decoder = rawloader::RawLoader::new();
    let raw_image = decoder
        .decode_file(path)
        .map_err(|e| PreviewError::decode(path, format!("{:?}", e)))?;

    // rawloader returns data in different formats, normalize to u16
    let data: Vec<u16> = match raw_image.data {
        rawloader::RawImageData::Integer(values) => values,
        rawloader::RawImageData::Float(values) => values
            .iter()
            .map(|&v| (v * 65535.0).clamp(0.0, 65535.0) as u16)
            .collect(),
    };

    let expected = raw_image.width * raw_image.height * raw_image.cpp;
    if raw_image.cpp == 0 || data.len() < expected {
        return Err(PreviewError::decode(
            path,
            format!(
                "sensor data too short: {} values for {}x{}x{}",
                data.len(),
                raw_image.width,
                raw_image.height,
                raw_image.cpp
            ),
        ));
    }

    // rawloader reports float data on a 0..1 scale, which we stretched to u16
    let (black_levels, white_levels) = if raw_image.whitelevels.iter().all(|&w| w == 0) {
        ([0; 4], [u16::MAX; 4])
    } else {
        (raw_image.blacklevels, raw_image.whitelevels)
    };

    tracing::trace!(
        path = %path.display(),
        width = raw_image.width,
        height = raw_image.height,
        cpp = raw_image.cpp,
        "loaded sensor data"
    );

    Ok(SensorData {
        data,
        width: raw_image.width,
        height: raw_image.height,
        cpp: raw_image.cpp,
        cfa: raw_image.cfa,
        black_levels,
        white_levels,
        wb_multipliers: normalize_white_balance(raw_image.wb_coeffs),
        cam_to_srgb: cam_to_srgb_matrix([
            raw_image.xyz_to_cam[0],
            raw_image.xyz_to_cam[1],
            raw_image.xyz_to_cam[2],
        ]),
        crops: raw_image.crops,
    })
}

/// Develop sensor data into an 8-bit RGB image
pub fn develop(sensor: &SensorData, settings: &DevelopSettings) -> std::result::Result<RgbImage, String> {
    let (x0, y0, x1, y1) = sensor
        .window()
        .ok_or_else(|| format!("crops leave no pixels in a {}x{} frame", sensor.width, sensor.height))?;

    let wb = if settings.use_camera_wb {
        sensor.wb_multipliers
    } else {
        NEUTRAL_WB
    };

    // Linear value of one sample, levels and white balance applied
    let sample = |row: usize, col: usize, component: usize, color: usize| -> f32 {
        let idx = (row * sensor.width + col) * sensor.cpp + component;
        let raw = sensor.data[idx] as f32;
        let level = normalize_level(
            raw,
            sensor.black_levels[color] as f32,
            sensor.white_levels[color] as f32,
        );
        level * wb[color]
    };

    let finish = |rgb: [f32; 3]| -> Rgb<u8> {
        let srgb = apply_matrix(&sensor.cam_to_srgb, rgb);
        Rgb(srgb.map(|v| to_u8(bt709_gamma(v * settings.bright))))
    };

    if sensor.cpp == 3 {
        let mut out = RgbImage::new((x1 - x0) as u32, (y1 - y0) as u32);
        for (x, y, pixel) in out.enumerate_pixels_mut() {
            let (row, col) = (y0 + y as usize, x0 + x as usize);
            *pixel = finish([sample(row, col, 0, 0), sample(row, col, 1, 1), sample(row, col, 2, 2)]);
        }
        return Ok(out);
    }

    if sensor.cpp != 1 {
        return Err(format!("unsupported sensor layout with {} components per pixel", sensor.cpp));
    }

    let color_at = |row: usize, col: usize| -> usize {
        // The fourth CFA colour is a second green on every sensor we handle
        match sensor.cfa.color_at(row, col) {
            c @ 0..=2 => c,
            _ => 1,
        }
    };

    match settings.demosaic {
        Demosaic::HalfSize => {
            let out_w = (x1 - x0) / 2;
            let out_h = (y1 - y0) / 2;
            if out_w == 0 || out_h == 0 {
                return Err("image too small for half-size demosaic".to_string());
            }
            let mut out = RgbImage::new(out_w as u32, out_h as u32);
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                let (row, col) = (y0 + 2 * y as usize, x0 + 2 * x as usize);
                let mut sums = [0.0f32; 3];
                let mut counts = [0u32; 3];
                for (r, c) in [(row, col), (row, col + 1), (row + 1, col), (row + 1, col + 1)] {
                    let color = color_at(r, c);
                    sums[color] += sample(r, c, 0, color);
                    counts[color] += 1;
                }
                *pixel = finish(average(sums, counts));
            }
            Ok(out)
        }
        Demosaic::Bilinear => {
            let mut out = RgbImage::new((x1 - x0) as u32, (y1 - y0) as u32);
            for (x, y, pixel) in out.enumerate_pixels_mut() {
                let (row, col) = (y0 + y as usize, x0 + x as usize);
                let own = color_at(row, col);
                let mut sums = [0.0f32; 3];
                let mut counts = [0u32; 3];
                for r in row.saturating_sub(1)..=(row + 1).min(sensor.height - 1) {
                    for c in col.saturating_sub(1)..=(col + 1).min(sensor.width - 1) {
                        let color = color_at(r, c);
                        sums[color] += sample(r, c, 0, color);
                        counts[color] += 1;
                    }
                }
                // A site always keeps its own measured value
                sums[own] = sample(row, col, 0, own);
                counts[own] = 1;
                *pixel = finish(average(sums, counts));
            }
            Ok(out)
        }
    }
}

fn average(sums: [f32; 3], counts: [u32; 3]) -> [f32; 3] {
    let mut out = [0.0; 3];
    for i in 0..3 {
        if counts[i] > 0 {
            out[i] = sums[i] / counts[i] as f32;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::IDENTITY_MATRIX;

    /// A 4x4 RGGB mosaic with a flat grey scene (all sites at half scale)
    fn flat_sensor(value: u16) -> SensorData {
        SensorData {
            data: vec![value; 16],
            width: 4,
            height: 4,
            cpp: 1,
            cfa: CFA::new("RGGB"),
            black_levels: [0; 4],
            white_levels: [1000; 4],
            wb_multipliers: NEUTRAL_WB,
            cam_to_srgb: IDENTITY_MATRIX,
            crops: [0; 4],
        }
    }

    #[test]
    fn test_load_raw_data_missing_file() {
        let result = load_sensor_data(Path::new("/nonexistent/path.nef"));
        assert!(matches!(result, Err(PreviewError::Decode { .. })));
    }

    #[test]
    fn test_decoder_reports_garbage_as_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.nef");
        std::fs::write(&path, b"definitely not a raw file").unwrap();
        assert!(RawDecoder::default().decode(&path).is_err());
    }

    #[test]
    fn test_develop_flat_field_is_grey() {
        let sensor = flat_sensor(1000);
        let img = develop(&sensor, &DevelopSettings::default()).unwrap();
        assert_eq!(img.dimensions(), (4, 4));
        for pixel in img.pixels() {
            assert_eq!(pixel.0, [255, 255, 255]);
        }

        let img = develop(&flat_sensor(0), &DevelopSettings::default()).unwrap();
        for pixel in img.pixels() {
            assert_eq!(pixel.0, [0, 0, 0]);
        }
    }

    #[test]
    fn test_develop_half_size() {
        let settings = DevelopSettings {
            demosaic: Demosaic::HalfSize,
            ..DevelopSettings::default()
        };
        let img = develop(&flat_sensor(500), &settings).unwrap();
        assert_eq!(img.dimensions(), (2, 2));
        let p = img.get_pixel(0, 0).0;
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn test_white_balance_toggle() {
        let mut sensor = flat_sensor(250);
        sensor.wb_multipliers = [2.0, 1.0, 1.0, 1.0];

        let balanced = develop(&sensor, &DevelopSettings::default()).unwrap();
        let p = balanced.get_pixel(1, 1).0;
        assert!(p[0] > p[1], "red should be boosted: {:?}", p);

        let settings = DevelopSettings {
            use_camera_wb: false,
            ..DevelopSettings::default()
        };
        let neutral = develop(&sensor, &settings).unwrap();
        let p = neutral.get_pixel(1, 1).0;
        assert_eq!(p[0], p[1]);
    }

    #[test]
    fn test_exposure_brightens() {
        let sensor = flat_sensor(100);
        let base = develop(&sensor, &DevelopSettings::default()).unwrap();
        let settings = DevelopSettings {
            bright: 2.0,
            ..DevelopSettings::default()
        };
        let brighter = develop(&sensor, &settings).unwrap();
        assert!(brighter.get_pixel(0, 0).0[1] > base.get_pixel(0, 0).0[1]);
    }

    #[test]
    fn test_crops_shrink_output() {
        let mut sensor = flat_sensor(500);
        sensor.crops = [1, 1, 1, 1];
        let img = develop(&sensor, &DevelopSettings::default()).unwrap();
        assert_eq!(img.dimensions(), (2, 2));

        sensor.crops = [2, 2, 2, 2];
        assert!(develop(&sensor, &DevelopSettings::default()).is_err());
    }

    #[test]
    fn test_linear_rgb_sensor() {
        let sensor = SensorData {
            data: vec![1000, 0, 0, 0, 1000, 0],
            width: 2,
            height: 1,
            cpp: 3,
            cfa: CFA::new("RGGB"),
            black_levels: [0; 4],
            white_levels: [1000; 4],
            wb_multipliers: NEUTRAL_WB,
            cam_to_srgb: IDENTITY_MATRIX,
            crops: [0; 4],
        };
        let img = develop(&sensor, &DevelopSettings::default()).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0, [0, 255, 0]);
    }

    #[test]
    fn test_develop_converts_camera_colour() {
        // Camera red lands in sRGB blue
        let mut sensor = flat_sensor(0);
        sensor.cam_to_srgb = [[0.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]];
        sensor.data[0] = 1000; // (0, 0) is a red site on RGGB

        let settings = DevelopSettings {
            demosaic: Demosaic::HalfSize,
            ..DevelopSettings::default()
        };
        let img = develop(&sensor, &settings).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 255]);
    }

    #[test]
    fn test_develop_keeps_grey_under_camera_matrix() {
        let mut sensor = flat_sensor(400);
        sensor.cam_to_srgb = cam_to_srgb_matrix([
            [1.0405, -0.3755, -0.1270],
            [-0.5461, 1.3787, 0.1793],
            [-0.1040, 0.2015, 0.6785],
        ]);
        let img = develop(&sensor, &DevelopSettings::default()).unwrap();
        let p = img.get_pixel(2, 2).0;
        assert!(p[0].abs_diff(p[1]) <= 1 && p[1].abs_diff(p[2]) <= 1, "{:?}", p);
    }
}
