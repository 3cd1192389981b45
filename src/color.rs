/// Colour helpers for developing sensor data
///
/// This module handles:
/// - White balance multipliers (as-shot camera coefficients, normalised to green)
/// - Sensor level normalisation (black/white points)
/// - Camera RGB to sRGB primaries (from the camera's XYZ matrix)
/// - BT.709 transfer curve and 8-bit quantisation
use cgmath::{Array, Matrix, Matrix3, SquareMatrix};

/// BT.709 curve parameters: power 1/2.222, linear toe slope 4.5
const GAMMA_POWER: f32 = 1.0 / 2.222;
const GAMMA_TOE_SLOPE: f32 = 4.5;
const GAMMA_TOE_END: f32 = 0.018;

/// Neutral multipliers [R, G, B, G2]
pub const NEUTRAL_WB: [f32; 4] = [1.0, 1.0, 1.0, 1.0];

/// Linear sRGB (D65) to CIE XYZ
const SRGB_TO_XYZ: [[f32; 3]; 3] = [
    [0.412453, 0.357580, 0.180423],
    [0.212671, 0.715160, 0.072169],
    [0.019334, 0.119193, 0.950227],
];

/// Row-major 3x3 colour matrix that leaves pixels untouched
pub const IDENTITY_MATRIX: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// Normalise camera white balance coefficients so that green is 1.0
///
/// Cameras report coefficients on arbitrary scales and some leave the
/// fourth (second green) slot empty or NaN. Missing data yields neutral
/// multipliers.
pub fn normalize_white_balance(coeffs: [f32; 4]) -> [f32; 4] {
    let usable = |v: f32| v.is_finite() && v > 0.0;
    if !usable(coeffs[0]) || !usable(coeffs[1]) || !usable(coeffs[2]) {
        return NEUTRAL_WB;
    }

    let g_ref = coeffs[1];
    let g2 = if usable(coeffs[3]) { coeffs[3] } else { coeffs[1] };
    [
        coeffs[0] / g_ref,
        1.0,
        coeffs[2] / g_ref,
        g2 / g_ref,
    ]
}

/// Camera RGB to linear sRGB matrix from the camera's XYZ-to-camera matrix.
///
/// `cam_rgb = xyz_to_cam * SRGB_TO_XYZ` has its rows scaled to sum to 1 so a
/// white-balanced neutral stays neutral, then gets inverted. Missing or
/// singular metadata yields the identity.
pub fn cam_to_srgb_matrix(xyz_to_cam: [[f32; 3]; 3]) -> [[f32; 3]; 3] {
    // Matrix3::from reads nested arrays as columns, ours are rows
    let xyz_to_cam = Matrix3::from(xyz_to_cam).transpose();
    let srgb_to_xyz = Matrix3::from(SRGB_TO_XYZ).transpose();

    let mut cam_rgb = xyz_to_cam * srgb_to_xyz;
    for row in 0..3 {
        let sum = cam_rgb.row(row).sum();
        if !sum.is_finite() || sum.abs() < f32::EPSILON {
            return IDENTITY_MATRIX;
        }
        for col in 0..3 {
            cam_rgb[col][row] /= sum;
        }
    }

    let Some(rgb_cam) = cam_rgb.invert() else {
        return IDENTITY_MATRIX;
    };

    let rows: [[f32; 3]; 3] = rgb_cam.transpose().into();
    if rows.iter().flatten().any(|v| !v.is_finite()) {
        return IDENTITY_MATRIX;
    }
    rows
}

/// Multiply a linear RGB triple by a row-major colour matrix
#[inline]
pub fn apply_matrix(matrix: &[[f32; 3]; 3], rgb: [f32; 3]) -> [f32; 3] {
    matrix.map(|row| row[0] * rgb[0] + row[1] * rgb[1] + row[2] * rgb[2])
}

/// Map a raw sensor value into 0.0..=1.0 given its black and white levels
#[inline]
pub fn normalize_level(value: f32, black: f32, white: f32) -> f32 {
    let range = (white - black).max(1.0);
    ((value - black) / range).clamp(0.0, 1.0)
}

/// Apply the BT.709 transfer curve to a linear value in 0.0..=1.0
#[inline]
pub fn bt709_gamma(linear: f32) -> f32 {
    let v = linear.clamp(0.0, 1.0);
    if v < GAMMA_TOE_END {
        v * GAMMA_TOE_SLOPE
    } else {
        1.099 * v.powf(GAMMA_POWER) - 0.099
    }
}

/// Quantise a display-referred value in 0.0..=1.0 to 8 bits
#[inline]
pub fn to_u8(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}
