//! Lens-shading correction.
//!
//! A 17x17 grid of calibration samples describes the gain at the corners of
//! 16x16 sectors covering the frame. [`GainMap::generate`] interpolates the
//! grid per sector, first along y and then along x, with fixed-point
//! gradients. The result is one 12-bit-fraction gain per pixel that
//! [`GainMap::apply_luma`] multiplies into the luma plane.
//!
//! Sector sizes are symmetric: eight sizes per axis cover the first half of
//! the frame and are mirrored for the second half.

use serde::{Deserialize, Serialize};

/// Calibration grid dimension (sector corners per axis)
pub const GRID: usize = 17;

/// Sectors per half axis
pub const HALF_SECTORS: usize = 8;

/// Gain value meaning "no correction" (12 fractional bits)
pub const UNITY_GAIN: u16 = 1 << FRAC_BITS;

const SAMPLE_BITS: u32 = 13;
const CORR_BITS: u32 = 15;
const CORR_DIFF: u32 = CORR_BITS - SAMPLE_BITS;
const GRAD_EXP: u32 = 15;
const EXTEND_BITS: u32 = 10;
const EXTEND_ROUND: u32 = 1 << (EXTEND_BITS - 1);
const DX_SHIFT: u32 = GRAD_EXP - EXTEND_BITS;
const DX_ROUND: u32 = 1 << (DX_SHIFT - 1);
const DY_SHIFT: u32 = GRAD_EXP - EXTEND_BITS - CORR_DIFF;
const DY_ROUND: u32 = 1 << (DY_SHIFT - 1);
const FRAC_BITS: u32 = 12;
const FRAC_ROUND: u32 = 1 << (FRAC_BITS - 1);
const MAX_GAIN: u32 = (2 << CORR_BITS) - 1;
const MAX_GRAD: u16 = 4095;

/// Green (red row) channel samples, applied to luma.
#[rustfmt::skip]
pub const GREEN_SAMPLES: [[u16; GRID]; GRID] = [
    [1377,1306,1244,1189,1157,1134,1112,1111,1101,1110,1120,1134,1149,1177,1233,1279,1373],
    [1358,1268,1202,1158,1132,1107,1100,1087,1081,1085,1092,1109,1115,1158,1185,1248,1306],
    [1301,1234,1184,1136,1110,1090,1077,1065,1068,1068,1075,1085,1109,1127,1170,1212,1294],
    [1273,1204,1156,1120,1094,1076,1061,1059,1056,1054,1061,1074,1087,1118,1146,1185,1254],
    [1251,1192,1149,1109,1088,1068,1054,1048,1048,1050,1054,1065,1084,1105,1133,1177,1218],
    [1235,1182,1130,1100,1073,1056,1053,1039,1039,1042,1049,1059,1078,1091,1123,1160,1216],
    [1228,1169,1121,1093,1074,1050,1038,1035,1027,1036,1039,1054,1064,1088,1116,1157,1209],
    [1211,1156,1117,1091,1063,1046,1035,1028,1028,1027,1038,1048,1063,1087,1109,1148,1196],
    [1210,1161,1114,1081,1065,1048,1035,1024,1024,1029,1035,1048,1064,1080,1112,1141,1193],
    [1221,1160,1121,1090,1067,1051,1039,1031,1027,1030,1039,1049,1064,1090,1116,1153,1196],
    [1235,1166,1127,1095,1071,1054,1042,1036,1033,1036,1043,1056,1073,1098,1121,1158,1211],
    [1239,1179,1132,1102,1073,1063,1049,1043,1042,1040,1052,1066,1084,1104,1135,1173,1239],
    [1244,1190,1145,1115,1083,1066,1057,1046,1045,1051,1055,1071,1086,1118,1142,1191,1234],
    [1277,1213,1158,1120,1101,1075,1066,1062,1058,1058,1064,1083,1108,1124,1165,1202,1265],
    [1322,1228,1192,1141,1119,1096,1081,1072,1074,1071,1083,1098,1124,1153,1180,1240,1288],
    [1337,1276,1200,1171,1133,1113,1102,1091,1093,1092,1100,1118,1140,1170,1208,1269,1347],
    [1387,1298,1251,1198,1161,1135,1121,1111,1113,1110,1124,1141,1168,1198,1242,1301,1377],
];

/// Sector sizes of the calibrated 1080p module
const CALIBRATED_WIDTH: u32 = 1920;
const CALIBRATED_HEIGHT: u32 = 1080;
const CALIBRATED_SIZE_X: [u16; HALF_SECTORS] = [120; HALF_SECTORS];
const CALIBRATED_SIZE_Y: [u16; HALF_SECTORS] = [67, 68, 67, 68, 67, 68, 67, 68];

/// How the frame is split into sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlockSizing {
    /// `dim / 16` per sector, the odd remainder added to the innermost sector
    #[default]
    Uniform,
    /// Fixed 1080p calibration sizes (remainder still added to the innermost
    /// sector). Other resolutions fall back to `Uniform`.
    Calibrated,
}

/// Sector sizes and fixed-point gradients for one frame geometry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorLayout {
    pub size_x: [u16; HALF_SECTORS],
    pub size_y: [u16; HALF_SECTORS],
    pub grad_x: [u16; HALF_SECTORS],
    pub grad_y: [u16; HALF_SECTORS],
}

impl SectorLayout {
    pub fn new(width: u32, height: u32, sizing: BlockSizing) -> Self {
        let (mut size_x, mut size_y) = match sizing {
            BlockSizing::Calibrated
                if width == CALIBRATED_WIDTH && height == CALIBRATED_HEIGHT =>
            {
                (CALIBRATED_SIZE_X, CALIBRATED_SIZE_Y)
            }
            BlockSizing::Calibrated => {
                tracing::warn!(
                    "Calibrated LSC sectors only cover {}x{}, using uniform split for {}x{}",
                    CALIBRATED_WIDTH,
                    CALIBRATED_HEIGHT,
                    width,
                    height
                );
                uniform_sizes(width, height)
            }
            BlockSizing::Uniform => uniform_sizes(width, height),
        };

        size_x[HALF_SECTORS - 1] += ((width % 16) / 2) as u16;
        size_y[HALF_SECTORS - 1] += ((height % 16) / 2) as u16;

        Self {
            size_x,
            size_y,
            grad_x: size_x.map(gradient),
            grad_y: size_y.map(gradient),
        }
    }

    /// Size and gradient of sector `blk` (0..16) along x
    fn x(&self, blk: usize) -> (u16, u16) {
        let i = mirror(blk);
        (self.size_x[i], self.grad_x[i])
    }

    fn y(&self, blk: usize) -> (u16, u16) {
        let i = mirror(blk);
        (self.size_y[i], self.grad_y[i])
    }
}

fn uniform_sizes(width: u32, height: u32) -> ([u16; HALF_SECTORS], [u16; HALF_SECTORS]) {
    (
        [(width / 2 / 8) as u16; HALF_SECTORS],
        [(height / 2 / 8) as u16; HALF_SECTORS],
    )
}

fn mirror(blk: usize) -> usize {
    if blk < HALF_SECTORS {
        blk
    } else {
        2 * HALF_SECTORS - 1 - blk
    }
}

fn gradient(size: u16) -> u16 {
    let grad = 32768.0 / size as f64 + 0.5;
    // `as` saturates, so an empty sector clamps like an oversized gradient
    (grad as u16).min(MAX_GRAD)
}

/// Interpolated corner value at `offset` rows down a sector edge
fn edge(top: u32, bottom: u32, grad: u32, offset: u32) -> u32 {
    let mut delta = top.abs_diff(bottom) * grad;
    delta = (delta + DY_ROUND) >> DY_SHIFT;
    delta *= offset;
    delta = (delta + EXTEND_ROUND) >> EXTEND_BITS;
    delta = (delta << (32 - CORR_BITS)) >> (32 - CORR_BITS);
    let base = top << CORR_DIFF;
    if top > bottom {
        base.wrapping_sub(delta)
    } else {
        base.wrapping_add(delta)
    }
}

/// Per-pixel gain table for one frame geometry
#[derive(Clone)]
pub struct GainMap {
    width: u32,
    height: u32,
    gains: Vec<u16>,
}

impl GainMap {
    /// Interpolate `samples` across a `width` x `height` frame.
    ///
    /// Pixels not covered by any sector keep unity gain.
    pub fn generate(
        width: u32,
        height: u32,
        sizing: BlockSizing,
        samples: &[[u16; GRID]; GRID],
    ) -> Self {
        let layout = SectorLayout::new(width, height, sizing);
        let (w, h) = (width as usize, height as usize);
        let mut gains = vec![UNITY_GAIN; w * h];

        let mut y_base = 0usize;
        for y_blk in 0..2 * HALF_SECTORS {
            let (size_y, grad_y) = layout.y(y_blk);
            let mut x_base = 0usize;
            for x_blk in 0..2 * HALF_SECTORS {
                let (size_x, grad_x) = layout.x(x_blk);
                let lu = samples[y_blk][x_blk] as u32;
                let ld = samples[y_blk + 1][x_blk] as u32;
                let ru = samples[y_blk][x_blk + 1] as u32;
                let rd = samples[y_blk + 1][x_blk + 1] as u32;

                for y_off in 0..size_y as usize {
                    let coef_l = edge(lu, ld, grad_y as u32, y_off as u32);
                    let coef_r = edge(ru, rd, grad_y as u32, y_off as u32);
                    let mut coef = coef_l << EXTEND_BITS;
                    let step = ((coef_r.wrapping_sub(coef_l) as i32).unsigned_abs() * grad_x as u32
                        + DX_ROUND)
                        >> DX_SHIFT;

                    let y = y_base + y_off;
                    for x_off in 0..size_x as usize {
                        let x = x_base + x_off;
                        if y < h && x < w {
                            gains[y * w + x] = ((coef + EXTEND_ROUND) >> EXTEND_BITS).min(MAX_GAIN) as u16;
                        }
                        coef = if coef_l > coef_r {
                            coef.wrapping_sub(step)
                        } else {
                            coef.wrapping_add(step)
                        };
                    }
                }
                x_base += size_x as usize;
            }
            y_base += size_y as usize;
        }

        Self {
            width,
            height,
            gains,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn gain_at(&self, x: u32, y: u32) -> u16 {
        self.gains[y as usize * self.width as usize + x as usize]
    }

    /// Apply the gains to a luma plane. Rows are `src_stride`/`dst_stride` bytes apart.
    pub fn apply_luma(&self, src: &[u8], src_stride: usize, dst: &mut [u8], dst_stride: usize) {
        let w = self.width as usize;
        for y in 0..self.height as usize {
            let gains = &self.gains[y * w..(y + 1) * w];
            let src_row = &src[y * src_stride..y * src_stride + w];
            let dst_row = &mut dst[y * dst_stride..y * dst_stride + w];
            for ((out, &px), &gain) in dst_row.iter_mut().zip(src_row).zip(gains) {
                *out = correct(px, gain);
            }
        }
    }
}

#[inline]
fn correct(px: u8, gain: u16) -> u8 {
    let scaled = ((px as u64) << 8) * gain as u64 + FRAC_ROUND as u64;
    let narrowed = (scaled >> FRAC_BITS).min(u16::MAX as u64);
    (narrowed >> 8) as u8
}

impl std::fmt::Debug for GainMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GainMap")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_1080p() {
        let layout = SectorLayout::new(1920, 1080, BlockSizing::Uniform);
        assert_eq!(layout.size_x, [120; 8]);
        assert_eq!(layout.size_y, [67, 67, 67, 67, 67, 67, 67, 71]);
        assert_eq!(layout.grad_x[0], 273);
        assert_eq!(layout.grad_y[0], 489);
        assert_eq!(layout.grad_y[7], 462);
    }

    #[test]
    fn test_calibrated_layout_keeps_table_and_remainder() {
        let layout = SectorLayout::new(1920, 1080, BlockSizing::Calibrated);
        assert_eq!(layout.size_y, [67, 68, 67, 68, 67, 68, 67, 72]);
        assert_eq!(layout.grad_y[1], 482);
    }

    #[test]
    fn test_calibrated_falls_back_off_resolution() {
        let calibrated = SectorLayout::new(640, 480, BlockSizing::Calibrated);
        let uniform = SectorLayout::new(640, 480, BlockSizing::Uniform);
        assert_eq!(calibrated, uniform);
    }

    #[test]
    fn test_gradient_clamps() {
        assert_eq!(gradient(0), MAX_GRAD);
        assert_eq!(gradient(4), MAX_GRAD);
        assert_eq!(gradient(120), 273);
    }

    #[test]
    fn test_corner_gain_matches_sample() {
        let map = GainMap::generate(1920, 1080, BlockSizing::Uniform, &GREEN_SAMPLES);
        // top-left pixel sits exactly on the first sample, scaled by the correction bit gap
        assert_eq!(map.gain_at(0, 0), GREEN_SAMPLES[0][0] << CORR_DIFF);
        // first pixel of the centre sector sits on the centre sample
        assert_eq!(map.gain_at(960, 540), GREEN_SAMPLES[8][8] << CORR_DIFF);
    }

    #[test]
    fn test_flat_samples_give_flat_map() {
        let flat = [[1024u16; GRID]; GRID];
        let map = GainMap::generate(64, 32, BlockSizing::Uniform, &flat);
        for y in 0..32 {
            for x in 0..64 {
                assert_eq!(map.gain_at(x, y), UNITY_GAIN);
            }
        }
    }

    #[test]
    fn test_uncovered_pixels_keep_unity() {
        // 33 % 16 = 1, so the last column is not covered by any sector
        let map = GainMap::generate(33, 32, BlockSizing::Uniform, &GREEN_SAMPLES);
        assert_eq!(map.gain_at(32, 0), UNITY_GAIN);
    }

    #[test]
    fn test_apply_unity_is_identity() {
        let flat = [[1024u16; GRID]; GRID];
        let map = GainMap::generate(16, 16, BlockSizing::Uniform, &flat);
        let src: Vec<u8> = (0..=255).collect();
        let mut dst = vec![0u8; 256];
        map.apply_luma(&src, 16, &mut dst, 16);
        assert_eq!(src, dst);
    }

    #[test]
    fn test_apply_saturates() {
        assert_eq!(correct(255, u16::MAX), 255);
        assert_eq!(correct(100, UNITY_GAIN * 2), 200);
        assert_eq!(correct(200, UNITY_GAIN * 2), 255);
    }
}
