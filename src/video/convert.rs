//! Frame conversion into top-down RGBA8888
//!
//! Each source layout carries its own [`ConvertStrategy`]. All strategies write
//! every byte of the destination: rows or pixels missing from the source are
//! zero-filled, so a short or malformed buffer never leaves stale pixels behind.

use super::format::{ChannelOrder, Packed422, PackedRgb, Planar420, SourceLayout};
use super::reader::SampleView;
use super::rows::RowView;

/// Largest deviation from 1.0 at which a sample step counts as identity
const IDENTITY_STEP_EPSILON: f32 = 0.0005;

/// Decode and output dimensions plus the nearest-neighbor source mapping.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameGeometry {
    pub decode_width: u32,
    pub decode_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    /// Source pixels advanced per output pixel
    pub step_x: f32,
    pub step_y: f32,
    columns: Vec<usize>,
    rows: Vec<usize>,
}

impl FrameGeometry {
    pub fn new(decode: (u32, u32), output: (u32, u32)) -> Self {
        let (decode_width, decode_height) = (decode.0.max(1), decode.1.max(1));
        let (output_width, output_height) = (output.0.max(1), output.1.max(1));
        let step_x = decode_width as f32 / output_width as f32;
        let step_y = decode_height as f32 / output_height as f32;
        Self {
            decode_width,
            decode_height,
            output_width,
            output_height,
            step_x,
            step_y,
            columns: sample_positions(output_width, step_x, decode_width),
            rows: sample_positions(output_height, step_y, decode_height),
        }
    }

    /// True when output pixels map one-to-one onto decoded pixels
    pub fn is_identity(&self) -> bool {
        (self.step_x - 1.0).abs() < IDENTITY_STEP_EPSILON
            && (self.step_y - 1.0).abs() < IDENTITY_STEP_EPSILON
    }

    pub fn output_len(&self) -> usize {
        self.output_width as usize * self.output_height as usize * 4
    }

    fn row_bytes(&self) -> usize {
        self.output_width as usize * 4
    }
}

/// Source index for each output position, accumulated the way a scanline walker steps.
fn sample_positions(count: u32, step: f32, limit: u32) -> Vec<usize> {
    let last = limit.saturating_sub(1) as usize;
    let mut position = 0.0f32;
    (0..count)
        .map(|_| {
            let index = (position as usize).min(last);
            position += step;
            index
        })
        .collect()
}

/// Converts one locked sample into RGBA. Returns whether any source data was read.
pub trait ConvertStrategy {
    fn convert(&self, src: &SampleView<'_>, geometry: &FrameGeometry, dst: &mut [u8]) -> bool;
}

impl ConvertStrategy for PackedRgb {
    fn convert(&self, src: &SampleView<'_>, geometry: &FrameGeometry, dst: &mut [u8]) -> bool {
        let bpp = self.bytes_per_pixel;
        let decode_width = geometry.decode_width as usize;
        let rows = RowView::new(src.bytes(), src.stride(), geometry.decode_height as usize);
        let identity = geometry.is_identity();
        let mut had_data = false;

        for (y, dst_row) in dst.chunks_exact_mut(geometry.row_bytes()).enumerate() {
            let Some(row) = rows.row(geometry.rows[y], decode_width * bpp) else {
                dst_row.fill(0);
                continue;
            };
            let available = (row.len() / bpp).min(decode_width);
            if available == 0 {
                dst_row.fill(0);
                continue;
            }
            had_data = true;

            if identity {
                let copied = available.min(geometry.output_width as usize);
                for (out, px) in dst_row.chunks_exact_mut(4).zip(row.chunks_exact(bpp)) {
                    self.write_pixel(px, out);
                }
                dst_row[copied * 4..].fill(0);
            } else {
                for (x, out) in dst_row.chunks_exact_mut(4).enumerate() {
                    let sx = geometry.columns[x];
                    if sx >= available {
                        out.fill(0);
                        continue;
                    }
                    self.write_pixel(&row[sx * bpp..(sx + 1) * bpp], out);
                }
            }
        }
        had_data
    }
}

impl PackedRgb {
    fn write_pixel(&self, px: &[u8], out: &mut [u8]) {
        let (r, g, b) = match self.order {
            ChannelOrder::Bgr => (px[2], px[1], px[0]),
            ChannelOrder::Rgb => (px[0], px[1], px[2]),
        };
        let mut a = if self.has_alpha && px.len() > 3 {
            px[3]
        } else {
            255
        };
        if self.force_opaque && a == 0 {
            a = 255;
        }
        out.copy_from_slice(&[r, g, b, a]);
    }
}

impl ConvertStrategy for Planar420 {
    fn convert(&self, src: &SampleView<'_>, geometry: &FrameGeometry, dst: &mut [u8]) -> bool {
        let pitch = src.stride().unsigned_abs();
        let width = geometry.decode_width as usize;
        let height = geometry.decode_height as usize;
        let chroma_height = height.div_ceil(2);
        let luma_len = pitch * height;

        if pitch < width || src.len() < luma_len + pitch * chroma_height {
            dst.fill(0);
            return false;
        }

        let (luma, chroma) = src.bytes().split_at(luma_len);
        let luma = RowView::new(luma, src.stride(), height);
        let chroma = RowView::new(chroma, src.stride(), chroma_height);
        let chroma_span = width.div_ceil(2) * 2;
        let mut had_data = false;

        for (y, dst_row) in dst.chunks_exact_mut(geometry.row_bytes()).enumerate() {
            let sy = geometry.rows[y];
            let (Some(luma_row), Some(chroma_row)) =
                (luma.row(sy, width), chroma.row(sy / 2, chroma_span))
            else {
                dst_row.fill(0);
                continue;
            };
            had_data = true;

            for (x, out) in dst_row.chunks_exact_mut(4).enumerate() {
                let sx = geometry.columns[x];
                let (Some(&luma_sample), Some(uv)) =
                    (luma_row.get(sx), chroma_row.get((sx / 2) * 2..(sx / 2) * 2 + 2))
                else {
                    out.fill(0);
                    continue;
                };
                out.copy_from_slice(&yuv_to_rgba(luma_sample, uv[0], uv[1]));
            }
        }
        had_data
    }
}

impl ConvertStrategy for Packed422 {
    fn convert(&self, src: &SampleView<'_>, geometry: &FrameGeometry, dst: &mut [u8]) -> bool {
        let pitch = src.stride().unsigned_abs();
        let width = geometry.decode_width as usize;
        let height = geometry.decode_height as usize;
        let row_span = width.div_ceil(2) * 4;

        if pitch < row_span || src.len() < pitch * height {
            dst.fill(0);
            return false;
        }

        let rows = RowView::new(src.bytes(), src.stride(), height);
        let mut had_data = false;

        for (y, dst_row) in dst.chunks_exact_mut(geometry.row_bytes()).enumerate() {
            let Some(row) = rows.row(geometry.rows[y], row_span) else {
                dst_row.fill(0);
                continue;
            };
            had_data = true;

            for (x, out) in dst_row.chunks_exact_mut(4).enumerate() {
                let sx = geometry.columns[x];
                let base = (sx / 2) * 4;
                let Some(macropixel) = row.get(base..base + 4) else {
                    out.fill(0);
                    continue;
                };
                let luma = if sx % 2 == 0 { macropixel[0] } else { macropixel[2] };
                out.copy_from_slice(&yuv_to_rgba(luma, macropixel[1], macropixel[3]));
            }
        }
        had_data
    }
}

/// Studio-swing BT.601 YUV to opaque RGBA in 8.8 fixed point.
pub fn yuv_to_rgba(y: u8, u: u8, v: u8) -> [u8; 4] {
    let c = (i32::from(y) - 16).max(0);
    let d = i32::from(u) - 128;
    let e = i32::from(v) - 128;

    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;

    [clamp_u8(r), clamp_u8(g), clamp_u8(b), 255]
}

fn clamp_u8(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

/// Converts samples of a negotiated layout into a player's RGBA buffer.
#[derive(Debug, Clone)]
pub struct FrameConverter {
    layout: SourceLayout,
    geometry: FrameGeometry,
}

impl FrameConverter {
    pub fn new(layout: SourceLayout, geometry: FrameGeometry) -> Self {
        Self { layout, geometry }
    }

    pub fn geometry(&self) -> &FrameGeometry {
        &self.geometry
    }

    /// Fill `dst` from `src`. Every byte of `dst` is written.
    ///
    /// Returns `false` when no source data could be read, in which case the
    /// frame is entirely zero.
    pub fn convert(&self, src: &SampleView<'_>, dst: &mut [u8]) -> bool {
        if dst.len() != self.geometry.output_len() || src.is_empty() {
            dst.fill(0);
            return false;
        }
        match &self.layout {
            SourceLayout::PackedRgb(strategy) => strategy.convert(src, &self.geometry, dst),
            SourceLayout::Planar420(strategy) => strategy.convert(src, &self.geometry, dst),
            SourceLayout::Packed422(strategy) => strategy.convert(src, &self.geometry, dst),
        }
    }
}

/// Diagnostic gradient shown when no frame could be decoded:
/// red ramps left to right, blue ramps top to bottom.
pub fn fill_gradient(dst: &mut [u8], width: u32, height: u32) {
    let (width, height) = (width.max(1) as usize, height.max(1) as usize);
    for (y, row) in dst.chunks_exact_mut(width * 4).take(height).enumerate() {
        let blue = (y * 255 / height) as u8;
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&[(x * 255 / width) as u8, 0, blue, 255]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::format::FormatFamily;

    fn converter(family: FormatFamily, decode: (u32, u32), output: (u32, u32)) -> FrameConverter {
        FrameConverter::new(family.layout(), FrameGeometry::new(decode, output))
    }

    #[test]
    fn test_geometry_steps() {
        let geometry = FrameGeometry::new((1920, 1080), (640, 360));
        assert!((geometry.step_x - 3.0).abs() < 1e-6);
        assert!((geometry.step_y - 3.0).abs() < 1e-6);
        assert!(!geometry.is_identity());
        assert_eq!(geometry.columns[1], 3);
        assert_eq!(geometry.columns[639], 1917);
        assert!(FrameGeometry::new((640, 360), (640, 360)).is_identity());
    }

    #[test]
    fn test_packed_bgra_channel_order() {
        let conv = converter(FormatFamily::Argb32, (1, 1), (1, 1));
        let mut out = [0u8; 4];
        assert!(conv.convert(&SampleView::new(&[10, 20, 30, 40], 4), &mut out));
        assert_eq!(out, [30, 20, 10, 40]);

        let conv = converter(FormatFamily::Rgba32, (1, 1), (1, 1));
        assert!(conv.convert(&SampleView::new(&[10, 20, 30, 40], 4), &mut out));
        assert_eq!(out, [10, 20, 30, 40]);
    }

    #[test]
    fn test_force_opaque_only_rewrites_zero_alpha() {
        let conv = converter(FormatFamily::Abgr32, (2, 1), (2, 1));
        let mut out = [0u8; 8];
        conv.convert(&SampleView::new(&[1, 2, 3, 0, 4, 5, 6, 7], 8), &mut out);
        assert_eq!(out, [1, 2, 3, 255, 4, 5, 6, 7]);

        // Padding byte of BGRX is never read as alpha
        let conv = converter(FormatFamily::Rgb32, (1, 1), (1, 1));
        let mut out = [0u8; 4];
        conv.convert(&SampleView::new(&[1, 2, 3, 9], 4), &mut out);
        assert_eq!(out, [3, 2, 1, 255]);
    }

    #[test]
    fn test_rgb24_pixels() {
        let conv = converter(FormatFamily::Rgb24, (2, 1), (2, 1));
        let mut out = [0u8; 8];
        conv.convert(&SampleView::new(&[1, 2, 3, 4, 5, 6], 6), &mut out);
        assert_eq!(out, [3, 2, 1, 255, 6, 5, 4, 255]);
    }

    #[test]
    fn test_nearest_neighbor_downscale() {
        // 4x2 source, each pixel's blue byte is its column index
        let mut src = Vec::new();
        for y in 0..2u8 {
            for x in 0..4u8 {
                src.extend_from_slice(&[x, y, 0, 255]);
            }
        }
        let conv = converter(FormatFamily::Argb32, (4, 2), (2, 1));
        let mut out = [0u8; 8];
        assert!(conv.convert(&SampleView::new(&src, 16), &mut out));
        assert_eq!(out, [0, 0, 0, 255, 0, 0, 2, 255]);
    }

    #[test]
    fn test_downscale_short_row_zero_fills_missing_columns() {
        // 4x1 decode but only the first pixel is present
        let conv = converter(FormatFamily::Argb32, (4, 1), (2, 1));
        let mut out = [0xAAu8; 8];
        assert!(conv.convert(&SampleView::new(&[10, 20, 30, 255], 16), &mut out));
        assert_eq!(out, [30, 20, 10, 255, 0, 0, 0, 0]);
    }

    #[test]
    fn test_bottom_up_stride_flips_rows() {
        // Row 0 in memory is the bottom of the image
        let src = [1, 1, 1, 255, 2, 2, 2, 255];
        let conv = converter(FormatFamily::Argb32, (1, 2), (1, 2));
        let mut out = [0u8; 8];
        conv.convert(&SampleView::new(&src, -4), &mut out);
        assert_eq!(out, [2, 2, 2, 255, 1, 1, 1, 255]);
    }

    #[test]
    fn test_short_buffer_zero_fills_missing_rows() {
        let src = [9u8; 4];
        let conv = converter(FormatFamily::Argb32, (1, 3), (1, 3));
        let mut out = [0xAAu8; 12];
        assert!(conv.convert(&SampleView::new(&src, 4), &mut out));
        assert_eq!(&out[..4], &[9, 9, 9, 9]);
        assert!(out[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_nv12_white_frame() {
        let (w, h) = (4usize, 4usize);
        let mut src = vec![235u8; w * h];
        src.extend(std::iter::repeat(128u8).take(w * h / 2));
        let conv = converter(FormatFamily::Nv12, (4, 4), (4, 4));
        let mut out = vec![0u8; w * h * 4];
        assert!(conv.convert(&SampleView::new(&src, w as isize), &mut out));
        assert!(out.chunks_exact(4).all(|px| px == [255, 255, 255, 255]));
    }

    #[test]
    fn test_nv12_chroma_shared_by_pixel_pairs() {
        // 2x2 luma, one UV pair covering every pixel
        let src = [16, 16, 16, 16, 90, 240];
        let conv = converter(FormatFamily::Nv12, (2, 2), (2, 2));
        let mut out = [0u8; 16];
        conv.convert(&SampleView::new(&src, 2), &mut out);
        let expected = yuv_to_rgba(16, 90, 240);
        assert!(out.chunks_exact(4).all(|px| px == expected));
    }

    #[test]
    fn test_nv12_undersized_buffer_zero_fills_frame() {
        let src = [235u8; 10];
        let conv = converter(FormatFamily::Nv12, (4, 4), (4, 4));
        let mut out = vec![0xFFu8; 64];
        assert!(!conv.convert(&SampleView::new(&src, 4), &mut out));
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_yuy2_macropixel_unpacking() {
        // Y0 U Y1 V
        let src = [16, 128, 235, 128];
        let conv = converter(FormatFamily::Yuy2, (2, 1), (2, 1));
        let mut out = [0u8; 8];
        assert!(conv.convert(&SampleView::new(&src, 4), &mut out));
        assert_eq!(&out[..4], &[0, 0, 0, 255]);
        assert_eq!(&out[4..], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_yuy2_undersized_buffer_zero_fills_frame() {
        // 4x2 needs two 8-byte rows
        let src = [235u8, 128, 235, 128, 235, 128, 235, 128];
        let conv = converter(FormatFamily::Yuy2, (4, 2), (4, 2));
        let mut out = vec![0xFFu8; 32];
        assert!(!conv.convert(&SampleView::new(&src, 8), &mut out));
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_yuy2_pitch_narrower_than_row_is_rejected() {
        let src = [235u8; 16];
        let conv = converter(FormatFamily::Yuy2, (4, 1), (4, 1));
        let mut out = vec![0xFFu8; 16];
        assert!(!conv.convert(&SampleView::new(&src, 4), &mut out));
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_yuv_coefficients() {
        assert_eq!(yuv_to_rgba(235, 128, 128), [255, 255, 255, 255]);
        assert_eq!(yuv_to_rgba(16, 128, 128), [0, 0, 0, 255]);
        assert_eq!(yuv_to_rgba(0, 128, 128), [0, 0, 0, 255]);
        // Saturated red clamps instead of wrapping
        let red = yuv_to_rgba(81, 90, 240);
        assert_eq!(red[0], 255);
        assert!(red[1] < 10 && red[2] < 10);
    }

    #[test]
    fn test_mismatched_destination_is_cleared() {
        let conv = converter(FormatFamily::Argb32, (1, 1), (1, 1));
        let mut out = [0xFFu8; 8];
        assert!(!conv.convert(&SampleView::new(&[1, 2, 3, 4], 4), &mut out));
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_gradient_fill() {
        let mut out = vec![0u8; 4 * 4 * 2];
        fill_gradient(&mut out, 4, 2);
        assert_eq!(&out[..4], &[0, 0, 0, 255]);
        // x = 3 of 4 -> 191, y = 1 of 2 -> 127
        let last = &out[out.len() - 4..];
        assert_eq!(last, &[191, 0, 127, 255]);
    }
}
