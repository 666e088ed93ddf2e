//! Source pixel formats
//!
//! Every candidate output format belongs to one of three layout families:
//! packed RGB (32 or 24 bits), planar 4:2:0 (NV12) and packed 4:2:2 (YUY2).

use std::fmt;

use ffmpeg_next::format::Pixel;

/// Pixel formats the negotiator may request from a reader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatFamily {
    /// 32-bit BGRX, padding byte ignored
    Rgb32,
    /// 32-bit BGRA
    Argb32,
    /// 32-bit RGBA
    Rgba32,
    /// 32-bit RGBX, padding byte may be zero
    Abgr32,
    /// 8-bit luma plane followed by an interleaved UV plane at half resolution
    Nv12,
    /// Y0 U Y1 V macropixels
    Yuy2,
    /// 24-bit BGR
    Rgb24,
}

impl FormatFamily {
    /// Negotiation order used when no preference is configured
    pub const DEFAULT_PRIORITY: [FormatFamily; 7] = [
        FormatFamily::Rgb32,
        FormatFamily::Argb32,
        FormatFamily::Rgba32,
        FormatFamily::Abgr32,
        FormatFamily::Nv12,
        FormatFamily::Yuy2,
        FormatFamily::Rgb24,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormatFamily::Rgb32 => "RGB32",
            FormatFamily::Argb32 => "ARGB32",
            FormatFamily::Rgba32 => "RGBA32",
            FormatFamily::Abgr32 => "ABGR32",
            FormatFamily::Nv12 => "NV12",
            FormatFamily::Yuy2 => "YUY2",
            FormatFamily::Rgb24 => "RGB24",
        }
    }

    /// Case-insensitive inverse of [`FormatFamily::label`]
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim();
        Self::DEFAULT_PRIORITY
            .into_iter()
            .find(|family| family.label().eq_ignore_ascii_case(label))
    }

    /// Bytes per pixel for packed RGB, bytes per luma sample for NV12,
    /// bytes per pixel averaged over a macropixel for YUY2.
    pub fn bytes_per_unit(self) -> usize {
        match self {
            FormatFamily::Rgb32
            | FormatFamily::Argb32
            | FormatFamily::Rgba32
            | FormatFamily::Abgr32 => 4,
            FormatFamily::Rgb24 => 3,
            FormatFamily::Nv12 => 1,
            FormatFamily::Yuy2 => 2,
        }
    }

    /// FFmpeg pixel format with the same memory layout
    pub fn pixel(self) -> Pixel {
        match self {
            FormatFamily::Rgb32 => Pixel::BGRZ,
            FormatFamily::Argb32 => Pixel::BGRA,
            FormatFamily::Rgba32 => Pixel::RGBA,
            FormatFamily::Abgr32 => Pixel::RGBZ,
            FormatFamily::Nv12 => Pixel::NV12,
            FormatFamily::Yuy2 => Pixel::YUYV422,
            FormatFamily::Rgb24 => Pixel::BGR24,
        }
    }

    pub fn from_pixel(pixel: Pixel) -> Option<Self> {
        Self::DEFAULT_PRIORITY
            .into_iter()
            .find(|family| family.pixel() == pixel)
    }

    /// Layout descriptor driving frame conversion
    pub fn layout(self) -> SourceLayout {
        let packed = |order, has_alpha, force_opaque, bytes_per_pixel| {
            SourceLayout::PackedRgb(PackedRgb {
                order,
                has_alpha,
                force_opaque,
                bytes_per_pixel,
            })
        };
        match self {
            FormatFamily::Rgb32 => packed(ChannelOrder::Bgr, false, true, 4),
            FormatFamily::Argb32 => packed(ChannelOrder::Bgr, true, false, 4),
            FormatFamily::Rgba32 => packed(ChannelOrder::Rgb, true, false, 4),
            FormatFamily::Abgr32 => packed(ChannelOrder::Rgb, true, true, 4),
            FormatFamily::Rgb24 => packed(ChannelOrder::Bgr, false, true, 3),
            FormatFamily::Nv12 => SourceLayout::Planar420(Planar420),
            FormatFamily::Yuy2 => SourceLayout::Packed422(Packed422),
        }
    }

    /// Bytes per row of a tightly packed frame of the given width
    pub fn default_stride(self, width: u32) -> usize {
        let width = width as usize;
        match self {
            FormatFamily::Nv12 => width.div_ceil(2) * 2,
            FormatFamily::Yuy2 => width.div_ceil(2) * 4,
            _ => width * self.bytes_per_unit(),
        }
    }
}

impl fmt::Display for FormatFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Byte order of the color channels in a packed RGB pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Bgr,
    Rgb,
}

/// Packed RGB pixels, 3 or 4 bytes each
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedRgb {
    pub order: ChannelOrder,
    /// The fourth byte carries alpha
    pub has_alpha: bool,
    /// A zero alpha byte is written as 255
    pub force_opaque: bool,
    pub bytes_per_pixel: usize,
}

/// NV12: luma plane, then interleaved UV at half width and half height
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Planar420;

/// YUY2: 4-byte macropixels covering two horizontal pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packed422;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceLayout {
    PackedRgb(PackedRgb),
    Planar420(Planar420),
    Packed422(Packed422),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_round_trip() {
        for family in FormatFamily::DEFAULT_PRIORITY {
            assert_eq!(FormatFamily::from_label(family.label()), Some(family));
        }
        assert_eq!(FormatFamily::from_label(" nv12 "), Some(FormatFamily::Nv12));
        assert_eq!(FormatFamily::from_label("P010"), None);
    }

    #[test]
    fn test_layout_descriptors() {
        match FormatFamily::Rgb32.layout() {
            SourceLayout::PackedRgb(desc) => {
                assert_eq!(desc.order, ChannelOrder::Bgr);
                assert!(!desc.has_alpha);
                assert!(desc.force_opaque);
            }
            other => panic!("unexpected layout {:?}", other),
        }
        match FormatFamily::Abgr32.layout() {
            SourceLayout::PackedRgb(desc) => {
                assert_eq!(desc.order, ChannelOrder::Rgb);
                assert!(desc.has_alpha && desc.force_opaque);
            }
            other => panic!("unexpected layout {:?}", other),
        }
        assert_eq!(FormatFamily::Nv12.layout(), SourceLayout::Planar420(Planar420));
        assert_eq!(FormatFamily::Yuy2.layout(), SourceLayout::Packed422(Packed422));
    }

    #[test]
    fn test_default_stride() {
        assert_eq!(FormatFamily::Rgb32.default_stride(5), 20);
        assert_eq!(FormatFamily::Rgb24.default_stride(5), 15);
        assert_eq!(FormatFamily::Nv12.default_stride(5), 6);
        assert_eq!(FormatFamily::Yuy2.default_stride(5), 12);
        assert_eq!(FormatFamily::Yuy2.default_stride(4), 8);
    }
}
