//! Output format negotiation
//!
//! Walks the candidate list in priority order, first asking the reader for a
//! pre-scaled decode so large sources are downscaled by the decoder, then at
//! native size. The first accepted candidate wins; the descriptor is always
//! rebuilt from what the reader reports it actually configured.

use super::convert::FrameGeometry;
use super::error::VideoError;
use super::format::{FormatFamily, SourceLayout};
use super::reader::SampleReader;

/// Bounds on decoded and displayed frame size plus timing defaults.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeLimits {
    pub max_width: u32,
    pub max_height: u32,
    /// Used when the stream does not report a frame rate
    pub default_frame_rate: (u32, u32),
    pub min_frame_duration: f32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_width: 640,
            max_height: 480,
            default_frame_rate: (30, 1),
            min_frame_duration: 1.0 / 120.0,
        }
    }
}

/// Outcome of a successful negotiation
#[derive(Debug, Clone)]
pub struct Negotiation {
    pub family: FormatFamily,
    pub layout: SourceLayout,
    /// Signed row pitch of delivered samples, never zero
    pub stride: isize,
    pub geometry: FrameGeometry,
    /// Seconds per frame
    pub frame_duration: f32,
    /// The reader accepted a pre-scaled decode size
    pub scaled_decode: bool,
}

/// Largest size fitting `limits` with the source aspect, rounded down.
pub fn fit_within(size: (u32, u32), limits: &DecodeLimits) -> (u32, u32) {
    let (width, height) = (u64::from(size.0.max(1)), u64::from(size.1.max(1)));
    let (max_w, max_h) = (u64::from(limits.max_width), u64::from(limits.max_height));
    if width <= max_w && height <= max_h {
        return (width as u32, height as u32);
    }
    // Integer form of floor(dimension * min(max_w / width, max_h / height))
    let (w, h) = if width * max_h >= height * max_w {
        (max_w, height * max_w / width)
    } else {
        (width * max_h / height, max_h)
    };
    (w.max(1) as u32, h.max(1) as u32)
}

/// Decoder-side target for a native size exceeding the limits: the fitted
/// size with each dimension even and at least 2. `None` when no scaling is needed.
pub fn scaled_decode_size(native: (u32, u32), limits: &DecodeLimits) -> Option<(u32, u32)> {
    if native.0 <= limits.max_width && native.1 <= limits.max_height {
        return None;
    }
    let (w, h) = fit_within(native, limits);
    let even = |v: u32| (v & !1).max(2);
    Some((even(w), even(h)))
}

/// Seconds per frame from a rate, clamped to `min_frame_duration`.
pub fn frame_duration(rate: Option<(u32, u32)>, limits: &DecodeLimits) -> f32 {
    let (num, den) = match rate {
        Some((num, den)) if num > 0 && den > 0 => (num, den),
        _ => limits.default_frame_rate,
    };
    let duration = if num > 0 && den > 0 {
        (f64::from(den) / f64::from(num)) as f32
    } else {
        1.0 / 30.0
    };
    duration.max(limits.min_frame_duration)
}

pub fn negotiate<R: SampleReader>(
    reader: &mut R,
    candidates: &[FormatFamily],
    limits: &DecodeLimits,
) -> Result<Negotiation, VideoError> {
    let scaled = reader
        .native_size()
        .and_then(|native| scaled_decode_size(native, limits));

    let mut last_error = None;
    let mut accepted = None;
    'candidates: for &family in candidates {
        for size in scaled.into_iter().map(Some).chain([None]) {
            match reader.try_output(family, size) {
                Ok(()) => {
                    accepted = Some((family, size.is_some()));
                    break 'candidates;
                }
                Err(err) => {
                    tracing::debug!(format = %family, ?size, error = %err, "Output format rejected");
                    last_error = Some(err);
                }
            }
        }
    }

    let Some((requested, scaled_decode)) = accepted else {
        return Err(match last_error {
            Some(err @ VideoError::FormatNegotiation { .. }) => err,
            Some(err) => VideoError::negotiation("set output type", err),
            None => VideoError::negotiation("set output type", "no candidate formats"),
        });
    };

    let actual = reader.current_output()?;
    if actual.width == 0 || actual.height == 0 {
        return Err(VideoError::FrameSizeUnavailable(format!(
            "reader reported {}x{}",
            actual.width, actual.height
        )));
    }
    let family = actual.family.unwrap_or(requested);
    let decode = (actual.width, actual.height);
    let output = fit_within(decode, limits);
    let stride = match actual.stride {
        Some(stride) if stride != 0 => stride,
        _ => family.default_stride(actual.width) as isize,
    };

    tracing::info!(
        format = %family,
        decode_width = decode.0,
        decode_height = decode.1,
        output_width = output.0,
        output_height = output.1,
        stride,
        scaled_decode,
        "Negotiated video output"
    );

    Ok(Negotiation {
        family,
        layout: family.layout(),
        stride,
        geometry: FrameGeometry::new(decode, output),
        frame_duration: frame_duration(actual.frame_rate, limits),
        scaled_decode,
    })
}
