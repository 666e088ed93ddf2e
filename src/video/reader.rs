//! Sample reader seam
//!
//! [`SampleReader`] is the narrow surface the player needs from a decoding
//! backend: format negotiation, sequential frame reads and seeking. The FFmpeg
//! backend lives in `decoder.rs`; tests drive the player with a scripted reader.

use super::error::VideoError;
use super::format::FormatFamily;

/// Result of a single read request
#[derive(Debug)]
pub enum ReadOutcome<S> {
    /// A decoded frame
    Sample(S),
    /// No further frames until the reader is repositioned
    EndOfStream,
    /// The reader advanced without producing a frame (stream gap)
    StreamTick,
}

/// Output media type a reader actually configured
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputType {
    /// `None` when the reader settled on a layout outside the candidate set
    pub family: Option<FormatFamily>,
    pub width: u32,
    pub height: u32,
    /// Signed row pitch; negative means rows are stored bottom-up
    pub stride: Option<isize>,
    /// Frame rate as numerator/denominator
    pub frame_rate: Option<(u32, u32)>,
}

pub trait SampleReader {
    type Sample<'a>: SampleBuffer
    where
        Self: 'a;

    /// Native frame size of the selected video stream, if known
    fn native_size(&mut self) -> Option<(u32, u32)>;

    /// Ask the reader to deliver `family` frames, optionally scaled to `size`.
    fn try_output(
        &mut self,
        family: FormatFamily,
        size: Option<(u32, u32)>,
    ) -> Result<(), VideoError>;

    /// The output type in effect after a successful [`SampleReader::try_output`]
    fn current_output(&self) -> Result<OutputType, VideoError>;

    /// Stream duration in seconds, `0.0` when unknown
    fn duration_seconds(&self) -> f64;

    fn read_sample(&mut self) -> Result<ReadOutcome<Self::Sample<'_>>, VideoError>;

    fn seek(&mut self, seconds: f64) -> Result<(), VideoError>;
}

/// A decoded frame that may live on the GPU or in system memory
pub trait SampleBuffer {
    /// Presentation time in seconds
    fn presentation_time(&self) -> Option<f64>;

    /// Whether the frame is backed by a hardware surface that can be staged
    fn has_gpu_surface(&self) -> bool;

    /// Copy the hardware surface into a CPU readable staging surface
    fn copy_to_staging(&mut self) -> Result<StagingSurface, VideoError>;

    /// Lock the frame bytes for reading. Rows are laid out with the negotiated stride.
    fn lock(&mut self) -> Result<&[u8], VideoError>;

    fn unlock(&mut self);
}

/// Borrowed view over locked frame bytes
#[derive(Debug, Clone, Copy)]
pub struct SampleView<'a> {
    bytes: &'a [u8],
    stride: isize,
}

impl<'a> SampleView<'a> {
    pub fn new(bytes: &'a [u8], stride: isize) -> Self {
        Self { bytes, stride }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn stride(&self) -> isize {
        self.stride
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// CPU copy of a hardware frame
#[derive(Debug)]
pub struct StagingSurface {
    data: Vec<u8>,
    row_pitch: usize,
    mapped: bool,
}

impl StagingSurface {
    pub fn new(data: Vec<u8>, row_pitch: usize) -> Self {
        Self {
            data,
            row_pitch,
            mapped: false,
        }
    }

    pub fn row_pitch(&self) -> usize {
        self.row_pitch
    }

    /// Map the staged bytes. The view stride is the surface row pitch.
    pub fn map(&mut self) -> Result<SampleView<'_>, VideoError> {
        if self.data.is_empty() || self.row_pitch == 0 {
            return Err(VideoError::sample_read(
                "StagingSurface::map",
                "staging surface is empty",
            ));
        }
        self.mapped = true;
        Ok(SampleView::new(&self.data, self.row_pitch as isize))
    }

    pub fn unmap(&mut self) {
        self.mapped = false;
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }
}
