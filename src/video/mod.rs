//! Video playback module
//!
//! Opens clips through FFmpeg, negotiates a decoder output format, converts
//! each decoded frame to top-down RGBA8888 and paces frame advancement against
//! the host clock. Frames reach the GPU through [`VideoTexture`] or stay in
//! system memory with [`MemoryTexture`].

mod access;
mod convert;
mod decoder;
mod error;
mod format;
mod negotiate;
mod pacer;
mod player;
mod reader;
mod rows;
mod session;
mod texture;

#[cfg(test)]
mod mock;

pub use access::{with_sample_view, AccessKind, CpuMapped, GpuStaged, SampleAccess};
pub use convert::{fill_gradient, yuv_to_rgba, ConvertStrategy, FrameConverter, FrameGeometry};
pub use decoder::{FfmpegReader, FfmpegSample, HwAccelMethod, ReaderOptions};
pub use error::VideoError;
pub use format::{ChannelOrder, FormatFamily, Packed422, PackedRgb, Planar420, SourceLayout};
pub use negotiate::{fit_within, frame_duration, negotiate, scaled_decode_size, DecodeLimits, Negotiation};
pub use pacer::{PlaybackClock, PlaybackState, Step, TickReport};
pub use player::{Player, VideoInfo, VideoPlayer};
pub use reader::{OutputType, ReadOutcome, SampleBuffer, SampleReader, SampleView, StagingSurface};
pub use rows::RowView;
pub use session::MediaSession;
pub use texture::{FrameTexture, MemoryTexture, VideoTexture};
