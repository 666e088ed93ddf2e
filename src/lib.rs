//! Canvas Video Library
//!
//! Video clip playback for canvas hosts: opens a file through FFmpeg, negotiates a
//! decoder output format, converts every decoded frame into a top-down RGBA8888
//! buffer and paces frame advancement against the host's frame clock.

pub mod settings;
pub mod telemetry;
pub mod video;

pub use settings::{SettingsError, VideoSettings};
pub use video::{
    FfmpegReader, FormatFamily, FrameTexture, MediaSession, MemoryTexture, PlaybackState, Player,
    VideoError, VideoPlayer, VideoTexture,
};
