//! Host-driven video player
//!
//! A [`Player`] owns one reader, its RGBA buffer and the texture mirroring it.
//! Everything runs on the caller's thread: the host calls [`Player::update`]
//! once per tick and the pacer decides how many frames to step through.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use super::access::with_sample_view;
use super::convert::{fill_gradient, FrameConverter, FrameGeometry};
use super::decoder::{FfmpegReader, ReaderOptions};
use super::error::VideoError;
use super::format::FormatFamily;
use super::negotiate::negotiate;
use super::pacer::{PlaybackClock, PlaybackState, Step};
use super::reader::{ReadOutcome, SampleBuffer, SampleReader};
use super::session::{MediaSession, SessionLease};
use super::texture::{FrameTexture, MemoryTexture, VideoTexture};
use crate::settings::VideoSettings;
use crate::telemetry::{ConversionMetrics, ConversionStats};

/// Clip metadata fixed at load time
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub format: FormatFamily,
    pub decode_width: u32,
    pub decode_height: u32,
    pub output_width: u32,
    pub output_height: u32,
    /// Seconds per frame
    pub frame_duration: f32,
    /// Seconds, `0.0` when unknown
    pub duration: f64,
    /// The decoder downscaled to the decode size
    pub scaled_decode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameRead {
    Produced,
    EndOfStream,
    Failed,
}

/// Reader, pixel buffer and texture. Fields drop in declaration order.
struct FramePipeline<R, T> {
    reader: R,
    pixels: Vec<u8>,
    texture: T,
    converter: FrameConverter,
    /// Negotiated row pitch of CPU-mapped samples
    stride: isize,
    prefer_gpu: bool,
    duration: f64,
    position: f64,
    ready: bool,
    metrics: ConversionMetrics,
    lease: SessionLease,
}

impl<R: SampleReader, T: FrameTexture> FramePipeline<R, T> {
    /// Read and convert one frame. With `advance` set the position only moves
    /// forward; otherwise it jumps to the frame's timestamp.
    fn read_frame(&mut self, advance: bool) -> FrameRead {
        let mut sample = match self.reader.read_sample() {
            Ok(ReadOutcome::Sample(sample)) => sample,
            Ok(ReadOutcome::EndOfStream) => return FrameRead::EndOfStream,
            Ok(ReadOutcome::StreamTick) => return FrameRead::Failed,
            Err(err) => {
                self.lease.session().record_error(&err);
                return FrameRead::Failed;
            }
        };

        let pts = sample.presentation_time();
        let started = Instant::now();
        let converter = &self.converter;
        let pixels = &mut self.pixels;
        let result = with_sample_view(&mut sample, self.stride, self.prefer_gpu, |view| {
            converter.convert(view, pixels)
        });
        drop(sample);

        let (had_data, access) = match result {
            Ok(converted) => converted,
            Err(err) => {
                self.lease.session().record_error(&err);
                return FrameRead::Failed;
            }
        };

        self.texture.upload(&self.pixels);
        self.ready = true;
        if had_data {
            self.metrics.record_decoded(started.elapsed(), access);
        } else {
            tracing::debug!(?pts, "Sample held no readable data, frame zero-filled");
            self.metrics.record_fallback(Some(access));
        }
        if let Some(pts) = pts {
            self.set_position(pts, advance);
        }
        FrameRead::Produced
    }

    fn set_position(&mut self, seconds: f64, advance: bool) {
        let seconds = self.clamp_time(seconds);
        self.position = if advance {
            self.position.max(seconds)
        } else {
            seconds
        };
    }

    fn clamp_time(&self, seconds: f64) -> f64 {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        if self.duration > 0.0 {
            seconds.min(self.duration)
        } else {
            seconds
        }
    }

    fn seek(&mut self, seconds: f64) -> Result<(), VideoError> {
        self.reader.seek(seconds).inspect_err(|err| {
            self.lease.session().record_error(err);
        })
    }

    /// One pacer step: read the next frame, wrapping to the start when looping.
    fn step(&mut self, looping: bool) -> Step {
        match self.read_frame(true) {
            FrameRead::Produced => Step::Advanced,
            FrameRead::Failed => Step::Stalled,
            FrameRead::EndOfStream if looping => {
                if self.seek(0.0).is_err() {
                    return Step::Stalled;
                }
                tracing::debug!("Looping to start");
                self.position = 0.0;
                match self.read_frame(false) {
                    FrameRead::Produced => Step::Advanced,
                    _ => Step::Stalled,
                }
            }
            FrameRead::EndOfStream => Step::EndOfStream,
        }
    }

    /// Fill the buffer with the diagnostic gradient so the texture is never invalid.
    fn show_gradient(&mut self) {
        let geometry = self.converter.geometry();
        fill_gradient(&mut self.pixels, geometry.output_width, geometry.output_height);
        self.texture.upload(&self.pixels);
        self.ready = true;
        self.metrics.record_fallback(None);
    }
}

/// A loaded video clip
pub struct Player<R: SampleReader, T: FrameTexture> {
    pipeline: FramePipeline<R, T>,
    clock: PlaybackClock,
    state: PlaybackState,
    looping: bool,
    format: FormatFamily,
    scaled_decode: bool,
}

/// Player decoding through FFmpeg
pub type VideoPlayer<T = VideoTexture> = Player<FfmpegReader, T>;

impl<T: FrameTexture> Player<FfmpegReader, T> {
    /// Open `path` with FFmpeg and load it.
    ///
    /// On failure the message is also stored in the session's last-error slot.
    pub fn open<F>(
        session: &MediaSession,
        path: &Path,
        settings: &VideoSettings,
        make_texture: F,
    ) -> Result<Self, VideoError>
    where
        F: FnOnce(u32, u32) -> Result<T, VideoError>,
    {
        session.clear_last_error();
        let reader = session
            .ensure_active()
            .and_then(|()| FfmpegReader::open(path, ReaderOptions::from(settings)))
            .inspect_err(|err| session.record_error(err))?;
        Self::load(session, reader, settings, make_texture)
    }
}

impl Player<FfmpegReader, VideoTexture> {
    /// Open `path` and upload frames to a wgpu texture on `device`.
    pub fn open_gpu(
        session: &MediaSession,
        path: &Path,
        settings: &VideoSettings,
        device: &wgpu::Device,
        queue: Arc<wgpu::Queue>,
    ) -> Result<Self, VideoError> {
        Self::open(session, path, settings, |width, height| {
            VideoTexture::new(device, queue, width, height)
        })
    }
}

impl Player<FfmpegReader, MemoryTexture> {
    /// Open `path` keeping frames in system memory only.
    pub fn open_headless(
        session: &MediaSession,
        path: &Path,
        settings: &VideoSettings,
    ) -> Result<Self, VideoError> {
        Self::open(session, path, settings, MemoryTexture::new)
    }
}

impl<R: SampleReader, T: FrameTexture> Player<R, T> {
    /// Load a clip from an already opened reader.
    ///
    /// Negotiates the output format, allocates the RGBA buffer and texture and
    /// decodes the first frame. If no frame can be decoded even after
    /// rewinding, the texture shows a gradient instead.
    pub fn load<F>(
        session: &MediaSession,
        reader: R,
        settings: &VideoSettings,
        make_texture: F,
    ) -> Result<Self, VideoError>
    where
        F: FnOnce(u32, u32) -> Result<T, VideoError>,
    {
        session.clear_last_error();
        Self::build(session, reader, settings, make_texture)
            .inspect_err(|err| session.record_error(err))
    }

    fn build<F>(
        session: &MediaSession,
        mut reader: R,
        settings: &VideoSettings,
        make_texture: F,
    ) -> Result<Self, VideoError>
    where
        F: FnOnce(u32, u32) -> Result<T, VideoError>,
    {
        session.ensure_active()?;

        let negotiation = negotiate(&mut reader, &settings.candidates(), &settings.decode_limits())?;
        let geometry: FrameGeometry = negotiation.geometry;
        let (width, height) = (geometry.output_width, geometry.output_height);

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(geometry.output_len())
            .map_err(|e| VideoError::BufferAllocation(e.to_string()))?;
        pixels.resize(geometry.output_len(), 0);

        let texture = make_texture(width, height)?;
        if texture.width() != width || texture.height() != height {
            return Err(VideoError::BufferAllocation(format!(
                "texture is {}x{}, expected {}x{}",
                texture.width(),
                texture.height(),
                width,
                height
            )));
        }

        let duration = reader.duration_seconds();
        let duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };

        let mut player = Self {
            pipeline: FramePipeline {
                reader,
                pixels,
                texture,
                converter: FrameConverter::new(negotiation.layout, geometry),
                stride: negotiation.stride,
                prefer_gpu: settings.prefer_gpu_staging,
                duration,
                position: 0.0,
                ready: false,
                metrics: ConversionMetrics::new(),
                lease: session.lease(),
            },
            clock: PlaybackClock::new(negotiation.frame_duration, settings.max_catch_up_steps),
            state: PlaybackState::Playing,
            looping: settings.start_looping,
            format: negotiation.family,
            scaled_decode: negotiation.scaled_decode,
        };
        player.prime_first_frame();

        tracing::info!(
            format = %player.format,
            width,
            height,
            duration,
            frame_duration = player.clock.frame_duration(),
            "Video loaded"
        );
        Ok(player)
    }

    fn prime_first_frame(&mut self) {
        if self.pipeline.read_frame(false) == FrameRead::Produced {
            return;
        }
        tracing::warn!("First frame unavailable, rewinding reader and retrying");
        if self.pipeline.seek(0.0).is_ok() && self.pipeline.read_frame(false) == FrameRead::Produced {
            return;
        }
        tracing::warn!("No decodable frame, showing fallback pattern");
        self.pipeline.show_gradient();
    }

    /// Release the reader, buffer and texture, in that order.
    pub fn unload(self) {
        tracing::debug!(format = %self.format, "Video unloaded");
    }

    /// Advance playback by `delta_seconds` of host time.
    pub fn update(&mut self, delta_seconds: f32) {
        if self.state != PlaybackState::Playing {
            return;
        }
        let looping = self.looping;
        let pipeline = &mut self.pipeline;
        let report = self.clock.tick(delta_seconds, || pipeline.step(looping));
        if report.reached_end {
            self.state = PlaybackState::EndOfStream;
            if self.pipeline.duration > 0.0 {
                self.pipeline.position = self.pipeline.duration;
            }
            tracing::info!(position = self.pipeline.position, "Reached end of stream");
        }
    }

    pub fn texture(&self) -> &T {
        &self.pipeline.texture
    }

    /// The RGBA8888 frame last written to the texture
    pub fn pixels(&self) -> &[u8] {
        &self.pipeline.pixels
    }

    /// True once a frame, real or fallback, has been produced
    pub fn is_ready(&self) -> bool {
        self.pipeline.ready
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn set_paused(&mut self, paused: bool) {
        let next = match (paused, self.state) {
            (true, PlaybackState::Playing) => PlaybackState::Paused,
            (false, PlaybackState::Paused) => PlaybackState::Playing,
            (false, PlaybackState::EndOfStream) => {
                // A failed rewind leaves the clip halted; the seek already
                // recorded the error
                if !self.looping && self.restart_at(0.0).is_err() {
                    return;
                }
                PlaybackState::Playing
            }
            _ => return,
        };
        self.state = next;
        self.clock.reset();
    }

    /// Paused explicitly or halted at the end of the stream
    pub fn is_paused(&self) -> bool {
        self.state != PlaybackState::Playing
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    /// Return to the start and show the first frame. A clip halted at the end
    /// resumes playing; a paused clip stays paused.
    pub fn rewind(&mut self) -> Result<(), VideoError> {
        self.restart_at(0.0)
    }

    pub fn duration_seconds(&self) -> f64 {
        self.pipeline.duration
    }

    pub fn position_seconds(&self) -> f64 {
        self.pipeline.position
    }

    /// Seek to `seconds`, clamped to the clip, and show the frame there.
    ///
    /// A rejected seek leaves the position unchanged.
    pub fn set_position_seconds(&mut self, seconds: f64) -> Result<(), VideoError> {
        let target = self.pipeline.clamp_time(seconds);
        self.restart_at(target)
    }

    fn restart_at(&mut self, seconds: f64) -> Result<(), VideoError> {
        self.pipeline.seek(seconds)?;
        self.clock.reset();
        if self.state == PlaybackState::EndOfStream {
            self.state = PlaybackState::Playing;
        }
        self.pipeline.position = seconds;
        self.pipeline.read_frame(false);
        Ok(())
    }

    pub fn info(&self) -> VideoInfo {
        let geometry = self.pipeline.converter.geometry();
        VideoInfo {
            format: self.format,
            decode_width: geometry.decode_width,
            decode_height: geometry.decode_height,
            output_width: geometry.output_width,
            output_height: geometry.output_height,
            frame_duration: self.clock.frame_duration(),
            duration: self.pipeline.duration,
            scaled_decode: self.scaled_decode,
        }
    }

    pub fn output_size(&self) -> (u32, u32) {
        let geometry = self.pipeline.converter.geometry();
        (geometry.output_width, geometry.output_height)
    }

    pub fn decode_size(&self) -> (u32, u32) {
        let geometry = self.pipeline.converter.geometry();
        (geometry.decode_width, geometry.decode_height)
    }

    pub fn frame_duration(&self) -> f32 {
        self.clock.frame_duration()
    }

    pub fn sample_format_label(&self) -> &'static str {
        self.format.label()
    }

    pub fn decoded_frame_count(&self) -> u64 {
        self.pipeline.metrics.decoded_frames()
    }

    pub fn fallback_frame_count(&self) -> u64 {
        self.pipeline.metrics.fallback_frames()
    }

    pub fn convert_cpu_average_micros(&self) -> f64 {
        self.pipeline.metrics.average_micros()
    }

    pub fn convert_cpu_peak_micros(&self) -> f64 {
        self.pipeline.metrics.peak_micros()
    }

    pub fn convert_cpu_last_micros(&self) -> f64 {
        self.pipeline.metrics.last_micros()
    }

    pub fn convert_cpu_sample_count(&self) -> u64 {
        self.pipeline.metrics.sample_count()
    }

    /// Frames served by (GPU staging, CPU mapping)
    pub fn access_counts(&self) -> (u64, u64) {
        self.pipeline.metrics.access_counts()
    }

    pub fn stats(&self) -> ConversionStats {
        self.pipeline.metrics.stats()
    }

    pub fn session(&self) -> &MediaSession {
        self.pipeline.lease.session()
    }

    /// The backend the frames come from
    pub fn reader(&self) -> &R {
        &self.pipeline.reader
    }
}

impl<R: SampleReader, T: FrameTexture> std::fmt::Debug for Player<R, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("format", &self.format)
            .field("state", &self.state)
            .field("looping", &self.looping)
            .field("position", &self.pipeline.position)
            .field("duration", &self.pipeline.duration)
            .finish()
    }
}
