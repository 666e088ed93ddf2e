//! Scripted reader for exercising negotiation, access and playback without media files.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::error::VideoError;
use super::format::FormatFamily;
use super::reader::{
    OutputType, ReadOutcome, SampleBuffer, SampleReader, StagingSurface,
};

/// Counters shared between a test and the reader it handed to a player
#[derive(Debug, Clone, Default)]
pub(crate) struct MockProbe {
    inner: Rc<ProbeInner>,
}

#[derive(Debug, Default)]
struct ProbeInner {
    attempts: RefCell<Vec<(FormatFamily, Option<(u32, u32)>)>>,
    reads: Cell<usize>,
    seeks: RefCell<Vec<f64>>,
    failing_reads: Cell<usize>,
}

impl MockProbe {
    pub fn attempts(&self) -> Vec<(FormatFamily, Option<(u32, u32)>)> {
        self.inner.attempts.borrow().clone()
    }

    pub fn reads(&self) -> usize {
        self.inner.reads.get()
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.inner.seeks.borrow().clone()
    }

    /// Make the next `count` reads fail
    pub fn fail_reads(&self, count: usize) {
        self.inner.failing_reads.set(count);
    }
}

#[derive(Debug, Clone)]
pub(crate) struct MockFrame {
    pub bytes: Vec<u8>,
    pub pts: Option<f64>,
}

impl MockFrame {
    /// BGRA frame filled with one pixel value
    pub fn solid(width: u32, height: u32, bgra: [u8; 4], pts: f64) -> Self {
        Self {
            bytes: bgra.repeat(width as usize * height as usize),
            pts: Some(pts),
        }
    }

    pub fn empty(pts: f64) -> Self {
        Self {
            bytes: Vec::new(),
            pts: Some(pts),
        }
    }
}

pub(crate) struct MockSample {
    frame: MockFrame,
    pitch: usize,
    gpu: bool,
    pub fail_staging: bool,
    pub stagings: usize,
    pub locks: usize,
    pub unlocks: usize,
}

impl MockSample {
    pub fn new(frame: MockFrame, pitch: usize, gpu: bool) -> Self {
        Self {
            frame,
            pitch,
            gpu,
            fail_staging: false,
            stagings: 0,
            locks: 0,
            unlocks: 0,
        }
    }
}

impl SampleBuffer for MockSample {
    fn presentation_time(&self) -> Option<f64> {
        self.frame.pts
    }

    fn has_gpu_surface(&self) -> bool {
        self.gpu
    }

    fn copy_to_staging(&mut self) -> Result<StagingSurface, VideoError> {
        self.stagings += 1;
        if self.fail_staging {
            return Err(VideoError::sample_read("copy_to_staging", "device lost"));
        }
        Ok(StagingSurface::new(self.frame.bytes.clone(), self.pitch))
    }

    fn lock(&mut self) -> Result<&[u8], VideoError> {
        self.locks += 1;
        Ok(&self.frame.bytes)
    }

    fn unlock(&mut self) {
        self.unlocks += 1;
    }
}

type AcceptFn = Box<dyn Fn(FormatFamily, Option<(u32, u32)>) -> bool>;

pub(crate) struct MockReader {
    native: Option<(u32, u32)>,
    accept: AcceptFn,
    report: Option<OutputType>,
    selected: Option<OutputType>,
    frames: Vec<MockFrame>,
    cursor: usize,
    frame_rate: Option<(u32, u32)>,
    duration: f64,
    gpu: bool,
    fail_seek: bool,
    probe: MockProbe,
}

impl MockReader {
    pub fn new(native: (u32, u32)) -> Self {
        Self {
            native: Some(native),
            accept: Box::new(|_, _| true),
            report: None,
            selected: None,
            frames: Vec::new(),
            cursor: 0,
            frame_rate: Some((30, 1)),
            duration: 0.0,
            gpu: false,
            fail_seek: false,
            probe: MockProbe::default(),
        }
    }

    /// `count` solid frames at `fps`; frame `i` has blue channel `i`.
    pub fn clip(width: u32, height: u32, count: usize, fps: u32) -> Self {
        let frames = (0..count)
            .map(|i| MockFrame::solid(width, height, [i as u8, 0, 0, 255], i as f64 / f64::from(fps)))
            .collect();
        Self::new((width, height))
            .frames(frames)
            .frame_rate(Some((fps, 1)))
            .duration(count as f64 / f64::from(fps))
    }

    pub fn accept(mut self, accept: impl Fn(FormatFamily, Option<(u32, u32)>) -> bool + 'static) -> Self {
        self.accept = Box::new(accept);
        self
    }

    pub fn report(mut self, output: OutputType) -> Self {
        self.report = Some(output);
        self
    }

    pub fn frames(mut self, frames: Vec<MockFrame>) -> Self {
        self.frames = frames;
        self
    }

    pub fn frame_rate(mut self, rate: Option<(u32, u32)>) -> Self {
        self.frame_rate = rate;
        self
    }

    pub fn duration(mut self, seconds: f64) -> Self {
        self.duration = seconds;
        self
    }

    pub fn gpu(mut self, gpu: bool) -> Self {
        self.gpu = gpu;
        self
    }

    pub fn failing_seek(mut self) -> Self {
        self.fail_seek = true;
        self
    }

    pub fn probe(&self) -> MockProbe {
        self.probe.clone()
    }
}

impl SampleReader for MockReader {
    type Sample<'a>
        = MockSample
    where
        Self: 'a;

    fn native_size(&mut self) -> Option<(u32, u32)> {
        self.native
    }

    fn try_output(
        &mut self,
        family: FormatFamily,
        size: Option<(u32, u32)>,
    ) -> Result<(), VideoError> {
        self.probe.inner.attempts.borrow_mut().push((family, size));
        if !(self.accept)(family, size) {
            return Err(VideoError::negotiation(family.label(), "media type rejected"));
        }
        let (width, height) = size.or(self.native).unwrap_or((0, 0));
        self.selected = Some(OutputType {
            family: Some(family),
            width,
            height,
            stride: None,
            frame_rate: self.frame_rate,
        });
        Ok(())
    }

    fn current_output(&self) -> Result<OutputType, VideoError> {
        self.report
            .or(self.selected)
            .ok_or_else(|| VideoError::negotiation("current output", "no output selected"))
    }

    fn duration_seconds(&self) -> f64 {
        self.duration
    }

    fn read_sample(&mut self) -> Result<ReadOutcome<Self::Sample<'_>>, VideoError> {
        let probe = &self.probe.inner;
        probe.reads.set(probe.reads.get() + 1);
        if probe.failing_reads.get() > 0 {
            probe.failing_reads.set(probe.failing_reads.get() - 1);
            return Err(VideoError::sample_read("ReadSample", "decode error"));
        }
        let Some(frame) = self.frames.get(self.cursor).cloned() else {
            return Ok(ReadOutcome::EndOfStream);
        };
        self.cursor += 1;

        let output = self.current_output()?;
        let pitch = match (output.stride, output.family) {
            (Some(stride), _) => stride.unsigned_abs(),
            (None, Some(family)) => family.default_stride(output.width),
            (None, None) => output.width as usize * 4,
        };
        Ok(ReadOutcome::Sample(MockSample::new(frame, pitch, self.gpu)))
    }

    fn seek(&mut self, seconds: f64) -> Result<(), VideoError> {
        self.probe.inner.seeks.borrow_mut().push(seconds);
        if self.fail_seek {
            return Err(VideoError::seek(seconds, "not seekable"));
        }
        self.cursor = self
            .frames
            .iter()
            .position(|frame| frame.pts.unwrap_or(0.0) >= seconds - 1e-9)
            .unwrap_or(self.frames.len());
        Ok(())
    }
}
