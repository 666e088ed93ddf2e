//! Sample access strategies
//!
//! A decoded sample is read either by staging its hardware surface into a CPU
//! copy ([`GpuStaged`]) or by locking its bytes directly ([`CpuMapped`]).
//! Whatever is acquired is released exactly once, on success and failure alike.

use super::error::VideoError;
use super::reader::{SampleBuffer, SampleView, StagingSurface};

/// Which strategy produced a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessKind {
    GpuStaged,
    CpuMapped,
}

pub trait SampleAccess {
    fn kind(&self) -> AccessKind;

    /// Map the sample and return its bytes with the row stride to use.
    fn acquire(&mut self) -> Result<SampleView<'_>, VideoError>;

    /// Release whatever [`SampleAccess::acquire`] obtained. Safe to call repeatedly.
    fn release(&mut self);
}

/// Copies a GPU surface to a staging surface and maps that.
pub struct GpuStaged<'a, B: SampleBuffer + ?Sized> {
    buffer: &'a mut B,
    staging: Option<StagingSurface>,
}

impl<'a, B: SampleBuffer + ?Sized> GpuStaged<'a, B> {
    pub fn new(buffer: &'a mut B) -> Self {
        Self {
            buffer,
            staging: None,
        }
    }
}

impl<B: SampleBuffer + ?Sized> SampleAccess for GpuStaged<'_, B> {
    fn kind(&self) -> AccessKind {
        AccessKind::GpuStaged
    }

    fn acquire(&mut self) -> Result<SampleView<'_>, VideoError> {
        if !self.buffer.has_gpu_surface() {
            return Err(VideoError::sample_read(
                "GpuStaged::acquire",
                "sample has no GPU surface",
            ));
        }
        let staging = self.staging.insert(self.buffer.copy_to_staging()?);
        staging.map()
    }

    fn release(&mut self) {
        if let Some(mut staging) = self.staging.take() {
            staging.unmap();
        }
    }
}

impl<B: SampleBuffer + ?Sized> Drop for GpuStaged<'_, B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Locks the sample's bytes in place.
pub struct CpuMapped<'a, B: SampleBuffer + ?Sized> {
    buffer: &'a mut B,
    stride: isize,
    locked: bool,
}

impl<'a, B: SampleBuffer + ?Sized> CpuMapped<'a, B> {
    /// `stride` is the negotiated row pitch of the sample.
    pub fn new(buffer: &'a mut B, stride: isize) -> Self {
        Self {
            buffer,
            stride,
            locked: false,
        }
    }
}

impl<B: SampleBuffer + ?Sized> SampleAccess for CpuMapped<'_, B> {
    fn kind(&self) -> AccessKind {
        AccessKind::CpuMapped
    }

    fn acquire(&mut self) -> Result<SampleView<'_>, VideoError> {
        let bytes = self.buffer.lock()?;
        self.locked = true;
        if bytes.is_empty() {
            return Err(VideoError::sample_read("CpuMapped::acquire", "sample is empty"));
        }
        Ok(SampleView::new(bytes, self.stride))
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.locked) {
            self.buffer.unlock();
        }
    }
}

impl<B: SampleBuffer + ?Sized> Drop for CpuMapped<'_, B> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Run `visit` over the sample's bytes, preferring GPU staging when enabled and
/// available and falling back to a CPU lock.
pub fn with_sample_view<B, T>(
    buffer: &mut B,
    stride: isize,
    prefer_gpu: bool,
    mut visit: impl FnMut(&SampleView<'_>) -> T,
) -> Result<(T, AccessKind), VideoError>
where
    B: SampleBuffer + ?Sized,
{
    if prefer_gpu && buffer.has_gpu_surface() {
        let mut staged = GpuStaged::new(&mut *buffer);
        match staged.acquire() {
            Ok(view) => {
                let value = visit(&view);
                staged.release();
                return Ok((value, staged.kind()));
            }
            Err(err) => {
                tracing::debug!(error = %err, "GPU staging unavailable, locking sample on CPU");
            }
        }
    }

    let mut mapped = CpuMapped::new(buffer, stride);
    let view = mapped.acquire()?;
    let value = visit(&view);
    mapped.release();
    Ok((value, AccessKind::CpuMapped))
}
