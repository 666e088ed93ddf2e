//! Media session
//!
//! The process holds one media session. [`MediaSession::init`] starts FFmpeg
//! on first use and hands out clones of the same cloneable handle, so every
//! caller shares the player count and last-error slot hosts read for
//! diagnostics.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use super::error::VideoError;

struct SessionInner {
    active: AtomicBool,
    players: AtomicUsize,
    last_error: Mutex<Option<String>>,
    teardown: fn(),
}

/// Handle to the media platform. Cheap to clone.
#[derive(Clone)]
pub struct MediaSession {
    inner: Arc<SessionInner>,
}

impl MediaSession {
    /// Start the FFmpeg platform and return the process session.
    ///
    /// Platform startup runs once per process; later calls reuse its result, so
    /// repeated initialization returns the same session and a failed startup
    /// keeps failing. Calling it after [`MediaSession::shutdown`] reactivates
    /// the session for every existing handle.
    pub fn init() -> Result<Self, VideoError> {
        static PLATFORM: OnceLock<Result<(), String>> = OnceLock::new();
        static SESSION: Mutex<Option<MediaSession>> = Mutex::new(None);
        let started = PLATFORM.get_or_init(start_ffmpeg).clone();
        Self::acquire(&SESSION, started, start_network, stop_ffmpeg)
    }

    /// Return the session held in `slot`, creating it on first use.
    ///
    /// `bringup` runs whenever the session becomes active; `teardown` runs on
    /// each successful [`MediaSession::shutdown`] of an active session.
    pub(crate) fn acquire(
        slot: &Mutex<Option<MediaSession>>,
        startup: Result<(), String>,
        bringup: fn(),
        teardown: fn(),
    ) -> Result<Self, VideoError> {
        startup.map_err(VideoError::SessionInit)?;
        let mut slot = slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(session) = slot.as_ref() {
            if !session.inner.active.swap(true, Ordering::AcqRel) {
                bringup();
                tracing::info!("Media session reactivated");
            }
            return Ok(session.clone());
        }
        let session = Self::start(Ok(()), teardown)?;
        bringup();
        *slot = Some(session.clone());
        Ok(session)
    }

    /// Open a standalone session over an already started platform.
    pub(crate) fn start(startup: Result<(), String>, teardown: fn()) -> Result<Self, VideoError> {
        startup.map_err(VideoError::SessionInit)?;
        Ok(Self {
            inner: Arc::new(SessionInner {
                active: AtomicBool::new(true),
                players: AtomicUsize::new(0),
                last_error: Mutex::new(None),
                teardown,
            }),
        })
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Fails with [`VideoError::SessionInit`] once the session was shut down.
    pub fn ensure_active(&self) -> Result<(), VideoError> {
        if self.is_active() {
            Ok(())
        } else {
            Err(VideoError::SessionInit("media session was shut down".into()))
        }
    }

    /// Number of players currently holding this session
    pub fn player_count(&self) -> usize {
        self.inner.players.load(Ordering::Acquire)
    }

    /// Tear the session down. Idempotent.
    ///
    /// Returns `false` without doing anything while players are alive.
    pub fn shutdown(&self) -> bool {
        let players = self.player_count();
        if players > 0 {
            tracing::warn!(players, "Refusing to shut down media session with live players");
            return false;
        }
        if self.inner.active.swap(false, Ordering::AcqRel) {
            (self.inner.teardown)();
            tracing::info!("Media session shut down");
        }
        true
    }

    /// Most recent failure message, if any
    pub fn last_error(&self) -> Option<String> {
        self.lock_error().clone()
    }

    pub fn record_error(&self, err: &VideoError) {
        tracing::warn!(error = %err, "Video error");
        *self.lock_error() = Some(err.to_string());
    }

    pub fn clear_last_error(&self) {
        *self.lock_error() = None;
    }

    /// Register a player for the duration of the returned lease.
    pub(crate) fn lease(&self) -> SessionLease {
        self.inner.players.fetch_add(1, Ordering::AcqRel);
        SessionLease {
            session: self.clone(),
        }
    }

    fn lock_error(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A poisoned slot still holds a usable message
        self.inner
            .last_error
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for MediaSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaSession")
            .field("active", &self.is_active())
            .field("players", &self.player_count())
            .finish()
    }
}

/// Keeps a session's player count raised while a player is alive
#[derive(Debug)]
pub(crate) struct SessionLease {
    session: MediaSession,
}

impl SessionLease {
    pub(crate) fn session(&self) -> &MediaSession {
        &self.session
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.session.inner.players.fetch_sub(1, Ordering::AcqRel);
    }
}

fn start_ffmpeg() -> Result<(), String> {
    ffmpeg_next::init().map_err(|e| format!("ffmpeg init failed: {}", e))?;
    ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
    tracing::info!("FFmpeg initialized");
    Ok(())
}

fn start_network() {
    ffmpeg_next::format::network::init();
}

fn stop_ffmpeg() {
    ffmpeg_next::format::network::deinit();
}

#[cfg(test)]
pub(crate) fn test_session() -> MediaSession {
    MediaSession::start(Ok(()), || {}).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_startup_is_reported() {
        let err = MediaSession::start(Err("no codecs".into()), || {}).unwrap_err();
        assert!(matches!(err, VideoError::SessionInit(ref msg) if msg == "no codecs"));
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let session = test_session();
        assert!(session.shutdown());
        assert!(session.shutdown());
        assert!(!session.is_active());
        assert!(matches!(session.ensure_active(), Err(VideoError::SessionInit(_))));
    }

    #[test]
    fn test_shutdown_refused_while_leased() {
        let session = test_session();
        let lease = session.lease();
        assert!(!session.shutdown());
        assert!(session.is_active());
        drop(lease);
        assert!(session.shutdown());
    }

    #[test]
    fn test_handles_share_one_session() {
        static TEARDOWNS: AtomicUsize = AtomicUsize::new(0);
        let slot = Mutex::new(None);
        let first = MediaSession::acquire(&slot, Ok(()), || {}, || {
            TEARDOWNS.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        let second = MediaSession::acquire(&slot, Ok(()), || {}, || {}).unwrap();

        let lease = second.lease();
        assert_eq!(first.player_count(), 1);
        assert!(!first.shutdown());
        assert!(second.is_active());

        first.record_error(&VideoError::FrameSizeUnavailable("0x0".into()));
        assert_eq!(second.last_error().as_deref(), Some("Frame size unavailable: 0x0"));

        drop(lease);
        assert!(first.shutdown());
        assert!(second.shutdown());
        assert!(!second.is_active());
        assert_eq!(TEARDOWNS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_acquire_after_shutdown_reactivates() {
        static BRINGUPS: AtomicUsize = AtomicUsize::new(0);
        let bringup = || {
            BRINGUPS.fetch_add(1, Ordering::SeqCst);
        };
        let slot = Mutex::new(None);
        let old = MediaSession::acquire(&slot, Ok(()), bringup, || {}).unwrap();
        assert!(old.shutdown());

        let new = MediaSession::acquire(&slot, Ok(()), bringup, || {}).unwrap();
        assert!(old.is_active());
        assert!(new.is_active());
        assert_eq!(BRINGUPS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_acquire_reports_failed_startup() {
        let slot = Mutex::new(None);
        let err = MediaSession::acquire(&slot, Err("no codecs".into()), || {}, || {}).unwrap_err();
        assert!(matches!(err, VideoError::SessionInit(_)));
        assert!(slot.lock().unwrap().is_none());
    }

    #[test]
    fn test_last_error_slot() {
        let session = test_session();
        assert_eq!(session.last_error(), None);
        session.record_error(&VideoError::FrameSizeUnavailable("0x0".into()));
        assert_eq!(session.last_error().as_deref(), Some("Frame size unavailable: 0x0"));
        session.clear_last_error();
        assert_eq!(session.last_error(), None);
    }
}
