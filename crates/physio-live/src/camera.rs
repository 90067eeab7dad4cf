//! # Camera Ownership
//!
//! Capture devices and the gate that keeps them exclusive.
//!
//! ## Exclusivity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DeviceGate (1 permit)                           │
//! │                                                                         │
//! │  session A: acquire() ──► lease ──► open() ... close() ──► drop lease  │
//! │                                                               │         │
//! │  session B: acquire() ── waits ───────────────────────────────┴──► lease│
//! │                 │                                                       │
//! │                 └── acquire_timeout elapsed ──► DeviceUnavailable       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//! A new session can only open the camera after the previous holder has
//! closed its device and dropped its lease.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::debug;

use physio_core::CameraError;

// =============================================================================
// Capture Device Trait
// =============================================================================

/// A camera (or anything producing JPEG frames).
#[async_trait]
pub trait CaptureDevice: Send {
    /// Opens the device. Permission prompts happen here.
    async fn open(&mut self) -> Result<(), CameraError>;

    /// Captures one encoded frame.
    async fn capture(&mut self) -> Result<Vec<u8>, CameraError>;

    /// Closes the device. Idempotent.
    async fn close(&mut self);

    fn is_open(&self) -> bool;

    fn name(&self) -> &str;
}

// =============================================================================
// Device Gate
// =============================================================================

/// Process-wide exclusive access to the capture hardware.
#[derive(Clone)]
pub struct DeviceGate {
    permit: Arc<Semaphore>,
    acquire_timeout: Duration,
}

/// Proof of exclusive access. Dropping it frees the device for the next session.
#[derive(Debug)]
pub struct DeviceLease {
    _permit: OwnedSemaphorePermit,
}

impl DeviceGate {
    pub fn new(acquire_timeout: Duration) -> Self {
        DeviceGate {
            permit: Arc::new(Semaphore::new(1)),
            acquire_timeout,
        }
    }

    /// Waits for exclusive access, bounded by the acquire timeout.
    pub async fn acquire(&self) -> Result<DeviceLease, CameraError> {
        match timeout(self.acquire_timeout, self.permit.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(DeviceLease { _permit: permit }),
            Ok(Err(_closed)) => Err(CameraError::DeviceUnavailable),
            Err(_elapsed) => {
                debug!(timeout = ?self.acquire_timeout, "Camera still held by another session");
                Err(CameraError::DeviceUnavailable)
            }
        }
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn is_available(&self) -> bool {
        self.permit.available_permits() > 0
    }
}

// =============================================================================
// Synthetic Camera
// =============================================================================

/// How a [`SyntheticCamera`] responds to `open()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticBehavior {
    Grant,
    Deny,
    Unavailable,
}

/// Open/close/capture counters shared with whoever built the camera.
#[derive(Debug, Clone, Default)]
pub struct CameraProbe {
    opens: Arc<AtomicU32>,
    closes: Arc<AtomicU32>,
    captures: Arc<AtomicU32>,
}

impl CameraProbe {
    pub fn opens(&self) -> u32 {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> u32 {
        self.captures.load(Ordering::SeqCst)
    }
}

/// Camera that produces tiny placeholder JPEGs. Used by the runner when no
/// hardware backend is wired in, and by tests.
pub struct SyntheticCamera {
    behavior: SyntheticBehavior,
    open: bool,
    frame_counter: u32,
    probe: CameraProbe,
}

impl SyntheticCamera {
    pub fn new() -> Self {
        Self::with_behavior(SyntheticBehavior::Grant)
    }

    pub fn with_behavior(behavior: SyntheticBehavior) -> Self {
        SyntheticCamera {
            behavior,
            open: false,
            frame_counter: 0,
            probe: CameraProbe::default(),
        }
    }

    pub fn probe(&self) -> CameraProbe {
        self.probe.clone()
    }
}

impl Default for SyntheticCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureDevice for SyntheticCamera {
    async fn open(&mut self) -> Result<(), CameraError> {
        match self.behavior {
            SyntheticBehavior::Grant => {
                self.open = true;
                self.probe.opens.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            SyntheticBehavior::Deny => Err(CameraError::PermissionDenied),
            SyntheticBehavior::Unavailable => Err(CameraError::DeviceUnavailable),
        }
    }

    async fn capture(&mut self) -> Result<Vec<u8>, CameraError> {
        if !self.open {
            return Err(CameraError::DeviceUnavailable);
        }
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.probe.captures.fetch_add(1, Ordering::SeqCst);

        // SOI, frame counter, EOI
        let mut frame = vec![0xff, 0xd8];
        frame.extend_from_slice(&self.frame_counter.to_be_bytes());
        frame.extend_from_slice(&[0xff, 0xd9]);
        Ok(frame)
    }

    async fn close(&mut self) {
        if self.open {
            self.open = false;
            self.probe.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}
