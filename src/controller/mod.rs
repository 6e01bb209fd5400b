/*
    FluxRescue
    https://github.com/dbalsom/fluxrescue

    Copyright 2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    --------------------------------------------------------------------------

    src/controller/mod.rs

    The abstract drive controller capability the engine consumes. Transport
    framing lives outside the engine; any USB flux device that can satisfy
    this contract plugs in here. The controller is a serial resource: one
    operation in flight per handle, enforced by exclusive (&mut) access.
*/
use crate::{DiskCh, FluxCapture};
use thiserror::Error;

pub mod sim;

pub use sim::{SimDrive, SimOp};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Seek to {0} was not confirmed on-track")]
    SeekError(String),
    #[error("Drive not ready (motor off or no media)")]
    NotReady,
    #[error("Media is write protected")]
    WriteProtected,
    #[error("Write failed")]
    WriteError,
    #[error("Operation exceeded its time bound")]
    TransportTimeout,
    #[error("Transport to the controller was lost")]
    TransportLost,
}

impl ControllerError {
    /// Fatal errors stop the current job; the sector table keeps its
    /// last-committed state.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ControllerError::TransportLost)
    }

    /// Errors worth a single retry before surfacing.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControllerError::SeekError(_) | ControllerError::TransportTimeout)
    }
}

/// Controller configuration. Time bounds are enforced by implementations
/// and surface as `TransportTimeout`.
#[derive(Copy, Clone, Debug)]
pub struct ControllerConfig {
    /// Drive unit on the bus (0 or 1).
    pub drive_unit: u8,
    /// Transfer rate hint for the transport, in kbit/s.
    pub bus_rate_kbps: u32,
    /// Spin-up bound.
    pub motor_timeout_ms: u64,
    /// Single-seek bound.
    pub seek_timeout_ms: u64,
    /// Flux read bound as a multiple of the expected revolution time.
    pub read_timeout_factor: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            drive_unit: 0,
            bus_rate_kbps: 12_000,
            motor_timeout_ms: 3_000,
            seek_timeout_ms: 2_000,
            read_timeout_factor: 1.5,
        }
    }
}

/// The capability set the engine requires of a flux-capable drive
/// controller.
pub trait DriveController {
    /// Block until the heads are confirmed on-track.
    fn seek(&mut self, ch: DiskCh) -> Result<(), ControllerError>;

    /// Start or stop the spindle; returns once speed is steady (±1.5%).
    fn set_motor(&mut self, on: bool) -> Result<(), ControllerError>;

    /// Capture flux at the current track. One extra revolution is read and
    /// trimmed to absorb index-timing slack.
    fn read_flux(&mut self, revolutions: u8) -> Result<FluxCapture, ControllerError>;

    /// Write exactly one revolution of flux at the current track.
    fn write_flux(&mut self, capture: &FluxCapture) -> Result<(), ControllerError>;

    /// DC-erase the current track: one full revolution of steady current.
    fn erase_track(&mut self) -> Result<(), ControllerError>;

    /// Spindle speed from index-to-index timing.
    fn measure_rpm(&mut self) -> Result<f64, ControllerError>;

    /// Release the motor and the handle.
    fn close(&mut self);
}
