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

    src/formatter.rs

    Full-disk format: write a freshly laid-out track at every (cylinder,
    head) with the configured fill byte. Write protection aborts the job
    before any further write is attempted.
*/
use crate::{
    controller::{ControllerError, DriveController},
    events::{CancelToken, EngineEvent, EventSink},
    recovery::surface::format_track_flux,
    scan::retry_once,
    DiskCh,
    DiskGeometry,
    JobOutcome,
    TrackEncoding,
};

#[derive(Debug)]
pub struct FormatResult {
    pub outcome: JobOutcome,
    pub reason: Option<String>,
    pub tracks_formatted: usize,
    pub tracks_failed: usize,
}

pub fn format_disk(
    controller: &mut dyn DriveController,
    geometry: &DiskGeometry,
    encoding: TrackEncoding,
    fill: u8,
    sink: &dyn EventSink,
    cancel: &CancelToken,
) -> FormatResult {
    let mut tracks_formatted = 0usize;
    let mut tracks_failed = 0usize;

    let fail = |reason: String, formatted, failed| FormatResult {
        outcome: JobOutcome::Failed,
        reason: Some(reason),
        tracks_formatted: formatted,
        tracks_failed: failed,
    };

    if let Err(e) = retry_once(|| controller.set_motor(true)) {
        return fail(e.to_string(), 0, 0);
    }

    let mut cancelled = false;
    'format: for c in 0..geometry.cylinders {
        for h in 0..geometry.heads {
            if cancel.is_cancelled() {
                cancelled = true;
                break 'format;
            }
            let ch = DiskCh::new(c, h);
            sink.on_event(EngineEvent::TrackStarted { ch });

            if let Err(e) = retry_once(|| controller.seek(ch)) {
                if e.is_fatal() {
                    let _ = controller.set_motor(false);
                    return fail(e.to_string(), tracks_formatted, tracks_failed);
                }
                tracks_failed += 1;
                continue;
            }

            let capture = match format_track_flux(geometry, encoding, ch, fill) {
                Ok(capture) => capture,
                Err(e) => {
                    let _ = controller.set_motor(false);
                    return fail(e.to_string(), tracks_formatted, tracks_failed);
                }
            };

            match controller.write_flux(&capture) {
                Ok(()) => tracks_formatted += 1,
                Err(ControllerError::WriteProtected) => {
                    // No further writes are attempted on protected media.
                    let _ = controller.set_motor(false);
                    return fail(ControllerError::WriteProtected.to_string(), tracks_formatted, tracks_failed);
                }
                Err(e) if e.is_fatal() => {
                    let _ = controller.set_motor(false);
                    return fail(e.to_string(), tracks_formatted, tracks_failed);
                }
                Err(e) => {
                    log::error!("format: write at {} failed: {}", ch, e);
                    tracks_failed += 1;
                }
            }
        }
    }

    let _ = controller.set_motor(false);
    let (outcome, reason) = if cancelled {
        (JobOutcome::Partial, Some("cancelled".to_string()))
    }
    else if tracks_failed > 0 {
        (JobOutcome::Partial, Some(format!("{} track(s) failed", tracks_failed)))
    }
    else {
        (JobOutcome::Ok, None)
    };

    log::info!(
        "format: {} ({} formatted, {} failed)",
        outcome,
        tracks_formatted,
        tracks_failed
    );

    FormatResult {
        outcome,
        reason,
        tracks_formatted,
        tracks_failed,
    }
}
