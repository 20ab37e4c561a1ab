//! Auxiliary-device synchronizer.
//!
//! The auxiliary low-frequency device runs on its own clock and exposes no
//! shared timebase; all the engine ever sees is a periodic (loop count,
//! byte count) read-back from its transport. The synchronizer keeps the
//! device's circular playback buffer a configurable lead ahead of that
//! reader by nudging an adaptive source rate, and performs a hard resync
//! when the positions drift beyond the safety margins.
//!
//! ```text
//!            aux circular buffer (frames)
//!  ┌───────────────▲────────────────▲──────────────┐
//!  │               │ reader         │ writer       │
//!  └───────────────┴────────────────┴──────────────┘
//!                   ◄── lead distance ──►
//! ```
//!
//! Per callback: classify the writer/reader distance into one of four
//! relative-position cases via the loop-count pair, nudge the adaptive
//! rate (or restore nominal), flag a resync when the margins are violated,
//! then either hard-resync or advance the writer by the main-stream delta
//! translated through the sample-rate ratio.
//!
//! Desync is self-healing and never user-visible; the only logged
//! configuration problem is a target lead smaller than one callback's
//! worth of samples, which violates the latency budget but is not fatal.

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use log::{debug, warn};

use crate::constants::RATE_NUDGE_SHIFT;
use crate::convert::routines::saturate16;
use crate::platform::AuxTransport;

const BYTES_PER_SAMPLE: u32 = 2;

/// Synchronizer configuration, fixed at attach time.
#[derive(Clone, Copy, Debug)]
pub struct AuxSyncConfig {
    /// Main-stream sample rate in Hz.
    pub main_rate: u32,
    /// Desired writer lead over the device reader, in aux frames.
    pub target_lead: u32,
    /// Main-stream frames per real-time callback.
    pub callback_frames: u32,
}

/// Relative writer/reader position, disambiguated by the loop-count pair.
enum Relative {
    /// Reader behind the writer by the given number of frames (less than
    /// one loop, or exactly one loop when the counts differ by one).
    Lead(i64),
    /// Writer lapped the reader by more than one loop.
    WriterLapped,
    /// Reader at or ahead of the writer, or it lapped the writer.
    ReaderAhead,
}

/// Per-engine synchronizer state. Created on auxiliary-device attach,
/// destroyed on detach; never shared between engine instances.
pub struct AuxSync {
    transport: Box<dyn AuxTransport + Send>,
    buffer: Vec<i16>,
    frames: u32,
    channels: u32,

    write_cursor: i64,
    loop_count: u32,
    rate: u32,
    nominal_rate: u32,
    needs_resync: bool,

    main_rate: u32,
    target_lead: u32,
    unsafe_margin: u32,
    last_main_pos: u32,
    main_abs: u64,
    frac: u64,
}

impl AuxSync {
    /// Attach the auxiliary device and start its transport.
    pub fn attach(transport: Box<dyn AuxTransport + Send>, config: AuxSyncConfig) -> AuxSync {
        let frames = transport.buffer_frames().max(1);
        let channels = transport.channel_count().max(1);
        let nominal_rate = transport.sample_rate().max(1);
        let main_rate = config.main_rate.max(1);

        let callback_aux =
            (config.callback_frames as u64 * nominal_rate as u64 / main_rate as u64) as u32;
        if config.target_lead < callback_aux {
            warn!(
                "aux target lead {} below one callback's worth ({} frames): latency budget violated",
                config.target_lead, callback_aux
            );
        }

        transport.start();

        AuxSync {
            buffer: vec![0; (frames * channels) as usize],
            frames,
            channels,
            transport,
            write_cursor: 0,
            loop_count: 0,
            rate: nominal_rate,
            nominal_rate,
            // First callback performs the initial hard alignment.
            needs_resync: true,
            main_rate,
            target_lead: config.target_lead,
            unsafe_margin: callback_aux.max(1),
            last_main_pos: 0,
            main_abs: 0,
            frac: 0,
        }
    }

    /// One synchronization step, run once per real-time callback.
    ///
    /// `feed` holds the staged mono low-frequency samples for this block
    /// (main rate), `main_pos` the current main-stream position in frames
    /// within its own ring of `main_ring_frames`.
    pub fn process(&mut self, feed: &[f32], main_pos: u32, main_ring_frames: u32) {
        // The main ring wraps on its own; fold the delta back into a
        // monotonic frame count.
        let delta = if main_ring_frames == 0 {
            0
        } else {
            (main_pos + main_ring_frames - self.last_main_pos) % main_ring_frames
        };
        self.last_main_pos = main_pos;
        self.main_abs += delta as u64;

        if self.transport.take_resync_request() {
            self.needs_resync = true;
        }

        match self.relative_position() {
            Relative::Lead(distance) => {
                self.nudge_rate(distance);
                if distance < self.unsafe_margin as i64 {
                    self.needs_resync = true;
                }
            }
            Relative::WriterLapped | Relative::ReaderAhead => {
                self.needs_resync = true;
            }
        }

        if self.needs_resync {
            self.hard_resync();
        } else {
            self.advance(feed, delta);
        }
    }

    fn reader_frame(&self) -> i64 {
        let samples = self.transport.byte_count() / (BYTES_PER_SAMPLE * self.channels);
        (samples % self.frames) as i64
    }

    fn relative_position(&self) -> Relative {
        let frames = self.frames as i64;
        let reader = self.reader_frame();
        match self.loop_count as i64 - self.transport.loop_count() as i64 {
            0 => {
                let distance = self.write_cursor - reader;
                if distance > 0 {
                    Relative::Lead(distance)
                } else {
                    Relative::ReaderAhead
                }
            }
            1 => Relative::Lead(self.write_cursor + frames - reader),
            d if d >= 2 => Relative::WriterLapped,
            _ => Relative::ReaderAhead,
        }
    }

    /// Nudge the adaptive rate by one part in sixteen of nominal. A short
    /// lead raises the source rate so more aux frames are produced per
    /// main block and the lead grows; a long lead lowers it; anything in
    /// between restores nominal.
    fn nudge_rate(&mut self, distance: i64) {
        let nudge = self.nominal_rate >> RATE_NUDGE_SHIFT;
        let target = self.target_lead as i64;
        let old = self.rate;
        if distance < target / 2 {
            self.rate = self.nominal_rate + nudge;
        } else if distance > target * 3 / 2 {
            self.rate = self.nominal_rate - nudge;
        } else {
            self.rate = self.nominal_rate;
        }
        if self.rate != old {
            debug!(
                "aux rate {} -> {} (lead {} of target {})",
                old, self.rate, distance, self.target_lead
            );
        }
    }

    /// Zero the device buffer and recompute the writer from the *current*
    /// main-stream position scaled by the sample-rate ratio, rather than
    /// from the drift accumulated in the old cursor.
    fn hard_resync(&mut self) {
        debug!("aux hard resync at main frame {}", self.main_abs);
        self.buffer.fill(0);
        let scaled = self.main_abs * self.nominal_rate as u64 / self.main_rate as u64;
        let aligned = scaled + self.target_lead as u64;
        self.write_cursor = (aligned % self.frames as u64) as i64;
        self.loop_count = (aligned / self.frames as u64) as u32;
        self.rate = self.nominal_rate;
        self.frac = 0;
        self.needs_resync = false;
    }

    /// Translate the main-stream delta into aux frames at the adaptive
    /// rate, write them, and renormalize the cursor into `[0, frames)`,
    /// folding whole buffer lengths into the loop count.
    fn advance(&mut self, feed: &[f32], delta_main: u32) {
        let total = self.frac + delta_main as u64 * self.rate as u64;
        let produced = (total / self.main_rate as u64) as usize;
        self.frac = total % self.main_rate as u64;

        for k in 0..produced {
            let src = k * delta_main as usize / produced;
            let sample = feed.get(src).copied().unwrap_or(0.0);
            let value = saturate16((sample * 32768.0) as i32);
            let frame = ((self.write_cursor as u64 + k as u64) % self.frames as u64) as usize;
            let base = frame * self.channels as usize;
            for ch in 0..self.channels as usize {
                self.buffer[base + ch] = value;
            }
        }

        let cursor = self.write_cursor + produced as i64;
        let folds = cursor.div_euclid(self.frames as i64);
        self.write_cursor = cursor.rem_euclid(self.frames as i64);
        self.loop_count = (self.loop_count as i64 + folds) as u32;
    }

    /// Request a hard resync on the next callback (engine restart).
    pub fn request_resync(&mut self) {
        self.needs_resync = true;
    }

    /// The adaptive source rate currently feeding the downsampler.
    pub fn rate(&self) -> u32 {
        self.rate
    }

    pub fn write_cursor(&self) -> i64 {
        self.write_cursor
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn buffer_frames(&self) -> u32 {
        self.frames
    }

    pub fn target_lead(&self) -> u32 {
        self.target_lead
    }

    #[cfg(test)]
    pub(crate) fn buffer(&self) -> &[i16] {
        &self.buffer
    }
}

impl Drop for AuxSync {
    /// Detach tears the synchronizer down immediately, stopping the
    /// transport with it.
    fn drop(&mut self) {
        self.transport.stop();
    }
}
