//! Sample acquisition engine
//!
//! Four capture strategies sharing one loop shape: poll a status flag (or the
//! FIFO fill count), fetch one fixed-size frame per positive poll, stamp it,
//! repeat. Polling is a tight busy-wait with no sleeps: at the device's top
//! rate a new sample arrives every 312 us, so any suspension would drop
//! samples. All buffers are allocated and sized exactly before the loop
//! starts; nothing allocates inside it.
//!
//! Every poll carries a wall-clock ceiling and an optional [`CancelFlag`], so
//! a device that never becomes ready ends the call with an error instead of a
//! hang, and the duration-based modes restore standby power on every exit
//! path through a drop guard.

use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use crate::bus::RegisterBus;
use crate::decode::{decode_xyz, strip_frames, MalformedBuffer, FRAME_LEN, SAMPLE_LEN};
use crate::reg;
use crate::{Adxl345, Error, FifoMode, PowerMode};

/// Default busy-wait ceiling. One second covers a full period of even the
/// slowest output rate.
pub const DEFAULT_POLL_TIMEOUT_US: u64 = 1_000_000;

/// Monotonic microsecond counter
///
/// Timestamps samples and bounds the busy-wait polls. Wraparound is the
/// implementor's concern; a u64 at microsecond resolution outlives the
/// hardware.
pub trait MonotonicUs {
    fn now_us(&mut self) -> u64;
}

/// External abort switch for an acquisition in progress
///
/// Set it from an interrupt handler or another context; the polling loop
/// observes it once per iteration and bails out with [`Error::Cancelled`],
/// restoring standby power where that guarantee applies.
#[derive(Debug, Default)]
pub struct CancelFlag(AtomicBool);

impl CancelFlag {
    pub const fn new() -> Self {
        Self(AtomicBool::new(false))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One finished acquisition
///
/// `bytes` holds stripped sample payloads (6 bytes each), `timestamps_us` one
/// entry per accepted sample in acquisition order. FIFO-drained duration
/// captures carry a synthesized `i / rate` grid instead of measured stamps,
/// and the fixed-count FIFO drain has no timing signal at all, so its
/// timestamp sequence is empty.
#[derive(Debug, Clone)]
pub struct Capture {
    pub bytes:         Vec<u8>,
    pub timestamps_us: Vec<u64>,
    pub elapsed_us:    u64,
}

impl Capture {
    pub fn sample_count(&self) -> usize {
        self.bytes.len() / SAMPLE_LEN
    }

    /// Decode into x, y, z readings in LSB units
    pub fn decode(&self) -> Result<(Vec<i16>, Vec<i16>, Vec<i16>), MalformedBuffer> {
        decode_xyz(&self.bytes)
    }

    /// Achieved sampling rate over the whole capture
    pub fn actual_rate_hz(&self) -> f32 {
        if self.elapsed_us == 0 {
            return 0.0;
        }
        self.sample_count() as f32 * 1_000_000.0 / self.elapsed_us as f32
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                          Standby guard
// —————————————————————————————————————————————————————————————————————————————————————————————————

/// Forces the device back to standby when a duration capture ends, no matter
/// how it ends. The happy path goes through `finish` so a failing power write
/// still surfaces; every other path (error, timeout, cancellation) falls back
/// to the drop.
struct StandbyGuard<'a, B: RegisterBus, CLK> {
    dev:   &'a mut Adxl345<B, CLK>,
    armed: bool,
}

impl<'a, B: RegisterBus, CLK> StandbyGuard<'a, B, CLK> {
    /// The caller has already switched the device to measure mode
    fn new(dev: &'a mut Adxl345<B, CLK>) -> Self {
        Self { dev, armed: true }
    }

    fn finish(mut self) -> Result<(), B::Error> {
        self.armed = false;
        self.dev.cfg.power = PowerMode::Standby;
        self.dev
            .bus
            .write_register(reg::POWER_CTL, &[PowerMode::Standby as u8])
    }
}

impl<'a, B: RegisterBus, CLK> Drop for StandbyGuard<'a, B, CLK> {
    fn drop(&mut self) {
        if self.armed {
            // Best effort; the original failure is already on its way up
            let _ = self
                .dev
                .bus
                .write_register(reg::POWER_CTL, &[PowerMode::Standby as u8]);
            self.dev.cfg.power = PowerMode::Standby;
        }
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                            Capture
// —————————————————————————————————————————————————————————————————————————————————————————————————

impl<B: RegisterBus, CLK: MonotonicUs> Adxl345<B, CLK> {
    /// Status check for the hot loops: one 2-byte transaction, the status
    /// byte riding the reply slot next to the address phase.
    fn data_ready_inline(&mut self) -> Result<bool, Error<B::Error>> {
        let mut frame = [0u8; 2];
        self.bus
            .read_frame_into(reg::INT_SOURCE, &mut frame)
            .map_err(Error::Bus)?;
        Ok(frame[1] & reg::INT_DATA_READY != 0)
    }

    /// FIFO fill count for the hot loops, same 2-byte transaction trick
    fn fifo_count_inline(&mut self) -> Result<u8, Error<B::Error>> {
        let mut frame = [0u8; 2];
        self.bus
            .read_frame_into(reg::FIFO_STATUS, &mut frame)
            .map_err(Error::Bus)?;
        Ok(frame[1] & reg::FIFO_ENTRIES)
    }

    /// Polled burst: busy-wait on the data-ready flag and fetch exactly `n`
    /// samples, each with a measured arrival timestamp.
    ///
    /// A stale data-ready condition is cleared with one throwaway read before
    /// the loop starts, so the first accepted sample is really new.
    pub fn read_samples(
        &mut self,
        n: usize,
        cancel: Option<&CancelFlag>,
    ) -> Result<Capture, Error<B::Error>> {
        let mut raw = vec![0u8; n * FRAME_LEN];
        let mut timestamps = Vec::with_capacity(n);

        self.clear_data_ready()?;

        let start = self.clock.now_us();
        let mut deadline = start + self.poll_timeout_us;
        let mut accepted = 0usize;

        while accepted < n {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(Error::Cancelled);
            }
            if !self.data_ready_inline()? {
                if self.clock.now_us() > deadline {
                    return Err(Error::Timeout);
                }
                continue;
            }

            let slot = &mut raw[accepted * FRAME_LEN..(accepted + 1) * FRAME_LEN];
            self.bus.read_frame_into(reg::DATAX0, slot).map_err(Error::Bus)?;

            let now = self.clock.now_us();
            timestamps.push(now);
            deadline = now + self.poll_timeout_us;
            accepted += 1;
        }

        let elapsed = self.clock.now_us().saturating_sub(start);
        let bytes = strip_frames(&raw[..accepted * FRAME_LEN])?;

        #[cfg(feature = "defmt")]
        defmt::debug!("polled burst: {} samples in {} us", accepted, elapsed);

        Ok(Capture { bytes, timestamps_us: timestamps, elapsed_us: elapsed })
    }

    /// Fixed-count FIFO drain: `n` back-to-back fetch transactions with no
    /// status checks. Only sound when the caller has already confirmed (via
    /// [`Adxl345::fifo_count`] or the watermark flag) that at least `n`
    /// samples are queued. The FIFO pops one entry per full sample read, so
    /// one transaction per sample is the only way to empty it.
    pub fn drain_fifo(&mut self, n: usize) -> Result<Capture, Error<B::Error>> {
        let mut raw = vec![0u8; n * FRAME_LEN];

        let start = self.clock.now_us();
        for slot in raw.chunks_exact_mut(FRAME_LEN) {
            self.bus.read_frame_into(reg::DATAX0, slot).map_err(Error::Bus)?;
        }
        let elapsed = self.clock.now_us().saturating_sub(start);

        let bytes = strip_frames(&raw)?;

        #[cfg(feature = "defmt")]
        defmt::debug!("fifo drain: {} samples in {} us", n, elapsed);

        Ok(Capture { bytes, timestamps_us: Vec::new(), elapsed_us: elapsed })
    }

    /// Fixed-duration polled capture. The target count is
    /// `floor(duration x rate)`, trusting the device's own rate: if the
    /// device undershoots its nominal rate the call runs longer than
    /// `duration` rather than coming home short.
    ///
    /// Forces the FIFO to bypass, runs in measure mode, and restores standby
    /// on every exit path.
    pub fn record(
        &mut self,
        duration: Duration,
        cancel: Option<&CancelFlag>,
    ) -> Result<Capture, Error<B::Error>> {
        let rate = self.cfg.rate.ok_or(Error::NotConfigured)?;
        let target = (duration.as_secs_f64() * rate.hz() as f64) as usize;

        let mut raw = vec![0u8; target * FRAME_LEN];
        let mut timestamps = Vec::with_capacity(target);

        self.set_fifo_mode(FifoMode::Bypass, self.cfg.watermark)?;
        self.set_power_mode(PowerMode::Measure)?;
        let mut g = StandbyGuard::new(self);

        let start = g.dev.clock.now_us();
        let mut deadline = start + g.dev.poll_timeout_us;
        let mut accepted = 0usize;

        while accepted < target {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(Error::Cancelled);
            }
            if !g.dev.data_ready_inline()? {
                if g.dev.clock.now_us() > deadline {
                    return Err(Error::Timeout);
                }
                continue;
            }

            let slot = &mut raw[accepted * FRAME_LEN..(accepted + 1) * FRAME_LEN];
            g.dev.bus.read_frame_into(reg::DATAX0, slot).map_err(Error::Bus)?;

            let now = g.dev.clock.now_us();
            timestamps.push(now);
            deadline = now + g.dev.poll_timeout_us;
            accepted += 1;
        }

        let elapsed = g.dev.clock.now_us().saturating_sub(start);
        g.finish().map_err(Error::Bus)?;

        let bytes = strip_frames(&raw[..accepted * FRAME_LEN])?;
        timestamps.truncate(accepted);

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "duration capture: {} samples in {} us (target {})",
            accepted,
            elapsed,
            target
        );

        Ok(Capture { bytes, timestamps_us: timestamps, elapsed_us: elapsed })
    }

    /// Fixed-duration FIFO-drained capture. The queue decouples sampling
    /// from polling, so this path sustains the full 3.2 kHz device rate: each
    /// fill-count poll is followed by that many back-to-back fetches with no
    /// flag re-check in between.
    ///
    /// The FIFO is switched to stream mode and flushed after measurement
    /// starts, so no stale pre-capture samples leak in. Individual drained
    /// samples carry no timing signal; the returned timestamps are the even
    /// `i / rate` grid. Standby is restored on every exit path.
    pub fn record_fifo(
        &mut self,
        duration: Duration,
        cancel: Option<&CancelFlag>,
    ) -> Result<Capture, Error<B::Error>> {
        let rate = self.cfg.rate.ok_or(Error::NotConfigured)?;
        let target = (duration.as_secs_f64() * rate.hz() as f64) as usize;

        let mut raw = vec![0u8; target * FRAME_LEN];

        self.set_fifo_mode(FifoMode::Stream, self.cfg.watermark)?;
        self.set_power_mode(PowerMode::Measure)?;
        let mut g = StandbyGuard::new(self);
        g.dev.clear_fifo()?;

        let start = g.dev.clock.now_us();
        let mut deadline = start + g.dev.poll_timeout_us;
        let mut accepted = 0usize;

        while accepted < target {
            if cancel.is_some_and(CancelFlag::is_cancelled) {
                return Err(Error::Cancelled);
            }
            let avail = g.dev.fifo_count_inline()? as usize;
            if avail == 0 {
                if g.dev.clock.now_us() > deadline {
                    return Err(Error::Timeout);
                }
                continue;
            }

            let take = avail.min(target - accepted);
            for _ in 0..take {
                let slot = &mut raw[accepted * FRAME_LEN..(accepted + 1) * FRAME_LEN];
                g.dev.bus.read_frame_into(reg::DATAX0, slot).map_err(Error::Bus)?;
                accepted += 1;
            }
            deadline = g.dev.clock.now_us() + g.dev.poll_timeout_us;
        }

        let elapsed = g.dev.clock.now_us().saturating_sub(start);
        g.finish().map_err(Error::Bus)?;

        let bytes = strip_frames(&raw[..accepted * FRAME_LEN])?;
        let period_us = 1_000_000.0 / rate.hz() as f64;
        let timestamps = (0..accepted).map(|i| (i as f64 * period_us) as u64).collect();

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "fifo capture: {} samples in {} us (target {})",
            accepted,
            elapsed,
            target
        );

        Ok(Capture { bytes, timestamps_us: timestamps, elapsed_us: elapsed })
    }
}

// —————————————————————————————————————————————————————————————————————————————————————————————————
//                                              Tests
// —————————————————————————————————————————————————————————————————————————————————————————————————
