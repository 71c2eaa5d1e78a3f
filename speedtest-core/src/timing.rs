//! Calibration & Timing Engine
//!
//! Timing a variant happens in two phases:
//!
//! 1. **Calibration** picks a loop count. Trials run with 1, 2, 5, 10, 20, 50,
//!    ... calls until one takes at least the configured threshold. A prior
//!    cache record skips this phase entirely.
//! 2. **Measurement** runs `nreps` trials of exactly that many calls and
//!    keeps the fastest. The score is the best trial divided by the loop
//!    count, in seconds per call.
//!
//! Arguments are decoded once per variant by [`BoundVariant::prepare`],
//! before any timer starts.

use crate::cache::TimingRecord;
use crate::config::CalibrationConfig;
use crate::error::CallError;
use crate::measure::{Clock, SystemClock, Timer};
use crate::params::BoundVariant;
use crate::symbols::{catch_call, PreparedCall};
use std::hint::black_box;
use std::time::Duration;

/// The 1-2-5 loop count sequence: 1, 2, 5, 10, 20, 50, ...
pub fn loop_counts() -> impl Iterator<Item = u64> {
    (0u32..)
        .map_while(|exp| 10u64.checked_pow(exp))
        .flat_map(|base| [1u64, 2, 5].into_iter().filter_map(move |m| base.checked_mul(m)))
}

/// Outcome of the calibration phase
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub loop_count: u64,
    /// Provisional seconds per call
    pub score: f64,
}

/// Outcome of the measurement phase
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub loop_count: u64,
    /// One duration per repetition, in run order
    pub trials: Vec<Duration>,
    /// Fastest trial divided by `loop_count`, in seconds
    pub score: f64,
}

/// Calibrates and times bound variants against a clock.
#[derive(Debug, Clone)]
pub struct TimingEngine<C: Clock = SystemClock> {
    clock: C,
    calibration: CalibrationConfig,
    nreps: usize,
}

impl TimingEngine<SystemClock> {
    pub fn new(calibration: CalibrationConfig, nreps: usize) -> Self {
        Self::with_clock(SystemClock::new(), calibration, nreps)
    }
}

impl<C: Clock> TimingEngine<C> {
    pub fn with_clock(clock: C, calibration: CalibrationConfig, nreps: usize) -> Self {
        Self {
            clock,
            calibration,
            nreps: nreps.max(1),
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn nreps(&self) -> usize {
        self.nreps
    }

    /// Time `loops` consecutive invocations of a prepared call.
    ///
    /// The first error or panic aborts the trial.
    pub fn trial(&self, call: &mut PreparedCall, loops: u64) -> Result<Duration, CallError> {
        let timer = Timer::start(&self.clock);
        catch_call(|| {
            for _ in 0..loops {
                black_box(call()?);
            }
            Ok(())
        })?;
        Ok(timer.stop())
    }

    /// Find the smallest 1-2-5 loop count whose trial reaches the threshold.
    ///
    /// Stops after `max_steps` trials with the last count tried. A failing
    /// callable yields the fallback loop count and a zero score.
    pub fn calibrate(&self, call: &mut PreparedCall) -> Calibration {
        let steps = self.calibration.max_steps.max(1);
        let mut last = None;

        for loops in loop_counts().take(steps) {
            match self.trial(call, loops) {
                Ok(elapsed) => {
                    last = Some((loops, elapsed));
                    if elapsed >= self.calibration.threshold {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, "calibration failed, using fallback loop count");
                    return Calibration {
                        loop_count: self.calibration.fallback_loops.max(1),
                        score: 0.0,
                    };
                }
            }
        }

        match last {
            Some((loop_count, elapsed)) => Calibration {
                loop_count,
                score: elapsed.as_secs_f64() / loop_count as f64,
            },
            None => Calibration {
                loop_count: self.calibration.fallback_loops.max(1),
                score: 0.0,
            },
        }
    }

    /// Run `nreps` trials of `loop_count` calls and keep the fastest.
    pub fn measure(&self, call: &mut PreparedCall, loop_count: u64) -> Result<Measurement, CallError> {
        let loop_count = loop_count.max(1);
        let trials = (0..self.nreps)
            .map(|_| self.trial(call, loop_count))
            .collect::<Result<Vec<_>, _>>()?;

        let best = trials.iter().copied().min().unwrap_or_default();
        Ok(Measurement {
            loop_count,
            score: best.as_secs_f64() / loop_count as f64,
            trials,
        })
    }

    /// Time one variant, reusing the prior record's loop count when given.
    ///
    /// The variant is prepared once; calibration and every measured trial
    /// share the prepared call.
    pub fn time_variant(
        &self,
        variant: &BoundVariant,
        prior: Option<&TimingRecord>,
    ) -> Result<TimingRecord, CallError> {
        let mut call = catch_call(|| variant.prepare())?;
        let loop_count = match prior {
            Some(record) => {
                tracing::debug!(loops = record.loop_count, "reusing cached loop count");
                record.loop_count
            }
            None => self.calibrate(&mut call).loop_count,
        };

        let measurement = self.measure(&mut call, loop_count)?;
        Ok(TimingRecord::new(
            measurement.loop_count,
            measurement.score,
            variant.params(),
        ))
    }
}
