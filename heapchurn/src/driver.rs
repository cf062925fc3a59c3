/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! The allocation-pressure driver.
//!
//! Every iteration allocates one zeroed buffer. While the live-memory counter
//! is at or below the ceiling the buffer is appended to the retained set and
//! the counter grows. Once the counter exceeds the ceiling the set stops
//! growing and the new buffer overwrites a uniformly random slot instead,
//! freeing whatever was there. The result is steady allocate/free churn
//! around a fixed live size.
//!
//! The counter is only ever incremented. After the plateau it no longer says
//! anything about how much memory is actually live.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

use crate::config::ConfigError;
use crate::config::DriverConfig;
use crate::pace::Pacer;
use crate::pace::StopToken;
use crate::watch::PauseTracker;

/// What a single iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Appended a buffer; `len` is the new retained-set length.
    Grew { len: usize },
    /// Overwrote the buffer at `index`.
    Replaced { index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Growing,
    Plateau,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Growing => write!(f, "growing"),
            Phase::Plateau => write!(f, "plateau"),
        }
    }
}

/// Owns the retained buffers and drives allocation churn.
pub struct Driver<R = Pcg64Mcg> {
    config: DriverConfig,
    retained: Vec<Box<[u8]>>,
    /// Monotonic; never decremented on replacement.
    live_bytes: u64,
    rng: R,
    iterations: u64,
    replacements: u64,
    pause: Option<Arc<PauseTracker>>,
}

impl<R> fmt::Debug for Driver<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("config", &self.config)
            .field("retained", &self.retained.len())
            .field("live_bytes", &self.live_bytes)
            .field("iterations", &self.iterations)
            .field("replacements", &self.replacements)
            .finish()
    }
}

impl Driver<Pcg64Mcg> {
    /// Create a driver whose eviction order is a function of `seed`.
    pub fn seeded(config: DriverConfig, seed: u64) -> Result<Self, ConfigError> {
        Self::new(config, Pcg64Mcg::seed_from_u64(seed))
    }
}

impl<R: Rng> Driver<R> {
    /// Create a driver with an empty retained set and a zero counter.
    pub fn new(config: DriverConfig, rng: R) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            retained: Vec::new(),
            live_bytes: 0,
            rng,
            iterations: 0,
            replacements: 0,
            pause: None,
        })
    }

    /// Report allocator work to `tracker` on every step.
    pub fn with_pause_tracker(mut self, tracker: Arc<PauseTracker>) -> Self {
        self.pause = Some(tracker);
        self
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn retained_len(&self) -> usize {
        self.retained.len()
    }

    pub fn live_bytes(&self) -> u64 {
        self.live_bytes
    }

    pub fn iterations(&self) -> u64 {
        self.iterations
    }

    pub fn replacements(&self) -> u64 {
        self.replacements
    }

    pub fn phase(&self) -> Phase {
        if self.live_bytes > self.config.max_memory_size {
            Phase::Plateau
        } else {
            Phase::Growing
        }
    }

    /// Run one iteration, without pacing.
    pub fn step(&mut self) -> Step {
        if let Some(pause) = &self.pause {
            pause.begin();
        }

        let value = vec![0u8; self.config.value_size].into_boxed_slice();
        let step = match self.phase() {
            Phase::Plateau => {
                let index = self.rng.gen_range(0..self.retained.len());
                // The evicted buffer is freed here.
                self.retained[index] = value;
                self.replacements += 1;
                Step::Replaced { index }
            }
            Phase::Growing => {
                self.retained.push(value);
                self.live_bytes += self.config.value_size as u64;
                if self.phase() == Phase::Plateau {
                    tracing::info!(
                        "reached plateau after {} buffers ({} bytes)",
                        self.retained.len(),
                        self.live_bytes
                    );
                }
                Step::Grew {
                    len: self.retained.len(),
                }
            }
        };
        self.iterations += 1;

        if let Some(pause) = &self.pause {
            pause.end();
        }
        tracing::trace!("iteration {}: {:?}", self.iterations, step);
        step
    }

    /// Step and pause until `stop` is cancelled. The token is checked before
    /// every iteration.
    pub fn run<P: Pacer>(&mut self, mut pacer: P, stop: &StopToken) {
        self.run_with(&mut pacer, stop, |_, _| {})
    }

    /// Like [`run`](Self::run), calling `observe` after every step.
    pub fn run_with<P, F>(&mut self, mut pacer: P, stop: &StopToken, mut observe: F)
    where
        P: Pacer,
        F: FnMut(&Self, Step),
    {
        tracing::debug!("driver starting: {:?}", self.config);
        while !stop.is_cancelled() {
            let step = self.step();
            observe(self, step);
            pacer.pause();
        }
        tracing::debug!("driver stopped after {} iterations", self.iterations);
    }

    /// Run until the process is killed.
    pub fn run_forever<P: Pacer, F: FnMut(&Self, Step)>(&mut self, pacer: P, observe: F) -> ! {
        self.run_with(pacer, &StopToken::never(), observe);
        unreachable!("a StopToken::never() token cannot be cancelled")
    }
}
