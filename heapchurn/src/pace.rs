/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Pacing and cancellation for the driver loop.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// Called by the driver loop after every iteration.
pub trait Pacer {
    fn pause(&mut self);
}

/// Sleeps the current thread for a fixed delay. The sleep cannot be cut
/// short; a signal delivered meanwhile terminates the process.
#[derive(Debug, Clone, Copy)]
pub struct SleepPacer {
    delay: Duration,
}

impl SleepPacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl Pacer for SleepPacer {
    fn pause(&mut self) {
        std::thread::sleep(self.delay);
    }
}

/// Does not wait at all. Counts the pauses it was asked for, which is the
/// only notion of time a scaled-down test needs.
#[derive(Debug, Clone, Copy, Default)]
pub struct CountingPacer {
    pub pauses: u64,
}

impl Pacer for CountingPacer {
    fn pause(&mut self) {
        self.pauses += 1;
    }
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn pause(&mut self) {
        (**self).pause()
    }
}

/// A cancellation signal checked by the driver between iterations.
///
/// Clones share the same flag. A token created with [`StopToken::never`] has
/// no way of being cancelled.
#[derive(Debug, Clone)]
pub struct StopToken {
    flag: Option<Arc<AtomicBool>>,
}

impl Default for StopToken {
    fn default() -> Self {
        Self::new()
    }
}

impl StopToken {
    /// A token that can be cancelled through any of its clones.
    pub fn new() -> Self {
        Self {
            flag: Some(Arc::new(AtomicBool::new(false))),
        }
    }

    /// A token that is never cancelled.
    pub fn never() -> Self {
        Self { flag: None }
    }

    pub fn cancel(&self) {
        if let Some(flag) = &self.flag {
            flag.store(true, Ordering::Release);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_cancellation() {
        let token = StopToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn never_stays_uncancelled() {
        let token = StopToken::never();
        token.cancel();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn default_token_can_be_cancelled() {
        let token = StopToken::default();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn counting_pacer_through_reference() {
        fn pause_twice(mut pacer: impl Pacer) {
            pacer.pause();
            pacer.pause();
        }
        let mut pacer = CountingPacer::default();
        pause_twice(&mut pacer);
        assert_eq!(pacer.pauses, 2);
    }

    #[test]
    fn sleep_pacer_waits_at_least_delay() {
        let mut pacer = SleepPacer::new(Duration::from_millis(2));
        let start = std::time::Instant::now();
        pacer.pause();
        assert!(start.elapsed() >= pacer.delay());
    }
}
