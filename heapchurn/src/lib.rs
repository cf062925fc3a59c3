/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Sustained allocation pressure with a bounded live set.
//!
//! [`Driver`] allocates fixed-size buffers and keeps them until a memory
//! ceiling is crossed, after which each new buffer replaces a random old one.
//! It is a diagnostic workload: run it under a chosen allocator and heap
//! limit and watch the process from the outside, optionally through the
//! [`watch`] probe.

// Treat all Clippy warnings as errors.
#![deny(clippy::all)]

pub mod config;
pub mod driver;
pub mod pace;
pub mod watch;

pub use config::ConfigError;
pub use config::DriverConfig;
pub use driver::Driver;
pub use driver::Phase;
pub use driver::Step;
pub use pace::CountingPacer;
pub use pace::Pacer;
pub use pace::SleepPacer;
pub use pace::StopToken;
pub use watch::PauseStatus;
pub use watch::PauseTracker;
pub use watch::PauseWatch;
