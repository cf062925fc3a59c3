/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Driver configuration and the compiled-in workload constants.

use std::fmt;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

/// Bytes per retained buffer.
pub const VALUE_SIZE: usize = 100 * 1024;

/// Once the live-memory counter exceeds this many bytes the driver stops
/// growing and starts replacing entries. 0.9 GiB.
pub const MAX_MEMORY_SIZE: u64 = (0.9 * 1024.0 * 1024.0 * 1024.0) as u64;

/// Delay between two iterations of the driver loop.
pub const PACE_DELAY: Duration = Duration::from_millis(1);

/// Configuration of the allocation-pressure driver.
///
/// The workload is deliberately not tunable from the command line; change the
/// constants above and rebuild. Tests construct scaled-down values directly.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Size in bytes of every allocated buffer.
    pub value_size: usize,

    /// Memory ceiling in bytes, compared against the live-memory counter.
    pub max_memory_size: u64,

    /// Pause inserted after each iteration by the real pacer.
    pub pace_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            value_size: VALUE_SIZE,
            max_memory_size: MAX_MEMORY_SIZE,
            pace_delay: PACE_DELAY,
        }
    }
}

impl DriverConfig {
    /// Check that the driver can make progress with this configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.value_size == 0 {
            return Err(ConfigError::ZeroValueSize);
        }
        Ok(())
    }

    /// Number of buffers retained once the plateau is reached: the smallest
    /// length whose byte total exceeds the ceiling. Saturates at
    /// `usize::MAX` for ceilings no address space can reach.
    pub fn plateau_len(&self) -> Result<usize, ConfigError> {
        self.validate()?;
        let len = (self.max_memory_size / self.value_size as u64).saturating_add(1);
        Ok(usize::try_from(len).unwrap_or(usize::MAX))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Zero-sized buffers never advance the counter, so the driver would grow
    /// its retained set forever.
    ZeroValueSize,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            ConfigError::ZeroValueSize => write!(f, "value size must be greater than zero"),
        }
    }
}

impl std::error::Error for ConfigError {}
