/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::convert::Infallible;
use std::net::Ipv6Addr;
use std::net::SocketAddr;
use std::num::NonZeroU64;
use std::str::FromStr;
use std::sync::Arc;

use alloc_watch::CountingAlloc;
use anyhow::Context;
use clap::Parser;
use heapchurn::Driver;
use heapchurn::DriverConfig;
use heapchurn::PauseTracker;
use heapchurn::PauseWatch;
use heapchurn::SleepPacer;
use nix::sys::resource::Resource;
use nix::sys::resource::setrlimit;

/// Launch options. None of these change the shape of the workload, which is
/// fixed at compile time.
#[derive(Debug, Parser, Clone)]
pub struct RunOpts {
    /// Seed for choosing which buffer to evict. Random (and logged) if not given.
    #[clap(long, env = "HEAPCHURN_SEED", value_name = "uint64")]
    pub seed: Option<u64>,

    /// Answer pause probes on this TCP port (all interfaces).
    #[clap(long, value_name = "PORT")]
    pub watch_port: Option<u16>,

    /// Bound the process data segment, like a runtime's maximum heap size.
    /// Takes a number of bytes, or shorthand (e.g. "1GiB").
    #[clap(long, parse(try_from_str = try_parse_memory), value_name = "bytesize")]
    pub heap_limit: Option<u64>,

    /// Log driver and allocator counters every this many iterations.
    #[clap(long, default_value = "10000", value_name = "uint64")]
    pub report_every: NonZeroU64,
}

fn try_parse_memory(from_str: &str) -> anyhow::Result<u64> {
    <bytesize::ByteSize as FromStr>::from_str(from_str)
        .map(|res| res.as_u64())
        .map_err(anyhow::Error::msg)
}

/// Counters are written to the log only, at a fixed cadence; nothing is
/// exported or aggregated.
fn report_due(iterations: u64, every: NonZeroU64) -> bool {
    iterations % every.get() == 0
}

impl RunOpts {
    /// Apply the launch environment and drive allocation until killed. Only
    /// returns if setting up fails.
    pub fn main(&self, alloc: &'static CountingAlloc) -> anyhow::Result<Infallible> {
        if let Some(limit) = self.heap_limit {
            setrlimit(Resource::RLIMIT_DATA, limit, limit)
                .with_context(|| format!("Failed to limit the data segment to {} bytes", limit))?;
            tracing::info!("data segment limited to {} bytes", limit);
        }

        let config = DriverConfig::default();
        tracing::info!(
            "driver config: {}",
            serde_json::to_string(&config).context("Failed to serialize driver config")?
        );

        let seed = self.seed.unwrap_or_else(rand::random);
        tracing::info!("eviction seed: {}", seed);

        let mut driver = Driver::seeded(config.clone(), seed).context("Invalid driver config")?;

        if let Some(port) = self.watch_port {
            let tracker = Arc::new(PauseTracker::new());
            let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, port));
            PauseWatch::bind(addr, Arc::clone(&tracker))
                .with_context(|| format!("Failed to bind pause watch on port {}", port))?
                .spawn()
                .context("Failed to start pause watch thread")?;
            driver = driver.with_pause_tracker(tracker);
        }

        let report_every = self.report_every;
        driver.run_forever(SleepPacer::new(config.pace_delay), |driver, _| {
            if report_due(driver.iterations(), report_every) {
                tracing::info!(
                    "iterations={} phase={} retained={} counter={}B replacements={} heap: {}",
                    driver.iterations(),
                    driver.phase(),
                    driver.retained_len(),
                    driver.live_bytes(),
                    driver.replacements(),
                    alloc.snapshot(),
                );
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parse_memory_shorthand() {
        assert_eq!(try_parse_memory("1GiB").unwrap(), 1 << 30);
        assert_eq!(try_parse_memory("512 MiB").unwrap(), 512 << 20);
        assert_eq!(try_parse_memory("4096").unwrap(), 4096);
        assert!(try_parse_memory("lots").is_err());
    }

    #[test]
    fn defaults() {
        let opts = RunOpts::try_parse_from(["run"]).unwrap();
        assert_eq!(opts.seed, None);
        assert_eq!(opts.watch_port, None);
        assert_eq!(opts.heap_limit, None);
        assert_eq!(opts.report_every.get(), 10000);
    }

    #[test]
    fn all_options() {
        let opts = RunOpts::try_parse_from([
            "run",
            "--seed",
            "17",
            "--watch-port",
            "9091",
            "--heap-limit",
            "1GiB",
            "--report-every",
            "5",
        ])
        .unwrap();
        assert_eq!(opts.seed, Some(17));
        assert_eq!(opts.watch_port, Some(9091));
        assert_eq!(opts.heap_limit, Some(1 << 30));
        assert_eq!(opts.report_every.get(), 5);
    }

    #[test]
    fn report_cadence() {
        let every = NonZeroU64::new(3).unwrap();
        let due: Vec<u64> = (1..=10).filter(|i| report_due(*i, every)).collect();
        assert_eq!(due, vec![3, 6, 9]);
    }

    #[test]
    fn zero_report_interval_is_rejected() {
        assert!(RunOpts::try_parse_from(["run", "--report-every", "0"]).is_err());
    }
}
