/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fs::File;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;

/// Where and how much to log. Logging never shapes the workload.
#[derive(Debug, Parser, Clone)]
pub struct GlobalOpts {
    /// The verbosity level of log output (default: warn).
    #[clap(short, long, value_name = "LEVEL", env = "HEAPCHURN_LOG")]
    pub log: Option<LevelFilter>,

    /// Log to a file instead of stderr.
    #[clap(long, value_name = "FILE", env = "HEAPCHURN_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl GlobalOpts {
    /// Installs logging. Keep the guard alive for as long as the driver runs.
    #[must_use = "This function returns a guard that should not be immediately dropped"]
    pub fn init_tracing(&self) -> anyhow::Result<Option<WorkerGuard>> {
        let file = self
            .log_file
            .as_ref()
            .map(|path| {
                File::create(path).with_context(|| format!("Failed to open log file {:?}", path))
            })
            .transpose()?;
        super::tracing::init_tracing(self.log, file)
    }
}
