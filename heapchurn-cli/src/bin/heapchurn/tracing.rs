/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use std::fs::File;
use std::io;
use std::io::IsTerminal;

use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_TRACE_LEVEL: LevelFilter = LevelFilter::WARN;

fn effective_level(level: Option<LevelFilter>) -> LevelFilter {
    level.unwrap_or(DEFAULT_TRACE_LEVEL)
}

/// Installs the global subscriber, writing to `file` or else to stderr.
///
/// File output goes through a background writer so the driver loop never
/// blocks on disk; the returned guard flushes it when dropped.
pub fn init_tracing(
    level: Option<LevelFilter>,
    file: Option<File>,
) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::from_default_env().add_directive(effective_level(level).into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match file {
        Some(f) => {
            let (writer, guard) = tracing_appender::non_blocking(f);
            builder
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(anyhow::Error::msg)?;
            Ok(Some(guard))
        }
        None => {
            builder
                .with_writer(io::stderr)
                .with_ansi(io::stderr().is_terminal())
                .try_init()
                .map_err(anyhow::Error::msg)?;
            Ok(None)
        }
    }
}
