/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

// Treat all Clippy warnings as errors.
#![deny(clippy::all)]

mod global_opts;
mod run;
mod tracing;

use alloc_watch::CountingAlloc;
use clap::Parser;
use colored::*;

use self::global_opts::GlobalOpts;
use self::run::RunOpts;

#[global_allocator]
static ALLOC: CountingAlloc = CountingAlloc::system();

/// Keeps a bounded set of buffers alive and keeps replacing them, producing
/// steady allocate/free churn for observing an allocator under pressure.
///
/// Runs until killed. Buffer size, memory ceiling and pacing are compile-time
/// constants.
#[derive(Debug, Parser)]
#[clap(name = "heapchurn", version)]
struct Args {
    #[clap(flatten)]
    global: GlobalOpts,

    #[clap(flatten)]
    run: RunOpts,
}

fn main() {
    let Args { global, run } = Args::parse();

    let result = global
        .init_tracing()
        .and_then(|_guard| run.main(&ALLOC).map(|never| match never {}));

    if let Err(err) = result {
        display_error(err);
        std::process::exit(1);
    }
}

fn display_error(error: anyhow::Error) {
    let mut chain = error.chain();

    if let Some(error) = chain.next() {
        eprintln!("{}: {}", "Error".red().bold(), error);
    }

    for cause in chain {
        eprintln!("     {} {}", ">".dimmed().bold(), cause);
    }
}
