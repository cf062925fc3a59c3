/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! A tiny TCP probe that tells an outside observer whether the driver is
//! currently busy inside the allocator.
//!
//! Every accepted connection receives exactly one line and is then closed:
//!
//! - `OK\n` when the driver is between allocations (pacing or idle).
//! - `PAUSE <millis>\n` when the driver has been inside an allocate/replace
//!   step for `<millis>` milliseconds.
//!
//! The listener runs on its own thread and never touches the retained
//! buffers; the driver and the listener share nothing but a [`PauseTracker`].

use std::io;
use std::io::Write;
use std::net::SocketAddr;
use std::net::TcpListener;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering::*;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::Instant;

/// Shared record of whether (and since when) the driver is in allocator work.
#[derive(Debug)]
pub struct PauseTracker {
    /// Monotonic anchor. `start` is measured in milliseconds from here.
    epoch: Instant,
    in_pause: AtomicBool,
    start: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseStatus {
    Idle,
    Paused(Duration),
}

impl PauseStatus {
    /// The single line written to a probe connection.
    pub fn reply_line(&self) -> String {
        match self {
            PauseStatus::Idle => "OK\n".to_owned(),
            PauseStatus::Paused(elapsed) => format!("PAUSE {}\n", elapsed.as_millis()),
        }
    }
}

impl Default for PauseTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseTracker {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            in_pause: AtomicBool::new(false),
            start: AtomicU64::new(0),
        }
    }

    fn millis(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Mark the start of a pause.
    pub fn begin(&self) {
        self.start.store(self.millis(), Release);
        self.in_pause.store(true, Release);
    }

    /// Mark the end of the current pause.
    pub fn end(&self) {
        self.in_pause.store(false, Release);
    }

    pub fn status(&self) -> PauseStatus {
        if self.in_pause.load(Acquire) {
            let since = self.millis().saturating_sub(self.start.load(Acquire));
            PauseStatus::Paused(Duration::from_millis(since))
        } else {
            PauseStatus::Idle
        }
    }
}

/// A bound, not yet running, pause-watch listener.
pub struct PauseWatch {
    listener: TcpListener,
    tracker: Arc<PauseTracker>,
}

impl PauseWatch {
    /// Bind the probe socket. Fails if the address is unavailable.
    pub fn bind(addr: SocketAddr, tracker: Arc<PauseTracker>) -> io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self { listener, tracker })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start answering probes on a dedicated thread. The thread runs for the
    /// rest of the process.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new()
            .name("pause-watch".to_owned())
            .spawn(move || self.serve())
    }

    fn serve(self) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!("pause watch listening on {}", addr);
        }
        for conn in self.listener.incoming() {
            match conn {
                Ok(stream) => {
                    if let Err(e) = reply(stream, self.tracker.status()) {
                        tracing::debug!("pause watch reply failed: {}", e);
                    }
                }
                // A failed accept affects only that client.
                Err(e) => tracing::debug!("pause watch accept failed: {}", e),
            }
        }
    }
}

fn reply(mut stream: TcpStream, status: PauseStatus) -> io::Result<()> {
    stream.write_all(status.reply_line().as_bytes())?;
    stream.flush()
}
