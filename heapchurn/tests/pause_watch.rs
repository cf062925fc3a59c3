/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Probe the pause watch over a real loopback socket.

use std::io::Read;
use std::net::SocketAddr;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use heapchurn::Driver;
use heapchurn::DriverConfig;
use heapchurn::PauseTracker;
use heapchurn::PauseWatch;
use heapchurn::Step;

fn probe(addr: SocketAddr) -> String {
    let mut stream = TcpStream::connect(addr).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let mut line = String::new();
    stream.read_to_string(&mut line).unwrap();
    line
}

fn start(tracker: &Arc<PauseTracker>) -> SocketAddr {
    let watch = PauseWatch::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(tracker)).unwrap();
    let addr = watch.local_addr().unwrap();
    watch.spawn().unwrap();
    addr
}

#[test]
fn reports_ok_when_idle() {
    let tracker = Arc::new(PauseTracker::new());
    let addr = start(&tracker);
    assert_eq!(probe(addr), "OK\n");
    // One line per connection, any number of connections.
    assert_eq!(probe(addr), "OK\n");
}

#[test]
fn reports_pause_duration() {
    let tracker = Arc::new(PauseTracker::new());
    let addr = start(&tracker);
    tracker.begin();
    std::thread::sleep(Duration::from_millis(30));
    let line = probe(addr);
    let millis: u64 = line
        .strip_prefix("PAUSE ")
        .and_then(|rest| rest.strip_suffix('\n'))
        .unwrap_or_else(|| panic!("unexpected reply {:?}", line))
        .parse()
        .unwrap();
    assert!(millis >= 29, "{}", millis);

    tracker.end();
    assert_eq!(probe(addr), "OK\n");
}

#[test]
fn driver_leaves_watch_idle_between_steps() {
    let tracker = Arc::new(PauseTracker::new());
    let addr = start(&tracker);
    let config = DriverConfig {
        value_size: 4096,
        max_memory_size: 64 * 1024,
        pace_delay: Duration::ZERO,
    };
    let mut driver = Driver::seeded(config, 11)
        .unwrap()
        .with_pause_tracker(Arc::clone(&tracker));
    let mut replaced = 0;
    for _ in 0..100 {
        if let Step::Replaced { .. } = driver.step() {
            replaced += 1;
        }
    }
    assert_eq!(replaced, 100 - 17);
    assert_eq!(probe(addr), "OK\n");
}

#[test]
fn bind_conflict_is_an_error() {
    let tracker = Arc::new(PauseTracker::new());
    let first = PauseWatch::bind("127.0.0.1:0".parse().unwrap(), Arc::clone(&tracker)).unwrap();
    let taken = first.local_addr().unwrap();
    assert!(PauseWatch::bind(taken, tracker).is_err());
}
