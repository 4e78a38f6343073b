// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Minimal client for a running playback_host.
//
// Usage:
//   playback_ctl Volume 75            one request, print the response
//   playback_ctl                      read "Command [data]" lines from stdin
//   playback_ctl --watch              print notifications until Ctrl-C
//
// The client holds the liveness lock while it runs; the host shuts down
// once it exits.

use std::io::{self, BufRead};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use playback_ipc::naming::{ResourceNames, DEFAULT_CLIENT_LOCK, DEFAULT_PREFIX};
use playback_ipc::{PlaybackClient, Request, Response};

#[derive(Parser, Debug)]
#[command(name = "playback_ctl")]
#[command(version)]
#[command(about = "Send commands to a playback host")]
struct Args {
    /// Command name, e.g. Play, Volume, GetProgress
    command: Option<String>,

    /// Command payload
    data: Option<String>,

    #[arg(long, default_value = DEFAULT_PREFIX)]
    prefix: String,

    #[arg(long, value_name = "NAME", default_value = DEFAULT_CLIENT_LOCK)]
    client_lock: String,

    /// Response timeout in milliseconds
    #[arg(long, default_value_t = 2000)]
    timeout_ms: u64,

    /// Print notifications until Ctrl-C instead of sending commands
    #[arg(short, long)]
    watch: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn print_response(label: &str, r: &Response) {
    println!("{label} type={} message={:?} result={:?}", r.kind, r.message, r.result);
}

fn parse_line(line: &str) -> Option<Request> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(match line.split_once(char::is_whitespace) {
        Some((command, data)) => Request::new(command, data.trim()),
        None => Request::bare(line),
    })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(io::stderr)
        .init();

    let names = ResourceNames::from_prefix(&args.prefix).with_client_lock(&args.client_lock);
    let client = PlaybackClient::connect(&names)?;
    let timeout = Duration::from_millis(args.timeout_ms);

    if let Some(command) = &args.command {
        let request = match &args.data {
            Some(data) => Request::new(command, data),
            None => Request::bare(command),
        };
        let response = client.request(&request, timeout)?;
        print_response("<", &response);
        return Ok(());
    }

    if args.watch {
        let running = Arc::new(AtomicBool::new(true));
        {
            let running = Arc::clone(&running);
            ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
        }
        while running.load(Ordering::SeqCst) {
            match client.next_notification(Duration::from_millis(200)) {
                Ok(Some(n)) => print_response("!", &n),
                Ok(None) => {}
                Err(e) => {
                    eprintln!("notification error: {e}");
                    thread::sleep(Duration::from_millis(500));
                }
            }
        }
        return Ok(());
    }

    for line in io::stdin().lock().lines() {
        let Some(request) = parse_line(&line?) else {
            continue;
        };
        match client.request(&request, timeout) {
            Ok(response) => print_response("<", &response),
            Err(e) => eprintln!("request failed: {e}"),
        }
    }

    Ok(())
}
