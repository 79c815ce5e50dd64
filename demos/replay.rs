//! Replay a raw receiver capture through a full session and print what the
//! correlator makes of it.
//!
//! Usage: cargo run --example replay -- <capture.bin> <lat> <lon> <alt> [pace_ms]
//!
//! The capture is the raw byte stream from the receiver (as logged by a
//! serial terminal); `<lat> <lon> <alt>` is the firing position. The session
//! stamps shots and hits with the receiver clock on arrival, so frames are
//! replayed `pace_ms` apart (default 250) to give each hit a flight time.
//! Set `RUST_LOG=debug` for per-frame logging.

use std::env;
use std::fs::File;
use std::io::{self, Read, Write};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shotlink::ballistics;
use shotlink::tracker::TrackerConfig;
use shotlink::{GeoPoint, Link, LinkError, ProtocolEvent, Session, ShotTracker, SphericalEarth, TrackerEvent};

/// Capture file on the read side, outbound commands echoed to stdout.
struct Capture {
    file: File,
}

impl Read for Capture {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file.read(buf)
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        println!("  -> {}", String::from_utf8_lossy(buf));
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn parse_arg(args: &[String], i: usize, name: &str) -> f64 {
    match args.get(i).map(|s| s.parse::<f64>()) {
        Some(Ok(v)) => v,
        _ => {
            eprintln!("missing or invalid {name}");
            process::exit(2);
        }
    }
}

fn print_tracker_event(event: &TrackerEvent) {
    match event {
        TrackerEvent::ShotFired { target_id, shot_time } => {
            println!("  shot at {target_id} ({shot_time})");
        }
        TrackerEvent::BallisticsComputed { target_id, ballistics } => {
            println!(
                "  {target_id}: range {:.1} m, ToF {:.3} s, MV {:.1} m/s, BC {:.3}",
                ballistics.range, ballistics.time_of_flight, ballistics.muzzle_velocity, ballistics.ballistic_coefficient
            );
        }
        TrackerEvent::HitCorrelated { target_id, shot } => {
            println!("  hit on {target_id} matched shot {}", shot.id);
        }
        TrackerEvent::ShotTimeout { target_id, shot_time } => {
            println!("  shot at {target_id} ({shot_time}) timed out");
        }
    }
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!("usage: {} <capture.bin> <lat> <lon> <alt> [pace_ms]", args[0]);
        process::exit(2);
    }
    let firing = GeoPoint::new(
        parse_arg(&args, 2, "latitude"),
        parse_arg(&args, 3, "longitude"),
        parse_arg(&args, 4, "altitude"),
    );
    let pace = match args.get(5) {
        Some(_) => Duration::from_millis(parse_arg(&args, 5, "pace").max(0.0) as u64),
        None => Duration::from_millis(250),
    };

    let file = match File::open(&args[1]) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot open {}: {e}", args[1]);
            process::exit(1);
        }
    };

    let geodesy = Arc::new(SphericalEarth);
    let (tracker, events) = match ShotTracker::with_channel(TrackerConfig::default(), geodesy.clone()) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("cannot start tracker: {e}");
            process::exit(1);
        }
    };
    tracker.update_firing_position(firing);

    let mut session = Session::new(Link::new(Capture { file }), Arc::new(tracker));
    loop {
        match session.poll() {
            Ok(ProtocolEvent::ParseError { message }) => println!("parse error: {message}"),
            Ok(event) => println!("{event:?}"),
            Err(LinkError::Disconnected) => break,
            Err(e) => {
                eprintln!("replay failed: {e}");
                process::exit(1);
            }
        }
        for event in events.try_iter() {
            print_tracker_event(&event);
        }
        thread::sleep(pace);
    }

    println!();
    for target in session.targets().iter() {
        println!("{}", session.tracker().statistics(&target.id));

        let Some(location) = target.location else { continue };
        let Some(last) = session
            .tracker()
            .completed_shots(&target.id)
            .into_iter()
            .rev()
            .find_map(|s| s.ballistics)
        else {
            continue;
        };
        let solution = ballistics::shooting_solution(
            &firing,
            &location,
            &last,
            geodesy.as_ref(),
        );
        println!("{solution}\n");
    }
}
