use futures::StreamExt;
use std::env;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{error, info};

use vidctl::engine::{SimulatedEngine, SimulatedItem};
use vidctl::playback::{PlaybackProgress, PlaybackService, PlaybackState};
use vidctl::PlayerConfig;

#[tokio::main]
async fn main() {
    // Use RUST_LOG env var if set, otherwise default to info level
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(log_filter).init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage(&args[0]);
        std::process::exit(1);
    }

    let url = args[1].clone();
    let mut start_time: Option<Duration> = None;
    let mut duration = Duration::from_secs(20);

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--start" | "--duration" => {
                let Some(value) = args.get(i + 1).and_then(|v| v.parse::<f64>().ok()) else {
                    error!("{} requires a number of seconds", args[i]);
                    print_usage(&args[0]);
                    std::process::exit(1);
                };
                if !(value.is_finite() && value >= 0.0) {
                    error!("{} must be a non-negative number of seconds", args[i]);
                    std::process::exit(1);
                }
                if args[i] == "--start" {
                    start_time = Some(Duration::from_secs_f64(value));
                } else {
                    duration = Duration::from_secs_f64(value);
                }
                i += 2;
            }
            _ => {
                error!("Unknown argument: {}", args[i]);
                print_usage(&args[0]);
                std::process::exit(1);
            }
        }
    }

    let config = match PlayerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    let item = SimulatedItem {
        duration,
        ..SimulatedItem::default()
    };
    let handle = PlaybackService::start(
        config,
        move |events| SimulatedEngine::new(events, item),
        tokio::runtime::Handle::current(),
    );

    // Print every notification as it arrives
    let mut stream = handle.progress_stream();
    tokio::spawn(async move {
        while let Some(progress) = stream.next().await {
            match progress {
                PlaybackProgress::TimeChanged { update } => info!("{}", update),
                other => info!("{:?}", other),
            }
        }
    });

    let mut progress = handle.subscribe_progress();
    if let Err(e) = handle.load(url.as_str(), start_time).await {
        error!("Failed to load {}: {}", url, e);
        std::process::exit(1);
    }

    let ready = wait_for(&mut progress, Duration::from_secs(10), |p| {
        matches!(
            p,
            PlaybackProgress::ReadyToPlay { .. } | PlaybackProgress::Error { .. }
        )
    })
    .await;
    if !matches!(ready, Some(PlaybackProgress::ReadyToPlay { .. })) {
        error!("Item never became ready");
        std::process::exit(1);
    }

    handle.play();
    tokio::time::sleep(Duration::from_secs(2)).await;

    handle.skip_forward(Duration::from_secs(5));
    tokio::time::sleep(Duration::from_secs(1)).await;

    handle.begin_scrub();
    handle.scrub_preview(duration / 4);
    handle.end_scrub_at_fraction(0.5, true);
    tokio::time::sleep(Duration::from_secs(1)).await;

    handle.suspend();
    tokio::time::sleep(Duration::from_millis(500)).await;
    handle.resume_from_interruption();

    handle.set_rate(4.0);
    let ended = wait_for(&mut progress, duration, |p| {
        matches!(p, PlaybackProgress::ReachedEnd { .. })
    })
    .await;
    if ended.is_none() {
        error!("Playback did not reach the end");
    }

    handle.dismiss();
    match handle.state().await {
        Ok(PlaybackState::Dismissed) => info!("Done"),
        Ok(state) => error!("Unexpected final state: {}", state),
        Err(e) => error!("{}", e),
    }
}

async fn wait_for<F>(
    progress: &mut tokio::sync::mpsc::UnboundedReceiver<PlaybackProgress>,
    limit: Duration,
    predicate: F,
) -> Option<PlaybackProgress>
where
    F: Fn(&PlaybackProgress) -> bool,
{
    timeout(limit, async {
        while let Some(p) = progress.recv().await {
            if predicate(&p) {
                return Some(p);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

fn print_usage(program: &str) {
    eprintln!("Usage: {} <url> [--start SECONDS] [--duration SECONDS]", program);
    eprintln!();
    eprintln!("Drives a simulated media item through load, play, seek, scrub,");
    eprintln!("interruption and end of item, logging every notification.");
    eprintln!();
    eprintln!("Example:");
    eprintln!("  {} https://cdn.example/movie.m3u8 --start 5 --duration 30", program);
}
