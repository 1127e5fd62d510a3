mod config;
use brainwire_core::{MetricSeries, NotificationFilter, QueueEvent, RealtimeProvider};
use config::LiveFeedConfig;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::signal;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Pick up BRAINWIRE_* overrides from a local .env when present
    let _ = dotenvy::dotenv();

    if let Err(e) = brainwire_core::telemetry::init_tracing_with(
        "info,brainwire_core=info,live_feed=info",
    ) {
        eprintln!("tracing already initialised: {}", e);
    }

    let cfg = LiveFeedConfig::load();
    info!(target = "live_feed", url = %cfg.realtime.url, "Starting live feed");

    let provider = RealtimeProvider::websocket(cfg.realtime.clone())?;

    // Rolling window per topic for numeric streams
    let charts: Arc<Mutex<HashMap<String, MetricSeries>>> = Arc::default();
    let window = Arc::clone(&charts);
    provider.metrics().on_update(move |sample| {
        let mut charts = window.lock().unwrap_or_else(|e| e.into_inner());
        let series = charts.entry(sample.topic.clone()).or_default();
        if series.push_sample(sample) {
            println!(
                "[metric] {:<14} = {} (min {:.2}, max {:.2}, n={})",
                sample.topic,
                sample.value,
                series.min().unwrap_or_default(),
                series.max().unwrap_or_default(),
                series.len()
            );
        } else {
            println!("[metric] {:<14} = {}", sample.topic, sample.value);
        }
    });
    provider.notifications().on_change(|event| match event {
        QueueEvent::Added(n) => println!(
            "[toast] {:?}/{} {}: {}",
            n.severity, n.category, n.title, n.message
        ),
        QueueEvent::Dismissed(id) => println!("[toast] dismissed {}", id),
        QueueEvent::Evicted(id) => info!(target = "live_feed", %id, "Notification evicted"),
        _ => {}
    });

    provider.start()?;
    let _view = provider.subscribe(cfg.view.clone());

    let mut status = provider.watch_status();
    let mut summary = tokio::time::interval(cfg.summary_every);
    summary.tick().await;

    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    warn!(target = "live_feed", "Status channel closed");
                    break;
                }
                let s = status.borrow_and_update().clone();
                println!("[status] {} ({:?}, attempt {})", s.indicator(), s.state, s.attempt);
                if let Some(err) = s.last_error.as_deref() {
                    println!("[status] last error: {}", err);
                }
            }
            _ = summary.tick() => print_summary(&provider),
            _ = signal::ctrl_c() => {
                info!(target = "live_feed", "Ctrl-C received, shutting down");
                break;
            }
        }
    }

    provider.shutdown().await;
    print_summary(&provider);
    Ok(())
}

fn print_summary(provider: &RealtimeProvider) {
    let queue = provider.notifications();
    let stats = provider.stats();
    println!(
        "[summary] {} metrics cached, {} notifications ({} unread), {} frames, {} dropped, {} reconnects",
        provider.metrics().len(),
        queue.len(),
        queue.unread_count(),
        stats.frames_received,
        stats.dropped_frames,
        stats.reconnects,
    );
    for n in queue.list(NotificationFilter::Unread).iter().take(5) {
        println!("  - {} [{}] {}", n.timestamp.format("%H:%M:%S"), n.category, n.title);
    }
}
