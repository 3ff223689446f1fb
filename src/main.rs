use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::time::MissedTickBehavior;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wifi_keysearch_rs::coordinator::{SearchConfig, SearchCoordinator, DEFAULT_WORKERS};
use wifi_keysearch_rs::radio::{SimulatedRadio, SystemRadio};
use wifi_keysearch_rs::server;
use wifi_keysearch_rs::tester::Radio;
use wifi_keysearch_rs::types::{Bssid, SearchOutcome, SearchReport, TargetNetwork};

/// wifi-keysearch-rs: resumable wordlist passphrase search against one Wi-Fi network.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "wifi-keysearch-rs",
    version,
    about = "Resumable wordlist passphrase search against one Wi-Fi network, with a tiny control API.",
    long_about = None
)]
struct Cli {
    /// Candidate file, one passphrase per line.
    #[arg(long, default_value = "rockyou.txt")]
    wordlist: PathBuf,

    /// File holding the byte offset already tested.
    #[arg(long, default_value = "checkpoint.txt")]
    checkpoint: PathBuf,

    /// Target network name. Without it, only the control API can start a search.
    #[arg(long)]
    ssid: Option<String>,

    /// Target access point address (aa:bb:cc:dd:ee:ff).
    #[arg(long, requires = "ssid")]
    bssid: Option<Bssid>,

    /// Target channel.
    #[arg(long, default_value_t = 1)]
    channel: u32,

    /// Target enforces management-frame protection.
    #[arg(long, default_value_t = false)]
    pmf: bool,

    /// Concurrent workers pulling candidates.
    #[arg(long, default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Upper bound on one association attempt, in milliseconds.
    #[arg(long = "attempt-timeout-ms", default_value_t = 10_000)]
    attempt_timeout_ms: u64,

    /// Wireless interface handed to nmcli.
    #[arg(long, default_value = "wlan0")]
    interface: String,

    /// Use a simulated access point that accepts this passphrase instead of the real radio.
    #[arg(long = "simulate", value_name = "PASSPHRASE")]
    simulate: Option<String>,

    /// Latency of each simulated attempt, in milliseconds.
    #[arg(long = "simulate-latency-ms", default_value_t = 0)]
    simulate_latency_ms: u64,

    /// Write the run report as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the HTTP control API.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Address for the control API.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    println!("wifi-keysearch-rs configuration:");
    println!("  wordlist     : {}", cli.wordlist.display());
    println!("  checkpoint   : {}", cli.checkpoint.display());
    println!("  ssid         : {}", cli.ssid.as_deref().unwrap_or("<none>"));
    println!(
        "  bssid        : {}",
        cli.bssid.map(|b| b.to_string()).unwrap_or_else(|| "<any>".to_string())
    );
    println!("  workers      : {}", cli.workers);
    println!("  timeout_ms   : {}", cli.attempt_timeout_ms);
    println!(
        "  radio        : {}",
        if cli.simulate.is_some() { "simulated".to_string() } else { format!("nmcli ({})", cli.interface) }
    );
    println!("  serve_ui     : {}", cli.serve_ui);

    match cli.simulate.clone() {
        Some(passphrase) => {
            let radio = SimulatedRadio::new(passphrase)
                .with_latency(Duration::from_millis(cli.simulate_latency_ms));
            run(cli, radio).await
        }
        None => {
            let radio = SystemRadio::new(cli.interface.clone());
            run(cli, radio).await
        }
    }
}

async fn run<R: Radio>(cli: Cli, radio: R) -> Result<()> {
    let config = SearchConfig {
        wordlist: cli.wordlist.clone(),
        checkpoint: cli.checkpoint.clone(),
        workers: cli.workers,
        attempt_timeout: Duration::from_millis(cli.attempt_timeout_ms),
    };
    let coordinator = Arc::new(SearchCoordinator::new(config, radio));

    if let Some(ssid) = cli.ssid.clone() {
        coordinator.select_target(TargetNetwork {
            ssid,
            bssid: cli.bssid.unwrap_or_default(),
            channel: cli.channel,
            pmf_required: cli.pmf,
        });
    }

    if cli.serve_ui {
        let bind = cli.bind.clone();
        let c = Arc::clone(&coordinator);
        tokio::spawn(async move {
            if let Err(e) = server::spawn_server(&bind, c).await {
                eprintln!("HTTP control API error: {e}");
            }
        });
        println!("Control API starting at http://{} (Ctrl+C to stop)", cli.bind);
    }

    if coordinator.target().is_some() {
        // Ctrl-C plays the role of the touch interrupt.
        let c = Arc::clone(&coordinator);
        let ctrlc = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                c.cancel();
            }
        });
        let ticker = tokio::spawn(report_progress(Arc::clone(&coordinator)));

        let result = coordinator.run().await;
        ticker.abort();
        ctrlc.abort();
        let report = result?;

        print_report(&report);
        if let Some(path) = cli.output.as_deref() {
            if let Err(e) = write_report_json(path, &report) {
                eprintln!("Failed to write JSON to {}: {}", path.display(), e);
            } else {
                println!("Wrote JSON report to {}", path.display());
            }
        }
    }

    if cli.serve_ui {
        println!("Press Ctrl+C to stop the server...");
        let _ = tokio::signal::ctrl_c().await;
        coordinator.cancel();
    }

    Ok(())
}

/// Log progress once per second while a run is active.
async fn report_progress<R: Radio>(coordinator: Arc<SearchCoordinator<R>>) {
    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tick.tick().await;
        if let Some(p) = coordinator.progress() {
            info!(percent = p.percent(), position = p.position(), total = p.total(), "progress");
        }
    }
}

fn print_report(report: &SearchReport) {
    println!();
    println!("SSID        : {}", report.target.ssid);
    println!("BSSID       : {}", report.target.bssid);
    println!("Channel     : {}", report.target.channel);
    match &report.outcome {
        SearchOutcome::Found(p) => println!("Passphrase  : {}", p),
        SearchOutcome::Exhausted => println!("Passphrase  : not in wordlist"),
        SearchOutcome::Cancelled => println!("Passphrase  : not cracked (interrupted)"),
    }
    println!("Tested      : {}", report.tested);
    println!("Checkpoint  : {}", report.checkpoint);
    println!("Elapsed     : {:.1}s", report.elapsed_ms as f64 / 1000.0);
}

fn write_report_json(path: &std::path::Path, report: &SearchReport) -> Result<()> {
    let file = File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
