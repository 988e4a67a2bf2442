mod config;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::{fmt, EnvFilter};

use m3u_core::{
    filter_channels, load_channels, render_playlist, write_outputs, CheckEvent, CheckReport,
    Checker, FfprobeProbe, HttpProbe, HttpSource, Probe, ProbeKind, RetryMode,
};

use crate::config::AppConfig;

fn version_string() -> &'static str {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    const GIT_HASH: &str = env!("GIT_HASH");

    if GIT_HASH.is_empty() {
        VERSION
    } else {
        Box::leak(format!("{VERSION} ({GIT_HASH})").into_boxed_str())
    }
}

/// IPTV playlist health checker: probe every channel and sort the playlist
/// into alive, unstable and dead.
#[derive(Parser)]
#[command(name = "m3u-health", version = version_string(), about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check every channel of a playlist and write the sorted playlists.
    Check {
        /// Playlist URL or file path. Overrides the config file.
        source: Option<String>,

        /// Seconds to wait between attempts against the same channel.
        #[arg(long)]
        retry_delay: Option<f64>,

        /// Maximum number of channels probed at the same time.
        #[arg(long)]
        max_workers: Option<usize>,

        /// Write probe diagnostics (codec, resolution) as JSON files here.
        #[arg(long)]
        diagnostics_dir: Option<PathBuf>,

        /// Directory for alive/dead/unstable playlists [default: output].
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Give unstable channels one more attempt with a longer timeout.
        #[arg(long, default_value_t = false)]
        retest: bool,

        /// Attempts per channel.
        #[arg(long)]
        retries: Option<u32>,

        /// Success ratio at or above which a channel is alive.
        #[arg(long)]
        threshold: Option<f64>,

        /// Stop probing a channel at its first successful attempt.
        #[arg(long, default_value_t = false)]
        first_success: bool,

        /// Probe implementation: ffprobe or http.
        #[arg(long)]
        probe: Option<ProbeKind>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Keep only the channels whose name or group contains a keyword.
    Filter {
        /// Playlist URL or file path.
        source: String,

        /// Keyword to match, case-insensitive. Repeatable.
        #[arg(short, long = "keyword", required = true)]
        keywords: Vec<String>,

        /// Where to write the filtered playlist.
        #[arg(short, long, default_value = "output/filtered_channels.m3u")]
        output: PathBuf,
    },
    /// Time a check of the first channels at several worker counts.
    Bench {
        /// Playlist URL or file path.
        source: String,

        /// Worker count to try. Repeatable [default: CPU count x1, x2, x4, x8].
        #[arg(short, long = "workers")]
        workers: Vec<usize>,

        /// Number of channels to check per run.
        #[arg(long, default_value_t = 100)]
        sample: usize,

        /// Seconds to wait between attempts against the same channel.
        #[arg(long)]
        retry_delay: Option<f64>,

        /// Probe implementation: ffprobe or http.
        #[arg(long)]
        probe: Option<ProbeKind>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Start the HTTP API server.
    Serve {
        /// Listen address (e.g. 0.0.0.0:8080). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Path to TOML config file.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { listen, config } => {
            let app_config = load_config(config.as_deref());
            run_serve(listen, app_config).await;
        }
        Commands::Check {
            source,
            retry_delay,
            max_workers,
            diagnostics_dir,
            output_dir,
            retest,
            retries,
            threshold,
            first_success,
            probe,
            config,
        } => {
            let mut app_config = load_config(config.as_deref());
            let c = &mut app_config.check;
            if source.is_some() {
                c.source = source;
            }
            if let Some(v) = retry_delay {
                c.retry_delay_secs = v;
            }
            if let Some(v) = max_workers {
                c.max_workers = v;
            }
            if diagnostics_dir.is_some() {
                c.diagnostics_dir = diagnostics_dir;
            }
            if let Some(v) = output_dir {
                c.output_dir = v;
            }
            if let Some(v) = retries {
                c.retries = v;
            }
            if let Some(v) = threshold {
                c.alive_threshold = v;
            }
            if let Some(v) = probe {
                c.probe = v;
            }
            c.retest |= retest;
            c.first_success |= first_success;
            run_check(validated(app_config)).await;
        }
        Commands::Filter {
            source,
            keywords,
            output,
        } => {
            init_tracing("pretty", "warn");
            run_filter(source, keywords, output).await;
        }
        Commands::Bench {
            source,
            workers,
            sample,
            retry_delay,
            probe,
            config,
        } => {
            let mut app_config = load_config_with_level(config.as_deref(), "warn");
            if let Some(v) = retry_delay {
                app_config.check.retry_delay_secs = v;
            }
            if let Some(v) = probe {
                app_config.check.probe = v;
            }
            run_bench(source, workers, sample, validated(app_config)).await;
        }
    }
}

fn load_config(path: Option<&Path>) -> AppConfig {
    load_config_with_level(path, "info")
}

/// Load the config file (if any) and initialise tracing from it. Exits on an
/// invalid file.
fn load_config_with_level(path: Option<&Path>, level: &str) -> AppConfig {
    let Some(path) = path else {
        init_tracing("pretty", level);
        return AppConfig::default();
    };
    match AppConfig::load(path) {
        Ok(c) => {
            init_tracing(&c.server.log_format, level);
            tracing::info!(path = %path.display(), "Loaded config file");
            c
        }
        Err(e) => {
            init_tracing("pretty", level);
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    }
}

/// Re-check the config once flags are merged in. Exits on an invalid value.
fn validated(app_config: AppConfig) -> AppConfig {
    if let Err(e) = app_config.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
    app_config
}

fn build_probe(kind: ProbeKind, ffprobe_path: Option<String>, user_agent: &str) -> Arc<dyn Probe> {
    match kind {
        ProbeKind::Ffprobe => Arc::new(FfprobeProbe::new(ffprobe_path, user_agent)),
        ProbeKind::Http => Arc::new(HttpProbe::new(user_agent)),
    }
}

async fn run_serve(listen_override: Option<SocketAddr>, app_config: AppConfig) {
    let listen = listen_override.unwrap_or(app_config.server.listen);
    let default_config = app_config.check.to_check_config();
    let probe = build_probe(
        app_config.check.probe,
        app_config.check.ffprobe_path.clone(),
        &default_config.user_agent,
    );

    let state = m3u_api::state::AppState::new()
        .with_default_config(default_config)
        .with_probe(probe);

    tracing::info!(%listen, probe = %app_config.check.probe, "Starting playlist checker API server");
    if let Err(e) = m3u_api::serve_with_state(listen, state, m3u_api::shutdown_signal()).await {
        tracing::error!(error = %e, "Server failed");
        std::process::exit(1);
    }

    tracing::info!("Shutdown complete");
}

async fn run_check(app_config: AppConfig) {
    let section = app_config.check;
    let Some(source) = section.source.clone() else {
        tracing::error!("No playlist source given: pass SOURCE or set check.source in the config file");
        std::process::exit(1);
    };

    let config = section.to_check_config();
    let probe = build_probe(section.probe, section.ffprobe_path.clone(), &config.user_agent);
    let loader = HttpSource::default();

    let channels = match load_channels(&loader, &source).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load playlist");
            std::process::exit(1);
        }
    };

    println!(
        "{} {}",
        style("m3u-health").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("  {} {}", style("source: ").dim(), style(&source).bold());
    println!("  {} {}", style("channels:").dim(), channels.len());
    println!(
        "  {} {} x{} ({})",
        style("probe:  ").dim(),
        section.probe,
        config.retries,
        match config.retry_mode {
            RetryMode::Exhaustive => "exhaustive",
            RetryMode::FirstSuccess => "first success",
        }
    );
    println!("  {} {}", style("workers:").dim(), config.max_workers);
    println!();

    let bar = ProgressBar::new(channels.len() as u64).with_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                match event {
                    CheckEvent::BatchCompleted {
                        checked,
                        alive,
                        unstable,
                        dead,
                        timeout_secs,
                        ..
                    } => {
                        bar.set_position(checked as u64);
                        bar.set_message(format!(
                            "{} {} {} timeout {:.1}s",
                            style(format!("alive {}", alive)).green(),
                            style(format!("unstable {}", unstable)).yellow(),
                            style(format!("dead {}", dead)).red(),
                            timeout_secs
                        ));
                    }
                    CheckEvent::RetestCompleted { recovered, failed } => {
                        bar.println(format!(
                            "  {} {} recovered, {} failed",
                            style("retest:").dim(),
                            recovered,
                            failed
                        ));
                    }
                }
            }
        })
    };

    let checker = Checker::new(config, probe).with_events(tx);
    let report = checker.run(channels, section.retest).await;
    drop(checker);
    let _ = progress.await;
    bar.finish_and_clear();

    print_summary(&report);

    match write_outputs(&report, &section.output_dir).await {
        Ok(files) => {
            for path in [&files.alive, &files.dead, &files.unstable].into_iter().flatten() {
                println!("  {} {}", style("wrote").dim(), path.display());
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to write output playlists");
            std::process::exit(1);
        }
    }
}

fn print_summary(report: &CheckReport) {
    let s = report.summary();
    println!(
        "{} {} channels in {:.1}s ({} batches, final timeout {:.2}s)",
        style("Checked").bold(),
        s.total,
        report.duration_secs(),
        report.batches,
        report.final_timeout_secs
    );
    println!("  {} {}", style(format!("{:<9}", "ALIVE")).green().bold(), s.alive);
    println!("  {} {}", style(format!("{:<9}", "UNSTABLE")).yellow().bold(), s.unstable);
    println!("  {} {}", style(format!("{:<9}", "DEAD")).red().bold(), s.dead);
    if s.retested > 0 {
        println!(
            "  {} {} of {} recovered",
            style(format!("{:<9}", "RETESTED")).cyan().bold(),
            s.recovered,
            s.retested
        );
    }
    println!();
}

async fn run_filter(source: String, keywords: Vec<String>, output: PathBuf) {
    let channels = match load_channels(&HttpSource::default(), &source).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load playlist");
            std::process::exit(1);
        }
    };
    println!("Loaded {} channels from {}", channels.len(), style(&source).bold());
    println!("Filtering by keywords: {}", keywords.join(", "));

    let matched = filter_channels(&channels, &keywords);
    println!("Found {} matching channels.", style(matched.len()).bold());
    if matched.is_empty() {
        println!("{}", style("No channels matched the keywords.").dim());
        return;
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            tracing::error!(path = %parent.display(), error = %e, "Failed to create output directory");
            std::process::exit(1);
        }
    }
    if let Err(e) = tokio::fs::write(&output, render_playlist(&matched)).await {
        tracing::error!(path = %output.display(), error = %e, "Failed to write filtered playlist");
        std::process::exit(1);
    }
    println!("  {} {}", style("wrote").dim(), output.display());
}

fn default_worker_values() -> Vec<usize> {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4);
    vec![cpus, cpus * 2, cpus * 4, cpus * 8]
}

async fn run_bench(source: String, workers: Vec<usize>, sample: usize, app_config: AppConfig) {
    let section = app_config.check;
    let mut channels = match load_channels(&HttpSource::default(), &source).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load playlist");
            std::process::exit(1);
        }
    };
    channels.truncate(sample);
    if channels.is_empty() {
        println!("{}", style("Playlist has no channels to benchmark.").dim());
        return;
    }

    let workers = if workers.is_empty() {
        default_worker_values()
    } else {
        workers
    };
    let base = section.to_check_config();
    let probe = build_probe(section.probe, section.ffprobe_path.clone(), &base.user_agent);

    println!(
        "Benchmarking {} channels with {} probe",
        channels.len(),
        section.probe
    );

    let mut timings = Vec::with_capacity(workers.len());
    for n in workers.into_iter().filter(|n| *n > 0) {
        let checker = Checker::new(base.clone().with_max_workers(n), probe.clone());
        let started = Instant::now();
        checker.check(channels.clone()).await;
        let elapsed = started.elapsed().as_secs_f64();
        println!("  max_workers={:<6} {:.2}s", n, elapsed);
        timings.push((n, elapsed));
    }

    if let Some((n, elapsed)) = timings
        .iter()
        .copied()
        .min_by(|a, b| a.1.total_cmp(&b.1))
    {
        println!();
        println!(
            "Recommended max_workers: {} (time: {:.2}s)",
            style(n).green().bold(),
            elapsed
        );
    }
}

fn init_tracing(log_format: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}
