// src/main.rs

use colored::*;
use env_logger::Builder;
use log::{debug, error, info, LevelFilter};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use ytdlbot::bot::{Bot, BotParts, BotSettings};
use ytdlbot::cli::build_cli;
use ytdlbot::config::Config;
use ytdlbot::console::ConsoleTransport;
use ytdlbot::dispatcher::JobDispatcher;
use ytdlbot::error::AppError;
use ytdlbot::metrics::MetricsRecorder;
use ytdlbot::postprocess::{FfmpegConverter, PostProcessor};
use ytdlbot::quota::{load_quota_state, save_quota_state, spawn_autosave, MemoryQuotaStore, QuotaStore};
use ytdlbot::scheduler::ResetScheduler;
use ytdlbot::text;
use ytdlbot::tools::check_tools;
use ytdlbot::vip::VipRegistry;
use ytdlbot::ytdlp::YtDlpDownloader;
use ytdlbot::VERSION;

const AUTOSAVE_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize the logger with a custom format
    init_logger();

    info!("ytdlbot starting up - version {}", VERSION);

    let matches = build_cli().get_matches();
    let config = Config::from_matches(&matches)?;
    debug!("configuration: {:?}", config);

    std::fs::create_dir_all(&config.state_dir)?;
    let quota = Arc::new(MemoryQuotaStore::new(config.quota_cap, config.quota_window));
    load_quota_state(&quota, config.quota_state_path()).await?;

    match matches.subcommand() {
        Some(("quota", sub)) => {
            let user = sub.get_one::<i64>("user").copied().unwrap_or_default();
            let status = quota.remaining(user);
            println!(
                "{} {}",
                format!("User {}:", user).bright_cyan(),
                text::remaining_quota_caption(&status, config.quota_mode)
            );
            Ok(())
        }
        Some(("reset-quota", _)) => {
            quota.reset_all();
            save_quota_state(&quota, config.quota_state_path()).await?;
            println!("{}", "Quota of every user restored.".green());
            Ok(())
        }
        Some(("check-tools", _)) => {
            let mut missing = false;
            for result in check_tools(&config.ytdl_bin, &config.ffmpeg_bin).await {
                match result {
                    Ok(tool) if tool.is_min_version => {
                        println!("{} {}", format!("{}:", tool.binary).green(), tool.version)
                    }
                    Ok(tool) => println!(
                        "{} {} (minimum {})",
                        format!("{}:", tool.binary).yellow(),
                        tool.version,
                        tool.kind.min_version()
                    ),
                    Err(e) => {
                        missing = true;
                        println!("{}", e.to_string().red());
                    }
                }
            }
            if missing {
                return Err(AppError::General("Required tools are missing".to_string()));
            }
            Ok(())
        }
        _ => serve(config, quota).await,
    }
}

async fn serve(config: Config, quota: Arc<MemoryQuotaStore>) -> Result<(), AppError> {
    println!("{}", format!("ytdlbot v{}", VERSION).bright_cyan().bold());
    println!(
        "{}",
        "Send '<user_id> <link>' to download, '<user_id> !audio <message_id>' to extract audio.".cyan()
    );

    check_tools(&config.ytdl_bin, &config.ffmpeg_bin).await;

    let autosave = spawn_autosave(Arc::clone(&quota), config.quota_state_path(), AUTOSAVE_INTERVAL);
    let quota_store: Arc<dyn QuotaStore> = quota.clone();
    let reset = ResetScheduler::new(Arc::clone(&quota_store), config.reset_at);
    info!("daily quota reset scheduled, next at {}", reset.next_fire().format("%Y-%m-%d %H:%M:%S"));
    let reset = reset.spawn();

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let vip = VipRegistry::new(config.vip_users.iter().copied(), config.payment_url.clone(), client)
        .with_state_file(config.vip_state_path())?;

    let downloader = YtDlpDownloader::new(&config.ytdl_bin).with_timeout(config.download_timeout);
    let dispatcher = JobDispatcher::new(Arc::new(downloader), config.workspace_dir.clone())
        .with_error_limit(config.error_limit);
    let postprocessor = PostProcessor::new(
        Arc::new(FfmpegConverter::new(&config.ffmpeg_bin)),
        config.workspace_dir.clone(),
    );

    let bot = Arc::new(Bot::new(
        BotParts {
            transport: Arc::new(ConsoleTransport::stdin(config.outbox_dir.clone())),
            quota: quota_store,
            vip: Arc::new(vip),
            dispatcher,
            postprocessor,
            metrics: Arc::new(MetricsRecorder::new()),
        },
        BotSettings {
            workers: config.workers,
            quota_mode: config.quota_mode,
            throttle: config.throttle,
            error_limit: config.error_limit,
            owner_id: config.owner_id,
        },
    ));

    tokio::select! {
        _ = Arc::clone(&bot).serve() => info!("input closed, shutting down"),
        _ = tokio::signal::ctrl_c() => info!("interrupted, shutting down"),
    }

    reset.abort();
    autosave.abort();
    if let Err(e) = save_quota_state(&quota, config.quota_state_path()).await {
        error!("Failed to save quota state: {}", e);
        return Err(e);
    }
    debug!("final metrics:\n{}", bot.metrics().render());
    Ok(())
}

fn init_logger() {
    // Create a custom logger builder
    let mut builder = Builder::from_default_env();

    // Set the default level based on debug/release mode
    if cfg!(debug_assertions) {
        builder.filter_level(LevelFilter::Debug);
    } else {
        builder.filter_level(LevelFilter::Info);
    }

    builder.format(|buf, record| {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        writeln!(
            buf,
            "[{} {} {}] {}",
            timestamp,
            record.level().to_string().to_uppercase(),
            record.module_path().unwrap_or("unknown"),
            record.args()
        )
    });

    // Allow override through RUST_LOG environment variable
    builder.parse_env("RUST_LOG");
    builder.init();
}
