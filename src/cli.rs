// src/cli.rs

use clap::{Arg, Command};

/// Build the command-line interface for the application
pub fn build_cli() -> Command {
    Command::new("ytdlbot")
        .version(crate::VERSION)
        .about("Chat bot that downloads media links with yt-dlp")
        .subcommand(Command::new("serve").about("Run the bot (default)"))
        .subcommand(
            Command::new("quota")
                .about("Show the remaining quota of a user")
                .arg(
                    Arg::new("user")
                        .help("User id to inspect")
                        .required(true)
                        .index(1)
                        .value_parser(clap::value_parser!(i64)),
                ),
        )
        .subcommand(Command::new("reset-quota").about("Restore the full quota of every user"))
        .subcommand(Command::new("check-tools").about("Verify that yt-dlp and ffmpeg can be executed"))
        .arg(
            Arg::new("workers")
                .long("workers")
                .short('w')
                .env("WORKERS")
                .help("Maximum number of requests handled at once")
                .value_parser(clap::value_parser!(usize))
                .default_value("100")
                .global(true),
        )
        .arg(
            Arg::new("quota")
                .long("quota")
                .env("QUOTA")
                .help("Quota units granted per window")
                .value_parser(clap::value_parser!(u64))
                .default_value("5")
                .global(true),
        )
        .arg(
            Arg::new("quota-mode")
                .long("quota-mode")
                .env("QUOTA_MODE")
                .help("What a quota unit counts (requests or bytes)")
                .value_parser(["requests", "bytes"])
                .default_value("requests")
                .global(true),
        )
        .arg(
            Arg::new("quota-window")
                .long("quota-window")
                .env("QUOTA_WINDOW")
                .help("Length of a quota window in seconds")
                .value_parser(clap::value_parser!(u64))
                .default_value("86400")
                .global(true),
        )
        .arg(
            Arg::new("reset-at")
                .long("reset-at")
                .env("RESET_AT")
                .help("Local time of the daily quota reset (HH:MM)")
                .value_name("HH:MM")
                .default_value("00:00")
                .global(true),
        )
        .arg(
            Arg::new("state-dir")
                .long("state-dir")
                .env("STATE_DIR")
                .help("Directory for persisted quota and VIP state")
                .value_name("DIRECTORY")
                .global(true),
        )
        .arg(
            Arg::new("workspace-dir")
                .long("workspace-dir")
                .env("WORKSPACE_DIR")
                .help("Root for per-job working directories")
                .value_name("DIRECTORY")
                .global(true),
        )
        .arg(
            Arg::new("outbox-dir")
                .long("outbox-dir")
                .env("OUTBOX_DIR")
                .help("Directory the console transport delivers files into")
                .value_name("DIRECTORY")
                .global(true),
        )
        .arg(
            Arg::new("ytdl-bin")
                .long("ytdl-bin")
                .env("YTDL_BIN")
                .help("yt-dlp executable")
                .default_value("yt-dlp")
                .global(true),
        )
        .arg(
            Arg::new("ffmpeg-bin")
                .long("ffmpeg-bin")
                .env("FFMPEG_BIN")
                .help("ffmpeg executable")
                .default_value("ffmpeg")
                .global(true),
        )
        .arg(
            Arg::new("download-timeout")
                .long("download-timeout")
                .env("DOWNLOAD_TIMEOUT")
                .help("Abort a download after this many seconds")
                .value_parser(clap::value_parser!(u64))
                .global(true),
        )
        .arg(
            Arg::new("vip-users")
                .long("vip-users")
                .env("VIP_USERS")
                .help("Comma separated list of VIP user ids")
                .value_delimiter(',')
                .value_parser(clap::value_parser!(i64))
                .global(true),
        )
        .arg(
            Arg::new("payment-url")
                .long("payment-url")
                .env("PAYMENT_URL")
                .help("Endpoint verifying VIP payments")
                .value_name("URL")
                .global(true),
        )
        .arg(
            Arg::new("owner-id")
                .long("owner-id")
                .env("OWNER_ID")
                .help("User id allowed to see metrics")
                .value_parser(clap::value_parser!(i64))
                .global(true),
        )
        .arg(
            Arg::new("progress-step")
                .long("progress-step")
                .env("PROGRESS_STEP")
                .help("Minimum percentage change between progress edits")
                .value_parser(clap::value_parser!(u8).range(1..=100))
                .default_value("5")
                .global(true),
        )
        .arg(
            Arg::new("progress-window")
                .long("progress-window")
                .env("PROGRESS_WINDOW")
                .help("Seconds after which a progress edit is sent regardless of change")
                .value_parser(clap::value_parser!(u64))
                .default_value("5")
                .global(true),
        )
        .arg(
            Arg::new("error-limit")
                .long("error-limit")
                .env("ERROR_LIMIT")
                .help("Maximum characters of error detail shown to users")
                .value_parser(clap::value_parser!(usize))
                .default_value("4000")
                .global(true),
        )
}
