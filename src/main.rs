#[macro_use]
extern crate log;

use std::{path::PathBuf, process::ExitCode, time::Duration};

use bili_live_rs::{api, ffmpeg, monitor, selector::CodecPolicy, util};
use clap::Parser;

/// Watch a Bilibili live room and record every broadcast with ffmpeg.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Room id or live room URL
    #[arg(value_parser = parse_room)]
    room: u64,

    /// Codec selection policy
    #[arg(long, value_enum, default_value_t = CodecPolicy::PreferHevc)]
    codec: CodecPolicy,

    /// Seconds between status checks while the room is offline
    #[arg(long, default_value_t = 60)]
    interval: u64,

    /// Directory recordings are written to
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Container of the recordings, picked by ffmpeg from the extension
    #[arg(long, default_value = "mp4")]
    format: String,

    /// ffmpeg executable
    #[arg(long, default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// Failed status checks in a row tolerated before exiting
    #[arg(long, default_value_t = 0)]
    fetch_retries: u32,
}

fn parse_room(s: &str) -> Result<u64, String> {
    api::parse_room_id(s).ok_or_else(|| format!("not a room id or live room URL: {}", s))
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let http = match util::HttpClient::new(util::ClientConfig::default()) {
        Ok(http) => http,
        Err(e) => {
            error!("Could not create HttpClient: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let api = api::ApiClient::new(http, cli.room);

    let config = monitor::MonitorConfig {
        poll_interval: Duration::from_secs(cli.interval),
        codec_policy: cli.codec,
        output_dir: cli.output_dir,
        extension: cli.format,
        capture_headers: api.http().config.capture_headers(),
        max_fetch_failures: cli.fetch_retries,
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        info!("Interrupted, finishing the current recording");
        let _ = shutdown_tx.send(true);

        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted again, exiting now");
            std::process::exit(130);
        }
    });

    let capture = ffmpeg::FfmpegCapture::new(&cli.ffmpeg).with_interrupt(shutdown_rx.clone());
    let mut monitor =
        monitor::RoomMonitor::new(api, capture, config).with_shutdown(shutdown_rx);

    match monitor.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", error_chain(&e));
            ExitCode::FAILURE
        }
    }
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut msg = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
