use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use anyhow::Context;
use clap::Parser;
use log::{error, info};

use vidgrab::config::AppConfig;
use vidgrab::downloader::{DownloadRequest, MediaFormat, Quality, YtDlpBackend};
use vidgrab::session::{Outcome, SessionController};
use vidgrab::terminal::TerminalNotifier;

#[derive(Parser, Debug)]
#[command(name = "vidgrab", version, about = "Download YouTube videos and audio with yt-dlp")]
struct Args {
    /// Video URL
    url: String,

    /// Output format (defaults to the configured one)
    #[arg(short, long, value_enum)]
    format: Option<MediaFormat>,

    #[arg(short, long, value_enum)]
    quality: Option<Quality>,

    /// Directory to save into
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the available formats and exit
    #[arg(long)]
    list_formats: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let args = Args::parse();

    let loaded = match &args.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = match loaded {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            AppConfig::default()
        }
    };

    let backend = Arc::new(YtDlpBackend::new(&config));

    if args.list_formats {
        let formats = backend
            .list_formats(&args.url)
            .await
            .context("Failed to list formats")?;
        println!("{}", formats);
        return Ok(ExitCode::SUCCESS);
    }

    let controller = Arc::new(
        SessionController::new(backend, Arc::new(TerminalNotifier::new()))
            .with_poll_interval(config.poll_interval()),
    );

    let cancel_on_interrupt = controller.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, cancelling download");
            cancel_on_interrupt.cancel().await;
        }
    });

    let request = DownloadRequest {
        url: args.url,
        format: args.format.unwrap_or(config.preferred_format),
        quality: args.quality.unwrap_or(config.preferred_quality),
        output_dir: args.output,
    };

    let outcome = controller.submit(request).await?;
    Ok(match outcome {
        Outcome::Success(_) => ExitCode::SUCCESS,
        Outcome::Failure(_) => ExitCode::FAILURE,
        Outcome::Cancelled => ExitCode::from(130),
    })
}
