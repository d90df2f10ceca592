use splash_analyzer::ffmpeg::check_ffmpeg_available;
use splash_common::Config;
use splash_leaderboard::SubmitOutcome;
use std::path::PathBuf;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        mode = config.capture.mode,
        host = config.capture.host,
        roi = config.analysis.roi.to_arg(),
        stride = config.analysis.stride,
        refine_range = config.analysis.refine_range,
        oracle = config.oracle.command.as_deref().unwrap_or("none"),
        backend = config.leaderboard.backend,
        capacity = config.leaderboard.capacity,
        "starting splash runner"
    );

    // Decoding and the overlay video both need ffmpeg on this host.
    check_ffmpeg_available();

    let summary = match splash_runner::spawn_run(config).await {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            error!(error = %e, "run failed");
            std::process::exit(1);
        }
        Err(e) => {
            error!(error = %e, "run task aborted");
            std::process::exit(1);
        }
    };

    match summary.outcome {
        SubmitOutcome::Ranked { rank, .. } => {
            println!("Score {:.1} placed #{rank}", summary.score)
        }
        SubmitOutcome::Dropped => {
            println!("Score {:.1} did not make the leaderboard", summary.score)
        }
    }
    for (i, entry) in summary.leaderboard.iter().enumerate() {
        println!(
            "{}. {:>6.1}  {}  {}",
            i + 1,
            entry.score,
            entry.video.display(),
            entry.thumbnail.display()
        );
    }
}
