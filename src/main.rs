use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, warn};

use lingo_shorts::api::gemini::GeminiBackend;
use lingo_shorts::config::{self, Config};
use lingo_shorts::credentials::CredentialPool;
use lingo_shorts::ffmpeg::FfmpegCompositor;
use lingo_shorts::init;
use lingo_shorts::log::ProjectLog;
use lingo_shorts::pipeline::{CompletedProject, Pipeline, RegenerationOp};
use lingo_shorts::store::Store;

#[derive(Parser)]
#[command(
    name = "lingo-shorts",
    version,
    about = "Turns a prompt into a guess-the-translation short video"
)]
struct Cli {
    /// JSON config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = config::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan and produce a new video from a prompt.
    New { prompt: String },
    /// Resume a project. Without a name, the most recent failed project.
    Resume { name: Option<String> },
    /// Delete and rebuild part of a project. Without a name, the most recent project.
    Regenerate {
        /// all, video, background, intro, music, words or word:N
        target: RegenerationOp,
        name: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt().with_target(false).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!("{err:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(&cli.config).await?;
    init::ensure_directories(&config).await?;
    if !init::check_ffmpeg().await {
        warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let store = Arc::new(
        Store::open(&config.db_file)
            .with_context(|| format!("Failed to open database: {}", config.db_file.display()))?,
    );
    let log = Arc::new(ProjectLog::new(store.clone()));
    let pool = Arc::new(CredentialPool::new(config::api_keys_from_env()?)?);
    log.info(format!("Loaded {} API key(s).", pool.len()));

    let backend = Arc::new(GeminiBackend::new(config.models.clone())?);
    let compositor = Arc::new(FfmpegCompositor::new(config.render.clone(), log.clone()));
    let pipeline = Pipeline::new(config, store, pool, backend, compositor, log.clone());

    let completed = match cli.command {
        Command::New { prompt } => Some(pipeline.create(&prompt).await?),
        Command::Resume { name } => Some(pipeline.resume(name.into()).await?),
        Command::Regenerate { target, name } => pipeline.regenerate(target, name.into()).await?,
    };

    if let Some(done) = completed {
        print_summary(&done);
    }
    Ok(())
}

fn print_summary(done: &CompletedProject) {
    let plan = &done.plan;
    println!();
    println!("{}", "=".repeat(60));
    println!("Project '{}' completed successfully!", done.name);
    println!("Final video: {}", done.video.display());
    println!(
        "Length: {:.1}s{}",
        done.duration_s,
        if done.has_music { "" } else { " (no music)" }
    );
    println!("{}", "-".repeat(20));
    println!("Title ({}): {}", plan.source_language, plan.video_title);
    println!("Description ({}): {}", plan.source_language, plan.video_description);
    println!("Hashtags: {}", plan.hashtags.join(" "));
    println!("{}", "=".repeat(60));
}
