use std::{path::PathBuf, pin::pin, process::Stdio};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use futures::StreamExt as _;
use reelcast::{
    AspectRatio, Config, GenerateRequest, JobStatus, RenderService, is_ffmpeg_on_path,
    is_ffprobe_on_path, progress_stream,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "reelcast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Turn a text post into a narrated MP4.
    Generate(GenerateArgs),
    /// Check that the external tools and keys generation needs are available.
    Doctor,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Source {
    /// Post text.
    #[arg(long)]
    text: Option<String>,

    /// File holding the post text.
    #[arg(long)]
    file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct GenerateArgs {
    #[command(flatten)]
    source: Source,

    /// Output shape: 1:1, 9:16 or 16:9.
    #[arg(long, default_value = "16:9")]
    aspect: AspectRatio,

    /// Frame rate (defaults to REEL_FPS).
    #[arg(long)]
    fps: Option<u32>,

    /// Directory for the finished video (defaults to REEL_OUTPUT_DIR).
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Print the final job record as JSON on stdout.
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("reelcast=info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Generate(args) => cmd_generate(args).await,
        Command::Doctor => cmd_doctor(),
    }
}

async fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let text = match (args.source.text, args.source.file) {
        (Some(t), _) => t,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("read post text '{}'", path.display()))?,
        (None, None) => anyhow::bail!("pass --text or --file"),
    };

    let mut cfg = Config::from_env()?;
    if let Some(dir) = args.out_dir {
        cfg.runtime.output_dir = dir;
    }
    let service = RenderService::from_config(&cfg)?;
    tracing::debug!(workers = service.workers(), "render service started");

    let mut request = GenerateRequest::new(text, args.aspect);
    request.fps = args.fps;
    let handle = service.submit(request).await?;
    tracing::info!(job = %handle.id(), "job submitted");

    let rx = service
        .jobs()
        .watch(handle.id())
        .context("submitted job is missing from the job store")?;
    let mut updates = pin!(progress_stream(rx));
    let mut interrupted = false;
    loop {
        tokio::select! {
            next = updates.next() => match next {
                Some(s) => eprintln!("[{:>3}%] {}", s.progress, s.message),
                None => break,
            },
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                eprintln!("cancelling...");
                service.jobs().cancel(handle.id());
            }
        }
    }
    service.shutdown().await;

    let last = handle.snapshot();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&last)?);
    }
    match (last.status, last.result) {
        (JobStatus::Complete, Some(result)) => {
            eprintln!(
                "wrote {} ({:.1}s, {} scenes)",
                result.video_url, result.duration_secs, result.scene_count
            );
            Ok(())
        }
        _ => anyhow::bail!(
            "generation failed: {}",
            last.error.unwrap_or_else(|| "unknown error".to_owned())
        ),
    }
}

fn tool_version_ok(bin: &str) -> bool {
    std::process::Command::new(bin)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

fn cmd_doctor() -> anyhow::Result<()> {
    let cfg = Config::from_env()?;
    let checks = [
        ("ffmpeg on PATH", is_ffmpeg_on_path()),
        ("ffprobe on PATH", is_ffprobe_on_path()),
        (
            "chromedriver runnable",
            tool_version_ok(&cfg.webdriver.chromedriver_bin),
        ),
        ("LLM_API_KEY set", cfg.llm.api_key.is_some()),
        ("TTS_API_KEY set", cfg.tts.api_key.is_some()),
    ];
    let mut missing = 0;
    for (name, ok) in checks {
        eprintln!("{} {name}", if ok { "ok  " } else { "MISS" });
        if !ok {
            missing += 1;
        }
    }
    eprintln!(
        "{} artifact store ({})",
        if cfg.store.is_enabled() { "ok  " } else { "off " },
        if cfg.store.is_enabled() {
            "uploads enabled"
        } else {
            "videos stay local"
        }
    );
    if missing > 0 {
        anyhow::bail!("{missing} required check(s) failed");
    }
    Ok(())
}
