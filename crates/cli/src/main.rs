//! autodub CLI: dub a video into another language.

mod server;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use autodub_core::config::{CacheScope, DubConfig};
use autodub_core::providers::elevenlabs::ElevenLabs;
use autodub_core::providers::VoiceCloner;
use autodub_core::reconcile::OverflowPolicy;
use autodub_core::{DubRequest, Dubber};

// ─── Top-level CLI ───────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "autodub",
    about = "Automatic video dubbing with per-speaker voices",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Dub a video into a target language
    Dub(DubArgs),
    /// Create a voice from a reference clip and print its id
    CloneVoice(CloneVoiceArgs),
    /// Run the HTTP service (POST /dub, results under /temp)
    Serve(ServeArgs),
}

// ─── Pipeline tuning (shared by dub and serve) ───────────────────

#[derive(clap::Args, Debug)]
struct PipelineArgs {
    /// Output directory [default: $AUTODUB_WORK_DIR or ./autodub-output]
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// What to do with speech longer than its slot
    #[arg(long, value_parser = ["stretch", "truncate"])]
    overflow: Option<String>,

    /// Working sample rate in Hz
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Share reference clips across runs of the same URL
    #[arg(long, value_parser = ["session", "source"])]
    cache_scope: Option<String>,

    /// Disable the transcription cache
    #[arg(long, default_value_t = false)]
    no_cache: bool,
}

// ─── Dub ─────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct DubArgs {
    /// Video URL (anything yt-dlp can fetch)
    url: String,

    /// Target language code, e.g. "es" or "fr"
    #[arg(long)]
    lang: String,

    /// Clone each speaker's voice from the original audio
    #[arg(long, default_value_t = false)]
    clone_voice: bool,

    /// Keep music and effects under the dubbed speech
    #[arg(long, default_value_t = false)]
    keep_background: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Print the outcome as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

// ─── Clone voice ─────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct CloneVoiceArgs {
    /// Reference clip (WAV or MP3) of a single speaker
    clip: PathBuf,

    /// Label for the new voice
    #[arg(long)]
    name: String,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

// ─── Serve ───────────────────────────────────────────────────────

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(long, default_value_t = 8000)]
    port: u16,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Show verbose output
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

// ─── Main ────────────────────────────────────────────────────────

fn main() {
    let cli = Cli::parse();

    // Credentials and voice ids usually live in .env
    dotenvy::dotenv().ok();

    let log_level = match &cli.command {
        Command::Dub(a) if a.verbose => "debug",
        Command::CloneVoice(a) if a.verbose => "debug",
        Command::Serve(a) if a.verbose => "debug",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Dub(args) => run_dub(args),
        Command::CloneVoice(args) => run_clone_voice(args),
        Command::Serve(args) => run_serve(args),
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn build_config(args: &PipelineArgs) -> Result<DubConfig> {
    let mut config = DubConfig::from_env()?;

    if let Some(dir) = &args.output_dir {
        config.work_dir = dir.clone();
    }
    if let Some(policy) = &args.overflow {
        config.overflow = policy.parse::<OverflowPolicy>()?;
    }
    if let Some(scope) = &args.cache_scope {
        config.cache_scope = scope.parse::<CacheScope>()?;
    }
    if let Some(sr) = args.sample_rate {
        if sr == 0 {
            bail!("--sample-rate must be positive");
        }
        config.sample_rate = sr;
    }
    if args.no_cache {
        config.use_transcript_cache = false;
    }
    Ok(config)
}

fn run_dub(args: DubArgs) -> Result<()> {
    let config = build_config(&args.pipeline)?;
    let dubber = Dubber::from_config(config)?;

    let request = DubRequest {
        source_url: args.url.clone(),
        target_lang: args.lang.clone(),
        clone_voice: args.clone_voice,
        keep_background: args.keep_background,
    };
    let outcome = dubber.dub(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    let stages: Vec<&str> = outcome.stages.iter().map(|s| s.as_str()).collect();
    println!("Session: {}", outcome.session_id);
    println!("Stages: {}", stages.join(", "));
    println!("Output: {}", outcome.output_path.display());
    Ok(())
}

fn run_serve(args: ServeArgs) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address: {}:{}", args.host, args.port))?;
    let config = build_config(&args.pipeline)?;

    // Providers hold blocking HTTP clients; build them outside the runtime
    // and keep a handle so they are also dropped outside it.
    let dubber = Arc::new(Dubber::from_config(config)?);
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(server::serve(addr, Arc::clone(&dubber)))?;
    drop(runtime);
    drop(dubber);
    Ok(())
}

fn run_clone_voice(args: CloneVoiceArgs) -> Result<()> {
    if !args.clip.is_file() {
        bail!("Reference clip not found: {}", args.clip.display());
    }

    let config = DubConfig::from_env()?;
    let api_key = config
        .elevenlabs_api_key
        .as_deref()
        .context("ELEVENLABS_API_KEY is not set")?;
    let client = ElevenLabs::new(api_key, config.sample_rate, config.http_timeout, config.retry)?;

    let voice = client.clone_voice(&args.clip, &args.name)?;
    println!("Voice ID: {}", voice);
    Ok(())
}
