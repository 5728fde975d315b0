mod args;

use args::{Args, Cmd};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use voxreel::models::{
    AspectMode, CompositionRequest, NarrationRequest, TtsResponse, VideoResponse,
};
use voxreel::{Config, ErrorResponse, Orchestrator, PipelineError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the JSON responses, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(dir) = args.artifact_dir {
        config.artifact_dir = dir;
    }

    info!("Using artifact directory {}", config.artifact_dir.display());
    let orchestrator = Orchestrator::from_config(config)?;

    match run(&orchestrator, args.command).await {
        Ok(json) => println!("{json}"),
        Err(e) => {
            error!("{}", e);
            println!("{}", render(&ErrorResponse::from(&e))?);
            std::process::exit(exit_code(&e));
        }
    }
    Ok(())
}

async fn run(orchestrator: &Orchestrator, command: Cmd) -> Result<String, PipelineError> {
    match command {
        Cmd::Tts {
            text,
            lang,
            voice,
            speed,
        } => {
            let request = NarrationRequest {
                text,
                lang,
                voice,
                speed,
            };
            let audio = orchestrator.synthesize(&request).await?;
            render(&TtsResponse::from(&audio))
        }
        Cmd::Video {
            background,
            aspect,
            audio_filename,
            text,
        } => {
            let aspect = AspectMode::parse(&aspect)?;
            let background = orchestrator.store().ingest_background(&background)?;
            let request = CompositionRequest {
                background,
                audio_filename,
                aspect,
                text,
            };
            let video = orchestrator.compose(&request).await?;
            render(&VideoResponse::from(&video))
        }
        Cmd::Download { filename, dest } => {
            let bytes = orchestrator.store().copy_out(&filename, &dest)?;
            info!("Copied {} ({} bytes) to {}", filename, bytes, dest.display());
            render(&serde_json::json!({ "file": dest, "bytes": bytes }))
        }
        Cmd::Voices => render(&orchestrator.config().voices),
    }
}

fn render<T: Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_json::to_string_pretty(value).map_err(|e| PipelineError::Io(e.into()))
}

/// Client errors exit with 2, everything else with 1.
fn exit_code(err: &PipelineError) -> i32 {
    if err.status_code() == 400 { 2 } else { 1 }
}
