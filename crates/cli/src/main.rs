mod cli;
mod output;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use audiograb_core::{
    load_config_or_default, validate_config, ChannelObserver, Config, ConversionController,
    ConversionEvent, ConversionRequest, FfmpegEngine, FormatRegistry,
};

use cli::{Cli, Commands};
use output::{save_result, LogTail};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = load_config_or_default(cli.config.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    validate_config(&config).context("Configuration validation failed")?;
    debug!(?config, "Configuration loaded");

    match cli.command {
        Commands::Formats { json } => list_formats(&config, json).await,
        Commands::Convert {
            input,
            format,
            output_dir,
            overwrite,
        } => {
            let dir = output_dir.unwrap_or_else(|| config.output.directory.clone());
            let overwrite = overwrite || config.output.overwrite;
            convert(&config, &input, &format, &dir, overwrite).await
        }
        Commands::CheckTools => check_tools(&config).await,
    }
}

fn build_controller(config: &Config) -> (Arc<FfmpegEngine>, Arc<ConversionController>) {
    let engine = Arc::new(FfmpegEngine::new(config.engine.clone()));
    let registry = Arc::new(FormatRegistry::new(engine.clone()));
    let controller = Arc::new(ConversionController::new(engine.clone(), registry));
    (engine, controller)
}

async fn list_formats(config: &Config, json: bool) -> Result<()> {
    let (_, controller) = build_controller(config);
    let formats = controller.list_formats_with_support().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&formats)?);
        return Ok(());
    }

    for entry in &formats {
        let spec = entry.format;
        let status = if entry.supported { "yes" } else { "no" };
        println!(
            "{:<6} {:<5} .{:<5} {:<4} {}",
            spec.id, spec.label, spec.extension, status, spec.description
        );
        if let Some(reason) = &entry.reason {
            println!("       {}", reason);
        }
    }
    Ok(())
}

async fn convert(
    config: &Config,
    input: &Path,
    format_id: &str,
    output_dir: &Path,
    overwrite: bool,
) -> Result<()> {
    if !input.exists() {
        bail!("Input file does not exist: {:?}", input);
    }

    let (engine, controller) = build_controller(config);
    engine
        .validate()
        .await
        .context("FFmpeg is not available, run `audiograb check-tools`")?;

    // Unsupported formats fail before the source is read
    let support = controller.registry().support(format_id).await;
    if !support.supported {
        bail!(
            "{}",
            support
                .reason
                .unwrap_or_else(|| format!("unknown output format '{}'", format_id))
        );
    }

    let (observer, mut events) = ChannelObserver::new();
    let request = ConversionRequest::from_path(input, format_id, Arc::new(observer))
        .await
        .with_context(|| format!("Failed to read {:?}", input))?;

    // Ctrl-C cancels the running conversion
    let cancel_controller = Arc::clone(&controller);
    let cancel_task = tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling conversion");
            cancel_controller.request_cancel();
        }
    });

    let printer = tokio::spawn(async move {
        let mut tail = LogTail::default();
        while let Some(event) = events.recv().await {
            match event {
                ConversionEvent::Progress(ratio) => {
                    eprint!("\r{:>3.0}%", ratio * 100.0);
                }
                ConversionEvent::Log(line) => {
                    info!("{}", line);
                    tail.push(line);
                }
            }
        }
        eprintln!();
        tail
    });

    let result = controller.convert(request).await;
    cancel_task.abort();

    // The request owned the only sender, so the printer ends here
    let tail = printer.await.unwrap_or_default();

    match result {
        Ok(done) => {
            let path = save_result(&done, output_dir, overwrite).await?;
            println!("{}", path.display());
            Ok(())
        }
        Err(e) if e.is_cancelled() => bail!("Conversion cancelled"),
        Err(e) => {
            for line in tail.lines() {
                eprintln!("  {}", line);
            }
            bail!("{}", e.user_message())
        }
    }
}

async fn check_tools(config: &Config) -> Result<()> {
    let (engine, controller) = build_controller(config);

    match engine.validate().await {
        Ok(()) => println!("ffmpeg:  {:?}", config.engine.ffmpeg_path),
        Err(e) => {
            println!("ffmpeg:  missing ({})", e);
            bail!("Required tools are missing");
        }
    }
    println!("ffprobe: {:?}", config.engine.ffprobe_path);

    let encoders = engine.capabilities().await;
    println!("audio encoders: {}", encoders.len());

    for entry in controller.list_formats_with_support().await {
        let mark = if entry.supported { "ok" } else { "--" };
        println!("  [{}] {}", mark, entry.format.id);
    }
    Ok(())
}
