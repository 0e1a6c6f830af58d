use anyhow::Result;
use clap::Parser;
use console::style;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mashup_maker::cli::{Cli, Commands};
use mashup_maker::config::Config;
use mashup_maker::pipeline::MashupPipeline;
use mashup_maker::utils;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let default_filter = if cli.verbose {
        "mashup_maker=debug,mashup=debug"
    } else {
        "mashup_maker=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match &cli.command {
        Commands::Create {
            workers,
            item_timeout,
            staging_dir,
            json,
            ..
        } => {
            // Nothing external happens before the request is known to be valid
            let raw = cli.command.raw_args().unwrap_or_default();
            let request = match raw.validate() {
                Ok(request) => request,
                Err(e) => {
                    eprintln!("{}", style("Error: invalid arguments").red().bold());
                    for violation in &e.violations {
                        eprintln!("   • {}", violation);
                    }
                    eprintln!("Example: mashup create \"Sharry Maan\" 20 25 output.mp3");
                    std::process::exit(2);
                }
            };

            let mut config = Config::load().await?;
            if let Some(workers) = workers {
                config.pipeline.workers = *workers;
            }
            if let Some(secs) = item_timeout {
                config.pipeline.item_timeout_secs = *secs;
            }
            if let Some(dir) = staging_dir {
                config.pipeline.staging_dir = Some(dir.clone());
            }
            config.validate()?;

            // Check for required external dependencies (non-fatal)
            let missing_deps = utils::check_dependencies(&config).await;
            if !missing_deps.is_empty() {
                eprintln!("⚠️  Dependency check warnings:");
                for dep in missing_deps {
                    eprintln!("   • {}", dep);
                }
                eprintln!("   (Continuing anyway - tools may be available)");
            }

            if !cli.quiet && !*json {
                println!("{}", "=".repeat(50));
                println!("  Mashup Maker");
                println!("{}", "=".repeat(50));
                println!("  Source        : {}", request.source_query());
                println!("  Videos        : {}", request.item_count());
                println!("  Clip duration : {}s", request.clip_duration_secs());
                println!("  Output file   : {}", request.output_path().display());
                println!("{}", "=".repeat(50));
            }

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                wait_for_signal().await;
                eprintln!("\nInterrupted by user.");
                trigger.cancel();
            });

            let pipeline = MashupPipeline::new(&config).with_progress(!cli.quiet && !*json);

            match pipeline.run(&request, cancel).await {
                Ok(outcome) => {
                    if *json {
                        println!("{}", serde_json::to_string_pretty(&outcome)?);
                    } else {
                        let size = fs_err::metadata(&outcome.output_path)
                            .map(|m| utils::format_file_size(m.len()))
                            .unwrap_or_else(|_| "unknown size".to_string());
                        println!(
                            "\n{} Mashup saved as '{}' ({})",
                            style("Done!").green().bold(),
                            outcome.output_path.display(),
                            size
                        );
                        for report in &outcome.stages {
                            println!(
                                "  {:<10} {}/{} ok, {} skipped",
                                format!("{}:", report.stage),
                                report.succeeded,
                                report.attempted,
                                report.failed
                            );
                        }
                        println!("Clips included: {}", outcome.summary.items_included);
                        println!(
                            "Total duration: {}",
                            utils::format_duration(outcome.summary.total_duration_seconds)
                        );
                    }
                }
                Err(e) => {
                    eprintln!("{} {}", style("Error:").red().bold(), e);
                    std::process::exit(1);
                }
            }
        }
        Commands::Config { show, init } => {
            let config = Config::load().await?;
            if *init {
                let path = config.save().await?;
                println!("Configuration written to: {}", path.display());
            } else {
                config.display();
                if !*show {
                    println!("\nEdit the config file to change these values:");
                    println!("  {}", Config::config_path()?.display());
                }
            }
        }
        Commands::Check => {
            let config = Config::load().await?;
            let missing = utils::check_dependencies(&config).await;
            if missing.is_empty() {
                println!("{} yt-dlp, ffmpeg and ffprobe are available", style("✓").green());
            } else {
                for dep in missing {
                    eprintln!("{} {}", style("✗").red(), dep);
                }
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on unix
#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        Err(e) => {
            tracing::warn!("Could not register SIGTERM handler, waiting for Ctrl+C only: {}", e);
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C signal: {}", e);
    }
}
