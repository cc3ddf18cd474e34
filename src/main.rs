#![allow(clippy::pedantic)]

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use glasstokey::cli::{Cli, Commands};
use glasstokey::config::validate_config;
use glasstokey::daemon::Daemon;
use glasstokey::ipc::{self, IpcRequest, IpcResponse};

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Daemon { config, dry_run }) => {
            tracing_subscriber::fmt()
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .init();

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?;
            runtime.block_on(async {
                let mut daemon = Daemon::new(config.as_deref(), dry_run)?;
                daemon.run().await
            })?;
        }
        Some(Commands::Status { json }) => run_status(json)?,
        Some(Commands::Mode { mode }) => run_set_mode(mode.into())?,
        Some(Commands::Reload) => run_reload()?,
        Some(Commands::Validate { config }) => run_validate(config.as_deref())?,
        Some(Commands::Completion { shell }) => glasstokey::cli::generate_completion(shell),
        None => unreachable!("clap shows help"),
    }

    Ok(())
}

fn run_status(json: bool) -> Result<()> {
    match ipc::send_request(&IpcRequest::Status)? {
        IpcResponse::Status(report) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
                return Ok(());
            }
            println!();
            println!("  {} {:?}", "Mode:".bright_cyan().bold(), report.mode);
            println!("  {} {:?}", "Layers:".bright_cyan().bold(), report.layers);
            for dev in &report.devices {
                println!(
                    "  {} {} ({}) pressure={:?} touches={}",
                    "Device:".bright_cyan().bold(),
                    dev.path,
                    dev.side,
                    dev.pressure,
                    dev.open_touches
                );
            }
            let c = &report.counters;
            println!(
                "  {} frames={} short={} decode={} pool={} dropped={} shed={} forced={}",
                "Counters:".bright_cyan().bold(),
                c.frames,
                c.short_buffers,
                c.decoder_faults,
                c.pool_faults,
                c.ingest_dropped,
                c.motion_dropped,
                c.forced_keyups
            );
            println!();
        }
        IpcResponse::Error(msg) => {
            println!("  {} {}", "✗".bright_red().bold(), msg.red());
            anyhow::bail!("status request failed");
        }
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
    Ok(())
}

fn run_set_mode(mode: glasstokey::engine::RuntimeMode) -> Result<()> {
    match ipc::send_request(&IpcRequest::SetMode(mode))? {
        IpcResponse::Ok => {
            println!("  {} mode set to {:?}", "✓".bright_green().bold(), mode);
            Ok(())
        }
        IpcResponse::Error(msg) => anyhow::bail!("mode change failed: {msg}"),
        other => anyhow::bail!("unexpected response: {other:?}"),
    }
}

fn run_reload() -> Result<()> {
    print!("  {} Sending reload request... ", "→".bright_blue());
    match ipc::send_request(&IpcRequest::Reload) {
        Ok(IpcResponse::Ok) => {
            println!("{}", "✓".bright_green().bold());
            println!(
                "  {} {}",
                "✓".bright_green().bold(),
                "Configuration reloaded successfully!".green()
            );
            Ok(())
        }
        Ok(IpcResponse::Error(msg)) => {
            println!("{}", "✗".bright_red().bold());
            println!("  {} {}", "✗".bright_red().bold(), msg.red());
            anyhow::bail!("config reload failed");
        }
        Ok(other) => anyhow::bail!("unexpected response: {other:?}"),
        Err(e) => {
            println!("{}", "✗".bright_red().bold());
            println!(
                "  {} {}",
                "Tip:".bright_yellow().bold(),
                "Make sure the daemon is running".dimmed()
            );
            Err(e)
        }
    }
}

fn run_validate(config: Option<&std::path::Path>) -> Result<()> {
    let warnings = validate_config(config)?;
    println!("  {} {}", "✓".bright_green().bold(), "Configuration is valid".green());
    for warning in warnings {
        println!("  {} {}", "!".bright_yellow().bold(), warning.yellow());
    }
    Ok(())
}
