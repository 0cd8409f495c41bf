//! Binary entry point: logging and error-report setup, config load, dispatch.

mod cli;
mod error_fmt;
mod rt;
mod run;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};

fn main() {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    if let Err(err) = try_main(cli) {
        if JSON_MODE.get().copied().unwrap_or(false) {
            println!("{}", error_fmt::format_error_json(&err));
        } else {
            eprintln!("{}", error_fmt::humanize(&err));
        }
        std::process::exit(error_fmt::exit_code_for_error(&err));
    }
}

fn try_main(cli: Cli) -> eyre::Result<()> {
    color_eyre::install()?;

    let cfg = load_config(&cli.config)?;
    init_tracing(&cli, &cfg.logging);
    tracing::info!(
        config = %cli.config.display(),
        steps_per_rev = cfg.machine.steps_per_rev,
        direction = cfg.machine.direction,
        "profile loaded"
    );

    let settings_path = cli
        .settings_file
        .clone()
        .unwrap_or_else(|| PathBuf::from(&cfg.settings.path));

    match cli.cmd {
        Commands::Run {
            for_ms,
            demo,
            sim,
            print_runtime,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
            stats,
        } => {
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let flag = shutdown.clone();
                ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
                    .wrap_err("install ctrl-c handler")?;
            }

            let opts = run::RunOpts {
                for_ms,
                demo,
                rt,
                rt_prio,
                rt_lock,
                rt_cpu,
                stats,
                json: cli.json,
            };

            let t0 = Instant::now();
            let summary = {
                #[cfg(all(feature = "hardware", target_os = "linux"))]
                {
                    if sim || demo {
                        run::run_sim(&cfg, &settings_path, &opts, shutdown)?
                    } else {
                        run::run_hardware(&cfg, &settings_path, &opts, shutdown)?
                    }
                }
                #[cfg(not(all(feature = "hardware", target_os = "linux")))]
                {
                    let _ = sim; // the backend is always simulated without the hardware feature
                    run::run_sim(&cfg, &settings_path, &opts, shutdown)?
                }
            };
            let elapsed = t0.elapsed();

            if cli.json {
                let rec = serde_json::json!({
                    "timestamp": run::unix_ms(),
                    "final_state": summary.final_state,
                    "position_mm": summary.position_mm,
                    "duration_ms": elapsed.as_millis() as u64,
                    "ticks": summary.ticks,
                    "profile": summary.profile,
                });
                println!("{rec}");
            } else {
                println!(
                    "run complete: state={} position={:.2} mm ticks={}",
                    summary.final_state, summary.position_mm, summary.ticks
                );
                if print_runtime {
                    println!("total runtime: {} ms", elapsed.as_millis());
                }
            }
            Ok(())
        }
        Commands::SelfCheck => {
            run::self_check(&cfg, &settings_path)?;
            println!("self-check ok");
            Ok(())
        }
        Commands::Health => {
            let rec = serde_json::json!({
                "status": "ok",
                "name": env!("CARGO_PKG_NAME"),
                "version": env!("CARGO_PKG_VERSION"),
                "config": cli.config.display().to_string(),
                "steps_per_rev": cfg.machine.steps_per_rev,
                "direction": cfg.machine.direction,
            });
            println!("{rec}");
            Ok(())
        }
    }
}

fn load_config(path: &std::path::Path) -> eyre::Result<lift_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = lift_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("validate config {}", path.display()))?;
    Ok(cfg)
}

/// Console logs go to stderr so stdout stays clean for frames and the JSONL
/// stream; a `[logging].file` routes them to a non-blocking JSON file writer
/// instead.
fn init_tracing(cli: &Cli, logging: &lift_config::Logging) {
    let level = cli
        .log_level
        .clone()
        .or_else(|| logging.level.clone())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if let Some(file) = &logging.file {
        let p = std::path::Path::new(file);
        let dir = match p.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => std::path::Path::new("."),
        };
        let name = p
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "lift.log".into());
        let appender = match logging.rotation.as_deref() {
            Some("daily") => tracing_appender::rolling::daily(dir, name),
            Some("hourly") => tracing_appender::rolling::hourly(dir, name),
            _ => tracing_appender::rolling::never(dir, name),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .with_ansi(false)
            .init();
    } else if cli.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_writer(std::io::stderr)
            .init();
    }
}
