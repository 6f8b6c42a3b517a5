#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions)]
//! `spotter` binary: config loading, logging setup and command dispatch.

mod cli;
mod error_fmt;
mod rt;
mod session;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD, JSON_MODE, RtLock};
use eyre::WrapErr;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(json: bool, level: &str, logging: &spotter_config::Logging) {
    let level = logging.level.as_deref().unwrap_or(level);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = if json {
        fmt::layer().json().with_writer(std::io::stderr).boxed()
    } else {
        fmt::layer().with_writer(std::io::stderr).boxed()
    };

    // Optional JSON-lines file sink from the config.
    let file = logging.file.as_ref().map(|path| {
        let path = std::path::Path::new(path);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().unwrap_or_else(|| "spotter.log".as_ref());
        let appender =
            tracing_appender::rolling::never(dir.unwrap_or_else(|| ".".as_ref()), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
}

fn load_config(path: &std::path::Path) -> eyre::Result<spotter_config::Config> {
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("read config {}", path.display()))?;
    let cfg = spotter_config::load_toml(&text)
        .wrap_err_with(|| format!("parse config {}", path.display()))?;
    cfg.validate()
        .wrap_err_with(|| format!("invalid configuration in {}", path.display()))?;
    Ok(cfg)
}

fn dispatch(args: &Cli) -> eyre::Result<()> {
    let cfg = load_config(&args.config)?;
    match &args.cmd {
        Commands::Run {
            windows,
            csv,
            rt,
            rt_prio,
            rt_lock,
            rt_cpu,
        } => {
            rt::setup_rt_once(
                *rt,
                *rt_prio,
                (*rt_lock).unwrap_or_else(|| RtLock::os_default()),
                *rt_cpu,
            );
            session::run(&cfg, *windows, csv.as_deref())
        }
        Commands::SelfCheck => {
            session::self_check(&cfg)?;
            if *JSON_MODE.get().unwrap_or(&false) {
                println!("{}", serde_json::json!({ "status": "ok" }));
            } else {
                println!("self-check: OK");
            }
            Ok(())
        }
    }
}

fn main() {
    let args = Cli::parse();
    let _ = JSON_MODE.set(args.json);
    if let Err(e) = color_eyre::install() {
        eprintln!("failed to install error reporter: {e}");
    }

    // Logging config lives in the TOML, but a broken config must still log:
    // fall back to CLI-only settings if the file does not load.
    let logging = load_config(&args.config)
        .map(|c| c.logging)
        .unwrap_or_default();
    init_logging(args.json, &args.log_level, &logging);

    if let Err(e) = dispatch(&args) {
        if args.json {
            eprintln!("{}", error_fmt::format_error_json(&e));
        } else {
            eprintln!("Error: {}", error_fmt::humanize(&e));
        }
        std::process::exit(error_fmt::exit_code_for_error(&e));
    }
}
