use anyhow::{anyhow, Context, Result};
use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use reelforge::{Config, EngineRegistry, JobQueue, JobStatus, Scheduler, SubmitRequest};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("reelforge")
        .version(env!("CARGO_PKG_VERSION"))
        .author("TigreRoll")
        .about("Render declarative specs into infographics, motion clips and compositions")
        .arg(
            Arg::new("spec")
                .value_name("SPEC")
                .help("Render spec JSON files to submit")
                .num_args(1..)
                .required(true),
        )
        .arg(
            Arg::new("output-dir")
                .short('o')
                .long("output-dir")
                .value_name("DIR")
                .help("Directory receiving finished artifacts"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file (TOML)"),
        )
        .arg(
            Arg::new("browser")
                .short('b')
                .long("browser")
                .value_name("PATH")
                .help("Headless Chromium-compatible browser executable"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .help("Keep workspaces and append diagnostics to errors")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Enable verbose logging")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let default_filter = if matches.get_flag("verbose") {
        "reelforge=debug,info"
    } else {
        "reelforge=info,warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let mut config = match matches.get_one::<String>("config") {
        Some(path) => Config::load_from(&PathBuf::from(path))?,
        None => Config::load().unwrap_or_else(|e| {
            warn!("Failed to load config, using defaults: {}", e);
            Config::default()
        }),
    };
    if let Some(dir) = matches.get_one::<String>("output-dir") {
        config.output.base_dir = PathBuf::from(dir);
    }
    if let Some(browser) = matches.get_one::<String>("browser") {
        config.browser.executable = PathBuf::from(browser);
    }
    if matches.get_flag("debug") {
        config.output.debug = true;
    }
    config.validate()?;

    info!("🚀 Reelforge starting...");
    info!("{}", config.summary());

    tokio::fs::create_dir_all(&config.output.base_dir)
        .await
        .with_context(|| format!("Cannot create {}", config.output.base_dir.display()))?;

    let queue = JobQueue::new();
    let registry = Arc::new(EngineRegistry::from_config(&config));
    let scheduler = Scheduler::from_config(&config, queue.clone(), registry);

    let mut rejected = 0;
    let spec_files: Vec<&String> = matches
        .get_many::<String>("spec")
        .map(|values| values.collect())
        .unwrap_or_default();

    for file in spec_files {
        let submission = std::fs::read_to_string(file)
            .map_err(|e| anyhow!("Cannot read {}: {}", file, e))
            .and_then(|json| SubmitRequest::from_json(&json).map_err(Into::into))
            .and_then(|request| request.into_spec(&config.defaults).map_err(Into::into));

        match submission {
            Ok(spec) => {
                let job = queue.create_job(spec).await;
                info!("📄 {} -> job {}", file, job.id);
            }
            Err(e) => {
                error!("❌ Rejected {}: {}", file, e);
                rejected += 1;
            }
        }
    }

    let start_time = std::time::Instant::now();
    scheduler.drain().await;
    let duration = start_time.elapsed();

    let jobs = queue.list_jobs().await;
    for job in &jobs {
        match job.status {
            JobStatus::Done => info!(
                "✅ {} [{}] {}",
                job.id,
                job.spec.engine,
                job.video_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default()
            ),
            _ => error!(
                "❌ {} [{}] {}",
                job.id,
                job.spec.engine,
                job.error.as_deref().unwrap_or("Unknown error")
            ),
        }
    }

    let stats = queue.stats().await;
    info!("🎉 Finished {} job(s) in {:.2}s", stats.total, duration.as_secs_f64());
    info!("✅ Successful: {}", stats.done);
    info!("❌ Failed: {}", stats.failed + rejected);

    if stats.failed + rejected > 0 {
        return Err(anyhow!("{} spec(s) did not render", stats.failed + rejected));
    }
    Ok(())
}
