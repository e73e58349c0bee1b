use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};

use hostwatch::config::Config;
use hostwatch::host::HostIdentity;
use hostwatch::monitor::{Collector, MonitorRuntime, MonitorState, SysinfoProvider};

fn main() -> Result<()> {
    hostwatch::init_logging();

    let matches = Command::new("hostwatch")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Host resource monitor with alerting and trend prediction")
        .subcommand(
            Command::new("run")
                .about("Run the monitor daemon with the HTTP query API")
                .arg(
                    Arg::new("http-addr")
                        .long("http-addr")
                        .value_name("ADDR")
                        .help("Bind address for the HTTP API (overrides HOSTWATCH_HTTP_ADDR)"),
                )
                .arg(
                    Arg::new("data-dir")
                        .long("data-dir")
                        .value_name("DIR")
                        .help("State directory (overrides HOSTWATCH_DATA_DIR)"),
                )
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_name("SECS")
                        .help("Sampling interval in seconds (overrides HOSTWATCH_INTERVAL_SECS)"),
                ),
        )
        .subcommand(Command::new("sample").about("Collect one snapshot and print it as JSON"))
        .get_matches();

    match matches.subcommand() {
        Some(("sample", _)) => run_sample(),
        Some(("run", sub)) => run_daemon(Some(sub)),
        _ => run_daemon(None),
    }
}

fn load_config(overrides: Option<&ArgMatches>) -> Result<Config> {
    let mut config = Config::from_env().context("invalid environment configuration")?;

    if let Some(matches) = overrides {
        if let Some(addr) = matches.get_one::<String>("http-addr") {
            config.http_addr = addr.clone();
        }
        if let Some(dir) = matches.get_one::<String>("data-dir") {
            config.data_dir = dir.into();
        }
        if let Some(secs) = matches.get_one::<String>("interval") {
            let secs: u64 = secs
                .parse()
                .with_context(|| format!("invalid --interval value: {}", secs))?;
            anyhow::ensure!(secs > 0, "--interval must be at least 1 second");
            config.sample_interval = std::time::Duration::from_secs(secs);
        }
    }

    Ok(config)
}

fn run_daemon(overrides: Option<&ArgMatches>) -> Result<()> {
    let config = load_config(overrides)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hostwatch-worker")
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let state = MonitorState::init(config).context("failed to open monitor state")?;
        let provider = Box::new(SysinfoProvider::new());
        let monitor = MonitorRuntime::spawn(state.clone(), provider);

        hostwatch::http::serve(state.clone(), async {
            let _ = tokio::signal::ctrl_c().await;
            log::info!("interrupt received, draining requests");
        })
        .await
        .context("HTTP server failed")?;

        // Timers are stopped and a final flush runs before exit.
        monitor.shutdown(&state).await;
        Ok(())
    })
}

fn run_sample() -> Result<()> {
    let config = load_config(None)?;
    let identity =
        HostIdentity::load_or_create(&config.data_dir).context("failed to load host identity")?;

    let mut provider = SysinfoProvider::new();
    let mut collector = Collector::new(identity.id.clone());
    let collection = collector
        .collect(&mut provider)
        .context("snapshot collection failed")?;

    let output = serde_json::json!({
        "host": identity.record(
            collection.status,
            collection.uptime_seconds,
            collection.sample.timestamp,
        ),
        "sample": collection.sample,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
