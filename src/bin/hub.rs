use std::sync::Arc;

use clap::Parser;
use telemetry_hub::{
    actors::{CollectorHandle, MonitorHandle},
    clock::{Clock, SystemClock},
    collectors::{ActivityFeed, build_collectors},
    config::{Config, read_config_file},
    notify::{AlertNotifier, build_notifier},
    push::SubscriptionRegistry,
    util::{get_bind_override, get_token_override},
};
use tracing::{debug, error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "telemetry-hub")]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Trace-level logging
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![("telemetry_hub", level), ("hub", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn apply_env_overrides(config: &mut Config) {
    if let Some(bind) = get_bind_override() {
        debug!("bind address overridden from environment: {bind}");
        config.api.bind = bind;
    }
    if let Some(token) = get_token_override() {
        debug!("API token overridden from environment");
        config.api.auth_token = Some(token);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    if dotenv::dotenv().is_ok() {
        debug!("loaded .env");
    }

    let mut config = read_config_file(&args.file)?;
    apply_env_overrides(&mut config);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = SubscriptionRegistry::new(clock.clone());
    let feed = ActivityFeed::default();

    let notifier: Option<Arc<dyn AlertNotifier>> =
        build_notifier(config.notifier.as_ref(), config.collector_timeout())?.map(Arc::from);
    if notifier.is_none() {
        warn!("no notifier configured, critical alerts reach push subscribers only");
    }

    let monitor = MonitorHandle::spawn(&config, clock.clone(), registry.clone(), notifier);

    let collectors = build_collectors(
        &config.collectors,
        config.collector_timeout(),
        &feed,
        &registry,
    )?
    .into_iter()
    .map(|collector| {
        debug!("starting collector {}", collector.id());
        CollectorHandle::spawn(
            collector,
            clock.clone(),
            monitor.event_sender(),
            config.monitoring_interval(),
            config.collector_timeout(),
        )
    })
    .collect::<Vec<_>>();
    info!("monitoring {} collector(s)", collectors.len());

    #[cfg(feature = "api")]
    let api_server = if config.api.enabled {
        use telemetry_hub::api::{ApiConfig, ApiState, spawn_api_server};

        let state = ApiState::new(monitor.clone(), registry.clone(), feed.clone(), clock.clone());
        match spawn_api_server(ApiConfig::from(&config.api), state).await {
            Ok(server) => Some(server),
            Err(e) => {
                error!("API server unavailable, continuing without push channel: {e:#}");
                None
            }
        }
    } else {
        info!("API disabled by configuration");
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    for collector in &collectors {
        if let Err(e) = collector.shutdown().await {
            debug!("collector {}: {e:#}", collector.collector_id);
        }
    }

    #[cfg(feature = "api")]
    {
        if let Some(server) = api_server {
            server.shutdown().await;
        }
    }

    if let Err(e) = monitor.shutdown().await {
        warn!("monitor shutdown: {e}");
    }

    Ok(())
}
