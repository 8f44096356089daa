use anyhow::{bail, Context};

use scout_core::{
    accounts::AccountPool,
    backoff::TokioSleeper,
    config::Config,
    domain::Partition,
    orchestrator::{Orchestrator, RunSettings},
    proxy::{load_proxies, ProxyAssigner},
    queries::read_queries,
    sink::FileResultSink,
};
use scout_gateway::GatewayConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = Config::load().context("loading configuration")?;
    scout_core::logging::init(&cfg.log_level, cfg.log_format, cfg.log_file.as_deref())?;

    let queries = read_queries(&cfg.queries_file)
        .with_context(|| format!("reading {}", cfg.queries_file.display()))?;
    if queries.is_empty() {
        tracing::error!(path = %cfg.queries_file.display(), "queries file is empty or missing");
        bail!("no queries in {}", cfg.queries_file.display());
    }

    let proxies = load_proxies(&cfg.proxy_file)
        .with_context(|| format!("reading {}", cfg.proxy_file.display()))?;
    let proxies = ProxyAssigner::new(proxies);
    if proxies.is_empty() {
        tracing::warn!("no proxies configured, accounts connect directly");
    }
    let mut pool = AccountPool::discover(&cfg.accounts_dir, &cfg.dead_dir);
    let sink = FileResultSink::open(&cfg.results_channels, &cfg.results_chats)
        .context("opening result files")?;
    let connector = GatewayConnector::new(cfg.gateway_url.clone(), cfg.gateway_timeout)?;
    let sleeper = TokioSleeper;

    tracing::info!(
        gateway = %cfg.gateway_url,
        accounts = pool.len(),
        proxies = proxies.len(),
        "starting parser"
    );
    let orchestrator =
        Orchestrator::new(RunSettings::from_config(&cfg), &connector, &sink, &sleeper);
    let summary = orchestrator
        .run(&queries, &mut pool, &proxies)
        .await;

    tracing::info!(
        channels = %sink.path(Partition::Channels).display(),
        chats = %sink.path(Partition::Chats).display(),
        records = summary.total_records(),
        "finished"
    );

    if let Some(path) = &cfg.run_report_file {
        if let Err(e) = summary.write_json(path) {
            tracing::warn!(path = %path.display(), "could not write run report: {e}");
        }
    }

    Ok(())
}
