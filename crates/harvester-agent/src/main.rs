use anyhow::Result;
use harvester_agent::config::AgentConfig;
use harvester_agent::reporter::Reporter;
use harvester_agent::{init_tracing, prepare_transport, shutdown_signal, workers};
use harvester_collector::{Catalogue, MetricTable};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1);
    let config = AgentConfig::load(config_path.as_deref())?;
    init_tracing(&config.log_level)?;

    let transport = prepare_transport(&config)?;
    let server = config.server_url();
    tracing::info!(
        server = %server,
        signing = transport.codec.signer().is_some(),
        encryption = transport.codec.cipher().is_some(),
        "harvester-agent starting"
    );

    let reporter = Arc::new(Reporter::new(
        server,
        transport.codec,
        config.request_timeout(),
    )?);
    let schedule = config.backoff_schedule();

    if let Some(sealed) = transport.sealed_key {
        if !reporter.share_key(sealed, &schedule).await {
            tracing::error!("Key exchange failed; encrypted reports will be rejected");
        }
    }

    let catalogue = Catalogue::standard();
    let table = Arc::new(MetricTable::from_catalogue(&catalogue));

    let poll = tokio::spawn(workers::poll_loop(
        catalogue,
        table.clone(),
        config.poll_interval(),
    ));
    let report = tokio::spawn(workers::report_loop(
        reporter,
        table,
        config.report_interval(),
        schedule,
    ));

    shutdown_signal().await;
    // In-flight deliveries are not drained.
    poll.abort();
    report.abort();
    tracing::info!("harvester-agent stopped");
    Ok(())
}
