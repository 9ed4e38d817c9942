//! `chainmirror serve`: HTTP API plus the supervised event listener.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::info;

use chainmirror_api::ApiState;
use chainmirror_core::{
    ContractGateway, DepositoryContract, DepositoryEventHandler, EventDecoder, EventListener,
    HandlerRegistry, Projector,
};

use crate::config::ServiceConfig;
use crate::wiring;

pub async fn run(config: ServiceConfig) -> Result<()> {
    let store = wiring::open_store(&config.store).await?;
    let ledger = wiring::open_ledger(&config.ledger)?;

    let gateway = ContractGateway::new(ledger, config.ledger.contract.as_str());
    let contract = DepositoryContract::new(gateway.clone());
    let projector = Projector::new(store, config.projector.clone());

    let decoder = EventDecoder::new(gateway.clone(), config.listener.decode_retry.clone());
    let handler = Arc::new(DepositoryEventHandler::new(decoder, projector.clone()));
    let mut registry = HandlerRegistry::new();
    for name in &config.listener.events {
        registry.on_event(name.as_str(), handler.clone());
    }
    info!(events = ?registry.event_names(), "mirroring events");

    let listener = Arc::new(EventListener::new(gateway, projector.clone(), registry));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let listener_task = {
        let listener = listener.clone();
        let shutdown = shutdown_rx.clone();
        let restart = config.listener.restart.clone();
        tokio::spawn(async move { listener.supervise(shutdown, &restart).await })
    };

    let mut http_rx = shutdown_rx;
    let http_shutdown = async move {
        let _ = http_rx.wait_for(|stop| *stop).await;
    };
    let mut server = tokio::spawn(chainmirror_api::serve(
        config.http.addr,
        ApiState::new(contract, projector),
        http_shutdown,
    ));

    // Either Ctrl-C or the server dying ends the process.
    let finished = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for ctrl-c")?;
            info!("interrupt received, shutting down");
            None
        }
        served = &mut server => Some(served),
    };
    let _ = shutdown_tx.send(true);

    let served = match finished {
        Some(served) => served,
        None => server.await,
    };
    listener_task.await.context("listener task panicked")?;
    served
        .context("http server task panicked")?
        .context("http server failed")?;

    let m = listener.metrics();
    info!(
        projected = m.events_projected,
        skipped = m.events_skipped,
        unhandled = m.events_unhandled,
        handler_errors = m.handler_errors,
        restarts = m.restarts,
        "stopped"
    );
    Ok(())
}
