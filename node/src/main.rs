use node::workflow::{ChainSyncWorkflow, PeerWorkflow};
use node::{NodeConfig, TaskRegistry, WorkflowHost};
use shared_types::RouteMode;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = NodeConfig::from_env()?;
    tracing::info!(?config, "Starting node");

    let registry = TaskRegistry::new();

    let peer = PeerWorkflow::new();
    let served = peer.served();
    let mut peer_receiver = config.receiver_config(config.peer_parallel_tasks);
    peer_receiver.route_mode = RouteMode::ReceiverOnly;
    let peer_host =
        WorkflowHost::new(peer, peer_receiver, registry.clone()).with_idle_wait(config.idle_wait);

    let sync = ChainSyncWorkflow::new(
        peer_host.receiver().owner(),
        served.clone(),
        config.sync_target_height,
    );
    let sync_host =
        WorkflowHost::new(sync, config.receiver_config(1), registry.clone()).with_idle_wait(config.idle_wait);
    let sync_state = sync_host.workflow().clone();

    let shutdown = CancellationToken::new();
    let peer_task = tokio::spawn(peer_host.run(shutdown.clone()));
    let sync_task = tokio::spawn(sync_host.run(shutdown.clone()));

    match config.run_for {
        Some(duration) => {
            tokio::select! {
                _ = tokio::time::sleep(duration) => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        None => {
            tokio::signal::ctrl_c().await?;
        }
    }

    tracing::info!("Shutting down node");
    shutdown.cancel();
    peer_task.await??;
    sync_task.await??;

    tracing::info!(
        height = sync_state.height(),
        synced = sync_state.is_synced(),
        served = served.load(std::sync::atomic::Ordering::Acquire),
        "Node stopped"
    );
    Ok(())
}
