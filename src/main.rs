use actix_web::{App, HttpServer, web};
use chrono::Utc;
use dotenvy::dotenv;
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc;

use weighted_ledger::api::{self, AppState};
use weighted_ledger::config::NodeConfig;
use weighted_ledger::error::ProposeError;
use weighted_ledger::node;
use weighted_ledger::storage::MemoryStore;
use weighted_ledger::sync::{Coordinator, Outbound};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let config = NodeConfig::from_env();
    let (host, port) = (config.host.clone(), config.port);
    let interval = Duration::from_secs(config.schedule.block_interval_secs.max(1));

    // Peer transport lives outside this binary; outbound traffic is only logged.
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            match msg {
                Outbound::Broadcast(payload) => debug!("NODE - broadcast {:?}", payload.kind()),
                Outbound::Direct { peer_id, payload } => {
                    debug!("NODE - to {peer_id}: {:?}", payload.kind())
                }
            }
        }
    });

    let mut coordinator = Coordinator::new(config, Box::new(MemoryStore::new()), out_tx);
    if let Err(e) = coordinator.rebuild_from_store() {
        warn!("NODE - store unavailable, starting empty: {e}");
    }
    match coordinator.bootstrap_genesis(Utc::now().timestamp_millis()) {
        Ok(Some(genesis)) => info!("NODE - genesis {}", genesis.hash),
        Ok(None) => {}
        Err(ProposeError::NoIdentity) => info!("NODE - no NODE_SECRET_KEY, waiting for peers"),
        Err(e) => warn!("NODE - genesis failed: {e}"),
    }

    let (handle, _inbound_task) = node::spawn(coordinator);
    let _producer = node::spawn_producer(handle.coordinator.clone(), interval);

    println!("⛓️ Starting ledger node API at http://{host}:{port}");

    let state = web::Data::new(AppState {
        node: handle.coordinator.clone(),
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
