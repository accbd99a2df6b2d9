use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use bulwark_server::config::ServerConfig;
use bulwark_server::game::archetypes::{StructureKind, TurretKind};
use bulwark_server::game::grid::CellCoord;
use bulwark_server::game::state::{Effect, PlayerId};
use bulwark_server::lobby::manager::LobbyManager;
use bulwark_server::lobby::room::RoomHandle;
use bulwark_server::lobby::session;
use bulwark_server::metrics::{self, Metrics};
use bulwark_server::net::protocol::{self, ClientMessage, ServerMessage};

/// Seconds between sweeps that drop finished rooms from the registry
const REAP_INTERVAL: Duration = Duration::from_secs(5);

/// How long the demo player waits for a snapshot before checking the room state
const DEMO_IDLE_CHECK: Duration = Duration::from_secs(1);

/// Opening build of the headless demo player, as offsets from the Nexus
const DEMO_BUILD: [(i32, i32, StructureKind); 6] = [
    (-2, 0, StructureKind::Turret(TurretKind::Blaster)),
    (2, 0, StructureKind::Turret(TurretKind::Blaster)),
    (0, -2, StructureKind::Turret(TurretKind::Scatter)),
    (0, 2, StructureKind::Turret(TurretKind::Laser)),
    (-3, -1, StructureKind::Wall),
    (3, 1, StructureKind::Wall),
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Bulwark Server v{}", env!("CARGO_PKG_VERSION"));

    let config = ServerConfig::load_or_default();
    if let Err(e) = config.validate() {
        anyhow::bail!("Invalid configuration: {}", e);
    }
    info!(
        "Configuration loaded: max_rooms={}, tick_rate={} Hz, mode={:?}, demo_rooms={}",
        config.max_rooms, config.tick_rate, config.room.mode, config.demo_rooms
    );

    let metrics = Arc::new(Metrics::new());
    if config.metrics_port != 0 {
        let metrics_clone = metrics.clone();
        let port = config.metrics_port;
        tokio::spawn(async move {
            if let Err(e) = metrics::start_metrics_server(metrics_clone, port).await {
                error!("Metrics server error: {}", e);
            }
        });
    }

    let lobby_manager = Arc::new(RwLock::new(LobbyManager::from_config(&config)));

    for i in 0..config.demo_rooms {
        let handle = {
            let mut manager = lobby_manager.write().await;
            let handle = manager.create_room(format!("Demo {}", i + 1))?;
            let player = Uuid::new_v4();
            manager.join_room(handle.id(), player)?;
            tokio::spawn(demo_player(handle.clone(), player, metrics.clone()));
            handle
        };
        session::spawn(handle, config.tick_rate, metrics.clone());
    }

    let reaper = {
        let lobby_manager = lobby_manager.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(REAP_INTERVAL);
            loop {
                interval.tick().await;
                let removed = lobby_manager.write().await.reap_closed();
                if removed > 0 {
                    info!("Removed {} finished rooms", removed);
                }
            }
        })
    };

    info!("Server ready ({} rooms running)", lobby_manager.read().await.room_count());

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    reaper.abort();
    lobby_manager.write().await.shutdown_all_rooms();
    info!("Server stopped");

    Ok(())
}

/// Headless stand-in for a client: builds a small defense through the
/// regular action path, then follows the snapshot stream
async fn demo_player(handle: RoomHandle, player: PlayerId, metrics: Arc<Metrics>) {
    let mut snapshots = handle.subscribe();
    let nexus = handle.lock().game_loop().state().nexus.cell;

    for (dx, dy, kind) in DEMO_BUILD {
        let cell = CellCoord::new(nexus.x + dx, nexus.y + dy);
        let frame = match protocol::encode(&ClientMessage::Place { cell, kind: kind.id() }) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Demo player could not encode action: {}", e);
                continue;
            }
        };
        match handle.handle_frame(player, &frame) {
            None => metrics.record_action(true),
            Some(ServerMessage::ActionRejected { code }) => {
                metrics.record_action(false);
                info!("Demo build {:?} at ({}, {}) rejected: {}", kind, cell.x, cell.y, code);
            }
            Some(_) => {}
        }
    }

    loop {
        let frame = match tokio::time::timeout(DEMO_IDLE_CHECK, snapshots.recv()).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                warn!("Demo player in room {} lagged by {} snapshots", handle.id(), skipped);
                continue;
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => break,
            Err(_) => {
                // No snapshots: the tick task may have stopped
                if handle.is_closing() {
                    break;
                }
                continue;
            }
        };
        let Ok(ServerMessage::Snapshot(snapshot)) = protocol::decode::<ServerMessage>(&frame) else {
            continue;
        };
        for effect in &snapshot.effects {
            match effect {
                Effect::WaveStarted { wave } => {
                    info!("Room {}: wave {} started", handle.id(), wave);
                }
                Effect::WaveCompleted { wave } => {
                    info!(
                        "Room {}: wave {} cleared, Nexus at {:.0}/{:.0}",
                        handle.id(),
                        wave,
                        snapshot.nexus.health,
                        snapshot.nexus.max_health
                    );
                }
                Effect::GameOver { wave, elapsed } => {
                    info!("Room {}: game over on wave {} after {:.0}s", handle.id(), wave, elapsed);
                }
                _ => {}
            }
        }
        if snapshot.game_over {
            break;
        }
    }
}
