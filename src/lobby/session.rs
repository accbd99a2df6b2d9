//! Per-room tick task
//!
//! Each room runs on its own tokio task driven by a fixed interval. The room
//! lock is held for one tick plus snapshot capture and released before the
//! encoded frame is broadcast.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::lobby::room::{GameRoom, RoomHandle, RoomState};
use crate::metrics::Metrics;
use crate::net::protocol::{self, ServerMessage};

/// Log the budget status every this many ticks
const STATUS_LOG_INTERVAL: u64 = 600;

/// How a room's tick task finished
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOutcome {
    pub room_id: Uuid,
    pub ticks: u64,
    pub wave: u32,
    pub game_over: bool,
}

enum Step {
    /// Nothing to simulate yet
    Idle,
    Frame(Arc<Vec<u8>>),
    Close,
}

/// Spawn the tick task for a room
pub fn spawn(handle: RoomHandle, tick_rate: u32, metrics: Arc<Metrics>) -> JoinHandle<SessionOutcome> {
    tokio::spawn(run_room(handle, tick_rate, metrics))
}

pub async fn run_room(handle: RoomHandle, tick_rate: u32, metrics: Arc<Metrics>) -> SessionOutcome {
    let tick_rate = tick_rate.max(1);
    let dt = 1.0 / tick_rate as f32;
    let mut interval = tokio::time::interval(Duration::from_secs_f32(dt));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    metrics.room_started();
    info!("Room {} tick task started at {} Hz", handle.id(), tick_rate);

    let mut ticks = 0u64;
    loop {
        interval.tick().await;

        let step = {
            let mut room = handle.lock();
            step_room(&mut room, dt, &metrics)
        };

        match step {
            Step::Idle => continue,
            Step::Close => break,
            Step::Frame(frame) => {
                ticks += 1;
                let bytes = frame.len();
                let receivers = handle.publish(frame);
                if receivers > 0 {
                    metrics.record_snapshot(bytes);
                }
                if ticks % STATUS_LOG_INTERVAL == 0 {
                    debug!("Room {}: {}", handle.id(), handle.lock().budget().status_message());
                }
            }
        }
    }

    let outcome = {
        let room = handle.lock();
        SessionOutcome {
            room_id: room.id(),
            ticks,
            wave: room.game_loop().director().wave(),
            game_over: room.game_loop().is_game_over(),
        }
    };
    metrics.room_ended(outcome.room_id, outcome.game_over);
    info!(
        "Room {} tick task ended after {} ticks (wave {}, game over: {})",
        outcome.room_id, outcome.ticks, outcome.wave, outcome.game_over
    );
    outcome
}

/// One tick under the room lock: simulate, capture, encode
fn step_room(room: &mut GameRoom, dt: f32, metrics: &Metrics) -> Step {
    step_room_with(room, metrics, |room| room.tick(dt))
}

fn step_room_with<F>(room: &mut GameRoom, metrics: &Metrics, tick: F) -> Step
where
    F: FnOnce(&mut GameRoom) -> Option<Duration>,
{
    if room.state == RoomState::Waiting {
        return Step::Idle;
    }
    if room.should_close() {
        room.retire();
        return Step::Close;
    }

    let room_id = room.id();
    guarded_tick(room_id, metrics, || tick(room));
    metrics.update_room(room_id, room.gauges());

    let snapshot = room.snapshot();
    match protocol::encode(&ServerMessage::Snapshot(snapshot)) {
        Ok(bytes) => Step::Frame(Arc::new(bytes)),
        Err(e) => {
            warn!("Room {}: failed to encode snapshot: {}", room_id, e);
            Step::Idle
        }
    }
}

/// Run a tick body, containing a panic to this tick. Returns false if it panicked.
fn guarded_tick<F>(room_id: Uuid, metrics: &Metrics, tick: F) -> bool
where
    F: FnOnce() -> Option<Duration>,
{
    match panic::catch_unwind(AssertUnwindSafe(tick)) {
        Ok(Some(elapsed)) => {
            metrics.record_tick_time(elapsed);
            true
        }
        Ok(None) => true,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            metrics.tick_errors.fetch_add(1, Ordering::Relaxed);
            error!("Room {} tick panicked: {}", room_id, reason);
            false
        }
    }
}
