//! Prometheus-compatible metrics endpoint
//!
//! Exposes server metrics in Prometheus text format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};
use uuid::Uuid;

/// Entity counts reported by one room after a tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoomGauges {
    pub players: u64,
    pub enemies: u64,
    pub turrets: u64,
    pub projectiles: u64,
    pub wave: u64,
    /// Tick budget status code (0=Healthy, 3=Overrun)
    pub budget_status: u64,
}

/// Metrics registry shared by every room
#[derive(Debug)]
pub struct Metrics {
    // Rooms
    pub rooms_active: AtomicU64,
    pub rooms_created: AtomicU64,
    pub games_over: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,
    /// Ticks that panicked and were skipped
    pub tick_errors: AtomicU64,

    // Snapshot fan-out
    pub snapshots_sent: AtomicU64,
    pub snapshot_bytes: AtomicU64,

    // Player actions
    pub actions_accepted: AtomicU64,
    pub actions_rejected: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
    room_gauges: RwLock<hashbrown::HashMap<Uuid, RoomGauges>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            rooms_active: AtomicU64::new(0),
            rooms_created: AtomicU64::new(0),
            games_over: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            tick_errors: AtomicU64::new(0),
            snapshots_sent: AtomicU64::new(0),
            snapshot_bytes: AtomicU64::new(0),
            actions_accepted: AtomicU64::new(0),
            actions_rejected: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
            room_gauges: RwLock::new(hashbrown::HashMap::new()),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn record_snapshot(&self, bytes: usize) {
        self.snapshots_sent.fetch_add(1, Ordering::Relaxed);
        self.snapshot_bytes.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub fn record_action(&self, accepted: bool) {
        if accepted {
            self.actions_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.actions_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn room_started(&self) {
        self.rooms_created.fetch_add(1, Ordering::Relaxed);
        self.rooms_active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn room_ended(&self, room_id: Uuid, game_over: bool) {
        self.rooms_active.fetch_sub(1, Ordering::Relaxed);
        if game_over {
            self.games_over.fetch_add(1, Ordering::Relaxed);
        }
        self.room_gauges.write().remove(&room_id);
    }

    pub fn update_room(&self, room_id: Uuid, gauges: RoomGauges) {
        self.room_gauges.write().insert(room_id, gauges);
    }

    /// Sum of the latest gauges across live rooms
    pub fn totals(&self) -> RoomGauges {
        self.room_gauges
            .read()
            .values()
            .fold(RoomGauges::default(), |acc, g| RoomGauges {
                players: acc.players + g.players,
                enemies: acc.enemies + g.enemies,
                turrets: acc.turrets + g.turrets,
                projectiles: acc.projectiles + g.projectiles,
                wave: acc.wave.max(g.wave),
                budget_status: acc.budget_status.max(g.budget_status),
            })
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Worst budget status across live rooms
    fn status_name(&self) -> &'static str {
        match self.totals().budget_status {
            0 => "healthy",
            1 => "busy",
            2 => "strained",
            _ => "overrun",
        }
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Rooms
        metric!("bulwark_rooms_active", "Rooms with a running tick task", "gauge",
            self.rooms_active.load(Ordering::Relaxed));
        metric!("bulwark_rooms_created_total", "Rooms created since start", "counter",
            self.rooms_created.load(Ordering::Relaxed));
        metric!("bulwark_games_over_total", "Rooms ended by Nexus destruction", "counter",
            self.games_over.load(Ordering::Relaxed));

        // Entities
        #[cfg(feature = "metrics_extended")]
        {
            let totals = self.totals();
            metric!("bulwark_players", "Players across all rooms", "gauge", totals.players);
            metric!("bulwark_enemies", "Live enemies across all rooms", "gauge", totals.enemies);
            metric!("bulwark_turrets", "Turrets across all rooms", "gauge", totals.turrets);
            metric!("bulwark_projectiles", "Live projectiles across all rooms", "gauge", totals.projectiles);
            metric!("bulwark_wave_max", "Highest wave reached by a live room", "gauge", totals.wave);
        }

        // Performance
        metric!("bulwark_tick_time_microseconds", "Most recent tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("bulwark_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("bulwark_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("bulwark_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("bulwark_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));
        metric!("bulwark_tick_errors_total", "Ticks aborted by a panic", "counter",
            self.tick_errors.load(Ordering::Relaxed));
        metric!("bulwark_budget_status", "Worst room budget status (0=Healthy, 3=Overrun)", "gauge",
            self.totals().budget_status);
        output.push_str(&format!(
            "# HELP bulwark_budget_state Human-readable budget state\n# TYPE bulwark_budget_state gauge\nbulwark_budget_state{{state=\"{}\"}} 1\n",
            self.status_name()
        ));

        // Network
        metric!("bulwark_snapshots_sent_total", "Snapshots broadcast", "counter",
            self.snapshots_sent.load(Ordering::Relaxed));
        metric!("bulwark_snapshot_bytes_total", "Encoded snapshot bytes broadcast", "counter",
            self.snapshot_bytes.load(Ordering::Relaxed));
        metric!("bulwark_actions_accepted_total", "Player actions applied", "counter",
            self.actions_accepted.load(Ordering::Relaxed));
        metric!("bulwark_actions_rejected_total", "Player actions rejected", "counter",
            self.actions_rejected.load(Ordering::Relaxed));

        metric!("bulwark_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON form for direct API access
    pub fn to_json(&self) -> String {
        let totals = self.totals();
        serde_json::json!({
            "rooms": {
                "active": self.rooms_active.load(Ordering::Relaxed),
                "created": self.rooms_created.load(Ordering::Relaxed),
                "games_over": self.games_over.load(Ordering::Relaxed),
            },
            "entities": {
                "players": totals.players,
                "enemies": totals.enemies,
                "turrets": totals.turrets,
                "projectiles": totals.projectiles,
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
                "tick_errors": self.tick_errors.load(Ordering::Relaxed),
                "status": self.status_name(),
            },
            "network": {
                "snapshots_sent": self.snapshots_sent.load(Ordering::Relaxed),
                "snapshot_bytes": self.snapshot_bytes.load(Ordering::Relaxed),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn http_response(content_type: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    let response = if request.starts_with("GET /metrics/json") {
                        http_response("application/json", &metrics.to_json())
                    } else if request.starts_with("GET /metrics") {
                        http_response("text/plain; version=0.0.4", &metrics.to_prometheus())
                    } else if request.starts_with("GET /health") {
                        http_response("text/plain", "OK")
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) >= 1000);
    }

    #[test]
    fn test_room_gauges_sum() {
        let metrics = Metrics::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        metrics.room_started();
        metrics.room_started();
        metrics.update_room(a, RoomGauges { players: 2, enemies: 10, turrets: 3, projectiles: 4, wave: 2, budget_status: 0 });
        metrics.update_room(b, RoomGauges { players: 1, enemies: 5, turrets: 1, projectiles: 0, wave: 7, budget_status: 2 });

        let totals = metrics.totals();
        assert_eq!(totals.enemies, 15);
        assert_eq!(totals.wave, 7);
        assert_eq!(totals.budget_status, 2);

        metrics.room_ended(a, true);
        assert_eq!(metrics.totals().enemies, 5);
        assert_eq!(metrics.rooms_active.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.games_over.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.record_snapshot(120);
        metrics.record_snapshot(80);
        metrics.record_action(false);

        let output = metrics.to_prometheus();
        assert!(output.contains("bulwark_snapshots_sent_total 2"));
        assert!(output.contains("bulwark_snapshot_bytes_total 200"));
        assert!(output.contains("bulwark_actions_rejected_total 1"));
        assert!(output.contains("bulwark_budget_state{state=\"healthy\"} 1"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.rooms_active.store(3, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["rooms"]["active"], 3);
        assert_eq!(value["performance"]["status"], "healthy");
    }
}
