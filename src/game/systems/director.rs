//! Wave and endless spawn director
//!
//! Wave mode alternates a rest timer with a generated manifest of delayed
//! spawns. Endless mode fires a spawn timer continuously and raises a
//! difficulty scalar over time. The mode is fixed for the room's lifetime.

use std::collections::VecDeque;

use rand::Rng;
use tracing::{debug, info};

use crate::config::GameMode;
use crate::game::archetypes::EnemyKind;
use crate::game::constants::{endless, wave};
use crate::game::state::{Effect, GameState};

/// One scheduled spawn, relative to the wave start
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpawnEntry {
    pub kind: EnemyKind,
    /// Seconds after the wave starts
    pub delay: f32,
}

/// Health multiplier for a wave number
pub fn wave_health_scale(wave_number: u32) -> f32 {
    1.0 + wave::HEALTH_PER_WAVE * wave_number.saturating_sub(1) as f32
}

/// Speed multiplier for a wave number
pub fn wave_speed_scale(wave_number: u32) -> f32 {
    1.0 + wave::SPEED_PER_WAVE * wave_number.saturating_sub(1) as f32
}

fn push_group(manifest: &mut Vec<SpawnEntry>, kind: EnemyKind, count: u32, start: f32, spacing: f32) {
    for i in 0..count {
        manifest.push(SpawnEntry {
            kind,
            delay: start + i as f32 * spacing,
        });
    }
}

/// Spawn manifest for a wave, sorted ascending by delay
pub fn wave_manifest(wave_number: u32) -> Vec<SpawnEntry> {
    let w = wave_number.max(1);
    let grunts = wave::BASE_COUNT + wave::COUNT_PER_WAVE * w;
    let mut manifest = Vec::with_capacity(grunts as usize * 2);

    push_group(&mut manifest, EnemyKind::Grunt, grunts, 0.0, wave::GRUNT_SPACING);
    if w >= 3 {
        push_group(&mut manifest, EnemyKind::Runner, (w - 1) / 2, 0.4, 0.6);
    }
    if w >= 5 {
        push_group(&mut manifest, EnemyKind::Brute, (w - 3) / 2, 1.0, 2.0);
    }
    if w >= 7 {
        push_group(&mut manifest, EnemyKind::Flyer, (w - 5) / 2, 0.6, 1.2);
    }
    if w >= 8 {
        push_group(&mut manifest, EnemyKind::Healer, 1 + (w - 8) / 5, 2.0, 3.0);
    }
    if w >= 10 {
        push_group(&mut manifest, EnemyKind::Shielded, (w - 8) / 2, 1.5, 1.5);
    }
    if w >= 12 {
        push_group(&mut manifest, EnemyKind::Splitter, (w - 10) / 2, 3.0, 2.5);
    }
    if w >= 15 {
        push_group(&mut manifest, EnemyKind::Bomber, (w - 13) / 2, 2.5, 2.0);
    }
    if w % wave::BOSS_EVERY == 0 {
        // The boss closes out the grunt stream
        push_group(&mut manifest, EnemyKind::Boss, 1, grunts as f32 * wave::GRUNT_SPACING, 0.0);
    }

    manifest.sort_by(|a, b| a.delay.total_cmp(&b.delay));
    manifest
}

/// Endless-mode pool: (kind, difficulty required)
const ENDLESS_POOL: [(EnemyKind, f32); 8] = [
    (EnemyKind::Grunt, 1.0),
    (EnemyKind::Runner, 1.0),
    (EnemyKind::Flyer, 1.5),
    (EnemyKind::Brute, 1.75),
    (EnemyKind::Healer, 2.0),
    (EnemyKind::Shielded, 2.25),
    (EnemyKind::Splitter, 2.5),
    (EnemyKind::Bomber, 3.0),
];

/// Kinds unlocked at a difficulty
pub fn endless_pool(difficulty: f32) -> impl Iterator<Item = EnemyKind> {
    ENDLESS_POOL
        .into_iter()
        .filter(move |&(_, required)| difficulty >= required)
        .map(|(kind, _)| kind)
}

#[derive(Debug, Clone)]
pub struct Director {
    mode: GameMode,
    // Wave mode
    wave: u32,
    wave_active: bool,
    rest_timer: f32,
    wave_clock: f32,
    manifest: VecDeque<SpawnEntry>,
    // Endless mode
    difficulty: f32,
    spawn_timer: f32,
    spawn_interval: f32,
    difficulty_timer: f32,
}

impl Director {
    pub fn new(mode: GameMode) -> Self {
        Self {
            mode,
            wave: 0,
            wave_active: false,
            rest_timer: wave::FIRST_REST,
            wave_clock: 0.0,
            manifest: VecDeque::new(),
            difficulty: 1.0,
            spawn_timer: endless::FIRST_SPAWN_DELAY,
            spawn_interval: endless::INITIAL_INTERVAL,
            difficulty_timer: 0.0,
        }
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    /// Current wave number (0 before the first wave)
    pub fn wave(&self) -> u32 {
        self.wave
    }

    pub fn is_resting(&self) -> bool {
        self.mode == GameMode::Waves && !self.wave_active
    }

    /// Seconds until the next wave, 0 while a wave runs
    pub fn rest_remaining(&self) -> f32 {
        if self.is_resting() {
            self.rest_timer.max(0.0)
        } else {
            0.0
        }
    }

    pub fn difficulty(&self) -> f32 {
        self.difficulty
    }

    pub fn spawn_interval(&self) -> f32 {
        self.spawn_interval
    }

    /// Spawns of the running wave not yet dispatched
    pub fn pending(&self) -> impl Iterator<Item = &SpawnEntry> {
        self.manifest.iter()
    }

    pub fn update(&mut self, state: &mut GameState, dt: f32) {
        match self.mode {
            GameMode::Waves => self.update_waves(state, dt),
            GameMode::Endless => self.update_endless(state, dt),
        }
    }

    /// Begin the next wave immediately
    pub fn start_next_wave(&mut self, state: &mut GameState) {
        self.wave += 1;
        self.wave_active = true;
        self.wave_clock = 0.0;
        self.manifest = wave_manifest(self.wave).into();
        state.push_effect(Effect::WaveStarted { wave: self.wave });
        info!("Wave {} started with {} spawns", self.wave, self.manifest.len());
    }

    fn update_waves(&mut self, state: &mut GameState, dt: f32) {
        if !self.wave_active {
            self.rest_timer -= dt;
            if self.rest_timer > 0.0 {
                return;
            }
            self.start_next_wave(state);
        }

        let health_scale = wave_health_scale(self.wave);
        let speed_scale = wave_speed_scale(self.wave);
        while self
            .manifest
            .front()
            .is_some_and(|entry| entry.delay <= self.wave_clock)
        {
            if let Some(entry) = self.manifest.pop_front() {
                let position = state.random_spawn_position();
                state.spawn_enemy(entry.kind, position, health_scale, speed_scale);
            }
        }
        self.wave_clock += dt;

        if self.manifest.is_empty() && state.alive_enemy_count() == 0 {
            self.wave_active = false;
            self.rest_timer = wave::REST_DURATION;
            state.push_effect(Effect::WaveCompleted { wave: self.wave });
            info!("Wave {} completed", self.wave);
        }
    }

    fn update_endless(&mut self, state: &mut GameState, dt: f32) {
        self.difficulty_timer += dt;
        while self.difficulty_timer >= endless::DIFFICULTY_STEP_INTERVAL {
            self.difficulty_timer -= endless::DIFFICULTY_STEP_INTERVAL;
            self.difficulty += endless::DIFFICULTY_STEP;
            self.spawn_interval = (self.spawn_interval * endless::INTERVAL_DECAY).max(endless::MIN_INTERVAL);
            debug!(
                "Endless difficulty {:.2}, spawn interval {:.2}s",
                self.difficulty, self.spawn_interval
            );
        }

        self.spawn_timer -= dt;
        if self.spawn_timer > 0.0 {
            return;
        }
        self.spawn_timer += self.spawn_interval;

        let pool: Vec<EnemyKind> = endless_pool(self.difficulty).collect();
        if pool.is_empty() {
            return;
        }
        let kind = pool[state.rng.gen_range(0..pool.len())];
        let position = state.random_spawn_position();
        state.spawn_enemy(kind, position, self.difficulty, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoomConfig;
    use crate::game::state::EnemyMode;

    fn test_state(mode: GameMode) -> GameState {
        GameState::new(&RoomConfig::default().with_mode(mode).with_seed(17))
    }

    #[test]
    fn test_wave_one_manifest() {
        let manifest = wave_manifest(1);
        assert_eq!(manifest.len(), 7);
        assert!(manifest.iter().all(|e| e.kind == EnemyKind::Grunt));
        assert_eq!(manifest[0].delay, 0.0);
        assert!(manifest.windows(2).all(|w| w[0].delay <= w[1].delay));
    }

    #[test]
    fn test_unlock_thresholds() {
        let has = |w: u32, kind: EnemyKind| wave_manifest(w).iter().any(|e| e.kind == kind);
        assert!(!has(2, EnemyKind::Runner));
        assert!(has(3, EnemyKind::Runner));
        assert!(!has(4, EnemyKind::Brute));
        assert!(has(5, EnemyKind::Brute));
        assert!(has(7, EnemyKind::Flyer));
        assert!(has(8, EnemyKind::Healer));
        assert!(has(10, EnemyKind::Shielded));
        assert!(has(12, EnemyKind::Splitter));
        assert!(!has(14, EnemyKind::Bomber));
        assert!(has(15, EnemyKind::Bomber));
    }

    #[test]
    fn test_boss_every_tenth_wave() {
        let bosses = |w: u32| wave_manifest(w).iter().filter(|e| e.kind == EnemyKind::Boss).count();
        assert_eq!(bosses(9), 0);
        assert_eq!(bosses(10), 1);
        assert_eq!(bosses(20), 1);
        let manifest = wave_manifest(10);
        assert!(manifest.windows(2).all(|w| w[0].delay <= w[1].delay));
    }

    #[test]
    fn test_wave_scaling() {
        assert_eq!(wave_health_scale(1), 1.0);
        assert!((wave_health_scale(11) - 2.0).abs() < 1e-5);
        assert!((wave_speed_scale(11) - 1.3).abs() < 1e-5);
    }

    #[test]
    fn test_rest_then_first_wave() {
        let mut state = test_state(GameMode::Waves);
        let mut director = Director::new(GameMode::Waves);
        assert!(director.is_resting());

        director.update(&mut state, wave::FIRST_REST - 1.0);
        assert_eq!(director.wave(), 0);
        assert!(state.enemies.is_empty());

        director.update(&mut state, 1.0);
        assert_eq!(director.wave(), 1);
        // First grunt at delay 0 dispatched immediately
        assert_eq!(state.enemies.len(), 1);
        assert_eq!(director.pending().count() + state.enemies.len(), 7);
        assert_eq!(state.effects, vec![Effect::WaveStarted { wave: 1 }]);
    }

    #[test]
    fn test_manifest_dispatch_and_completion() {
        let mut state = test_state(GameMode::Waves);
        let mut director = Director::new(GameMode::Waves);
        director.start_next_wave(&mut state);

        for _ in 0..200 {
            director.update(&mut state, 0.05);
        }
        assert_eq!(director.pending().count(), 0);
        assert_eq!(state.enemies.len(), 7);
        assert!(!director.is_resting());

        for enemy in state.enemies.iter_mut() {
            enemy.mode = EnemyMode::Dead;
        }
        director.update(&mut state, 0.05);
        assert!(director.is_resting());
        assert_eq!(director.rest_remaining(), wave::REST_DURATION);
        assert!(state.effects.contains(&Effect::WaveCompleted { wave: 1 }));
    }

    #[test]
    fn test_spawns_on_border() {
        let mut state = test_state(GameMode::Waves);
        let mut director = Director::new(GameMode::Waves);
        director.start_next_wave(&mut state);
        director.update(&mut state, 0.05);

        let cell = state.grid.world_to_cell(state.enemies[0].position).unwrap();
        assert_eq!(
            state.grid.cell_state(cell),
            Some(crate::game::grid::CellState::Border)
        );
    }

    #[test]
    fn test_endless_difficulty_ramp() {
        let mut state = test_state(GameMode::Endless);
        let mut director = Director::new(GameMode::Endless);

        director.update(&mut state, endless::FIRST_SPAWN_DELAY);
        assert_eq!(state.enemies.len(), 1);
        assert_eq!(director.difficulty(), 1.0);

        director.update(&mut state, endless::DIFFICULTY_STEP_INTERVAL);
        assert!((director.difficulty() - 1.25).abs() < 1e-5);
        assert!((director.spawn_interval() - endless::INITIAL_INTERVAL * endless::INTERVAL_DECAY).abs() < 1e-5);
    }

    #[test]
    fn test_endless_interval_floor() {
        let mut state = test_state(GameMode::Endless);
        let mut director = Director::new(GameMode::Endless);
        for _ in 0..100 {
            director.update(&mut state, endless::DIFFICULTY_STEP_INTERVAL);
        }
        assert_eq!(director.spawn_interval(), endless::MIN_INTERVAL);
    }

    #[test]
    fn test_endless_pool_gating() {
        let early: Vec<_> = endless_pool(1.0).collect();
        assert_eq!(early, vec![EnemyKind::Grunt, EnemyKind::Runner]);
        assert_eq!(endless_pool(3.0).count(), ENDLESS_POOL.len());
    }

    #[test]
    fn test_endless_health_scales_with_difficulty() {
        let mut state = test_state(GameMode::Endless);
        let mut director = Director::new(GameMode::Endless);
        director.difficulty = 2.0;
        director.update(&mut state, endless::FIRST_SPAWN_DELAY);
        let enemy = &state.enemies[0];
        assert!((enemy.max_health - enemy.archetype().health * 2.0).abs() < 1e-3);
    }
}
