//! Enemy movement, obstacle attacks, Nexus contact and support abilities

use tracing::trace;

use crate::game::archetypes::{EnemyKind, EnemyRole};
use crate::game::constants::enemy::{
    ATTACK_INTERVAL, MELEE_REACH, OBSTACLE_SEARCH_RADIUS, REPATH_INTERVAL, WAYPOINT_EPSILON,
};
use crate::game::constants::nexus::CONTACT_RADIUS;
use crate::game::state::{Effect, EnemyMode, GameState};
use crate::util::vec2::Vec2;

/// Recompute every ground enemy's path after an occupancy change
pub fn recompute_paths(state: &mut GameState) {
    if !state.paths_dirty {
        return;
    }
    state.paths_dirty = false;

    let mut recomputed = 0;
    for i in 0..state.enemies.len() {
        let enemy = &state.enemies[i];
        if !enemy.is_alive() || enemy.is_flying() {
            continue;
        }
        let path = state.path_to_nexus(enemy.position);
        let enemy = &mut state.enemies[i];
        if !path.is_empty() {
            // A fresh route wins over hacking through a structure
            enemy.mode = EnemyMode::Pathing;
        }
        enemy.set_path(path);
        recomputed += 1;
    }
    trace!("Recomputed {} enemy paths", recomputed);
}

/// Advance every enemy by one tick
pub fn update_enemies(state: &mut GameState, dt: f32) {
    run_abilities(state, dt);

    for i in 0..state.enemies.len() {
        if !state.enemies[i].is_alive() {
            continue;
        }
        tick_status(state, i, dt);
        if !state.enemies[i].is_alive() {
            continue;
        }
        if state.enemies[i].is_flying() {
            let target = state.nexus.position;
            step_towards(state, i, target, dt);
        } else {
            step_ground(state, i, dt);
        }
        check_nexus_contact(state, i);
    }
}

/// Healer and summoner abilities. Positions are read first, then applied.
fn run_abilities(state: &mut GameState, dt: f32) {
    let mut heals: Vec<(Vec2, f32, f32)> = Vec::new();
    let mut summons: Vec<(Vec2, EnemyKind, u8, f32, f32)> = Vec::new();

    for enemy in state.enemies.iter_mut().filter(|e| e.is_alive()) {
        let role = enemy.archetype().role;
        let interval = match role {
            EnemyRole::Healer { interval, .. } | EnemyRole::Summoner { interval, .. } => interval,
            _ => continue,
        };
        enemy.ability_cooldown -= dt;
        if enemy.ability_cooldown > 0.0 {
            continue;
        }
        enemy.ability_cooldown = interval;

        match role {
            EnemyRole::Healer { amount, radius, .. } => heals.push((enemy.position, radius, amount)),
            EnemyRole::Summoner { minion, count, .. } => {
                let health_scale = enemy.max_health / enemy.archetype().health;
                let speed_scale = enemy.speed / enemy.archetype().speed;
                summons.push((enemy.position, minion, count, health_scale, speed_scale));
            }
            _ => {}
        }
    }

    for (position, radius, amount) in heals {
        let radius_sq = radius * radius;
        for ally in state.enemies.iter_mut().filter(|e| e.is_alive()) {
            if ally.position.distance_sq_to(position) <= radius_sq {
                ally.health = (ally.health + amount).min(ally.max_health);
            }
        }
    }

    for (position, minion, count, health_scale, speed_scale) in summons {
        for _ in 0..count {
            state.spawn_enemy(minion, position, health_scale, speed_scale);
        }
    }
}

/// Spawn protection countdown and burn damage
fn tick_status(state: &mut GameState, i: usize, dt: f32) {
    let enemy = &mut state.enemies[i];
    enemy.spawn_protection = (enemy.spawn_protection - dt).max(0.0);
    enemy.attack_cooldown = (enemy.attack_cooldown - dt).max(0.0);
    enemy.repath_cooldown = (enemy.repath_cooldown - dt).max(0.0);

    if let Some(mut burn) = enemy.burn {
        if !enemy.is_protected() {
            enemy.health -= burn.dps * dt.min(burn.remaining);
        }
        burn.remaining -= dt;
        enemy.burn = (burn.remaining > 0.0).then_some(burn);
        if enemy.health <= 0.0 {
            enemy.mode = EnemyMode::Dead;
        }
    }
}

/// Move toward a world point, updating heading
fn step_towards(state: &mut GameState, i: usize, target: Vec2, dt: f32) -> bool {
    let clamp = state.grid.clamp_world(target);
    let enemy = &mut state.enemies[i];
    let step = enemy.current_speed() * dt;
    let delta = clamp - enemy.position;
    if delta.length_sq() > 0.0 {
        enemy.heading = delta.angle();
    }
    let (next, arrived) = enemy.position.move_towards(clamp, step);
    enemy.position = next;
    arrived
}

fn step_ground(state: &mut GameState, i: usize, dt: f32) {
    match state.enemies[i].mode {
        EnemyMode::AttackingObstacle(target_id) => attack_obstacle(state, i, target_id, dt),
        EnemyMode::Pathing => {
            if let Some(cell) = state.enemies[i].next_waypoint() {
                let waypoint = state.grid.cell_center(cell);
                step_towards(state, i, waypoint, dt);
                let enemy = &mut state.enemies[i];
                if enemy.position.distance_to(waypoint) <= WAYPOINT_EPSILON {
                    enemy.path_index += 1;
                }
            } else {
                stranded(state, i, dt);
            }
        }
        EnemyMode::Dead => {}
    }
}

/// Path exhausted or missing: hit the nearest structure, re-plan, or walk straight in
fn stranded(state: &mut GameState, i: usize, dt: f32) {
    let position = state.enemies[i].position;
    let radius = state.enemies[i].radius();

    // Already at the Nexus: hold until protection lapses
    let nexus = state.nexus.position;
    if position.distance_to(nexus) <= CONTACT_RADIUS {
        step_towards(state, i, nexus, dt);
        return;
    }

    if let Some((id, obstacle)) = state.nearest_obstacle(position, OBSTACLE_SEARCH_RADIUS) {
        if position.distance_to(obstacle) <= radius + MELEE_REACH {
            state.enemies[i].mode = EnemyMode::AttackingObstacle(id);
        } else {
            step_towards(state, i, obstacle, dt);
        }
        return;
    }

    if state.enemies[i].repath_cooldown <= 0.0 {
        state.enemies[i].repath_cooldown = REPATH_INTERVAL;
        let path = state.path_to_nexus(position);
        if path.len() > 1 {
            state.enemies[i].set_path(path);
            return;
        }
    }

    step_towards(state, i, nexus, dt);
}

fn attack_obstacle(state: &mut GameState, i: usize, target_id: u64, dt: f32) {
    let Some(obstacle) = state.obstacle_position(target_id) else {
        // Already gone: resume pathing next tick
        let enemy = &mut state.enemies[i];
        enemy.mode = EnemyMode::Pathing;
        enemy.path.clear();
        enemy.path_index = 0;
        return;
    };

    let (position, radius) = (state.enemies[i].position, state.enemies[i].radius());
    if position.distance_to(obstacle) > radius + MELEE_REACH {
        step_towards(state, i, obstacle, dt);
        return;
    }
    state.enemies[i].heading = (obstacle - position).angle();
    if state.enemies[i].attack_cooldown > 0.0 {
        return;
    }

    let archetype = state.enemies[i].archetype();
    state.damage_obstacle(target_id, archetype.damage);
    state.enemies[i].attack_cooldown = ATTACK_INTERVAL;

    if let EnemyRole::Kamikaze { blast_radius } = archetype.role {
        state.enemies[i].mode = EnemyMode::Dead;
        state.push_effect(Effect::Explosion {
            position,
            radius: blast_radius,
        });
    }
}

/// Entering the Nexus circle: damage the Nexus and die without a reward
fn check_nexus_contact(state: &mut GameState, i: usize) {
    let enemy = &state.enemies[i];
    if !enemy.is_alive() || enemy.is_protected() {
        return;
    }
    let reach = CONTACT_RADIUS + enemy.radius();
    if enemy.position.distance_sq_to(state.nexus.position) > reach * reach {
        return;
    }

    let archetype = enemy.archetype();
    let position = enemy.position;
    let enemy = &mut state.enemies[i];
    enemy.mode = EnemyMode::Dead;
    enemy.reached_nexus = true;
    state.damage_nexus(archetype.damage);

    if let EnemyRole::Kamikaze { blast_radius } = archetype.role {
        state.push_effect(Effect::Explosion {
            position,
            radius: blast_radius,
        });
    }
}
