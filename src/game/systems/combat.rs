//! Turret combat resolver
//!
//! Runs in two passes per tick. Support turrets first clear and restamp every
//! buff (fire-rate, damage, repair, slow) so the firing pass sees buffs granted
//! this same tick. All other turrets then pick the nearest valid target and act
//! according to their behavior.

use hashbrown::HashSet;
use rand::Rng;

use crate::game::archetypes::{self, Spread, SupportEffect, TurretBehavior, TurretKind};
use crate::game::constants::combat::{
    AOE_EDGE_FALLOFF, BEAM_VISUAL_TTL, FLAME_CONE, FLAME_PARTICLE_SPEED, FLAME_PARTICLE_TTL,
};
use crate::game::state::{Burn, Effect, Enemy, EnemyMode, EntityId, GameState, Projectile, ProjectileKind};
use crate::util::vec2::Vec2;

// ============================================================================
// Damage model
// ============================================================================

/// Armor fraction that applies to a hit coming from `source`
pub fn armor_fraction(enemy: &Enemy, source: Vec2) -> f32 {
    let armor = enemy.archetype().armor;
    if armor.fraction <= 0.0 {
        return 0.0;
    }
    if armor.front_only {
        let to_source = source - enemy.position;
        if enemy.heading_vec().dot(to_source) <= 0.0 {
            return 0.0;
        }
    }
    armor.fraction.clamp(0.0, 1.0)
}

/// Apply already-boosted damage to an enemy, reduced by armor.
/// Returns the damage dealt. Dead and spawn-protected enemies take nothing.
pub fn apply_damage(enemy: &mut Enemy, amount: f32, source: Vec2) -> f32 {
    if !enemy.is_alive() || enemy.is_protected() || amount <= 0.0 {
        return 0.0;
    }
    let dealt = amount * (1.0 - armor_fraction(enemy, source));
    enemy.health -= dealt;
    if enemy.health <= 0.0 {
        enemy.mode = EnemyMode::Dead;
    }
    dealt
}

/// Damage at `distance` from an AOE center: full at the center, half at the
/// edge, nothing beyond.
pub fn aoe_falloff(damage: f32, distance: f32, radius: f32) -> Option<f32> {
    if radius <= 0.0 || distance > radius {
        return None;
    }
    Some(damage * (1.0 - AOE_EDGE_FALLOFF * distance / radius))
}

/// Damage every enemy in `radius` of `center` with falloff. Returns hit count.
pub fn apply_area_damage(enemies: &mut [Enemy], center: Vec2, radius: f32, damage: f32, hits_air: bool) -> usize {
    let mut hits = 0;
    for enemy in enemies.iter_mut() {
        if !enemy.is_alive() || (enemy.is_flying() && !hits_air) {
            continue;
        }
        if let Some(amount) = aoe_falloff(damage, enemy.position.distance_to(center), radius) {
            if apply_damage(enemy, amount, center) > 0.0 {
                hits += 1;
            }
        }
    }
    hits
}

/// Start or replace a burn. Durations never stack.
pub fn apply_burn(enemy: &mut Enemy, burn: Burn) {
    if enemy.is_alive() && !enemy.is_protected() {
        enemy.burn = Some(burn);
    }
}

// ============================================================================
// Targeting
// ============================================================================

/// Index of the nearest alive enemy inside the ring `min_range..=range`.
/// Ties keep the earlier enemy.
pub fn find_target(enemies: &[Enemy], from: Vec2, range: f32, min_range: f32, hits_air: bool) -> Option<usize> {
    let range_sq = range * range;
    let min_sq = min_range * min_range;
    let mut best: Option<(usize, f32)> = None;

    for (i, enemy) in enemies.iter().enumerate() {
        if !enemy.is_alive() || (enemy.is_flying() && !hits_air) {
            continue;
        }
        let d = from.distance_sq_to(enemy.position);
        if d > range_sq || d < min_sq {
            continue;
        }
        if best.map_or(true, |(_, best_d)| d < best_d) {
            best = Some((i, d));
        }
    }

    best.map(|(i, _)| i)
}

// ============================================================================
// Passes
// ============================================================================

/// Snapshot of the acting turret, taken before mutating the room
#[derive(Debug, Clone, Copy)]
struct Shooter {
    kind: TurretKind,
    position: Vec2,
    damage: f32,
    range: f32,
    hits_air: bool,
    /// Level multiplier × (1 + damage boost)
    damage_scale: f32,
}

/// Run both combat passes
pub fn update_turrets(state: &mut GameState, dt: f32) {
    apply_support(state, dt);
    fire_turrets(state, dt);
}

/// Pass 1: clear buffs, then stamp boosts, repairs and slows
pub fn apply_support(state: &mut GameState, dt: f32) {
    for turret in state.turrets.iter_mut() {
        turret.clear_buffs();
    }
    for enemy in state.enemies.iter_mut() {
        enemy.slow_multiplier = 1.0;
    }

    let sources: Vec<(EntityId, Vec2, f32, u8, TurretBehavior, bool)> = state
        .turrets
        .iter()
        .filter(|t| t.is_alive() && t.archetype().behavior.is_support())
        .map(|t| (t.id, t.position, t.range(), t.level, t.archetype().behavior, t.archetype().hits_air))
        .collect();

    for (source_id, position, range, level, behavior, hits_air) in sources {
        let range_sq = range * range;
        match behavior {
            TurretBehavior::SlowField { multiplier } => {
                for enemy in state.enemies.iter_mut() {
                    if !enemy.is_alive() || (enemy.is_flying() && !hits_air) {
                        continue;
                    }
                    if enemy.position.distance_sq_to(position) <= range_sq {
                        enemy.slow_multiplier = enemy.slow_multiplier.min(multiplier);
                    }
                }
            }
            TurretBehavior::Support(SupportEffect::SpeedBoost(bonus)) => {
                for turret in state.turrets.iter_mut() {
                    if turret.id != source_id && turret.position.distance_sq_to(position) <= range_sq {
                        turret.speed_boost = turret.speed_boost.max(bonus);
                    }
                }
            }
            TurretBehavior::Support(SupportEffect::DamageBoost(bonus)) => {
                for turret in state.turrets.iter_mut() {
                    if turret.id != source_id && turret.position.distance_sq_to(position) <= range_sq {
                        turret.damage_boost = turret.damage_boost.max(bonus);
                    }
                }
            }
            TurretBehavior::Support(SupportEffect::Repair(per_second)) => {
                let heal = per_second * archetypes::damage_multiplier(level) * dt;
                for turret in state.turrets.iter_mut() {
                    if turret.id != source_id
                        && turret.is_alive()
                        && turret.position.distance_sq_to(position) <= range_sq
                    {
                        turret.health = (turret.health + heal).min(turret.max_health());
                    }
                }
                for wall in state.walls.iter_mut() {
                    if wall.is_alive() && wall.position.distance_sq_to(position) <= range_sq {
                        wall.health = (wall.health + heal).min(wall.max_health());
                    }
                }
            }
            _ => {}
        }
    }
}

/// Pass 2: target and fire every non-support turret
pub fn fire_turrets(state: &mut GameState, dt: f32) {
    for i in 0..state.turrets.len() {
        let turret = &mut state.turrets[i];
        let behavior = turret.archetype().behavior;
        if !turret.is_alive() || behavior.is_support() {
            continue;
        }

        turret.cooldown = (turret.cooldown - dt * (1.0 + turret.speed_boost)).max(0.0);
        if turret.cooldown > 0.0 {
            continue;
        }

        let damage_scale = archetypes::damage_multiplier(turret.level) * (1.0 + turret.damage_boost);
        let shooter = Shooter {
            kind: turret.kind,
            position: turret.position,
            damage: turret.archetype().damage * damage_scale,
            range: turret.range(),
            hits_air: turret.archetype().hits_air,
            damage_scale,
        };
        let min_range = turret.min_range();
        let fire_rate = turret.fire_rate();

        let Some(target) = find_target(&state.enemies, shooter.position, shooter.range, min_range, shooter.hits_air)
        else {
            continue;
        };

        let aim = state.enemies[target].position;
        let turret = &mut state.turrets[i];
        turret.angle = (aim - shooter.position).angle();
        if fire_rate > 0.0 {
            turret.cooldown = 1.0 / fire_rate;
        }

        match behavior {
            TurretBehavior::Kinetic {
                pellets,
                spread,
                speed,
                aoe_radius,
                penetrating,
                ttl,
            } => fire_kinetic(state, &shooter, aim, pellets, spread, speed, aoe_radius, penetrating, ttl),
            TurretBehavior::Beam { piercing, width } => fire_beam(state, &shooter, target, piercing, width),
            TurretBehavior::Chain { hops, radius } => fire_chain(state, &shooter, target, hops, radius),
            TurretBehavior::Continuous {
                direct_fraction,
                burn_dps,
                burn_duration,
                particles,
            } => fire_continuous(state, &shooter, target, direct_fraction, burn_dps, burn_duration, particles),
            TurretBehavior::Shockwave => {
                apply_area_damage(&mut state.enemies, shooter.position, shooter.range, shooter.damage, shooter.hits_air);
                state.push_effect(Effect::Shockwave {
                    position: shooter.position,
                    radius: shooter.range,
                });
            }
            TurretBehavior::SlowField { .. } | TurretBehavior::Support(_) => {}
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn fire_kinetic(
    state: &mut GameState,
    shooter: &Shooter,
    aim: Vec2,
    pellets: u8,
    spread: Spread,
    speed: f32,
    aoe_radius: Option<f32>,
    penetrating: bool,
    ttl: Option<f32>,
) {
    let dir = (aim - shooter.position).normalize();
    let perpendicular = Vec2::new(-dir.y, dir.x);
    let count = pellets.max(1);

    for k in 0..count {
        // -0.5..=0.5 across the volley, 0 for a single shot
        let t = if count > 1 {
            k as f32 / (count - 1) as f32 - 0.5
        } else {
            0.0
        };
        let heading = match spread {
            Spread::Angular(total) => dir.rotate(t * total),
            Spread::Positional(total) => (aim + perpendicular * (t * total) - shooter.position).normalize(),
        };

        let mut projectile = Projectile::kinetic(0, shooter.kind, shooter.position, heading * speed, shooter.damage);
        projectile.aoe_radius = aoe_radius;
        projectile.penetrating = penetrating;
        projectile.hits_air = shooter.hits_air;
        projectile.ttl = ttl;
        state.add_projectile(projectile);
    }
}

fn fire_beam(state: &mut GameState, shooter: &Shooter, target: usize, piercing: bool, width: f32) {
    let aim = state.enemies[target].position;
    let end = if piercing {
        shooter.position + (aim - shooter.position).normalize() * shooter.range
    } else {
        aim
    };

    if piercing {
        for enemy in state.enemies.iter_mut() {
            if !enemy.is_alive() || (enemy.is_flying() && !shooter.hits_air) {
                continue;
            }
            let (distance, t) = enemy.position.distance_to_segment(shooter.position, end);
            if (0.0..=1.0).contains(&t) && distance <= width + enemy.radius() {
                apply_damage(enemy, shooter.damage, shooter.position);
            }
        }
    } else {
        apply_damage(&mut state.enemies[target], shooter.damage, shooter.position);
    }

    state.add_projectile(Projectile::visual(
        0,
        ProjectileKind::Beam,
        shooter.kind,
        shooter.position,
        end,
        Vec2::ZERO,
        BEAM_VISUAL_TTL,
    ));
}

fn fire_chain(state: &mut GameState, shooter: &Shooter, target: usize, hops: u8, radius: f32) {
    let mut hit: HashSet<EntityId> = HashSet::new();
    let mut arcs: Vec<(Vec2, Vec2)> = Vec::with_capacity(hops as usize + 1);

    let mut last = state.enemies[target].position;
    apply_damage(&mut state.enemies[target], shooter.damage, shooter.position);
    hit.insert(state.enemies[target].id);
    arcs.push((shooter.position, last));

    for _ in 0..hops {
        let radius_sq = radius * radius;
        let next = state
            .enemies
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_alive() && !hit.contains(&e.id) && (shooter.hits_air || !e.is_flying()))
            .map(|(i, e)| (i, e.position.distance_sq_to(last)))
            .filter(|&(_, d)| d <= radius_sq)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(i, _)| i);

        let Some(i) = next else {
            break;
        };
        let position = state.enemies[i].position;
        apply_damage(&mut state.enemies[i], shooter.damage, last);
        hit.insert(state.enemies[i].id);
        arcs.push((last, position));
        last = position;
    }

    for (from, to) in arcs {
        state.add_projectile(Projectile::visual(
            0,
            ProjectileKind::Arc,
            shooter.kind,
            from,
            to,
            Vec2::ZERO,
            BEAM_VISUAL_TTL,
        ));
    }
}

#[allow(clippy::too_many_arguments)]
fn fire_continuous(
    state: &mut GameState,
    shooter: &Shooter,
    target: usize,
    direct_fraction: f32,
    burn_dps: f32,
    burn_duration: f32,
    particles: u8,
) {
    let aim = state.enemies[target].position;
    let enemy = &mut state.enemies[target];
    apply_damage(enemy, shooter.damage * direct_fraction, shooter.position);
    apply_burn(
        enemy,
        Burn {
            remaining: burn_duration,
            dps: burn_dps * shooter.damage_scale,
        },
    );

    let dir = (aim - shooter.position).normalize();
    for _ in 0..particles {
        let jitter = state.rng.gen_range(-0.5..=0.5) * FLAME_CONE;
        let velocity = dir.rotate(jitter) * FLAME_PARTICLE_SPEED;
        state.add_projectile(Projectile::visual(
            0,
            ProjectileKind::Flame,
            shooter.kind,
            shooter.position,
            shooter.position,
            velocity,
            FLAME_PARTICLE_TTL,
        ));
    }
}
