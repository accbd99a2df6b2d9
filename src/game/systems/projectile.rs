//! Projectile motion and collision
//!
//! Kinetic projectiles advance by velocity × dt and test against live enemies
//! with a fixed hit radius. Visual projectiles (beams, arcs, flames) only move
//! and expire; they never collide.

use crate::game::constants::combat::HIT_RADIUS;
use crate::game::state::{Effect, Enemy, GameState, Projectile};
use crate::game::systems::combat::{apply_area_damage, apply_burn, apply_damage};
use crate::util::vec2::Vec2;

/// Advance every projectile and resolve hits
pub fn update_projectiles(state: &mut GameState, dt: f32) {
    let GameState {
        projectiles,
        enemies,
        effects,
        grid,
        ..
    } = state;

    for projectile in projectiles.iter_mut().filter(|p| p.alive) {
        if let Some(ttl) = projectile.ttl.as_mut() {
            *ttl -= dt;
            if *ttl <= 0.0 {
                projectile.alive = false;
                continue;
            }
        }

        let previous = projectile.position;
        projectile.position += projectile.velocity * dt;
        if projectile.is_visual() {
            projectile.end += projectile.velocity * dt;
            continue;
        }
        if !grid.contains_world(projectile.position) {
            projectile.alive = false;
            continue;
        }

        resolve_hits(projectile, previous, enemies, effects);
    }

    projectiles.retain(|p| p.alive);
}

fn resolve_hits(
    projectile: &mut Projectile,
    previous: Vec2,
    enemies: &mut [Enemy],
    effects: &mut Vec<Effect>,
) {
    for i in 0..enemies.len() {
        let enemy = &enemies[i];
        if !enemy.is_alive() || (enemy.is_flying() && !projectile.hits_air) {
            continue;
        }
        if projectile.hit.contains(&enemy.id) {
            continue;
        }
        let reach = HIT_RADIUS + enemy.radius();
        if projectile.position.distance_sq_to(enemy.position) > reach * reach {
            continue;
        }

        if let Some(radius) = projectile.aoe_radius {
            // Area hits always consume the projectile
            apply_area_damage(enemies, projectile.position, radius, projectile.damage, projectile.hits_air);
            effects.push(Effect::Explosion {
                position: projectile.position,
                radius,
            });
            projectile.alive = false;
            return;
        }

        let enemy = &mut enemies[i];
        apply_damage(enemy, projectile.damage, previous);
        if let Some(burn) = projectile.burn {
            apply_burn(enemy, burn);
        }

        if projectile.penetrating {
            projectile.hit.push(enemy.id);
        } else {
            projectile.alive = false;
            return;
        }
    }
}
