pub mod combat;
pub mod director;
pub mod economy;
pub mod enemy;
pub mod projectile;
