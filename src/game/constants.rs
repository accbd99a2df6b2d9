/// Tick timing
pub mod tick {
    /// Server tick rate in Hz
    pub const TICK_RATE: u32 = 20;
    /// Delta time per tick in seconds
    pub const DT: f32 = 1.0 / TICK_RATE as f32;
    /// Tick duration in milliseconds
    pub const TICK_DURATION_MS: u64 = 1000 / TICK_RATE as u64;
}

/// Grid geometry
pub mod grid {
    /// World units per grid cell
    pub const CELL_SIZE: f32 = 40.0;
    /// Default room width in cells (including the border ring)
    pub const DEFAULT_WIDTH: u32 = 30;
    /// Default room height in cells (including the border ring)
    pub const DEFAULT_HEIGHT: u32 = 20;
    /// Number of resource clusters scattered at room creation
    pub const RESOURCE_CLUSTERS: u32 = 6;
    /// Cells per resource cluster (upper bound, clusters may overlap)
    pub const RESOURCE_CLUSTER_SIZE: u32 = 4;
    /// Resource cells are never generated this close (Manhattan) to the Nexus
    pub const RESOURCE_NEXUS_CLEARANCE: i32 = 3;
}

/// Economy constants
pub mod economy {
    /// Fraction of cumulative invested cost refunded on sell
    pub const SELL_REFUND_RATIO: f32 = 0.75;
    /// Starting resource pool
    pub const STARTING_IRON: u32 = 500;
    pub const STARTING_COPPER: u32 = 200;
    pub const STARTING_CRYSTAL: u32 = 50;
    /// Extractor base yield per second
    pub const EXTRACTOR_RATE: f32 = 1.5;
    /// Extractor base store capacity
    pub const EXTRACTOR_CAPACITY: f32 = 40.0;
    /// Maximum extractor level
    pub const EXTRACTOR_MAX_LEVEL: u8 = 3;
}

/// Structure constants
pub mod structure {
    /// Maximum turret level
    pub const TURRET_MAX_LEVEL: u8 = 5;
    /// Maximum wall level
    pub const WALL_MAX_LEVEL: u8 = 3;
    /// Wall base health
    pub const WALL_HEALTH: f32 = 400.0;
    /// Extra wall health per level above 1, as a fraction of base
    pub const WALL_HEALTH_PER_LEVEL: f32 = 0.5;
}

/// Nexus constants
pub mod nexus {
    /// Starting (and maximum) Nexus health
    pub const MAX_HEALTH: f32 = 1000.0;
    /// Contact radius around the Nexus center, in world units
    pub const CONTACT_RADIUS: f32 = 0.6 * super::grid::CELL_SIZE;
}

/// Combat constants
pub mod combat {
    /// Projectile-to-enemy hit radius (added to enemy radius)
    pub const HIT_RADIUS: f32 = 0.4 * super::grid::CELL_SIZE;
    /// AOE damage fraction lost at the edge of the radius
    pub const AOE_EDGE_FALLOFF: f32 = 0.5;
    /// Lifetime of zero-motion beam/arc visuals (seconds)
    pub const BEAM_VISUAL_TTL: f32 = 0.1;
    /// Lifetime of flame particle visuals (seconds)
    pub const FLAME_PARTICLE_TTL: f32 = 0.3;
    /// Speed of flame particle visuals
    pub const FLAME_PARTICLE_SPEED: f32 = 160.0;
    /// Spread of flame particle visuals (radians, total cone)
    pub const FLAME_CONE: f32 = 0.5;
}

/// Enemy behavior constants
pub mod enemy {
    /// Spawn protection duration in seconds
    pub const SPAWN_PROTECTION: f32 = 0.5;
    /// Radius (world units) in which a stranded enemy looks for an obstacle
    pub const OBSTACLE_SEARCH_RADIUS: f32 = 3.0 * super::grid::CELL_SIZE;
    /// Extra reach beyond the enemy radius for melee attacks
    pub const MELEE_REACH: f32 = 0.75 * super::grid::CELL_SIZE;
    /// Seconds between melee hits against an obstacle
    pub const ATTACK_INTERVAL: f32 = 1.0;
    /// Minimum seconds between re-path attempts for a stranded enemy
    pub const REPATH_INTERVAL: f32 = 0.5;
    /// Distance at which a path waypoint counts as reached
    pub const WAYPOINT_EPSILON: f32 = 0.5;
    /// Scatter radius for split children around the parent
    pub const SPLIT_SCATTER: f32 = 0.3 * super::grid::CELL_SIZE;
}

/// Wave director constants
pub mod wave {
    /// Rest before the first wave (seconds)
    pub const FIRST_REST: f32 = 10.0;
    /// Rest between waves (seconds)
    pub const REST_DURATION: f32 = 15.0;
    /// Spacing between consecutive grunt spawns (seconds)
    pub const GRUNT_SPACING: f32 = 0.8;
    /// Base grunt count before the per-wave term
    pub const BASE_COUNT: u32 = 5;
    /// Grunts added per wave number
    pub const COUNT_PER_WAVE: u32 = 2;
    /// Health growth per wave above 1
    pub const HEALTH_PER_WAVE: f32 = 0.1;
    /// Speed growth per wave above 1
    pub const SPEED_PER_WAVE: f32 = 0.03;
    /// A boss joins every Nth wave
    pub const BOSS_EVERY: u32 = 10;
}

/// Endless mode constants
pub mod endless {
    /// Initial seconds between spawns
    pub const INITIAL_INTERVAL: f32 = 2.0;
    /// Spawn interval floor
    pub const MIN_INTERVAL: f32 = 0.35;
    /// Multiplier applied to the interval on each difficulty step
    pub const INTERVAL_DECAY: f32 = 0.9;
    /// Seconds between difficulty steps
    pub const DIFFICULTY_STEP_INTERVAL: f32 = 30.0;
    /// Difficulty added per step
    pub const DIFFICULTY_STEP: f32 = 0.25;
    /// Grace period before the first endless spawn
    pub const FIRST_SPAWN_DELAY: f32 = 5.0;
}
