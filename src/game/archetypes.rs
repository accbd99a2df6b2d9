//! Static archetype tables for structures and enemies
//!
//! Archetypes are immutable and shared by every instance of a kind. Instances
//! keep only their level and compute effective stats on read through the
//! level multiplier functions below.

use serde::{Deserialize, Serialize};

use crate::game::constants::economy::{EXTRACTOR_CAPACITY, EXTRACTOR_MAX_LEVEL, EXTRACTOR_RATE};
use crate::game::constants::grid::CELL_SIZE;
use crate::game::constants::structure::{
    TURRET_MAX_LEVEL, WALL_HEALTH, WALL_HEALTH_PER_LEVEL, WALL_MAX_LEVEL,
};
use crate::game::state::ResourceBundle;

const C: f32 = CELL_SIZE;

// ============================================================================
// Structure kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TurretKind {
    Blaster = 0,
    Scatter = 1,
    Mortar = 2,
    Laser = 3,
    Railgun = 4,
    Tesla = 5,
    Flamethrower = 6,
    Cryo = 7,
    Shockwave = 8,
    Overclock = 9,
    Amplifier = 10,
    Repair = 11,
    Bastion = 12,
}

impl TurretKind {
    pub const ALL: [TurretKind; 13] = [
        TurretKind::Blaster,
        TurretKind::Scatter,
        TurretKind::Mortar,
        TurretKind::Laser,
        TurretKind::Railgun,
        TurretKind::Tesla,
        TurretKind::Flamethrower,
        TurretKind::Cryo,
        TurretKind::Shockwave,
        TurretKind::Overclock,
        TurretKind::Amplifier,
        TurretKind::Repair,
        TurretKind::Bastion,
    ];

    /// Stable numeric id used in snapshots
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    #[inline]
    pub fn archetype(self) -> &'static TurretArchetype {
        turret_archetype(self)
    }
}

/// Anything a player can build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureKind {
    Turret(TurretKind),
    Wall,
    Extractor,
}

impl StructureKind {
    /// Base placement cost
    pub fn cost(self) -> ResourceBundle {
        match self {
            StructureKind::Turret(kind) => kind.archetype().cost,
            StructureKind::Wall => WALL_COST,
            StructureKind::Extractor => EXTRACTOR_COST,
        }
    }

    /// Side length of the square footprint in cells
    pub fn footprint(self) -> u8 {
        match self {
            StructureKind::Turret(kind) => kind.archetype().footprint,
            StructureKind::Wall | StructureKind::Extractor => 1,
        }
    }

    pub fn max_level(self) -> u8 {
        match self {
            StructureKind::Turret(_) => TURRET_MAX_LEVEL,
            StructureKind::Wall => WALL_MAX_LEVEL,
            StructureKind::Extractor => EXTRACTOR_MAX_LEVEL,
        }
    }

    /// Stable numeric id used in snapshots (turrets 0..=12, wall 100, extractor 101)
    pub fn id(self) -> u8 {
        match self {
            StructureKind::Turret(kind) => kind.id(),
            StructureKind::Wall => 100,
            StructureKind::Extractor => 101,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            100 => Some(StructureKind::Wall),
            101 => Some(StructureKind::Extractor),
            _ => TurretKind::from_id(id).map(StructureKind::Turret),
        }
    }
}

pub const WALL_COST: ResourceBundle = ResourceBundle::new(20, 0, 0);
pub const EXTRACTOR_COST: ResourceBundle = ResourceBundle::new(60, 10, 0);

// ============================================================================
// Turret archetypes
// ============================================================================

/// How a multi-projectile volley is spread around the aim line
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Spread {
    /// Total fan angle in radians
    Angular(f32),
    /// Total lateral offset of the aim points in world units
    Positional(f32),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SupportEffect {
    /// Fractional fire-rate bonus stamped on nearby turrets
    SpeedBoost(f32),
    /// Fractional damage bonus stamped on nearby turrets
    DamageBoost(f32),
    /// Health per second restored to nearby turrets and walls
    Repair(f32),
}

/// What a turret does when it acts. Exactly one per archetype.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TurretBehavior {
    Kinetic {
        pellets: u8,
        spread: Spread,
        speed: f32,
        aoe_radius: Option<f32>,
        penetrating: bool,
        ttl: Option<f32>,
    },
    Beam {
        piercing: bool,
        /// Perpendicular hit distance from the aim segment (piercing only)
        width: f32,
    },
    Chain {
        hops: u8,
        radius: f32,
    },
    Continuous {
        direct_fraction: f32,
        burn_dps: f32,
        burn_duration: f32,
        particles: u8,
    },
    SlowField {
        multiplier: f32,
    },
    /// Pulsed AOE over the whole range on the turret's own cooldown
    Shockwave,
    Support(SupportEffect),
}

impl TurretBehavior {
    /// Support behaviors run in the first combat pass
    #[inline]
    pub fn is_support(&self) -> bool {
        matches!(self, TurretBehavior::SlowField { .. } | TurretBehavior::Support(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurretArchetype {
    pub kind: TurretKind,
    pub cost: ResourceBundle,
    pub damage: f32,
    /// World units
    pub range: f32,
    /// Enemies closer than this are ignored
    pub min_range: f32,
    /// Activations per second
    pub fire_rate: f32,
    pub max_health: f32,
    pub hits_air: bool,
    /// Side length of the square footprint in cells (1 or 3)
    pub footprint: u8,
    pub behavior: TurretBehavior,
}

static BLASTER: TurretArchetype = TurretArchetype {
    kind: TurretKind::Blaster,
    cost: ResourceBundle::new(100, 0, 0),
    damage: 12.0,
    range: 3.5 * C,
    min_range: 0.0,
    fire_rate: 2.0,
    max_health: 200.0,
    hits_air: true,
    footprint: 1,
    behavior: TurretBehavior::Kinetic {
        pellets: 1,
        spread: Spread::Angular(0.0),
        speed: 400.0,
        aoe_radius: None,
        penetrating: false,
        ttl: Some(2.0),
    },
};

static SCATTER: TurretArchetype = TurretArchetype {
    kind: TurretKind::Scatter,
    cost: ResourceBundle::new(120, 20, 0),
    damage: 6.0,
    range: 2.5 * C,
    min_range: 0.0,
    fire_rate: 1.2,
    max_health: 220.0,
    hits_air: true,
    footprint: 1,
    behavior: TurretBehavior::Kinetic {
        pellets: 5,
        spread: Spread::Angular(0.5),
        speed: 380.0,
        aoe_radius: None,
        penetrating: false,
        ttl: Some(0.6),
    },
};

static MORTAR: TurretArchetype = TurretArchetype {
    kind: TurretKind::Mortar,
    cost: ResourceBundle::new(150, 40, 0),
    damage: 40.0,
    range: 6.0 * C,
    min_range: 2.0 * C,
    fire_rate: 0.4,
    max_health: 250.0,
    hits_air: false,
    footprint: 1,
    behavior: TurretBehavior::Kinetic {
        pellets: 1,
        spread: Spread::Positional(0.0),
        speed: 220.0,
        aoe_radius: Some(1.2 * C),
        penetrating: false,
        ttl: Some(3.0),
    },
};

static LASER: TurretArchetype = TurretArchetype {
    kind: TurretKind::Laser,
    cost: ResourceBundle::new(140, 40, 10),
    damage: 25.0,
    range: 4.0 * C,
    min_range: 0.0,
    fire_rate: 1.5,
    max_health: 200.0,
    hits_air: true,
    footprint: 1,
    behavior: TurretBehavior::Beam {
        piercing: false,
        width: 0.0,
    },
};

static RAILGUN: TurretArchetype = TurretArchetype {
    kind: TurretKind::Railgun,
    cost: ResourceBundle::new(220, 60, 30),
    damage: 90.0,
    range: 8.0 * C,
    min_range: 0.0,
    fire_rate: 0.3,
    max_health: 220.0,
    hits_air: true,
    footprint: 1,
    behavior: TurretBehavior::Beam {
        piercing: true,
        width: 0.4 * C,
    },
};

static TESLA: TurretArchetype = TurretArchetype {
    kind: TurretKind::Tesla,
    cost: ResourceBundle::new(160, 80, 10),
    damage: 18.0,
    range: 3.0 * C,
    min_range: 0.0,
    fire_rate: 1.0,
    max_health: 220.0,
    hits_air: true,
    footprint: 1,
    behavior: TurretBehavior::Chain {
        hops: 4,
        radius: 2.0 * C,
    },
};

static FLAMETHROWER: TurretArchetype = TurretArchetype {
    kind: TurretKind::Flamethrower,
    cost: ResourceBundle::new(130, 50, 0),
    damage: 8.0,
    range: 2.0 * C,
    min_range: 0.0,
    fire_rate: 4.0,
    max_health: 260.0,
    hits_air: false,
    footprint: 1,
    behavior: TurretBehavior::Continuous {
        direct_fraction: 0.25,
        burn_dps: 12.0,
        burn_duration: 3.0,
        particles: 3,
    },
};

static CRYO: TurretArchetype = TurretArchetype {
    kind: TurretKind::Cryo,
    cost: ResourceBundle::new(120, 40, 10),
    damage: 0.0,
    range: 3.0 * C,
    min_range: 0.0,
    fire_rate: 0.0,
    max_health: 200.0,
    hits_air: true,
    footprint: 1,
    behavior: TurretBehavior::SlowField { multiplier: 0.5 },
};

static SHOCKWAVE: TurretArchetype = TurretArchetype {
    kind: TurretKind::Shockwave,
    cost: ResourceBundle::new(180, 60, 0),
    damage: 35.0,
    range: 2.5 * C,
    min_range: 0.0,
    fire_rate: 0.5,
    max_health: 300.0,
    hits_air: false,
    footprint: 1,
    behavior: TurretBehavior::Shockwave,
};

static OVERCLOCK: TurretArchetype = TurretArchetype {
    kind: TurretKind::Overclock,
    cost: ResourceBundle::new(150, 30, 20),
    damage: 0.0,
    range: 2.5 * C,
    min_range: 0.0,
    fire_rate: 0.0,
    max_health: 180.0,
    hits_air: false,
    footprint: 1,
    behavior: TurretBehavior::Support(SupportEffect::SpeedBoost(0.3)),
};

static AMPLIFIER: TurretArchetype = TurretArchetype {
    kind: TurretKind::Amplifier,
    cost: ResourceBundle::new(150, 30, 30),
    damage: 0.0,
    range: 2.5 * C,
    min_range: 0.0,
    fire_rate: 0.0,
    max_health: 180.0,
    hits_air: false,
    footprint: 1,
    behavior: TurretBehavior::Support(SupportEffect::DamageBoost(0.25)),
};

static REPAIR: TurretArchetype = TurretArchetype {
    kind: TurretKind::Repair,
    cost: ResourceBundle::new(120, 40, 0),
    damage: 0.0,
    range: 3.0 * C,
    min_range: 0.0,
    fire_rate: 0.0,
    max_health: 180.0,
    hits_air: false,
    footprint: 1,
    behavior: TurretBehavior::Support(SupportEffect::Repair(10.0)),
};

static BASTION: TurretArchetype = TurretArchetype {
    kind: TurretKind::Bastion,
    cost: ResourceBundle::new(400, 120, 40),
    damage: 60.0,
    range: 7.0 * C,
    min_range: 1.5 * C,
    fire_rate: 0.5,
    max_health: 1200.0,
    hits_air: false,
    footprint: 3,
    behavior: TurretBehavior::Kinetic {
        pellets: 3,
        spread: Spread::Positional(1.2 * C),
        speed: 260.0,
        aoe_radius: Some(1.5 * C),
        penetrating: false,
        ttl: Some(3.5),
    },
};

pub fn turret_archetype(kind: TurretKind) -> &'static TurretArchetype {
    match kind {
        TurretKind::Blaster => &BLASTER,
        TurretKind::Scatter => &SCATTER,
        TurretKind::Mortar => &MORTAR,
        TurretKind::Laser => &LASER,
        TurretKind::Railgun => &RAILGUN,
        TurretKind::Tesla => &TESLA,
        TurretKind::Flamethrower => &FLAMETHROWER,
        TurretKind::Cryo => &CRYO,
        TurretKind::Shockwave => &SHOCKWAVE,
        TurretKind::Overclock => &OVERCLOCK,
        TurretKind::Amplifier => &AMPLIFIER,
        TurretKind::Repair => &REPAIR,
        TurretKind::Bastion => &BASTION,
    }
}

// ============================================================================
// Level scaling
// ============================================================================

#[inline]
fn steps(level: u8) -> f32 {
    level.saturating_sub(1) as f32
}

#[inline]
pub fn damage_multiplier(level: u8) -> f32 {
    1.0 + 0.3 * steps(level)
}

#[inline]
pub fn range_multiplier(level: u8) -> f32 {
    1.0 + 0.05 * steps(level)
}

#[inline]
pub fn fire_rate_multiplier(level: u8) -> f32 {
    1.0 + 0.1 * steps(level)
}

#[inline]
pub fn health_multiplier(level: u8) -> f32 {
    1.0 + 0.25 * steps(level)
}

/// Cost to go from `level` to `level + 1`: floor(base × (0.5 + 0.25 × level))
pub fn upgrade_cost(base: ResourceBundle, level: u8) -> ResourceBundle {
    base.scaled_floor(0.5 + 0.25 * level as f32)
}

pub fn wall_max_health(level: u8) -> f32 {
    WALL_HEALTH * (1.0 + WALL_HEALTH_PER_LEVEL * steps(level))
}

/// Extractor yield per second at a level
pub fn extractor_rate(level: u8) -> f32 {
    EXTRACTOR_RATE * (1.0 + 0.5 * steps(level))
}

/// Extractor store capacity at a level
pub fn extractor_capacity(level: u8) -> f32 {
    EXTRACTOR_CAPACITY * level.max(1) as f32
}

// ============================================================================
// Enemy archetypes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EnemyKind {
    Grunt = 0,
    Runner = 1,
    Brute = 2,
    Shielded = 3,
    Flyer = 4,
    Healer = 5,
    Splitter = 6,
    Bomber = 7,
    Boss = 8,
    Mini = 9,
}

impl EnemyKind {
    #[inline]
    pub fn id(self) -> u8 {
        self as u8
    }

    #[inline]
    pub fn archetype(self) -> &'static EnemyArchetype {
        enemy_archetype(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Armor {
    /// Fraction of incoming damage absorbed
    pub fraction: f32,
    /// Only absorbs hits whose source is ahead of the enemy's heading
    pub front_only: bool,
}

impl Armor {
    pub const NONE: Armor = Armor {
        fraction: 0.0,
        front_only: false,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Movement {
    Ground,
    Flying,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EnemyRole {
    Standard,
    Splitter {
        children: u8,
        child: EnemyKind,
    },
    Healer {
        amount: f32,
        radius: f32,
        interval: f32,
    },
    /// Dies on contact and emits an explosion
    Kamikaze {
        blast_radius: f32,
    },
    Summoner {
        minion: EnemyKind,
        count: u8,
        interval: f32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyArchetype {
    pub kind: EnemyKind,
    pub health: f32,
    /// World units per second
    pub speed: f32,
    /// Damage to the Nexus on contact and to structures per melee hit
    pub damage: f32,
    pub radius: f32,
    pub armor: Armor,
    pub movement: Movement,
    pub role: EnemyRole,
    pub reward: ResourceBundle,
}

static GRUNT: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Grunt,
    health: 60.0,
    speed: 50.0,
    damage: 10.0,
    radius: 10.0,
    armor: Armor::NONE,
    movement: Movement::Ground,
    role: EnemyRole::Standard,
    reward: ResourceBundle::new(5, 0, 0),
};

static RUNNER: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Runner,
    health: 35.0,
    speed: 95.0,
    damage: 5.0,
    radius: 8.0,
    armor: Armor::NONE,
    movement: Movement::Ground,
    role: EnemyRole::Standard,
    reward: ResourceBundle::new(4, 0, 0),
};

static BRUTE: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Brute,
    health: 260.0,
    speed: 32.0,
    damage: 30.0,
    radius: 15.0,
    armor: Armor {
        fraction: 0.3,
        front_only: false,
    },
    movement: Movement::Ground,
    role: EnemyRole::Standard,
    reward: ResourceBundle::new(12, 3, 0),
};

static SHIELDED: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Shielded,
    health: 140.0,
    speed: 42.0,
    damage: 15.0,
    radius: 12.0,
    armor: Armor {
        fraction: 0.6,
        front_only: true,
    },
    movement: Movement::Ground,
    role: EnemyRole::Standard,
    reward: ResourceBundle::new(8, 2, 0),
};

static FLYER: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Flyer,
    health: 50.0,
    speed: 70.0,
    damage: 10.0,
    radius: 9.0,
    armor: Armor::NONE,
    movement: Movement::Flying,
    role: EnemyRole::Standard,
    reward: ResourceBundle::new(6, 1, 0),
};

static HEALER: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Healer,
    health: 80.0,
    speed: 45.0,
    damage: 5.0,
    radius: 10.0,
    armor: Armor::NONE,
    movement: Movement::Ground,
    role: EnemyRole::Healer {
        amount: 15.0,
        radius: 2.0 * C,
        interval: 2.0,
    },
    reward: ResourceBundle::new(7, 0, 1),
};

static SPLITTER: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Splitter,
    health: 120.0,
    speed: 45.0,
    damage: 15.0,
    radius: 13.0,
    armor: Armor::NONE,
    movement: Movement::Ground,
    role: EnemyRole::Splitter {
        children: 3,
        child: EnemyKind::Mini,
    },
    reward: ResourceBundle::new(8, 0, 0),
};

static BOMBER: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Bomber,
    health: 70.0,
    speed: 60.0,
    damage: 100.0,
    radius: 11.0,
    armor: Armor::NONE,
    movement: Movement::Ground,
    role: EnemyRole::Kamikaze {
        blast_radius: 1.5 * C,
    },
    reward: ResourceBundle::new(10, 0, 0),
};

static BOSS: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Boss,
    health: 2000.0,
    speed: 25.0,
    damage: 250.0,
    radius: 22.0,
    armor: Armor {
        fraction: 0.2,
        front_only: false,
    },
    movement: Movement::Ground,
    role: EnemyRole::Summoner {
        minion: EnemyKind::Grunt,
        count: 3,
        interval: 6.0,
    },
    reward: ResourceBundle::new(150, 50, 20),
};

static MINI: EnemyArchetype = EnemyArchetype {
    kind: EnemyKind::Mini,
    health: 20.0,
    speed: 70.0,
    damage: 3.0,
    radius: 6.0,
    armor: Armor::NONE,
    movement: Movement::Ground,
    role: EnemyRole::Standard,
    reward: ResourceBundle::new(1, 0, 0),
};

pub fn enemy_archetype(kind: EnemyKind) -> &'static EnemyArchetype {
    match kind {
        EnemyKind::Grunt => &GRUNT,
        EnemyKind::Runner => &RUNNER,
        EnemyKind::Brute => &BRUTE,
        EnemyKind::Shielded => &SHIELDED,
        EnemyKind::Flyer => &FLYER,
        EnemyKind::Healer => &HEALER,
        EnemyKind::Splitter => &SPLITTER,
        EnemyKind::Bomber => &BOMBER,
        EnemyKind::Boss => &BOSS,
        EnemyKind::Mini => &MINI,
    }
}
