//! Block positions, facings, and the rotation encoding of a monitor.
//!
//! A monitor cell is addressed inside its cluster by `(x_index, y_index)`.
//! Two directions turn those indices into world offsets:
//!
//! - **right** — the direction of increasing `x_index`
//! - **down** — the direction of increasing `y_index`
//!
//! plus **front**, the face a player reads and touches. All three derive from
//! one small integer, the rotation, which is persisted and sent on the wire:
//!
//! | raw    | mount                 | horizontal part            |
//! |--------|-----------------------|----------------------------|
//! | 2–5    | wall, front = facing  | `raw` is the facing index  |
//! | 8–11   | front points down     | `raw - 6` is a facing      |
//! | 14–17  | front points up       | `raw - 12` is a facing     |
//!
//! The remaining values (0, 1, 6, 7, 12, 13) do not produce three mutually
//! orthogonal, distinct axes and are rejected when decoded.
//!
//! Note that for wall monitors "down" is world-up: `y_index` 0 is the
//! bottom row of the cluster, while terminal row 0 is the top. Touch
//! mapping flips between the two.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::MonitorError;

// ---------------------------------------------------------------------------
// Facing
// ---------------------------------------------------------------------------

/// One of the six axis-aligned directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Facing {
    Down,
    Up,
    North,
    South,
    West,
    East,
}

impl Facing {
    pub const ALL: [Self; 6] = [
        Self::Down,
        Self::Up,
        Self::North,
        Self::South,
        Self::West,
        Self::East,
    ];

    /// Horizontal facings in yaw order (yaw 0 faces south).
    const BY_YAW: [Self; 4] = [Self::South, Self::West, Self::North, Self::East];

    /// Index 0–5: down, up, north, south, west, east.
    #[inline]
    #[must_use]
    pub const fn index(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        if index < 6 {
            Some(Self::ALL[index as usize])
        } else {
            None
        }
    }

    /// Unit vector `(dx, dy, dz)`.
    #[must_use]
    pub const fn vector(self) -> (i32, i32, i32) {
        match self {
            Self::Down => (0, -1, 0),
            Self::Up => (0, 1, 0),
            Self::North => (0, 0, -1),
            Self::South => (0, 0, 1),
            Self::West => (-1, 0, 0),
            Self::East => (1, 0, 0),
        }
    }

    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Down => Self::Up,
            Self::Up => Self::Down,
            Self::North => Self::South,
            Self::South => Self::North,
            Self::West => Self::East,
            Self::East => Self::West,
        }
    }

    #[must_use]
    pub const fn is_horizontal(self) -> bool {
        !matches!(self, Self::Down | Self::Up)
    }

    /// Horizontal facing a player with the given yaw (degrees) looks toward.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_yaw(yaw: f32) -> Self {
        let quadrant = (f64::from(yaw) / 90.0 + 0.5).floor() as i64;
        Self::BY_YAW[quadrant.rem_euclid(4) as usize]
    }

    /// Dot product of two facings' unit vectors.
    #[must_use]
    pub const fn dot(self, other: Self) -> i32 {
        let (ax, ay, az) = self.vector();
        let (bx, by, bz) = other.vector();
        ax * bx + ay * by + az * bz
    }
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Down => "down",
            Self::Up => "up",
            Self::North => "north",
            Self::South => "south",
            Self::West => "west",
            Self::East => "east",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// BlockPos / ChunkPos
// ---------------------------------------------------------------------------

/// Edge length of a chunk column in blocks.
pub const CHUNK_SIZE: i32 = 16;

/// An integer block position.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const ORIGIN: Self = Self { x: 0, y: 0, z: 0 };

    #[inline]
    #[must_use]
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Move `n` blocks along `facing` (backwards if `n` is negative).
    #[inline]
    #[must_use]
    pub const fn offset(self, facing: Facing, n: i32) -> Self {
        let (dx, dy, dz) = facing.vector();
        Self {
            x: self.x + dx * n,
            y: self.y + dy * n,
            z: self.z + dz * n,
        }
    }

    /// The chunk column containing this position.
    #[inline]
    #[must_use]
    pub const fn chunk(self) -> ChunkPos {
        ChunkPos {
            x: self.x.div_euclid(CHUNK_SIZE),
            z: self.z.div_euclid(CHUNK_SIZE),
        }
    }
}

impl fmt::Debug for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A 16×16 column of blocks, the unit of loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    #[inline]
    #[must_use]
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// How the front face of a monitor is mounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mount {
    /// Front is horizontal; "down" is world-up.
    Wall,
    /// Front points at the ground (a ceiling screen).
    FrontDown,
    /// Front points at the sky (a floor screen).
    FrontUp,
}

impl Mount {
    const fn base(self) -> u8 {
        match self {
            Self::Wall => 0,
            Self::FrontDown => 6,
            Self::FrontUp => 12,
        }
    }
}

/// A validated monitor rotation.
///
/// # Examples
///
/// ```
/// use n_cluster::geometry::{Facing, Rotation};
///
/// let r = Rotation::try_from(2).unwrap();
/// assert_eq!(r.front(), Facing::North);
/// assert_eq!(r.right(), Facing::West);
/// assert_eq!(r.down(), Facing::Up);
///
/// assert!(Rotation::try_from(7).is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rotation {
    mount: Mount,
    /// Always horizontal.
    facing: Facing,
}

impl Rotation {
    /// The default placement: a wall monitor facing north.
    pub const NORTH: Self = Self {
        mount: Mount::Wall,
        facing: Facing::North,
    };

    /// Every valid rotation, in raw order.
    #[must_use]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..18).filter_map(|raw| Self::try_from(raw).ok())
    }

    #[must_use]
    pub const fn mount(self) -> Mount {
        self.mount
    }

    /// The persisted integer encoding.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.mount.base() + self.facing.index()
    }

    /// The rotation a monitor gets when placed by a player looking along
    /// `yaw` / `pitch` (degrees, pitch positive looking down). The screen
    /// faces back toward the player.
    #[must_use]
    pub fn for_placement(yaw: f32, pitch: f32) -> Self {
        let facing = Facing::from_yaw(yaw).opposite();
        let mount = if pitch > 66.5 {
            Mount::FrontUp
        } else if pitch < -66.5 {
            Mount::FrontDown
        } else {
            Mount::Wall
        };
        Self { mount, facing }
    }

    /// The face players read and touch.
    #[must_use]
    pub const fn front(self) -> Facing {
        match self.mount {
            Mount::Wall => self.facing,
            Mount::FrontDown => Facing::Down,
            Mount::FrontUp => Facing::Up,
        }
    }

    /// Direction of increasing `x_index`.
    #[must_use]
    pub const fn right(self) -> Facing {
        match self.facing {
            Facing::South => Facing::East,
            Facing::West => Facing::South,
            Facing::East => Facing::North,
            _ => Facing::West,
        }
    }

    /// Direction of increasing `y_index`.
    #[must_use]
    pub const fn down(self) -> Facing {
        match self.mount {
            Mount::Wall => Facing::Up,
            Mount::FrontDown => self.facing,
            Mount::FrontUp => self.facing.opposite(),
        }
    }

    /// Recover the rotation whose axes are exactly this triple.
    #[must_use]
    pub fn from_axes(right: Facing, down: Facing, front: Facing) -> Option<Self> {
        Self::all().find(|r| r.right() == right && r.down() == down && r.front() == front)
    }

    /// World position `dx` steps right and `dy` steps down from `pos`.
    #[inline]
    #[must_use]
    pub const fn step(self, pos: BlockPos, dx: i32, dy: i32) -> BlockPos {
        pos.offset(self.right(), dx).offset(self.down(), dy)
    }
}

impl TryFrom<u8> for Rotation {
    type Error = MonitorError;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        let mount = match raw / 6 {
            0 => Mount::Wall,
            1 => Mount::FrontDown,
            2 => Mount::FrontUp,
            _ => return Err(MonitorError::InvalidRotation(raw)),
        };
        match Facing::from_index(raw % 6) {
            Some(facing) if facing.is_horizontal() => Ok(Self { mount, facing }),
            _ => Err(MonitorError::InvalidRotation(raw)),
        }
    }
}

impl From<Rotation> for u8 {
    fn from(rotation: Rotation) -> Self {
        rotation.raw()
    }
}

impl Default for Rotation {
    fn default() -> Self {
        Self::NORTH
    }
}

impl fmt::Debug for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rotation({})", self.raw())
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (right {}, down {}, front {})",
            self.raw(),
            self.right(),
            self.down(),
            self.front()
        )
    }
}

// ---------------------------------------------------------------------------
// Aabb
// ---------------------------------------------------------------------------

/// An axis-aligned box of whole blocks; `max` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Aabb {
    pub min: BlockPos,
    pub max: BlockPos,
}

impl Aabb {
    /// The single block at `pos`.
    #[must_use]
    pub const fn unit(pos: BlockPos) -> Self {
        Self {
            min: pos,
            max: BlockPos::new(pos.x + 1, pos.y + 1, pos.z + 1),
        }
    }

    /// The smallest box containing both blocks.
    #[must_use]
    pub fn spanning(a: BlockPos, b: BlockPos) -> Self {
        Self {
            min: BlockPos::new(a.x.min(b.x), a.y.min(b.y), a.z.min(b.z)),
            max: BlockPos::new(a.x.max(b.x) + 1, a.y.max(b.y) + 1, a.z.max(b.z) + 1),
        }
    }

    #[must_use]
    pub const fn contains(&self, pos: BlockPos) -> bool {
        pos.x >= self.min.x
            && pos.x < self.max.x
            && pos.y >= self.min.y
            && pos.y < self.max.y
            && pos.z >= self.min.z
            && pos.z < self.max.z
    }

    /// Number of blocks inside.
    #[must_use]
    pub const fn volume(&self) -> i64 {
        (self.max.x - self.min.x) as i64
            * (self.max.y - self.min.y) as i64
            * (self.max.z - self.min.z) as i64
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rot(raw: u8) -> Rotation {
        Rotation::try_from(raw).unwrap()
    }

    #[test]
    fn exactly_twelve_valid_rotations() {
        let raws: Vec<u8> = Rotation::all().map(Rotation::raw).collect();
        assert_eq!(raws, vec![2, 3, 4, 5, 8, 9, 10, 11, 14, 15, 16, 17]);
    }

    #[test]
    fn degenerate_rotations_are_rejected() {
        for raw in [0, 1, 6, 7, 12, 13, 18, 255] {
            assert!(Rotation::try_from(raw).is_err(), "raw {raw}");
        }
    }

    #[test]
    fn rotation_table() {
        use Facing::*;
        let table = [
            (2, West, Up, North),
            (3, East, Up, South),
            (4, South, Up, West),
            (5, North, Up, East),
            (8, West, North, Down),
            (9, East, South, Down),
            (10, South, West, Down),
            (11, North, East, Down),
            (14, West, South, Up),
            (15, East, North, Up),
            (16, South, East, Up),
            (17, North, West, Up),
        ];
        for (raw, right, down, front) in table {
            let r = rot(raw);
            assert_eq!((r.right(), r.down(), r.front()), (right, down, front), "raw {raw}");
        }
    }

    #[test]
    fn axes_are_orthogonal_and_decode_back() {
        for r in Rotation::all() {
            assert_eq!(r.right().dot(r.down()), 0);
            assert_eq!(r.right().dot(r.front()), 0);
            assert_eq!(r.down().dot(r.front()), 0);
            assert_eq!(Rotation::from_axes(r.right(), r.down(), r.front()), Some(r));
        }
    }

    #[test]
    fn from_axes_rejects_unknown_triples() {
        assert_eq!(Rotation::from_axes(Facing::Up, Facing::Up, Facing::Up), None);
    }

    #[test]
    fn step_walks_right_and_down() {
        let r = rot(2);
        let pos = BlockPos::new(10, 64, 3);
        assert_eq!(r.step(pos, 2, 1), BlockPos::new(8, 65, 3));
        assert_eq!(r.step(pos, -1, 0), BlockPos::new(11, 64, 3));
    }

    #[test]
    fn yaw_quadrants() {
        assert_eq!(Facing::from_yaw(0.0), Facing::South);
        assert_eq!(Facing::from_yaw(90.0), Facing::West);
        assert_eq!(Facing::from_yaw(-90.0), Facing::East);
        assert_eq!(Facing::from_yaw(180.0), Facing::North);
        assert_eq!(Facing::from_yaw(44.0), Facing::South);
        assert_eq!(Facing::from_yaw(46.0), Facing::West);
    }

    #[test]
    fn placement_faces_the_player() {
        // Player looking north at a wall: the screen faces south.
        let wall = Rotation::for_placement(180.0, 0.0);
        assert_eq!(wall.front(), Facing::South);
        assert_eq!(wall.raw(), 3);

        // Looking down at the floor while facing north: text reads upright,
        // so the top row is the far (north) edge and right is east.
        let floor = Rotation::for_placement(180.0, 80.0);
        assert_eq!(floor.front(), Facing::Up);
        assert_eq!(floor.right(), Facing::East);
        assert_eq!(floor.down(), Facing::North);

        let ceiling = Rotation::for_placement(180.0, -80.0);
        assert_eq!(ceiling.front(), Facing::Down);
        assert_eq!(ceiling.right(), Facing::East);
    }

    #[test]
    fn rotation_serializes_as_raw_integer() {
        let json = serde_json::to_string(&rot(16)).unwrap();
        assert_eq!(json, "16");
        assert!(serde_json::from_str::<Rotation>("6").is_err());
    }

    #[test]
    fn chunk_of_negative_positions() {
        assert_eq!(BlockPos::new(-1, 0, 15).chunk(), ChunkPos::new(-1, 0));
        assert_eq!(BlockPos::new(16, 0, -16).chunk(), ChunkPos::new(1, -1));
    }

    #[test]
    fn aabb_spanning_is_order_independent() {
        let a = BlockPos::new(3, 1, 0);
        let b = BlockPos::new(1, 2, 0);
        let bounds = Aabb::spanning(a, b);
        assert_eq!(bounds, Aabb::spanning(b, a));
        assert_eq!(bounds.volume(), 6);
        assert!(bounds.contains(BlockPos::new(2, 2, 0)));
        assert!(!bounds.contains(BlockPos::new(4, 1, 0)));
    }
}
