//! Basic type definitions for the relay
//!
//! Provides the core value types shared across modules:
//! - `SessionId`: UUID-based identifier for one live connection
//! - `DisplayColor`: HSL color string with a random generator
//! - `Vec3` / `CameraPose` / `CursorState`: 3D payload shapes

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique session identifier (newtype pattern)
///
/// Assigned at connection-accept time. Unique among currently-open
/// connections; not guaranteed unique over all time.
/// Implements Hash and Eq for use as HashMap keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display color assigned to a session
///
/// Stored and sent over the wire as an `hsl(H, S%, L%)` string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayColor(pub String);

impl DisplayColor {
    /// Generate a random color for a newly connected session
    ///
    /// Hue is uniform over [0, 360), saturation over [70, 100] and
    /// lightness over [50, 70], so every assigned color stays bright and
    /// saturated. Collisions between sessions are acceptable and not checked.
    pub fn random() -> Self {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let hue = rng.gen_range(0..360);
        let saturation = rng.gen_range(70..=100);
        let lightness = rng.gen_range(50..=70);
        Self(format!("hsl({}, {}%, {}%)", hue, saturation, lightness))
    }

    /// Create a DisplayColor from a client-supplied string
    pub fn from_string(color: String) -> Self {
        Self(color)
    }
}

impl std::fmt::Display for DisplayColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 3D vector as sent on the wire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Camera pose relayed between clients
///
/// Per-viewer state mirrored for presence; the relay never stores it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraPose {
    pub position: Vec3,
    pub target: Vec3,
}

/// Last known pointer state for a session
///
/// Kept only so the roster replay can show a late joiner where existing
/// cursors are.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorState {
    pub position: Vec3,
    pub normal: Vec3,
}
