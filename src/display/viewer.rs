// src/display/viewer.rs
//! The viewer the maps follow, and whether they stand under open sky

use crate::world::{BlockRegistry, ChunkPos, ChunkSource};

#[derive(Debug, Clone, PartialEq)]
pub struct ViewerState {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Degrees, 0 facing south (+z), growing clockwise seen from above.
    pub yaw: f32,
    pub dimension: String,
}

impl ViewerState {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            dimension: "overworld".to_string(),
        }
    }

    pub fn block_x(&self) -> i32 {
        self.x.floor() as i32
    }

    pub fn block_y(&self) -> i32 {
        self.y.floor() as i32
    }

    pub fn block_z(&self) -> i32 {
        self.z.floor() as i32
    }

    /// Heading used to rotate the arrow and non-north-locked maps, in radians.
    pub fn heading(&self) -> f64 {
        (self.yaw as f64 + 180.0).to_radians()
    }
}

/// Decide whether the maps should draw the surface for this viewer or slice at their height.
///
/// Without cave access it is always the surface. In ceiling dimensions the
/// viewer's Y must reach the logical height itself, whatever the floor of the
/// world. Elsewhere the viewer is at the surface when standing on or above it,
/// or when at most two opaque blocks lie overhead.
pub fn detect_surface(
    viewer: &ViewerState,
    world: &dyn ChunkSource,
    registry: &BlockRegistry,
    caves_allowed: bool,
) -> bool {
    if !caves_allowed {
        return true;
    }
    let bounds = world.bounds();
    let (x, y, z) = (viewer.block_x(), viewer.block_y(), viewer.block_z());
    if bounds.has_ceiling {
        return y >= bounds.logical_height;
    }

    let Some(chunk) = world.chunk(ChunkPos::containing(x, z)) else {
        return true;
    };
    let mut surface = chunk.surface_height(x, z);
    if surface + 1 <= y {
        return true;
    }

    let mut solid_above = 0;
    while solid_above <= 3 && surface > y && surface > bounds.min_y {
        if registry.info(chunk.block(x, surface, z)).opaque {
            solid_above += 1;
        }
        surface -= 1;
    }
    solid_above <= 2
}
