// src/lib.rs
//! Voxel Map Library
//!
//! Top-down maps of voxel worlds: a column rasterizer, a binary tile format,
//! an asynchronously loaded and disk-persisted tile cache, and the minimap and
//! world map views that draw from it.

pub mod config;
pub mod display;
pub mod error;
pub mod map;
pub mod waypoint;
pub mod world;

// Re-export main types for convenience
pub use config::{CacheOptions, CaveAccess, MapConfig, MinimapOptions};
pub use display::{Minimap, ViewerState, WorldMapView};
pub use error::{MapError, Result};
pub use map::{TileCache, TileCoordinate, TileStatus, TileStore};
pub use waypoint::{Waypoint, WaypointList};
pub use world::{BlockRegistry, ChunkSnapshot, ChunkSource};
