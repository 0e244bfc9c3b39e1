// src/display/mod.rs
//! Map views: the world map screen, the minimap and the draw lists they emit

pub mod draw;
pub mod minimap;
pub mod viewer;
pub mod world_map;

pub use draw::{composite, DrawCommand, DrawList};
pub use minimap::{Minimap, MINIMAP_SIZE};
pub use viewer::{detect_surface, ViewerState};
pub use world_map::{ContextTarget, WorldMapView};
