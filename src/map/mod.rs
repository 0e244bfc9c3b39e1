// src/map/mod.rs
//! Map tiles: rasterization, the binary tile format and the tile cache

pub mod codec;
pub mod coords;
pub mod raster;
pub mod store;
pub mod surface;
pub mod tile;
mod tile_cache;

pub use coords::{block_to_tile, TileCoordinate, TILE_SIZE};
pub use raster::{rasterize, rasterize_chunk, ColumnSource, PixelBuffer, RasterParameters, WorldWindow};
pub use store::TileStore;
pub use surface::{DrawSurface, MemorySurface, SurfaceHandle};
pub use tile::Tile;
pub use tile_cache::{
    build_runtime, CacheStats, LoadTicket, SaveReport, TileCache, TileSource, TileStatus,
};
