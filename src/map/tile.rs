// src/map/tile.rs
//! A rasterized tile and the chunk it was drawn from

use super::coords::{TileCoordinate, TILE_SIZE};
use super::raster::{rasterize_chunk, PixelBuffer, RasterParameters};
use super::surface::{DrawSurface, SurfaceHandle};
use crate::world::{BlockRegistry, ChunkSnapshot};
use std::sync::Arc;

pub struct Tile {
    coord: TileCoordinate,
    pixels: PixelBuffer,
    surface: Option<SurfaceHandle>,
    // kept so view changes can re-rasterize without fetching again
    chunk: Arc<ChunkSnapshot>,
}

impl Tile {
    pub fn new(coord: TileCoordinate, chunk: Arc<ChunkSnapshot>, pixels: PixelBuffer) -> Self {
        Self {
            coord,
            pixels,
            surface: None,
            chunk,
        }
    }

    /// Rasterize `chunk` into a fresh tile.
    pub fn rasterize(
        coord: TileCoordinate,
        chunk: Arc<ChunkSnapshot>,
        registry: &BlockRegistry,
        params: &RasterParameters,
    ) -> Self {
        let mut pixels = blank_pixels();
        rasterize_chunk(&chunk, registry, params, &mut pixels);
        Self::new(coord, chunk, pixels)
    }

    pub fn coord(&self) -> TileCoordinate {
        self.coord
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn chunk(&self) -> &Arc<ChunkSnapshot> {
        &self.chunk
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    /// Make the pixels drawable, creating the surface on first use.
    pub fn publish(&mut self, surface: &mut dyn DrawSurface) -> SurfaceHandle {
        match self.surface {
            Some(handle) => handle,
            None => {
                let handle = surface.publish(self.coord, &self.pixels);
                self.surface = Some(handle);
                handle
            }
        }
    }

    /// Swap in re-rasterized pixels, uploading them if a surface exists.
    pub fn replace_pixels(&mut self, pixels: PixelBuffer, surface: &mut dyn DrawSurface) {
        self.pixels = pixels;
        match self.surface {
            Some(handle) => surface.upload(handle, &self.pixels),
            None => {
                self.publish(surface);
            }
        }
    }

    pub fn release(&mut self, surface: &mut dyn DrawSurface) {
        if let Some(handle) = self.surface.take() {
            surface.release(handle);
        }
    }
}

pub fn blank_pixels() -> PixelBuffer {
    PixelBuffer::new(TILE_SIZE as usize, TILE_SIZE as usize)
}
