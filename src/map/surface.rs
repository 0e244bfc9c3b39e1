// src/map/surface.rs
//! Drawable surfaces that tile pixels are published to

use super::coords::TileCoordinate;
use super::raster::PixelBuffer;
use std::collections::HashMap;

/// Opaque handle of a published surface (a texture in a real renderer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Render-thread side of tile drawing. Only ever called from the thread that
/// pumps the tile cache.
pub trait DrawSurface {
    /// Create a surface holding `pixels`.
    fn publish(&mut self, coord: TileCoordinate, pixels: &PixelBuffer) -> SurfaceHandle;

    /// Replace the contents of an existing surface.
    fn upload(&mut self, handle: SurfaceHandle, pixels: &PixelBuffer);

    fn release(&mut self, handle: SurfaceHandle);
}

/// Surfaces kept in memory; used for CPU compositing and in tests.
#[derive(Debug, Default)]
pub struct MemorySurface {
    next_id: u64,
    textures: HashMap<SurfaceHandle, (TileCoordinate, PixelBuffer)>,
    pub publishes: usize,
    pub uploads: usize,
    pub releases: usize,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn texture(&self, handle: SurfaceHandle) -> Option<&PixelBuffer> {
        self.textures.get(&handle).map(|(_, pixels)| pixels)
    }

    pub fn coordinate(&self, handle: SurfaceHandle) -> Option<TileCoordinate> {
        self.textures.get(&handle).map(|(coord, _)| *coord)
    }

    /// Surfaces currently alive.
    pub fn live(&self) -> usize {
        self.textures.len()
    }
}

impl DrawSurface for MemorySurface {
    fn publish(&mut self, coord: TileCoordinate, pixels: &PixelBuffer) -> SurfaceHandle {
        self.next_id += 1;
        let handle = SurfaceHandle(self.next_id);
        self.textures.insert(handle, (coord, pixels.clone()));
        self.publishes += 1;
        handle
    }

    fn upload(&mut self, handle: SurfaceHandle, pixels: &PixelBuffer) {
        if let Some((_, texture)) = self.textures.get_mut(&handle) {
            texture.clone_from(pixels);
            self.uploads += 1;
        } else {
            log::warn!("Upload to released surface {:?}", handle);
        }
    }

    fn release(&mut self, handle: SurfaceHandle) {
        if self.textures.remove(&handle).is_some() {
            self.releases += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_upload_release() {
        let mut surface = MemorySurface::new();
        let coord = TileCoordinate::new(0, 0);
        let mut pixels = PixelBuffer::new(16, 16);
        let handle = surface.publish(coord, &pixels);
        assert_eq!(surface.coordinate(handle), Some(coord));

        pixels.set(1, 1, 0xFF123456);
        surface.upload(handle, &pixels);
        assert_eq!(surface.texture(handle).unwrap().get(1, 1), 0xFF123456);

        surface.release(handle);
        surface.release(handle);
        assert_eq!(surface.live(), 0);
        assert_eq!((surface.publishes, surface.uploads, surface.releases), (1, 1, 1));
    }
}
