// src/world/mod.rs
//! Voxel world model consumed by the map: chunk snapshots, blocks and the chunk provider seam

pub mod block;
pub mod chunk;
pub mod color;
pub mod palette;
pub mod synthetic;

pub use block::{BlockInfo, BlockRegistry, BlockState, FluidKind};
pub use chunk::{ChunkSection, ChunkSnapshot, Heightmap, HeightmapKind};
pub use color::{Brightness, MapColor, NO_DATA};
pub use synthetic::SyntheticWorld;

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Blocks along each horizontal edge of a chunk.
pub const CHUNK_WIDTH: usize = 16;
/// Blocks along the vertical edge of a chunk section.
pub const SECTION_HEIGHT: usize = 16;

/// Chunk column address on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkPos {
    pub x: i32,
    pub z: i32,
}

impl ChunkPos {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing the given block coordinates.
    pub fn containing(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_x.div_euclid(CHUNK_WIDTH as i32),
            z: block_z.div_euclid(CHUNK_WIDTH as i32),
        }
    }

    pub fn min_block_x(self) -> i32 {
        self.x * CHUNK_WIDTH as i32
    }

    pub fn min_block_z(self) -> i32 {
        self.z * CHUNK_WIDTH as i32
    }
}

/// Vertical extent and ceiling information of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorldBounds {
    pub min_y: i32,
    pub height: i32,
    /// Height players can normally reach; below the roof in ceiling dimensions.
    pub logical_height: i32,
    pub has_ceiling: bool,
}

impl WorldBounds {
    pub fn overworld() -> Self {
        Self {
            min_y: -64,
            height: 384,
            logical_height: 384,
            has_ceiling: false,
        }
    }

    pub fn nether() -> Self {
        Self {
            min_y: 0,
            height: 256,
            logical_height: 128,
            has_ceiling: true,
        }
    }

    pub fn max_y(&self) -> i32 {
        self.min_y + self.height - 1
    }

    pub fn section_count(&self) -> usize {
        (self.height as usize).div_ceil(SECTION_HEIGHT)
    }
}

/// Called with every chunk a world drops, before it is gone.
pub type UnloadHook = Box<dyn Fn(&ChunkSnapshot) + Send + Sync>;

/// Supplies chunk snapshots for the map. Lookups may block; the tile cache only
/// calls [`chunk`](ChunkSource::chunk) from worker threads.
pub trait ChunkSource: Send + Sync {
    fn bounds(&self) -> WorldBounds;

    /// Snapshot of a loaded, fully generated chunk, or `None` when it is not available.
    fn chunk(&self, pos: ChunkPos) -> Option<Arc<ChunkSnapshot>>;

    /// Cheap availability check used while walking neighbours.
    fn is_loaded(&self, pos: ChunkPos) -> bool {
        self.chunk(pos).is_some()
    }
}

/// In-memory world: whatever chunks were inserted are "loaded".
pub struct MemoryWorld {
    bounds: WorldBounds,
    chunks: RwLock<HashMap<ChunkPos, Arc<ChunkSnapshot>>>,
    on_unload: Option<UnloadHook>,
}

impl MemoryWorld {
    pub fn new(bounds: WorldBounds) -> Self {
        Self {
            bounds,
            chunks: RwLock::new(HashMap::new()),
            on_unload: None,
        }
    }

    pub fn with_unload_hook(mut self, hook: UnloadHook) -> Self {
        self.on_unload = Some(hook);
        self
    }

    pub fn insert(&self, chunk: ChunkSnapshot) {
        let pos = chunk.pos();
        self.chunks.write().unwrap().insert(pos, Arc::new(chunk));
    }

    /// Remove a chunk, handing it to the unload hook first.
    pub fn unload(&self, pos: ChunkPos) -> Option<Arc<ChunkSnapshot>> {
        let chunk = self.chunks.write().unwrap().remove(&pos)?;
        if let Some(hook) = &self.on_unload {
            hook(chunk.as_ref());
        }
        Some(chunk)
    }

    pub fn len(&self) -> usize {
        self.chunks.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChunkSource for MemoryWorld {
    fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    fn chunk(&self, pos: ChunkPos) -> Option<Arc<ChunkSnapshot>> {
        self.chunks.read().unwrap().get(&pos).cloned()
    }

    fn is_loaded(&self, pos: ChunkPos) -> bool {
        self.chunks.read().unwrap().contains_key(&pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_containing_negative_blocks() {
        assert_eq!(ChunkPos::containing(-1, -16), ChunkPos::new(-1, -1));
        assert_eq!(ChunkPos::containing(-17, 15), ChunkPos::new(-2, 0));
        assert_eq!(ChunkPos::containing(16, 0), ChunkPos::new(1, 0));
    }

    #[test]
    fn test_bounds() {
        let overworld = WorldBounds::overworld();
        assert_eq!(overworld.max_y(), 319);
        assert_eq!(overworld.section_count(), 24);
        assert_eq!(WorldBounds::nether().section_count(), 16);
    }

    #[test]
    fn test_memory_world() {
        let world = MemoryWorld::new(WorldBounds::overworld());
        let pos = ChunkPos::new(3, -2);
        assert!(!world.is_loaded(pos));
        world.insert(ChunkSnapshot::new(pos, WorldBounds::overworld()));
        assert!(world.is_loaded(pos));
        assert_eq!(world.chunk(pos).unwrap().pos(), pos);
        assert!(world.unload(pos).is_some());
        assert!(world.is_empty());
    }

    #[test]
    fn test_unload_hook_sees_dropped_chunk() {
        use std::sync::Mutex;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let world = MemoryWorld::new(WorldBounds::overworld())
            .with_unload_hook(Box::new(move |chunk: &ChunkSnapshot| sink.lock().unwrap().push(chunk.pos())));
        world.insert(ChunkSnapshot::new(ChunkPos::new(1, 1), WorldBounds::overworld()));

        assert!(world.unload(ChunkPos::new(2, 2)).is_none());
        world.unload(ChunkPos::new(1, 1));
        assert_eq!(*seen.lock().unwrap(), vec![ChunkPos::new(1, 1)]);
    }
}
