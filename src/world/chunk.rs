// src/world/chunk.rs
//! Read-mostly snapshot of one chunk column: sections, biomes and heightmaps

use super::block::{BlockRegistry, BlockState};
use super::palette::{ceil_log2, BitStorage, ContainerKind, PalettedContainer};
use super::{ChunkPos, WorldBounds, CHUNK_WIDTH, SECTION_HEIGHT};
use std::collections::BTreeMap;

/// Heightmap flavours a chunk can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HeightmapKind {
    WorldSurfaceWg,
    WorldSurface,
    OceanFloorWg,
    OceanFloor,
    MotionBlocking,
    MotionBlockingNoLeaves,
}

impl HeightmapKind {
    pub const ALL: [HeightmapKind; 6] = [
        HeightmapKind::WorldSurfaceWg,
        HeightmapKind::WorldSurface,
        HeightmapKind::OceanFloorWg,
        HeightmapKind::OceanFloor,
        HeightmapKind::MotionBlocking,
        HeightmapKind::MotionBlockingNoLeaves,
    ];

    pub fn id(self) -> u32 {
        self as u32
    }

    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Kinds a remote viewer needs; the rest only matter during world generation.
    pub fn sent_to_client(self) -> bool {
        matches!(
            self,
            HeightmapKind::WorldSurface | HeightmapKind::MotionBlocking | HeightmapKind::MotionBlockingNoLeaves
        )
    }

    fn is_opaque(self, registry: &BlockRegistry, state: BlockState) -> bool {
        let info = registry.info(state);
        match self {
            HeightmapKind::WorldSurfaceWg | HeightmapKind::WorldSurface => !info.air,
            HeightmapKind::OceanFloorWg | HeightmapKind::OceanFloor => info.motion_blocking && info.fluid.is_none(),
            HeightmapKind::MotionBlocking => info.motion_blocking || info.fluid.is_some(),
            HeightmapKind::MotionBlockingNoLeaves => {
                (info.motion_blocking || info.fluid.is_some()) && !info.leaves
            }
        }
    }
}

/// Per-column "first free Y above the highest matching block", stored relative to the world floor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Heightmap {
    storage: BitStorage,
}

impl Heightmap {
    pub fn new(bounds: &WorldBounds) -> Self {
        Self {
            storage: BitStorage::new(Self::bits(bounds), CHUNK_WIDTH * CHUNK_WIDTH),
        }
    }

    pub fn bits(bounds: &WorldBounds) -> u8 {
        ceil_log2(bounds.height as u32 + 1)
    }

    pub fn from_storage(storage: BitStorage) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &BitStorage {
        &self.storage
    }

    fn index(x: usize, z: usize) -> usize {
        x + z * CHUNK_WIDTH
    }

    pub fn first_available(&self, x: usize, z: usize, min_y: i32) -> i32 {
        self.storage.get(Self::index(x, z)) as i32 + min_y
    }

    pub fn set_first_available(&mut self, x: usize, z: usize, y: i32, min_y: i32) {
        self.storage.set(Self::index(x, z), (y - min_y).max(0) as u32);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSection {
    non_empty: u16,
    states: PalettedContainer,
    biomes: PalettedContainer,
}

impl ChunkSection {
    pub fn new() -> Self {
        Self {
            non_empty: 0,
            states: PalettedContainer::filled(ContainerKind::BlockStates, BlockState::AIR.id()),
            biomes: PalettedContainer::filled(ContainerKind::Biomes, 0),
        }
    }

    pub fn from_parts(non_empty: u16, states: PalettedContainer, biomes: PalettedContainer) -> Self {
        Self { non_empty, states, biomes }
    }

    pub fn states(&self) -> &PalettedContainer {
        &self.states
    }

    pub fn biomes(&self) -> &PalettedContainer {
        &self.biomes
    }

    pub fn non_empty_count(&self) -> u16 {
        self.non_empty
    }

    pub fn has_only_air(&self) -> bool {
        self.non_empty == 0
    }

    fn index(x: usize, y: usize, z: usize) -> usize {
        (y << 8) | (z << 4) | x
    }

    pub fn block(&self, x: usize, y: usize, z: usize) -> BlockState {
        BlockState(self.states.get(Self::index(x, y, z)))
    }

    pub fn set_block(&mut self, x: usize, y: usize, z: usize, state: BlockState, registry: &BlockRegistry) {
        let index = Self::index(x, y, z);
        let previous = BlockState(self.states.get(index));
        if previous == state {
            return;
        }
        if !registry.is_air(previous) {
            self.non_empty -= 1;
        }
        if !registry.is_air(state) {
            self.non_empty += 1;
        }
        self.states.set(index, state.id());
    }

    pub fn biome(&self, x: usize, y: usize, z: usize) -> u32 {
        self.biomes.get(((y >> 2) << 4) | ((z >> 2) << 2) | (x >> 2))
    }

    pub fn set_biome(&mut self, x: usize, y: usize, z: usize, biome: u32) {
        self.biomes.set(((y >> 2) << 4) | ((z >> 2) << 2) | (x >> 2), biome);
    }

    /// Recompute the cached non-air count from the block data.
    pub fn recalc_counts(&mut self, registry: &BlockRegistry) {
        self.non_empty = self.states.count_matching(|id| !registry.is_air(BlockState(id))) as u16;
    }
}

impl Default for ChunkSection {
    fn default() -> Self {
        Self::new()
    }
}

/// One chunk column as seen by the map. Placeholder snapshots stand in for chunks
/// that are not generated (or tile files from an incompatible world) and draw as no data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSnapshot {
    pos: ChunkPos,
    bounds: WorldBounds,
    sections: Vec<ChunkSection>,
    heightmaps: BTreeMap<HeightmapKind, Heightmap>,
    placeholder: bool,
}

impl ChunkSnapshot {
    /// An all-air chunk ready to be filled.
    pub fn new(pos: ChunkPos, bounds: WorldBounds) -> Self {
        let mut heightmaps = BTreeMap::new();
        for kind in HeightmapKind::ALL.into_iter().filter(|k| k.sent_to_client()) {
            heightmaps.insert(kind, Heightmap::new(&bounds));
        }
        Self {
            pos,
            sections: (0..bounds.section_count()).map(|_| ChunkSection::new()).collect(),
            bounds,
            heightmaps,
            placeholder: false,
        }
    }

    /// A chunk with no usable data.
    pub fn placeholder(pos: ChunkPos, bounds: WorldBounds) -> Self {
        Self {
            placeholder: true,
            ..Self::new(pos, bounds)
        }
    }

    /// Assemble a decoded chunk; heightmaps not present are primed from the blocks.
    pub fn from_parts(
        pos: ChunkPos,
        bounds: WorldBounds,
        sections: Vec<ChunkSection>,
        heightmaps: BTreeMap<HeightmapKind, Heightmap>,
        registry: &BlockRegistry,
    ) -> Self {
        let mut chunk = Self {
            pos,
            bounds,
            sections,
            heightmaps,
            placeholder: false,
        };
        for section in &mut chunk.sections {
            section.recalc_counts(registry);
        }
        let missing: Vec<HeightmapKind> = HeightmapKind::ALL
            .into_iter()
            .filter(|k| k.sent_to_client() && !chunk.heightmaps.contains_key(k))
            .collect();
        chunk.prime_heightmaps(registry, &missing);
        chunk
    }

    pub fn pos(&self) -> ChunkPos {
        self.pos
    }

    pub fn bounds(&self) -> &WorldBounds {
        &self.bounds
    }

    pub fn min_y(&self) -> i32 {
        self.bounds.min_y
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn sections(&self) -> &[ChunkSection] {
        &self.sections
    }

    pub fn heightmaps(&self) -> &BTreeMap<HeightmapKind, Heightmap> {
        &self.heightmaps
    }

    /// True when no section holds anything but air.
    pub fn is_blank(&self) -> bool {
        self.sections.iter().all(ChunkSection::has_only_air)
    }

    fn section_index(&self, y: i32) -> Option<usize> {
        if y < self.bounds.min_y {
            return None;
        }
        let index = ((y - self.bounds.min_y) / SECTION_HEIGHT as i32) as usize;
        (index < self.sections.len()).then_some(index)
    }

    /// Block at world coordinates; x and z are taken modulo the chunk width.
    pub fn block(&self, x: i32, y: i32, z: i32) -> BlockState {
        match self.section_index(y) {
            Some(index) => {
                let ly = ((y - self.bounds.min_y) as usize) % SECTION_HEIGHT;
                self.sections[index].block(local(x), ly, local(z))
            }
            None => BlockState::AIR,
        }
    }

    pub fn biome(&self, x: i32, y: i32, z: i32) -> u32 {
        let y = y.clamp(self.bounds.min_y, self.bounds.max_y());
        match self.section_index(y) {
            Some(index) => {
                let ly = ((y - self.bounds.min_y) as usize) % SECTION_HEIGHT;
                self.sections[index].biome(local(x), ly, local(z))
            }
            None => 0,
        }
    }

    /// Set a block. Heightmaps are not touched; call [`prime_heightmaps`](Self::prime_heightmaps) after bulk edits.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, state: BlockState, registry: &BlockRegistry) {
        if let Some(index) = self.section_index(y) {
            let ly = ((y - self.bounds.min_y) as usize) % SECTION_HEIGHT;
            self.sections[index].set_block(local(x), ly, local(z), state, registry);
        }
    }

    pub fn set_biome(&mut self, x: i32, y: i32, z: i32, biome: u32) {
        if let Some(index) = self.section_index(y) {
            let ly = ((y - self.bounds.min_y) as usize) % SECTION_HEIGHT;
            self.sections[index].set_biome(local(x), ly, local(z), biome);
        }
    }

    /// Y of the highest non-air block in the column, or `min_y - 1` for an empty column.
    pub fn surface_height(&self, x: i32, z: i32) -> i32 {
        self.height(HeightmapKind::WorldSurface, x, z)
    }

    pub fn height(&self, kind: HeightmapKind, x: i32, z: i32) -> i32 {
        match self.heightmaps.get(&kind) {
            Some(map) => map.first_available(local(x), local(z), self.bounds.min_y) - 1,
            None => self.bounds.min_y - 1,
        }
    }

    /// Recompute the given heightmap kinds by scanning each column downwards.
    pub fn prime_heightmaps(&mut self, registry: &BlockRegistry, kinds: &[HeightmapKind]) {
        if kinds.is_empty() {
            return;
        }
        let min_y = self.bounds.min_y;
        let mut maps: Vec<(HeightmapKind, Heightmap)> =
            kinds.iter().map(|&k| (k, Heightmap::new(&self.bounds))).collect();

        for z in 0..CHUNK_WIDTH {
            for x in 0..CHUNK_WIDTH {
                let mut pending = maps.len();
                let mut done = vec![false; maps.len()];
                let mut y = self.bounds.max_y();
                while pending > 0 && y >= min_y {
                    let state = self.block(x as i32, y, z as i32);
                    for (i, (kind, map)) in maps.iter_mut().enumerate() {
                        if !done[i] && kind.is_opaque(registry, state) {
                            map.set_first_available(x, z, y + 1, min_y);
                            done[i] = true;
                            pending -= 1;
                        }
                    }
                    y -= 1;
                }
            }
        }

        for (kind, map) in maps {
            self.heightmaps.insert(kind, map);
        }
    }

    /// Prime every heightmap kind a viewer needs.
    pub fn prime_client_heightmaps(&mut self, registry: &BlockRegistry) {
        let kinds: Vec<HeightmapKind> =
            HeightmapKind::ALL.into_iter().filter(|k| k.sent_to_client()).collect();
        self.prime_heightmaps(registry, &kinds);
    }
}

fn local(coord: i32) -> usize {
    (coord & (CHUNK_WIDTH as i32 - 1)) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stone_floor(registry: &BlockRegistry, top: i32) -> ChunkSnapshot {
        let bounds = WorldBounds::overworld();
        let stone = registry.state("stone").unwrap();
        let mut chunk = ChunkSnapshot::new(ChunkPos::new(0, 0), bounds);
        for x in 0..16 {
            for z in 0..16 {
                for y in bounds.min_y..=top {
                    chunk.set_block(x, y, z, stone, registry);
                }
            }
        }
        chunk.prime_client_heightmaps(registry);
        chunk
    }

    #[test]
    fn test_surface_height_after_priming() {
        let registry = BlockRegistry::standard();
        let chunk = stone_floor(&registry, 64);
        assert_eq!(chunk.surface_height(0, 0), 64);
        assert_eq!(chunk.surface_height(15, 15), 64);
        // world coordinates wrap into the chunk
        assert_eq!(chunk.surface_height(-1, 17), 64);
    }

    #[test]
    fn test_empty_column_height() {
        let chunk = ChunkSnapshot::new(ChunkPos::new(2, 3), WorldBounds::overworld());
        assert_eq!(chunk.surface_height(4, 4), -65);
        assert!(chunk.is_blank());
    }

    #[test]
    fn test_block_outside_world_is_air() {
        let registry = BlockRegistry::standard();
        let chunk = stone_floor(&registry, 10);
        assert_eq!(chunk.block(0, -65, 0), BlockState::AIR);
        assert_eq!(chunk.block(0, 320, 0), BlockState::AIR);
        assert_eq!(chunk.block(0, -64, 0), registry.state("stone").unwrap());
    }

    #[test]
    fn test_non_empty_counts_track_edits() {
        let registry = BlockRegistry::standard();
        let dirt = registry.state("dirt").unwrap();
        let mut chunk = ChunkSnapshot::new(ChunkPos::new(0, 0), WorldBounds::overworld());
        chunk.set_block(1, 0, 1, dirt, &registry);
        chunk.set_block(2, 0, 1, dirt, &registry);
        chunk.set_block(2, 0, 1, BlockState::AIR, &registry);
        let section = &chunk.sections()[4];
        assert_eq!(section.non_empty_count(), 1);
    }

    #[test]
    fn test_leaves_excluded_from_no_leaves_heightmap() {
        let registry = BlockRegistry::standard();
        let leaves = registry.state("oak_leaves").unwrap();
        let mut chunk = stone_floor(&registry, 60);
        chunk.set_block(3, 70, 3, leaves, &registry);
        chunk.prime_client_heightmaps(&registry);
        assert_eq!(chunk.height(HeightmapKind::MotionBlocking, 3, 3), 70);
        assert_eq!(chunk.height(HeightmapKind::MotionBlockingNoLeaves, 3, 3), 60);
        assert_eq!(chunk.surface_height(3, 3), 70);
    }

    #[test]
    fn test_biomes() {
        let mut chunk = ChunkSnapshot::new(ChunkPos::new(0, 0), WorldBounds::overworld());
        chunk.set_biome(5, 10, 5, 7);
        assert_eq!(chunk.biome(4, 8, 7), 7);
        assert_eq!(chunk.biome(0, 8, 0), 0);
    }
}
