// src/world/synthetic.rs
//! Noise-driven demo world used by the command line tool

use super::block::{BlockRegistry, BlockState};
use super::chunk::ChunkSnapshot;
use super::{ChunkPos, ChunkSource, UnloadHook, WorldBounds, CHUNK_WIDTH};
use noise::{NoiseFn, Perlin};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

const SEA_LEVEL: i32 = 62;
const SNOW_LINE: i32 = 100;

struct Palette {
    stone: BlockState,
    dirt: BlockState,
    grass: BlockState,
    sand: BlockState,
    snow: BlockState,
    water: BlockState,
    bedrock: BlockState,
}

/// Rolling terrain with oceans and carved caves. Only chunks within `loaded_radius`
/// of `center` count as loaded, the way a game keeps a render distance around the player.
pub struct SyntheticWorld {
    bounds: WorldBounds,
    registry: Arc<BlockRegistry>,
    terrain: Perlin,
    detail: Perlin,
    caves: Perlin,
    center: RwLock<ChunkPos>,
    loaded_radius: i32,
    generated: RwLock<HashMap<ChunkPos, Arc<ChunkSnapshot>>>,
    on_unload: Option<UnloadHook>,
}

impl SyntheticWorld {
    pub fn new(seed: u32, registry: Arc<BlockRegistry>, loaded_radius: i32) -> Self {
        Self {
            bounds: WorldBounds::overworld(),
            registry,
            terrain: Perlin::new(seed),
            detail: Perlin::new(seed.wrapping_add(1)),
            caves: Perlin::new(seed.wrapping_add(2)),
            center: RwLock::new(ChunkPos::new(0, 0)),
            loaded_radius,
            generated: RwLock::new(HashMap::new()),
            on_unload: None,
        }
    }

    pub fn with_unload_hook(mut self, hook: UnloadHook) -> Self {
        self.on_unload = Some(hook);
        self
    }

    fn in_range(&self, center: ChunkPos, pos: ChunkPos) -> bool {
        (pos.x - center.x).abs() <= self.loaded_radius && (pos.z - center.z).abs() <= self.loaded_radius
    }

    /// Move the loaded area, e.g. when the viewer walks. Generated chunks that
    /// fall out of range are dropped and passed to the unload hook.
    pub fn set_center(&self, center: ChunkPos) {
        *self.center.write().unwrap() = center;
        let dropped: Vec<Arc<ChunkSnapshot>> = {
            let mut generated = self.generated.write().unwrap();
            let gone: Vec<ChunkPos> = generated.keys().copied().filter(|pos| !self.in_range(center, *pos)).collect();
            gone.iter().filter_map(|pos| generated.remove(pos)).collect()
        };
        if dropped.is_empty() {
            return;
        }
        log::debug!("Unloaded {} chunks around {:?}", dropped.len(), center);
        if let Some(hook) = &self.on_unload {
            for chunk in &dropped {
                hook(chunk.as_ref());
            }
        }
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    /// Terrain height (top solid block) at a block column.
    pub fn terrain_height(&self, x: i32, z: i32) -> i32 {
        let (fx, fz) = (x as f64, z as f64);
        let broad = self.terrain.get([fx / 96.0, fz / 96.0]);
        let fine = self.detail.get([fx / 24.0, fz / 24.0]);
        (64.0 + broad * 28.0 + fine * 5.0).round() as i32
    }

    fn is_cave(&self, x: i32, y: i32, z: i32) -> bool {
        self.caves.get([x as f64 / 20.0, y as f64 / 12.0, z as f64 / 20.0]) > 0.45
    }

    fn palette(&self) -> Option<Palette> {
        let r = &self.registry;
        Some(Palette {
            stone: r.state("stone")?,
            dirt: r.state("dirt")?,
            grass: r.state("grass_block")?,
            sand: r.state("sand")?,
            snow: r.state("snow_block")?,
            water: r.state("water")?,
            bedrock: r.state("bedrock")?,
        })
    }

    fn generate(&self, pos: ChunkPos) -> ChunkSnapshot {
        let mut chunk = ChunkSnapshot::new(pos, self.bounds);
        let Some(p) = self.palette() else {
            log::warn!("Block registry lacks terrain blocks, generating empty chunk {:?}", pos);
            return chunk;
        };
        let registry = &self.registry;
        let min_y = self.bounds.min_y;

        for lx in 0..CHUNK_WIDTH as i32 {
            for lz in 0..CHUNK_WIDTH as i32 {
                let x = pos.min_block_x() + lx;
                let z = pos.min_block_z() + lz;
                let top = self.terrain_height(x, z);

                chunk.set_block(x, min_y, z, p.bedrock, registry);
                for y in (min_y + 1)..=top {
                    let state = if y == top {
                        if top <= SEA_LEVEL + 1 {
                            p.sand
                        } else if top >= SNOW_LINE {
                            p.snow
                        } else {
                            p.grass
                        }
                    } else if y >= top - 3 {
                        if top <= SEA_LEVEL + 1 { p.sand } else { p.dirt }
                    } else {
                        p.stone
                    };
                    let carved = y > min_y + 4 && y < top - 6 && self.is_cave(x, y, z);
                    if !carved {
                        chunk.set_block(x, y, z, state, registry);
                    }
                }
                for y in (top + 1)..=SEA_LEVEL {
                    chunk.set_block(x, y, z, p.water, registry);
                }
            }
        }

        chunk.prime_client_heightmaps(registry);
        chunk
    }
}

impl ChunkSource for SyntheticWorld {
    fn bounds(&self) -> WorldBounds {
        self.bounds
    }

    fn chunk(&self, pos: ChunkPos) -> Option<Arc<ChunkSnapshot>> {
        if !self.is_loaded(pos) {
            return None;
        }
        if let Some(chunk) = self.generated.read().unwrap().get(&pos) {
            return Some(Arc::clone(chunk));
        }
        let chunk = Arc::new(self.generate(pos));
        let mut generated = self.generated.write().unwrap();
        Some(Arc::clone(generated.entry(pos).or_insert(chunk)))
    }

    fn is_loaded(&self, pos: ChunkPos) -> bool {
        self.in_range(*self.center.read().unwrap(), pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let registry = Arc::new(BlockRegistry::standard());
        let a = SyntheticWorld::new(7, Arc::clone(&registry), 2);
        let b = SyntheticWorld::new(7, registry, 2);
        let pos = ChunkPos::new(1, -1);
        assert_eq!(a.chunk(pos).unwrap().as_ref(), b.chunk(pos).unwrap().as_ref());
    }

    #[test]
    fn test_loaded_radius() {
        let world = SyntheticWorld::new(1, Arc::new(BlockRegistry::standard()), 1);
        assert!(world.chunk(ChunkPos::new(1, 1)).is_some());
        assert!(world.chunk(ChunkPos::new(2, 0)).is_none());
        world.set_center(ChunkPos::new(2, 0));
        assert!(world.is_loaded(ChunkPos::new(3, 0)));
    }

    #[test]
    fn test_surface_matches_terrain() {
        let world = SyntheticWorld::new(3, Arc::new(BlockRegistry::standard()), 0);
        let chunk = world.chunk(ChunkPos::new(0, 0)).unwrap();
        let top = world.terrain_height(5, 9);
        assert_eq!(chunk.surface_height(5, 9), top.max(SEA_LEVEL));
    }
}
