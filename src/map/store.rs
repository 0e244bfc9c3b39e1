// src/map/store.rs
//! On-disk tile files: `<save>/worldmap/<x>_<y>.bin`

use super::codec;
use super::coords::TileCoordinate;
use crate::error::{MapError, Result};
use crate::world::{BlockRegistry, ChunkSnapshot, UnloadHook, WorldBounds};
use std::fs;
use std::path::{Path, PathBuf};

const DIR_NAME: &str = "worldmap";
const EXTENSION: &str = "bin";

/// Parse `3_-2.bin` into a tile coordinate.
pub fn parse_file_name(name: &str) -> Result<TileCoordinate> {
    let bad = || MapError::TileName(name.to_string());
    let stem = name
        .strip_suffix(EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .ok_or_else(bad)?;
    let (x, y) = stem.split_once('_').ok_or_else(bad)?;
    let x = x.parse::<i32>().map_err(|_| bad())?;
    let y = y.parse::<i32>().map_err(|_| bad())?;
    Ok(TileCoordinate::new(x, y))
}

pub fn file_name(coord: TileCoordinate) -> String {
    format!("{}_{}.{}", coord.x, coord.y, EXTENSION)
}

/// Directory of persisted tiles belonging to one save.
#[derive(Debug, Clone)]
pub struct TileStore {
    dir: PathBuf,
}

impl TileStore {
    /// Store under `<save_dir>/worldmap`.
    pub fn for_save(save_dir: &Path) -> Self {
        Self {
            dir: save_dir.join(DIR_NAME),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, coord: TileCoordinate) -> PathBuf {
        self.dir.join(file_name(coord))
    }

    /// Every tile file in the store. Files with unparseable names are skipped.
    pub fn scan(&self) -> Result<Vec<(TileCoordinate, PathBuf)>> {
        if !self.dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut tiles = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match parse_file_name(&name) {
                Ok(coord) => tiles.push((coord, path)),
                Err(e) => log::debug!("Skipping {}: {}", path.display(), e),
            }
        }
        tiles.sort_by_key(|(coord, _)| *coord);
        Ok(tiles)
    }

    /// Read a tile file and check it holds the chunk its name says.
    pub fn load(
        &self,
        coord: TileCoordinate,
        bounds: &WorldBounds,
        registry: &BlockRegistry,
    ) -> Result<ChunkSnapshot> {
        load_file(&self.path_for(coord), coord, bounds, registry)
    }

    pub fn save(&self, coord: TileCoordinate, chunk: &ChunkSnapshot) -> Result<()> {
        codec::write_file(&self.path_for(coord), chunk)
    }

    /// Persist a chunk the world is about to drop.
    pub fn save_chunk(&self, chunk: &ChunkSnapshot) -> Result<()> {
        if chunk.is_placeholder() {
            return Ok(());
        }
        let coord = TileCoordinate::from(chunk.pos());
        log::debug!("Saving unloaded chunk {} to the world map", coord);
        self.save(coord, chunk)
    }

    /// Unload hook for a world: every chunk it drops is written to this store.
    pub fn unload_hook(&self) -> UnloadHook {
        let store = self.clone();
        Box::new(move |chunk: &ChunkSnapshot| {
            if let Err(e) = store.save_chunk(chunk) {
                log::warn!("Failed to save unloaded chunk {:?}: {}", chunk.pos(), e);
            }
        })
    }

    /// Number of tile files and their combined size in bytes.
    pub fn disk_usage(&self) -> Result<(usize, u64)> {
        let mut count = 0;
        let mut bytes = 0;
        for (_, path) in self.scan()? {
            count += 1;
            bytes += fs::metadata(&path)?.len();
        }
        Ok((count, bytes))
    }
}

/// Read a tile file expected to hold `coord`.
pub fn load_file(
    path: &Path,
    coord: TileCoordinate,
    bounds: &WorldBounds,
    registry: &BlockRegistry,
) -> Result<ChunkSnapshot> {
    let chunk = codec::read_file(path, bounds, registry)?;
    let found = TileCoordinate::from(chunk.pos());
    if found != coord {
        return Err(MapError::Codec(format!(
            "{} holds chunk {} instead of {}",
            path.display(),
            found,
            coord
        )));
    }
    Ok(chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::ChunkPos;

    #[test]
    fn test_parse_file_name() {
        assert_eq!(parse_file_name("3_-2.bin").unwrap(), TileCoordinate::new(3, -2));
        assert_eq!(parse_file_name("-10_0.bin").unwrap(), TileCoordinate::new(-10, 0));
        assert!(parse_file_name("3_-2.png").is_err());
        assert!(parse_file_name("3-2.bin").is_err());
        assert!(parse_file_name("a_b.bin").is_err());
        assert_eq!(file_name(TileCoordinate::new(-1, 4)), "-1_4.bin");
    }

    #[test]
    fn test_scan_skips_strangers() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::for_save(dir.path());
        assert!(store.scan().unwrap().is_empty());

        let bounds = WorldBounds::overworld();
        store.save(TileCoordinate::new(1, 2), &ChunkSnapshot::new(ChunkPos::new(1, 2), bounds)).unwrap();
        fs::write(store.dir().join("notes.txt"), "hello").unwrap();

        let tiles = store.scan().unwrap();
        assert_eq!(tiles.len(), 1);
        assert_eq!(tiles[0].0, TileCoordinate::new(1, 2));
        assert_eq!(store.disk_usage().unwrap().0, 1);
    }

    #[test]
    fn test_name_must_match_contents() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::for_save(dir.path());
        let bounds = WorldBounds::overworld();
        let registry = BlockRegistry::standard();
        let chunk = ChunkSnapshot::new(ChunkPos::new(5, 5), bounds);
        store.save(TileCoordinate::new(6, 5), &chunk).unwrap();

        assert!(store.load(TileCoordinate::new(6, 5), &bounds, &registry).is_err());
        store.save_chunk(&chunk).unwrap();
        assert!(store.load(TileCoordinate::new(5, 5), &bounds, &registry).is_ok());
    }

    #[test]
    fn test_moving_world_persists_dropped_chunks() {
        use crate::world::{ChunkSource, SyntheticWorld};
        use std::sync::Arc;

        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::for_save(dir.path());
        let registry = Arc::new(BlockRegistry::standard());
        let world = SyntheticWorld::new(5, Arc::clone(&registry), 0).with_unload_hook(store.unload_hook());

        world.chunk(ChunkPos::new(0, 0)).unwrap();
        assert!(store.scan().unwrap().is_empty());

        world.set_center(ChunkPos::new(1, 0));
        world.chunk(ChunkPos::new(1, 0)).unwrap();
        assert!(dir.path().join("worldmap").join("0_0.bin").is_file());

        world.set_center(ChunkPos::new(-3, 2));
        assert!(dir.path().join("worldmap").join("1_0.bin").is_file());
        let saved = store.load(TileCoordinate::new(1, 0), &world.bounds(), &registry).unwrap();
        assert_eq!(saved.pos(), ChunkPos::new(1, 0));
        assert_eq!(store.scan().unwrap().len(), 2);
    }
}
