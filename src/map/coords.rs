// src/map/coords.rs
//! Tile coordinates and block <-> tile conversion

use crate::world::ChunkPos;
use std::fmt;

/// Blocks along each edge of a map tile. One tile covers exactly one chunk.
pub const TILE_SIZE: i32 = 16;

/// Tile column floor-divided from a block column; block -1 lands in tile -1.
pub fn block_to_tile(block: i32) -> i32 {
    let mut tile = block / TILE_SIZE;
    if block < 0 && block % TILE_SIZE != 0 {
        tile -= 1;
    }
    tile
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoordinate {
    pub x: i32,
    pub y: i32,
}

impl TileCoordinate {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Tile containing the block at (`block_x`, `block_z`).
    pub fn from_block(block_x: i32, block_z: i32) -> Self {
        Self {
            x: block_to_tile(block_x),
            y: block_to_tile(block_z),
        }
    }

    /// North-west block of the tile.
    pub fn block_origin(self) -> (i32, i32) {
        (self.x * TILE_SIZE, self.y * TILE_SIZE)
    }

    pub fn chunk_pos(self) -> ChunkPos {
        ChunkPos::new(self.x, self.y)
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Chebyshev distance in tiles.
    pub fn distance(self, other: TileCoordinate) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

impl From<ChunkPos> for TileCoordinate {
    fn from(pos: ChunkPos) -> Self {
        Self::new(pos.x, pos.z)
    }
}

impl fmt::Display for TileCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negative_blocks_floor() {
        assert_eq!(block_to_tile(-1), -1);
        assert_eq!(block_to_tile(-16), -1);
        assert_eq!(block_to_tile(-17), -2);
        assert_eq!(block_to_tile(0), 0);
        assert_eq!(block_to_tile(15), 0);
        assert_eq!(block_to_tile(16), 1);
    }

    #[test]
    fn test_origin_round_trip() {
        for x in -40..40 {
            for y in -40..40 {
                let tile = TileCoordinate::new(x, y);
                let (bx, bz) = tile.block_origin();
                assert_eq!(TileCoordinate::from_block(bx, bz), tile);
                // every block inside the tile maps back to it
                assert_eq!(TileCoordinate::from_block(bx + 15, bz + 7), tile);
            }
        }
    }

    #[test]
    fn test_matches_euclidean_division() {
        for block in -100..100 {
            assert_eq!(block_to_tile(block), block.div_euclid(TILE_SIZE));
        }
    }

    #[test]
    fn test_chunk_conversion() {
        let tile = TileCoordinate::new(3, -2);
        assert_eq!(tile.chunk_pos(), ChunkPos::new(3, -2));
        assert_eq!(TileCoordinate::from(ChunkPos::new(3, -2)), tile);
        assert_eq!(tile.to_string(), "3, -2");
    }
}
