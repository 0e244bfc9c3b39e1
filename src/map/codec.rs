// src/map/codec.rs
//! Binary tile format: a chunk snapshot with just enough data to re-rasterize it
//!
//! Layout (big-endian, lengths as VarInts):
//! - magic `VMTL`, u16 format version
//! - chunk x, chunk z (i32)
//! - heightmap count, then per heightmap: kind id, word count, i64 words
//! - section count (i32), then per section: non-air count (i16),
//!   block container, biome container
//!
//! A container is a bits-per-entry byte, the palette (single value, a
//! length-prefixed list, or nothing for global ids) and the packed words.

use crate::error::{MapError, Result};
use crate::world::palette::{BitStorage, ContainerKind, Palette, PalettedContainer};
use crate::world::{BlockRegistry, ChunkPos, ChunkSection, ChunkSnapshot, Heightmap, HeightmapKind, WorldBounds};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

pub const MAGIC: &[u8; 4] = b"VMTL";
pub const VERSION: u16 = 1;

/// Write a complete tile file body: header followed by the chunk.
pub fn write_tile<W: Write>(chunk: &ChunkSnapshot, writer: &mut W) -> Result<()> {
    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_be_bytes())?;
    encode_chunk(chunk, writer)
}

/// Read a tile file body written by [`write_tile`].
pub fn read_tile<R: Read>(reader: &mut R, bounds: &WorldBounds, registry: &BlockRegistry) -> Result<ChunkSnapshot> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(MapError::BadMagic(magic));
    }
    let version = read_u16(reader)?;
    if version != VERSION {
        return Err(MapError::UnsupportedVersion(version));
    }
    decode_chunk(reader, bounds, registry)
}

pub fn write_file(path: &Path, chunk: &ChunkSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    write_tile(chunk, &mut writer)?;
    writer.flush()?;
    Ok(())
}

pub fn read_file(path: &Path, bounds: &WorldBounds, registry: &BlockRegistry) -> Result<ChunkSnapshot> {
    let mut reader = BufReader::new(File::open(path)?);
    read_tile(&mut reader, bounds, registry)
}

/// Encode the chunk without a header.
pub fn encode_chunk<W: Write>(chunk: &ChunkSnapshot, writer: &mut W) -> Result<()> {
    let pos = chunk.pos();
    writer.write_all(&pos.x.to_be_bytes())?;
    writer.write_all(&pos.z.to_be_bytes())?;

    let heightmaps: Vec<(&HeightmapKind, &Heightmap)> =
        chunk.heightmaps().iter().filter(|(kind, _)| kind.sent_to_client()).collect();
    write_varint(writer, heightmaps.len() as u32)?;
    for (kind, map) in heightmaps {
        write_varint(writer, kind.id())?;
        write_words(writer, map.storage().raw())?;
    }

    writer.write_all(&(chunk.sections().len() as i32).to_be_bytes())?;
    for section in chunk.sections() {
        writer.write_all(&(section.non_empty_count() as i16).to_be_bytes())?;
        write_container(writer, section.states())?;
        write_container(writer, section.biomes())?;
    }
    Ok(())
}

/// Decode a chunk written by [`encode_chunk`] for a world with the given bounds.
///
/// A section count that does not match `bounds` means the data came from a
/// different world layout; that yields a placeholder snapshot instead of an error.
pub fn decode_chunk<R: Read>(reader: &mut R, bounds: &WorldBounds, registry: &BlockRegistry) -> Result<ChunkSnapshot> {
    let x = read_i32(reader)?;
    let z = read_i32(reader)?;
    let pos = ChunkPos::new(x, z);

    let heightmap_count = read_varint(reader)?;
    if heightmap_count as usize > HeightmapKind::ALL.len() {
        return Err(MapError::Codec(format!("{} heightmaps in one chunk", heightmap_count)));
    }
    let bits = Heightmap::bits(bounds);
    let mut heightmaps = BTreeMap::new();
    for _ in 0..heightmap_count {
        let id = read_varint(reader)?;
        let kind = HeightmapKind::from_id(id)
            .ok_or_else(|| MapError::Codec(format!("unknown heightmap kind {}", id)))?;
        let words = read_words(reader, 4096)?;
        match BitStorage::from_raw(bits, 256, words) {
            Ok(storage) if kind.sent_to_client() => {
                heightmaps.insert(kind, Heightmap::from_storage(storage));
            }
            Ok(_) => {}
            // wrong width for this world; primed from the blocks instead
            Err(e) => log::debug!("Dropping heightmap {:?} of chunk {:?}: {}", kind, pos, e),
        }
    }

    let section_count = read_i32(reader)?;
    if section_count < 0 || section_count as usize != bounds.section_count() {
        log::warn!(
            "Chunk {:?} has {} sections, world expects {}; using an empty chunk",
            pos,
            section_count,
            bounds.section_count()
        );
        return Ok(ChunkSnapshot::placeholder(pos, *bounds));
    }

    let mut sections = Vec::with_capacity(section_count as usize);
    for _ in 0..section_count {
        let non_empty = read_i16(reader)?;
        let states = read_container(reader, ContainerKind::BlockStates)?;
        let biomes = read_container(reader, ContainerKind::Biomes)?;
        sections.push(ChunkSection::from_parts(non_empty.max(0) as u16, states, biomes));
    }

    Ok(ChunkSnapshot::from_parts(pos, *bounds, sections, heightmaps, registry))
}

fn write_container<W: Write>(writer: &mut W, container: &PalettedContainer) -> Result<()> {
    let storage = container.storage();
    match container.palette() {
        Palette::Single(value) => {
            writer.write_all(&[0])?;
            write_varint(writer, *value)?;
        }
        Palette::Linear(entries) => {
            writer.write_all(&[storage.bits()])?;
            write_varint(writer, entries.len() as u32)?;
            for entry in entries {
                write_varint(writer, *entry)?;
            }
        }
        Palette::Global => {
            writer.write_all(&[storage.bits()])?;
        }
    }
    write_words(writer, storage.raw())
}

fn read_container<R: Read>(reader: &mut R, kind: ContainerKind) -> Result<PalettedContainer> {
    let bits = read_u8(reader)?;
    if bits > 32 {
        return Err(MapError::Codec(format!("{} bits per entry is out of range", bits)));
    }
    let palette = if bits == 0 {
        Palette::Single(read_varint(reader)?)
    } else if bits <= kind.max_linear_bits() {
        let len = read_varint(reader)? as usize;
        if len > 1 << bits {
            return Err(MapError::Codec(format!("palette of {} entries at {} bits", len, bits)));
        }
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            entries.push(read_varint(reader)?);
        }
        Palette::Linear(entries)
    } else {
        Palette::Global
    };

    let words = read_words(reader, BitStorage::required_len(bits, kind.size()))?;
    let storage = BitStorage::from_raw(bits, kind.size(), words)?;
    PalettedContainer::from_parts(kind, palette, storage)
}

fn write_words<W: Write>(writer: &mut W, words: &[u64]) -> Result<()> {
    write_varint(writer, words.len() as u32)?;
    for word in words {
        writer.write_all(&word.to_be_bytes())?;
    }
    Ok(())
}

// Reads a word array, refusing lengths above `limit` before allocating.
fn read_words<R: Read>(reader: &mut R, limit: usize) -> Result<Vec<u64>> {
    let len = read_varint(reader)? as usize;
    if len > limit {
        return Err(MapError::Codec(format!("{} words exceeds limit {}", len, limit)));
    }
    let mut words = Vec::with_capacity(len);
    let mut buf = [0u8; 8];
    for _ in 0..len {
        reader.read_exact(&mut buf)?;
        words.push(u64::from_be_bytes(buf));
    }
    Ok(words)
}

pub fn write_varint<W: Write>(writer: &mut W, mut value: u32) -> Result<()> {
    loop {
        if value & !0x7F == 0 {
            writer.write_all(&[value as u8])?;
            return Ok(());
        }
        writer.write_all(&[(value & 0x7F) as u8 | 0x80])?;
        value >>= 7;
    }
}

pub fn read_varint<R: Read>(reader: &mut R) -> Result<u32> {
    let mut value = 0u32;
    for i in 0..5 {
        let byte = read_u8(reader)?;
        value |= ((byte & 0x7F) as u32) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok(value);
        }
    }
    Err(MapError::Codec("VarInt is too long".to_string()))
}

fn read_u8<R: Read>(reader: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u16<R: Read>(reader: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

fn read_i16<R: Read>(reader: &mut R) -> Result<i16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf)?;
    Ok(i16::from_be_bytes(buf))
}

fn read_i32<R: Read>(reader: &mut R) -> Result<i32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(i32::from_be_bytes(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::raster::{rasterize_chunk, PixelBuffer, RasterParameters};
    use crate::world::synthetic::SyntheticWorld;
    use crate::world::ChunkSource;
    use std::io::Cursor;
    use std::sync::Arc;

    fn sample_chunk() -> (Arc<BlockRegistry>, ChunkSnapshot) {
        let registry = Arc::new(BlockRegistry::standard());
        let world = SyntheticWorld::new(42, Arc::clone(&registry), 4);
        let chunk = world.chunk(ChunkPos::new(-2, 3)).unwrap();
        (registry, chunk.as_ref().clone())
    }

    #[test]
    fn test_varint() {
        for value in [0u32, 1, 127, 128, 300, 2_097_151, u32::MAX] {
            let mut buf = Vec::new();
            write_varint(&mut buf, value).unwrap();
            assert_eq!(read_varint(&mut Cursor::new(buf)).unwrap(), value);
        }
        let mut buf = Vec::new();
        write_varint(&mut buf, 300).unwrap();
        assert_eq!(buf, vec![0xAC, 0x02]);
    }

    #[test]
    fn test_round_trip_rasterizes_identically() {
        let (registry, chunk) = sample_chunk();
        let mut bytes = Vec::new();
        write_tile(&chunk, &mut bytes).unwrap();
        let decoded = read_tile(&mut Cursor::new(bytes), &WorldBounds::overworld(), &registry).unwrap();

        assert_eq!(decoded.pos(), chunk.pos());
        assert!(!decoded.is_placeholder());
        for params in [
            RasterParameters::surface(),
            RasterParameters::new(20, false, true, &WorldBounds::overworld()),
        ] {
            let mut original = PixelBuffer::new(16, 16);
            let mut restored = PixelBuffer::new(16, 16);
            rasterize_chunk(&chunk, &registry, &params, &mut original);
            rasterize_chunk(&decoded, &registry, &params, &mut restored);
            assert_eq!(original, restored);
        }
    }

    #[test]
    fn test_missing_heightmaps_are_primed() {
        let registry = BlockRegistry::standard();
        let stone = registry.state("stone").unwrap();
        let mut chunk = ChunkSnapshot::new(ChunkPos::new(0, 0), WorldBounds::overworld());
        chunk.set_block(1, 40, 1, stone, &registry);
        chunk.prime_client_heightmaps(&registry);

        // hand-build a body with no heightmaps
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        write_varint(&mut bytes, 0).unwrap();
        bytes.extend_from_slice(&(chunk.sections().len() as i32).to_be_bytes());
        for section in chunk.sections() {
            bytes.extend_from_slice(&(section.non_empty_count() as i16).to_be_bytes());
            write_container(&mut bytes, section.states()).unwrap();
            write_container(&mut bytes, section.biomes()).unwrap();
        }

        let decoded = decode_chunk(&mut Cursor::new(bytes), &WorldBounds::overworld(), &registry).unwrap();
        assert_eq!(decoded.surface_height(1, 1), 40);
        assert_eq!(decoded.surface_height(2, 2), -65);
    }

    #[test]
    fn test_section_count_mismatch_gives_placeholder() {
        let (registry, chunk) = sample_chunk();
        let mut bytes = Vec::new();
        encode_chunk(&chunk, &mut bytes).unwrap();
        let decoded = decode_chunk(&mut Cursor::new(bytes), &WorldBounds::nether(), &registry).unwrap();
        assert!(decoded.is_placeholder());
        assert_eq!(decoded.pos(), chunk.pos());
    }

    #[test]
    fn test_truncated_stream_is_an_error() {
        let (registry, chunk) = sample_chunk();
        let mut bytes = Vec::new();
        write_tile(&chunk, &mut bytes).unwrap();
        bytes.truncate(bytes.len() / 2);
        let err = read_tile(&mut Cursor::new(bytes), &WorldBounds::overworld(), &registry).unwrap_err();
        assert!(err.is_truncation());
    }

    #[test]
    fn test_header_checks() {
        let registry = BlockRegistry::standard();
        let bounds = WorldBounds::overworld();
        let err = read_tile(&mut Cursor::new(b"NOPE\x00\x01".to_vec()), &bounds, &registry).unwrap_err();
        assert!(matches!(err, MapError::BadMagic(_)));

        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&9u16.to_be_bytes());
        let err = read_tile(&mut Cursor::new(bytes), &bounds, &registry).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedVersion(9)));
    }

    #[test]
    fn test_oversized_entry_width_is_rejected() {
        let registry = BlockRegistry::standard();
        let bounds = WorldBounds::overworld();
        let mut bytes = MAGIC.to_vec();
        bytes.extend_from_slice(&VERSION.to_be_bytes());
        bytes.extend_from_slice(&3i32.to_be_bytes());
        bytes.extend_from_slice(&(-2i32).to_be_bytes());
        write_varint(&mut bytes, 0).unwrap();
        bytes.extend_from_slice(&(bounds.section_count() as i32).to_be_bytes());
        for _ in 0..bounds.section_count() {
            bytes.extend_from_slice(&0i16.to_be_bytes());
            bytes.push(200);
            bytes.extend_from_slice(&[0u8; 64]);
        }

        let err = read_tile(&mut Cursor::new(bytes), &bounds, &registry).unwrap_err();
        assert!(matches!(err, MapError::Codec(_)));
        assert!(!err.is_truncation());
    }

    #[test]
    fn test_file_round_trip() {
        let (registry, chunk) = sample_chunk();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worldmap").join("-2_3.bin");
        write_file(&path, &chunk).unwrap();
        let decoded = read_file(&path, &WorldBounds::overworld(), &registry).unwrap();
        assert_eq!(decoded.sections(), chunk.sections());
    }
}
