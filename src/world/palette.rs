// src/world/palette.rs
//! Packed bit storage and paletted containers for chunk sections

use crate::error::{MapError, Result};

/// Smallest `b` with `2^b >= n`.
pub fn ceil_log2(n: u32) -> u8 {
    if n <= 1 {
        0
    } else {
        (32 - (n - 1).leading_zeros()) as u8
    }
}

/// Bits needed to hold `value` itself (at least one).
fn bits_for(value: u32) -> u8 {
    ((32 - value.leading_zeros()) as u8).max(1)
}

/// Fixed-width integers packed into 64-bit words; a value never straddles two words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitStorage {
    bits: u8,
    size: usize,
    data: Vec<u64>,
}

impl BitStorage {
    pub fn new(bits: u8, size: usize) -> Self {
        let len = Self::required_len(bits, size);
        Self { bits, size, data: vec![0; len] }
    }

    /// Wrap words read from a stream, checking the length matches `bits` and `size`.
    pub fn from_raw(bits: u8, size: usize, data: Vec<u64>) -> Result<Self> {
        if bits > 32 {
            return Err(MapError::Codec(format!("{} bits per entry is out of range", bits)));
        }
        let expected = Self::required_len(bits, size);
        if data.len() != expected {
            return Err(MapError::Codec(format!(
                "bit storage holds {} words, expected {} for {} x {} bits",
                data.len(),
                expected,
                size,
                bits
            )));
        }
        Ok(Self { bits, size, data })
    }

    /// Words needed for `size` entries. Widths over 64 bits cannot be packed
    /// and need none.
    pub fn required_len(bits: u8, size: usize) -> usize {
        if bits == 0 || bits > 64 {
            return 0;
        }
        let per_word = 64 / bits as usize;
        size.div_ceil(per_word)
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn raw(&self) -> &[u64] {
        &self.data
    }

    fn mask(&self) -> u64 {
        (1u64 << self.bits) - 1
    }

    fn locate(&self, index: usize) -> (usize, u32) {
        let per_word = 64 / self.bits as usize;
        (index / per_word, ((index % per_word) * self.bits as usize) as u32)
    }

    pub fn get(&self, index: usize) -> u32 {
        if self.bits == 0 {
            return 0;
        }
        let (word, shift) = self.locate(index);
        ((self.data[word] >> shift) & self.mask()) as u32
    }

    pub fn set(&mut self, index: usize, value: u32) {
        if self.bits == 0 {
            return;
        }
        let (word, shift) = self.locate(index);
        let mask = self.mask();
        self.data[word] = (self.data[word] & !(mask << shift)) | ((value as u64 & mask) << shift);
    }
}

/// Block-state containers cover 16x16x16 cells, biome containers 4x4x4.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    BlockStates,
    Biomes,
}

impl ContainerKind {
    pub fn size(self) -> usize {
        match self {
            ContainerKind::BlockStates => 4096,
            ContainerKind::Biomes => 64,
        }
    }

    fn min_linear_bits(self) -> u8 {
        match self {
            ContainerKind::BlockStates => 4,
            ContainerKind::Biomes => 1,
        }
    }

    /// Widest entry that still uses a local palette; anything wider stores raw ids.
    pub fn max_linear_bits(self) -> u8 {
        match self {
            ContainerKind::BlockStates => 8,
            ContainerKind::Biomes => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Palette {
    Single(u32),
    Linear(Vec<u32>),
    Global,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PalettedContainer {
    kind: ContainerKind,
    palette: Palette,
    storage: BitStorage,
}

impl PalettedContainer {
    /// Container where every cell holds `value`.
    pub fn filled(kind: ContainerKind, value: u32) -> Self {
        Self {
            kind,
            palette: Palette::Single(value),
            storage: BitStorage::new(0, kind.size()),
        }
    }

    /// Reassemble a container from decoded parts, rejecting palette indices that point nowhere.
    pub fn from_parts(kind: ContainerKind, palette: Palette, storage: BitStorage) -> Result<Self> {
        if storage.size() != kind.size() {
            return Err(MapError::Codec(format!(
                "container has {} cells, expected {}",
                storage.size(),
                kind.size()
            )));
        }
        if let Palette::Linear(entries) = &palette {
            if entries.is_empty() {
                return Err(MapError::Codec("empty palette".to_string()));
            }
            if (0..storage.size()).any(|i| storage.get(i) as usize >= entries.len()) {
                return Err(MapError::Codec("palette index out of range".to_string()));
            }
        }
        Ok(Self { kind, palette, storage })
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn storage(&self) -> &BitStorage {
        &self.storage
    }

    pub fn get(&self, index: usize) -> u32 {
        match &self.palette {
            Palette::Single(value) => *value,
            Palette::Linear(entries) => entries[self.storage.get(index) as usize],
            Palette::Global => self.storage.get(index),
        }
    }

    pub fn set(&mut self, index: usize, value: u32) {
        match &mut self.palette {
            Palette::Single(current) if *current == value => {}
            Palette::Linear(entries) => {
                if let Some(slot) = entries.iter().position(|&v| v == value) {
                    self.storage.set(index, slot as u32);
                } else if ceil_log2(entries.len() as u32 + 1) <= self.storage.bits() {
                    entries.push(value);
                    let slot = entries.len() as u32 - 1;
                    self.storage.set(index, slot);
                } else {
                    self.repack(index, value);
                }
            }
            Palette::Global if bits_for(value) <= self.storage.bits() => {
                self.storage.set(index, value);
            }
            _ => self.repack(index, value),
        }
    }

    /// True when every cell holds `value`.
    pub fn is_uniform(&self, value: u32) -> bool {
        match &self.palette {
            Palette::Single(v) => *v == value,
            _ => (0..self.kind.size()).all(|i| self.get(i) == value),
        }
    }

    pub fn count_matching(&self, mut predicate: impl FnMut(u32) -> bool) -> usize {
        match &self.palette {
            Palette::Single(v) => {
                if predicate(*v) {
                    self.kind.size()
                } else {
                    0
                }
            }
            _ => (0..self.kind.size()).filter(|&i| predicate(self.get(i))).count(),
        }
    }

    // Rebuilds the container wide enough for `value`, then writes it at `index`.
    fn repack(&mut self, index: usize, value: u32) {
        let size = self.kind.size();
        let mut values: Vec<u32> = (0..size).map(|i| self.get(i)).collect();
        values[index] = value;

        let mut distinct: Vec<u32> = Vec::new();
        for &v in &values {
            if !distinct.contains(&v) {
                distinct.push(v);
            }
        }

        if distinct.len() == 1 {
            *self = Self::filled(self.kind, distinct[0]);
            return;
        }

        let bits = ceil_log2(distinct.len() as u32).max(self.kind.min_linear_bits());
        if bits <= self.kind.max_linear_bits() {
            let mut storage = BitStorage::new(bits, size);
            for (i, v) in values.iter().enumerate() {
                let slot = distinct.iter().position(|d| d == v).unwrap_or(0);
                storage.set(i, slot as u32);
            }
            self.palette = Palette::Linear(distinct);
            self.storage = storage;
        } else {
            let widest = distinct.iter().copied().max().unwrap_or(0);
            let bits = bits_for(widest).max(self.kind.max_linear_bits() + 1);
            let mut storage = BitStorage::new(bits, size);
            for (i, v) in values.iter().enumerate() {
                storage.set(i, *v);
            }
            self.palette = Palette::Global;
            self.storage = storage;
        }
    }
}
