// src/world/block.rs
//! Block states and the registry that describes how they look on a map

use super::color::MapColor;
use std::collections::HashMap;

/// Raw block state id as stored in chunk sections and tile files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct BlockState(pub u32);

impl BlockState {
    pub const AIR: BlockState = BlockState(0);

    pub fn id(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FluidKind {
    Water,
    Lava,
}

/// Everything the rasterizer and surface probe need to know about one block state.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub name: String,
    pub map_color: MapColor,
    pub fluid: Option<FluidKind>,
    /// Top face is a full, solid face (fluid on top of it is drawn as the block).
    pub sturdy_top: bool,
    /// Occludes the view and stops skylight.
    pub opaque: bool,
    pub motion_blocking: bool,
    pub leaves: bool,
    pub air: bool,
}

impl BlockInfo {
    pub fn solid(name: &str, map_color: MapColor) -> Self {
        Self {
            name: name.to_string(),
            map_color,
            fluid: None,
            sturdy_top: true,
            opaque: true,
            motion_blocking: true,
            leaves: false,
            air: false,
        }
    }

    pub fn air(name: &str) -> Self {
        Self {
            name: name.to_string(),
            map_color: MapColor::NONE,
            fluid: None,
            sturdy_top: false,
            opaque: false,
            motion_blocking: false,
            leaves: false,
            air: true,
        }
    }

    pub fn fluid(name: &str, map_color: MapColor, kind: FluidKind) -> Self {
        Self {
            name: name.to_string(),
            map_color,
            fluid: Some(kind),
            sturdy_top: false,
            opaque: false,
            motion_blocking: true,
            leaves: false,
            air: false,
        }
    }

    /// A non-full block (plant, glass, ...) that still shows up on the map.
    pub fn transparent(name: &str, map_color: MapColor) -> Self {
        Self {
            name: name.to_string(),
            map_color,
            fluid: None,
            sturdy_top: false,
            opaque: false,
            motion_blocking: false,
            leaves: false,
            air: false,
        }
    }

    pub fn with_fluid(mut self, kind: FluidKind) -> Self {
        self.fluid = Some(kind);
        self
    }

    pub fn with_leaves(mut self) -> Self {
        self.leaves = true;
        self.opaque = false;
        self.sturdy_top = false;
        self
    }
}

/// Maps block state ids to their map properties. Id 0 is always air.
#[derive(Debug, Clone)]
pub struct BlockRegistry {
    blocks: Vec<BlockInfo>,
    by_name: HashMap<String, BlockState>,
    fluid_blocks: HashMap<FluidKind, BlockState>,
}

impl BlockRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            blocks: Vec::new(),
            by_name: HashMap::new(),
            fluid_blocks: HashMap::new(),
        };
        registry.register(BlockInfo::air("air"));
        registry
    }

    /// Registry with the handful of blocks the demo world and tests use.
    pub fn standard() -> Self {
        let mut r = Self::new();
        r.register(BlockInfo::air("cave_air"));
        r.register(BlockInfo::solid("stone", MapColor::STONE));
        r.register(BlockInfo::solid("dirt", MapColor::DIRT));
        r.register(BlockInfo::solid("grass_block", MapColor::GRASS));
        r.register(BlockInfo::solid("sand", MapColor::SAND));
        r.register(BlockInfo::solid("gravel", MapColor::STONE));
        r.register(BlockInfo::solid("snow_block", MapColor::SNOW));
        r.register(BlockInfo::solid("oak_log", MapColor::WOOD));
        r.register(BlockInfo::solid("netherrack", MapColor::NETHER));
        r.register(BlockInfo::solid("bedrock", MapColor::STONE));
        r.register(BlockInfo::solid("ice", MapColor::ICE));
        r.register(BlockInfo::solid("oak_leaves", MapColor::PLANT).with_leaves());
        r.register(BlockInfo::transparent("short_grass", MapColor::PLANT));
        r.register(BlockInfo::transparent("glass", MapColor::NONE));
        r.register(BlockInfo::fluid("water", MapColor::WATER, FluidKind::Water));
        r.register(BlockInfo::fluid("lava", MapColor::FIRE, FluidKind::Lava));
        r.register(BlockInfo::transparent("seagrass", MapColor::WATER).with_fluid(FluidKind::Water));
        r.register(BlockInfo::transparent("kelp", MapColor::WATER).with_fluid(FluidKind::Water));
        r
    }

    /// Register a block and return its state id. The first fluid block of a kind
    /// becomes that fluid's representative state.
    pub fn register(&mut self, info: BlockInfo) -> BlockState {
        let state = BlockState(self.blocks.len() as u32);
        if let Some(kind) = info.fluid {
            if info.map_color != MapColor::NONE {
                self.fluid_blocks.entry(kind).or_insert(state);
            }
        }
        self.by_name.insert(info.name.clone(), state);
        self.blocks.push(info);
        state
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn state(&self, name: &str) -> Option<BlockState> {
        self.by_name.get(name).copied()
    }

    /// Properties of a state; unknown ids read as air.
    pub fn info(&self, state: BlockState) -> &BlockInfo {
        self.blocks.get(state.0 as usize).unwrap_or(&self.blocks[0])
    }

    pub fn map_color(&self, state: BlockState) -> MapColor {
        self.info(state).map_color
    }

    pub fn fluid(&self, state: BlockState) -> Option<FluidKind> {
        self.info(state).fluid
    }

    pub fn is_air(&self, state: BlockState) -> bool {
        self.info(state).air
    }

    /// The plain block standing in for a fluid (e.g. `water` for waterlogged plants).
    pub fn fluid_block(&self, kind: FluidKind) -> Option<BlockState> {
        self.fluid_blocks.get(&kind).copied()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_air_is_first() {
        let registry = BlockRegistry::new();
        assert_eq!(registry.state("air"), Some(BlockState::AIR));
        assert!(registry.is_air(BlockState::AIR));
    }

    #[test]
    fn test_fluid_representative() {
        let registry = BlockRegistry::standard();
        let water = registry.state("water").unwrap();
        let seagrass = registry.state("seagrass").unwrap();
        assert_eq!(registry.fluid(seagrass), Some(FluidKind::Water));
        assert_eq!(registry.fluid_block(FluidKind::Water), Some(water));
        assert_eq!(registry.map_color(water), MapColor::WATER);
    }

    #[test]
    fn test_unknown_state_reads_as_air() {
        let registry = BlockRegistry::standard();
        assert!(registry.is_air(BlockState(9_999)));
    }
}
