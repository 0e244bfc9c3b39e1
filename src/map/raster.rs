// src/map/raster.rs
//! Column rasterization: turn block columns into shaded top-down pixels

use crate::config::CaveAccess;
use crate::world::color::{MapColor, NO_DATA};
use crate::world::{BlockRegistry, BlockState, Brightness, ChunkPos, ChunkSnapshot, ChunkSource, WorldBounds};
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Square grid of packed ARGB pixels, row-major by z.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    pixels: Vec<u32>,
}

impl PixelBuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![NO_DATA; width * height],
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, z: usize) -> u32 {
        self.pixels[z * self.width + x]
    }

    pub fn set(&mut self, x: usize, z: usize, color: u32) {
        self.pixels[z * self.width + x] = color;
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    /// Set every pixel; returns whether anything changed.
    pub fn fill(&mut self, color: u32) -> bool {
        let changed = self.pixels.iter().any(|&p| p != color);
        self.pixels.fill(color);
        changed
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|&p| p == NO_DATA)
    }

    pub fn to_rgba_image(&self) -> image::RgbaImage {
        image::RgbaImage::from_fn(self.width as u32, self.height as u32, |x, z| {
            image::Rgba(crate::world::color::to_rgba(self.get(x as usize, z as usize)))
        })
    }
}

/// View inputs to rasterization. They are not owned by tiles; changing them
/// re-rasterizes cached tiles without fetching chunks again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterParameters {
    /// Height cave-mode columns start descending from.
    pub slice_y: i32,
    /// Draw the true surface and ignore `slice_y`.
    pub surface_only: bool,
}

impl RasterParameters {
    pub fn surface() -> Self {
        Self {
            slice_y: i32::MAX,
            surface_only: true,
        }
    }

    /// Parameters for a viewer at `slice_y`. Cave mode only survives when the
    /// dimension allows it; the slice is clamped to just outside the world.
    pub fn new(slice_y: i32, at_surface: bool, caves_allowed: bool, bounds: &WorldBounds) -> Self {
        Self {
            slice_y: slice_y.clamp(bounds.min_y - 1, bounds.max_y() + 1),
            surface_only: at_surface || !caves_allowed,
        }
    }

    /// World map parameters honouring the world map cave switches.
    pub fn for_world_map(slice_y: i32, at_surface: bool, caves: &CaveAccess, bounds: &WorldBounds) -> Self {
        Self::new(slice_y, at_surface, caves.world_map_allows(bounds), bounds)
    }

    /// Minimap parameters honouring the minimap cave switch.
    pub fn for_minimap(slice_y: i32, at_surface: bool, caves: &CaveAccess, bounds: &WorldBounds) -> Self {
        Self::new(slice_y, at_surface, caves.minimap_caves, bounds)
    }
}

/// Block columns the rasterizer reads. Coordinates are world block coordinates.
pub trait ColumnSource {
    fn min_y(&self) -> i32;

    /// Highest non-air block of the column, or `None` when its chunk has no data.
    fn surface_height(&self, x: i32, z: i32) -> Option<i32>;

    fn block(&self, x: i32, y: i32, z: i32) -> BlockState;
}

/// A single chunk. Columns outside it are read from its nearest edge, so the
/// seed row above the tile repeats the tile's first row.
impl ColumnSource for ChunkSnapshot {
    fn min_y(&self) -> i32 {
        ChunkSnapshot::min_y(self)
    }

    fn surface_height(&self, x: i32, z: i32) -> Option<i32> {
        if self.is_placeholder() {
            return None;
        }
        let (x, z) = self.clamp_to_chunk(x, z);
        Some(ChunkSnapshot::surface_height(self, x, z))
    }

    fn block(&self, x: i32, y: i32, z: i32) -> BlockState {
        let (x, z) = self.clamp_to_chunk(x, z);
        ChunkSnapshot::block(self, x, y, z)
    }
}

impl ChunkSnapshot {
    fn clamp_to_chunk(&self, x: i32, z: i32) -> (i32, i32) {
        let min_x = self.pos().min_block_x();
        let min_z = self.pos().min_block_z();
        (x.clamp(min_x, min_x + 15), z.clamp(min_z, min_z + 15))
    }
}

/// Columns read straight from a live world, chunk lookups memoised for one pass.
pub struct WorldWindow<'a> {
    world: &'a dyn ChunkSource,
    min_y: i32,
    chunks: RefCell<HashMap<ChunkPos, Option<Arc<ChunkSnapshot>>>>,
}

impl<'a> WorldWindow<'a> {
    pub fn new(world: &'a dyn ChunkSource) -> Self {
        Self {
            min_y: world.bounds().min_y,
            world,
            chunks: RefCell::new(HashMap::new()),
        }
    }

    fn chunk_at(&self, x: i32, z: i32) -> Option<Arc<ChunkSnapshot>> {
        let pos = ChunkPos::containing(x, z);
        self.chunks
            .borrow_mut()
            .entry(pos)
            .or_insert_with(|| self.world.chunk(pos).filter(|c| !c.is_placeholder()))
            .clone()
    }
}

impl ColumnSource for WorldWindow<'_> {
    fn min_y(&self) -> i32 {
        self.min_y
    }

    fn surface_height(&self, x: i32, z: i32) -> Option<i32> {
        self.chunk_at(x, z).map(|c| c.surface_height(x, z))
    }

    fn block(&self, x: i32, y: i32, z: i32) -> BlockState {
        self.chunk_at(x, z).map_or(BlockState::AIR, |c| c.block(x, y, z))
    }
}

/// What a single column resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSample {
    pub y: i32,
    pub state: BlockState,
    pub fluid_depth: i32,
}

/// Walk one column down from the surface (or the slice) to the first block with a map colour.
pub fn sample_column(
    source: &dyn ColumnSource,
    registry: &BlockRegistry,
    params: &RasterParameters,
    x: i32,
    z: i32,
) -> Option<ColumnSample> {
    let min_y = source.min_y();
    let mut y = source.surface_height(x, z)? + 1;
    if !params.surface_only {
        y = y.min(params.slice_y);
    }

    let mut fluid_depth = 0;
    let mut state = BlockState::AIR;
    if y > min_y {
        loop {
            y -= 1;
            state = source.block(x, y, z);
            if !registry.map_color(state).is_none() || y <= min_y {
                break;
            }
        }

        if y > min_y {
            if let Some(kind) = registry.fluid(state) {
                let mut next = y - 1;
                loop {
                    let below = source.block(x, next, z);
                    next -= 1;
                    fluid_depth += 1;
                    if !(next > min_y && registry.fluid(below).is_some()) {
                        break;
                    }
                }
                if !registry.info(state).sturdy_top {
                    state = registry.fluid_block(kind).unwrap_or(state);
                }
            }
        }
    }

    Some(ColumnSample { y, state, fluid_depth })
}

/// `(x + z) & 1`: alternating 0/1 used to dither the shading.
pub fn checkerboard(x: i32, z: i32) -> i32 {
    (x + z) & 1
}

/// Shading tier for a water column from its depth.
pub fn water_brightness(fluid_depth: i32, x: i32, z: i32) -> Brightness {
    let f = fluid_depth as f64 * 0.1 + checkerboard(x, z) as f64 * 0.2;
    if f < 0.5 {
        Brightness::High
    } else if f > 0.9 {
        Brightness::Low
    } else {
        Brightness::Normal
    }
}

/// Shading tier for a land column from its height relative to the previous column.
pub fn relief_brightness(height: f64, previous: f64, x: i32, z: i32) -> Brightness {
    let f = (height - previous) * 4.0 / 5.0 + (checkerboard(x, z) as f64 - 0.5) * 0.4;
    if f > 0.6 {
        Brightness::High
    } else if f < -0.6 {
        Brightness::Low
    } else {
        Brightness::Normal
    }
}

/// Rasterize the `width x height` block area whose north-west corner is
/// (`origin_x`, `origin_z`) into `buffer`. Returns whether any pixel changed.
///
/// Each x column is scanned from z = -1; that extra row only seeds the
/// previous-height value used for relief shading and is never written.
pub fn rasterize(
    source: &dyn ColumnSource,
    registry: &BlockRegistry,
    params: &RasterParameters,
    origin_x: i32,
    origin_z: i32,
    buffer: &mut PixelBuffer,
) -> bool {
    let mut updated = false;
    let width = buffer.width() as i32;
    let height = buffer.height() as i32;

    for x in 0..width {
        let mut previous = 0.0;
        for z in -1..height {
            let world_x = origin_x + x;
            let world_z = origin_z + z;

            let color = match sample_column(source, registry, params, world_x, world_z) {
                Some(sample) => {
                    let current = sample.y as f64;
                    let map_color = registry.map_color(sample.state);
                    let brightness = if map_color == MapColor::WATER {
                        water_brightness(sample.fluid_depth, x, z)
                    } else {
                        relief_brightness(current, previous, x, z)
                    };
                    previous = current;
                    map_color.argb(brightness)
                }
                None => NO_DATA,
            };

            if z >= 0 && buffer.get(x as usize, z as usize) != color {
                buffer.set(x as usize, z as usize, color);
                updated = true;
            }
        }
    }

    updated
}

/// Rasterize one chunk into a tile buffer. Placeholder chunks clear the tile.
pub fn rasterize_chunk(
    chunk: &ChunkSnapshot,
    registry: &BlockRegistry,
    params: &RasterParameters,
    buffer: &mut PixelBuffer,
) -> bool {
    if chunk.is_placeholder() {
        return buffer.fill(NO_DATA);
    }
    let pos = chunk.pos();
    rasterize(chunk, registry, params, pos.min_block_x(), pos.min_block_z(), buffer)
}
