// src/display/minimap.rs
//! Minimap: a live raster around the viewer with waypoint and compass overlays

use super::draw::{label_half_size, DrawCommand, DrawList};
use super::viewer::{detect_surface, ViewerState};
use crate::config::{CaveAccess, MinimapOptions};
use crate::map::{rasterize, DrawSurface, PixelBuffer, RasterParameters, SurfaceHandle, TileCoordinate, WorldWindow};
use crate::waypoint::WaypointList;
use crate::world::{BlockRegistry, ChunkSource};
use glam::{DAffine2, DVec2};
use std::f64::consts::SQRT_2;
use std::time::{Duration, Instant};

/// Edge of the minimap on screen.
pub const MINIMAP_SIZE: f64 = 128.0;
const ARROW_SIZE: f64 = 15.0;
const MARKER_PAD: f64 = 2.0;
const CARDINAL_BACKGROUND: u32 = 0x7788_8888;

/// The minimap keeps no tile cache. Every update re-reads the square of
/// blocks around the viewer from the live world.
pub struct Minimap {
    options: MinimapOptions,
    caves: CaveAccess,
    position: DVec2,
    pixels: PixelBuffer,
    surface: Option<SurfaceHandle>,
    center: (i32, i32),
    at_surface: bool,
    update_duration: Option<Duration>,
}

impl Minimap {
    pub fn new(options: MinimapOptions, caves: CaveAccess) -> Self {
        let edge = options.view_distance.max(16) as usize;
        Self {
            options,
            caves,
            position: DVec2::new(10.0, 10.0),
            pixels: PixelBuffer::new(edge, edge),
            surface: None,
            center: (0, 0),
            at_surface: true,
            update_duration: None,
        }
    }

    pub fn options(&self) -> &MinimapOptions {
        &self.options
    }

    pub fn set_caves(&mut self, caves: CaveAccess) {
        self.caves = caves;
    }

    /// Top-left corner on screen.
    pub fn set_position(&mut self, position: DVec2) {
        self.position = position;
    }

    /// Anchor to the top-right corner of a screen `width` wide.
    pub fn anchor_top_right(&mut self, width: u32) {
        self.position = DVec2::new(width as f64 - MINIMAP_SIZE - 10.0, 10.0);
    }

    pub fn pixels(&self) -> &PixelBuffer {
        &self.pixels
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    pub fn at_surface(&self) -> bool {
        self.at_surface
    }

    /// How long the last update took; `None` while disabled.
    pub fn update_duration(&self) -> Option<Duration> {
        self.update_duration
    }

    fn half_width(&self) -> i32 {
        self.pixels.width() as i32 / 2
    }

    /// Re-rasterize around the viewer. The surface is only uploaded when a
    /// pixel changed. Returns whether one did.
    pub fn update(
        &mut self,
        viewer: &ViewerState,
        world: &dyn ChunkSource,
        registry: &BlockRegistry,
        surface: &mut dyn DrawSurface,
    ) -> bool {
        if !self.options.enabled {
            self.update_duration = None;
            return false;
        }
        let start = Instant::now();
        let (cx, cz) = (viewer.block_x(), viewer.block_z());
        self.center = (cx, cz);

        self.at_surface = detect_surface(viewer, world, registry, self.caves.minimap_caves);
        let params = RasterParameters::for_minimap(viewer.block_y(), self.at_surface, &self.caves, &world.bounds());
        let half = self.half_width();
        let window = WorldWindow::new(world);
        let updated = rasterize(&window, registry, &params, cx - half, cz - half, &mut self.pixels);

        match self.surface {
            Some(handle) if updated => surface.upload(handle, &self.pixels),
            Some(_) => {}
            None => self.surface = Some(surface.publish(TileCoordinate::from_block(cx, cz), &self.pixels)),
        }
        let elapsed = start.elapsed();
        self.update_duration = Some(elapsed);
        log::debug!("Minimap update took {:?} (changed: {})", elapsed, updated);
        updated
    }

    fn rotation(&self, viewer: &ViewerState) -> DAffine2 {
        if self.options.lock_north {
            DAffine2::IDENTITY
        } else {
            DAffine2::from_angle(-viewer.heading())
        }
    }

    fn centre(&self) -> DVec2 {
        self.position + DVec2::splat(MINIMAP_SIZE / 2.0)
    }

    /// World (x, z) to screen, rotated with the viewer unless locked north.
    pub fn transform(&self, viewer: &ViewerState) -> DAffine2 {
        let scale = SQRT_2 * self.options.map_scale as f64 * MINIMAP_SIZE / self.pixels.width() as f64;
        DAffine2::from_translation(self.centre())
            * self.rotation(viewer)
            * DAffine2::from_scale(DVec2::splat(scale))
            * DAffine2::from_translation(-DVec2::new(viewer.x, viewer.z))
    }

    /// World position under a screen point.
    pub fn to_world(&self, viewer: &ViewerState, screen: DVec2) -> DVec2 {
        self.transform(viewer).inverse().transform_point2(screen)
    }

    fn clamp_to_map(&self, point: DVec2) -> DVec2 {
        point.clamp(self.position, self.position + DVec2::splat(MINIMAP_SIZE))
    }

    pub fn frame(&self, viewer: &ViewerState, waypoints: &WaypointList) -> DrawList {
        let mut list = DrawList::new();
        if !self.options.enabled {
            return list;
        }
        let (min, max) = (self.position, self.position + DVec2::splat(MINIMAP_SIZE));
        let transform = self.transform(viewer);

        if let Some(handle) = self.surface {
            let half = self.half_width();
            let corner = DVec2::new((self.center.0 - half) as f64, (self.center.1 - half) as f64);
            list.push(DrawCommand::Scissor(Some((min, max))));
            list.push(DrawCommand::Surface {
                handle,
                size: DVec2::new(self.pixels.width() as f64, self.pixels.height() as f64),
                transform: transform * DAffine2::from_translation(corner),
            });
            list.push(DrawCommand::Scissor(None));
        }

        if self.options.outline {
            list.push(DrawCommand::Outline {
                min,
                max,
                color: self.options.outline_color,
            });
        }

        if self.options.show_waypoints {
            for waypoint in waypoints.in_dimension(&viewer.dimension) {
                let center = self.clamp_to_map(transform.transform_point2(DVec2::new(waypoint.x, waypoint.z)));
                list.push(DrawCommand::Label {
                    center,
                    half_size: label_half_size(&waypoint.display, MARKER_PAD),
                    background: waypoint.color,
                    text: waypoint.display.clone(),
                });
            }
        }

        if self.options.show_cardinal_directions {
            let around = DAffine2::from_translation(self.centre()) * self.rotation(viewer);
            for (label, offset) in [("N", (0.0, -1.0)), ("E", (1.0, 0.0)), ("S", (0.0, 1.0)), ("W", (-1.0, 0.0))] {
                let point = around.transform_point2(DVec2::new(offset.0, offset.1) * MINIMAP_SIZE);
                list.push(DrawCommand::Label {
                    center: self.clamp_to_map(point),
                    half_size: label_half_size(label, MARKER_PAD) * 0.5,
                    background: CARDINAL_BACKGROUND,
                    text: label.to_string(),
                });
            }
        }

        let heading = if self.options.lock_north { viewer.heading() } else { 0.0 };
        list.push(DrawCommand::Arrow {
            center: self.centre(),
            heading,
            size: ARROW_SIZE * 0.5 * self.options.arrow_scale as f64,
        });
        list
    }

    /// Free the minimap's surface.
    pub fn release(&mut self, surface: &mut dyn DrawSurface) {
        if let Some(handle) = self.surface.take() {
            surface.release(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::MemorySurface;
    use crate::waypoint::Waypoint;
    use crate::world::{Brightness, ChunkPos, ChunkSnapshot, MapColor, MemoryWorld, WorldBounds};

    fn flat_world(registry: &BlockRegistry) -> MemoryWorld {
        let grass = registry.state("grass_block").unwrap();
        let world = MemoryWorld::new(WorldBounds::overworld());
        for cx in -1..=0 {
            for cz in -1..=0 {
                let pos = ChunkPos::new(cx, cz);
                let mut chunk = ChunkSnapshot::new(pos, WorldBounds::overworld());
                for x in 0..16 {
                    for z in 0..16 {
                        chunk.set_block(pos.min_block_x() + x, 64, pos.min_block_z() + z, grass, registry);
                    }
                }
                chunk.prime_client_heightmaps(registry);
                world.insert(chunk);
            }
        }
        world
    }

    fn options() -> MinimapOptions {
        MinimapOptions {
            view_distance: 64,
            ..MinimapOptions::default()
        }
    }

    #[test]
    fn test_update_rasterizes_live_world() {
        let registry = BlockRegistry::standard();
        let world = flat_world(&registry);
        let mut surface = MemorySurface::new();
        let mut minimap = Minimap::new(options(), CaveAccess::default());
        let viewer = ViewerState::new(0.5, 65.0, 0.5);

        assert!(minimap.update(&viewer, &world, &registry, &mut surface));
        assert!(minimap.at_surface());
        assert!(minimap.update_duration().is_some());
        assert_eq!(surface.publishes, 1);

        // 16 blocks either side of the viewer are loaded, the rest is empty
        let pixels = minimap.pixels();
        assert_eq!(pixels.width(), 64);
        assert_eq!(pixels.get(32, 32), MapColor::GRASS.argb(Brightness::Normal));
        assert_eq!(pixels.get(0, 0), 0);

        // nothing moved: no upload
        assert!(!minimap.update(&viewer, &world, &registry, &mut surface));
        assert_eq!(surface.uploads, 0);
    }

    #[test]
    fn test_disabled_minimap_does_nothing() {
        let registry = BlockRegistry::standard();
        let world = flat_world(&registry);
        let mut surface = MemorySurface::new();
        let options = MinimapOptions {
            enabled: false,
            ..options()
        };
        let mut minimap = Minimap::new(options, CaveAccess::default());
        let viewer = ViewerState::new(0.5, 65.0, 0.5);
        assert!(!minimap.update(&viewer, &world, &registry, &mut surface));
        assert!(minimap.update_duration().is_none());
        assert!(minimap.frame(&viewer, &WaypointList::new()).commands.is_empty());
    }

    #[test]
    fn test_rotation_round_trips() {
        let options = MinimapOptions {
            lock_north: false,
            map_scale: 2,
            ..options()
        };
        let minimap = Minimap::new(options, CaveAccess::default());
        let mut viewer = ViewerState::new(10.0, 64.0, -4.0);
        viewer.yaw = 37.0;

        let world = DVec2::new(14.0, 2.5);
        let screen = minimap.transform(&viewer).transform_point2(world);
        assert!((minimap.to_world(&viewer, screen) - world).length() < 1e-9);

        // the viewer is always at the centre
        let centre = minimap.transform(&viewer).transform_point2(DVec2::new(10.0, -4.0));
        assert!((centre - DVec2::new(74.0, 74.0)).length() < 1e-9);
    }

    #[test]
    fn test_yaw_zero_faces_down_the_map() {
        // facing south (+z): the rotated map puts south at the top
        let options = MinimapOptions {
            lock_north: false,
            ..options()
        };
        let minimap = Minimap::new(options, CaveAccess::default());
        let viewer = ViewerState::new(0.0, 64.0, 0.0);
        let ahead = minimap.transform(&viewer).transform_point2(DVec2::new(0.0, 10.0));
        assert!(ahead.y < 74.0);
        assert!((ahead.x - 74.0).abs() < 1e-9);
    }

    #[test]
    fn test_overlays_are_clamped_to_the_map() {
        let minimap = Minimap::new(options(), CaveAccess::default());
        let viewer = ViewerState::new(0.0, 64.0, 0.0);
        let mut waypoints = WaypointList::new();
        waypoints.add(Waypoint::new("overworld", 5000.0, 64.0, 0.0, "far"));

        let list = minimap.frame(&viewer, &waypoints);
        let labels: Vec<(String, DVec2)> = list
            .commands
            .iter()
            .filter_map(|c| match c {
                DrawCommand::Label { text, center, .. } => Some((text.clone(), *center)),
                _ => None,
            })
            .collect();

        assert_eq!(labels.len(), 5);
        assert_eq!(labels[0], ("F".to_string(), DVec2::new(138.0, 74.0)));
        let north = labels.iter().find(|(t, _)| t == "N").unwrap();
        assert_eq!(north.1, DVec2::new(74.0, 10.0));
        let west = labels.iter().find(|(t, _)| t == "W").unwrap();
        assert_eq!(west.1, DVec2::new(10.0, 74.0));
        assert!(list
            .commands
            .iter()
            .any(|c| matches!(c, DrawCommand::Arrow { heading, .. } if (*heading - std::f64::consts::PI).abs() < 1e-9)));
    }
}
