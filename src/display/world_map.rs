// src/display/world_map.rs
//! Full-screen world map: pan/zoom state, tile population and overlays
//!
//! Screen positions relate to world blocks through one affine transform,
//! `screen = centre + drag_offset + scale * (world - viewer)`. Drawing uses it
//! forwards and hit testing uses its inverse, so both always agree.

use super::draw::{label_half_size, tile_size, DrawCommand, DrawList};
use super::viewer::{detect_surface, ViewerState};
use crate::config::CaveAccess;
use crate::map::{DrawSurface, RasterParameters, SaveReport, TileCache, TileCoordinate, TILE_SIZE};
use crate::waypoint::{Waypoint, WaypointList};
use crate::world::WorldBounds;
use glam::{DAffine2, DVec2};

const HOVER_COLOR: u32 = 0x33FF_FFFF;
const ARROW_SIZE: f64 = 15.0;
const MARKER_PAD: f64 = 2.0;

/// What a right click on the map refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum ContextTarget {
    Waypoint(Waypoint),
    Block { dimension: String, x: i32, y: i32, z: i32 },
}

fn in_range((min, max): (TileCoordinate, TileCoordinate), coord: TileCoordinate) -> bool {
    (min.x..=max.x).contains(&coord.x) && (min.y..=max.y).contains(&coord.y)
}

pub struct WorldMapView {
    width: f64,
    height: f64,
    drag_offset: DVec2,
    scale: f64,
    viewer: ViewerState,
    bounds: WorldBounds,
    caves: CaveAccess,
    caves_active: bool,
    at_surface: bool,
    cave_y: i32,
    slider: f64,
    arrow_scale: u32,
    show_waypoints: bool,
    initialized: bool,
    hovered_waypoint: Option<Waypoint>,
}

impl WorldMapView {
    pub fn new(width: u32, height: u32, bounds: WorldBounds, caves: CaveAccess, viewer: ViewerState) -> Self {
        let cave_y = viewer.block_y();
        Self {
            width: width as f64,
            height: height as f64,
            drag_offset: DVec2::ZERO,
            scale: 1.0,
            viewer,
            bounds,
            caves,
            caves_active: caves.world_map_allows(&bounds),
            at_surface: true,
            cave_y,
            slider: 0.0,
            arrow_scale: 2,
            show_waypoints: true,
            initialized: false,
            hovered_waypoint: None,
        }
    }

    pub fn with_arrow_scale(mut self, arrow_scale: u32) -> Self {
        self.arrow_scale = arrow_scale.clamp(1, 4);
        self
    }

    pub fn with_waypoints(mut self, show: bool) -> Self {
        self.show_waypoints = show;
        self
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width as f64;
        self.height = height as f64;
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn drag_offset(&self) -> DVec2 {
        self.drag_offset
    }

    pub fn viewer(&self) -> &ViewerState {
        &self.viewer
    }

    pub fn at_surface(&self) -> bool {
        self.at_surface
    }

    pub fn cave_y(&self) -> i32 {
        self.cave_y
    }

    pub fn hovered_waypoint(&self) -> Option<&Waypoint> {
        self.hovered_waypoint.as_ref()
    }

    fn origin(&self) -> DVec2 {
        DVec2::new(self.width / 2.0, self.height / 2.0) + self.drag_offset
    }

    /// World (x, z) to screen.
    pub fn transform(&self) -> DAffine2 {
        DAffine2::from_translation(self.origin())
            * DAffine2::from_scale(DVec2::splat(self.scale))
            * DAffine2::from_translation(-DVec2::new(self.viewer.x, self.viewer.z))
    }

    pub fn to_screen(&self, world: DVec2) -> DVec2 {
        self.transform().transform_point2(world)
    }

    pub fn to_world(&self, screen: DVec2) -> DVec2 {
        self.transform().inverse().transform_point2(screen)
    }

    /// Block column under a screen position.
    pub fn block_at(&self, screen: DVec2) -> (i32, i32) {
        let world = self.to_world(screen).floor();
        (world.x as i32, world.y as i32)
    }

    pub fn drag(&mut self, delta: DVec2) {
        self.drag_offset += delta;
    }

    /// Zoom by a factor of two around `cursor`, keeping the world point under
    /// it in place. Positive `delta` zooms in.
    pub fn scroll(&mut self, cursor: DVec2, delta: f64) {
        let centre = DVec2::new(self.width / 2.0, self.height / 2.0);
        let offset = self.origin();
        let mirrored = if delta > 0.0 {
            self.scale *= 2.0;
            offset - (cursor - offset)
        } else {
            self.scale /= 2.0;
            offset + (cursor - offset) / 2.0
        };
        self.drag_offset = mirrored - centre;
    }

    /// Tiles intersecting the viewport, as an inclusive corner pair.
    pub fn visible_range(&self) -> (TileCoordinate, TileCoordinate) {
        let a = self.to_world(DVec2::ZERO);
        let b = self.to_world(DVec2::new(self.width, self.height));
        let (min, max) = (a.min(b).floor(), a.max(b).floor());
        (
            TileCoordinate::from_block(min.x as i32, min.y as i32),
            TileCoordinate::from_block(max.x as i32, max.y as i32),
        )
    }

    pub fn is_visible(&self, coord: TileCoordinate) -> bool {
        in_range(self.visible_range(), coord)
    }

    pub fn raster_params(&self) -> RasterParameters {
        RasterParameters::for_world_map(self.cave_y, self.at_surface, &self.caves, &self.bounds)
    }

    fn collect_viewer_y(&mut self, cache: &TileCache) {
        self.at_surface = detect_surface(
            &self.viewer,
            cache.world().as_ref(),
            cache.registry(),
            self.caves.world_map_allows(&self.bounds),
        );
        self.cave_y = self.viewer.block_y();
    }

    /// Populate an empty cache: the viewer's tile and everything reachable from
    /// it through loaded chunks, then persisted tiles for the remaining gaps.
    /// A cache that already holds tiles is kept as is.
    pub fn open(&mut self, cache: &TileCache) -> usize {
        if !cache.is_empty() {
            self.initialized = true;
            return 0;
        }
        if !self.initialized {
            self.collect_viewer_y(cache);
        }
        self.initialized = true;
        cache.update_all(self.raster_params());

        let created = self.create_tiles(cache);
        let persisted = match cache.register_persisted() {
            Ok(count) => count,
            Err(e) => {
                log::error!("Failed to scan saved world map tiles: {}", e);
                0
            }
        };
        log::info!("World map opened with {} live and {} saved tiles", created, persisted);
        created + persisted
    }

    fn create_tiles(&self, cache: &TileCache) -> usize {
        let origin = TileCoordinate::from_block(self.viewer.block_x(), self.viewer.block_z());
        if !cache.world().is_loaded(origin.chunk_pos()) {
            return 0;
        }
        let existed = cache.contains(origin);
        cache.get_or_load(origin);
        let neighbours = cache.prefetch_neighbours(origin).len();
        neighbours + usize::from(!existed)
    }

    /// Move the viewer. Entering a tile the cache does not hold yet creates it
    /// and prefetches around it. Returns the number of tiles created.
    pub fn follow(&mut self, viewer: ViewerState, cache: &TileCache) -> usize {
        self.viewer = viewer;
        let origin = TileCoordinate::from_block(self.viewer.block_x(), self.viewer.block_z());
        if cache.contains(origin) {
            return 0;
        }
        self.create_tiles(cache)
    }

    /// Install finished loads and build this frame's draw list. Visible tiles
    /// that have not been loaded yet are requested.
    pub fn frame(
        &mut self,
        cache: &TileCache,
        surface: &mut dyn DrawSurface,
        mouse: DVec2,
        waypoints: &WaypointList,
    ) -> DrawList {
        cache.pump(surface);
        let mut list = DrawList::new();
        let transform = self.transform();

        let visible = self.visible_range();
        let mut coords = cache.coordinates();
        coords.retain(|c| in_range(visible, *c));
        coords.sort_by_key(|c| (c.y, c.x));
        for coord in coords {
            cache.get_or_load(coord);
            if let Some(handle) = cache.surface_handle(coord) {
                let (x, z) = coord.block_origin();
                list.push(DrawCommand::Surface {
                    handle,
                    size: tile_size(),
                    transform: transform * DAffine2::from_translation(DVec2::new(x as f64, z as f64)),
                });
            }
        }

        let (x, z) = self.block_at(mouse);
        let hovered = TileCoordinate::from_block(x, z);
        let (tx, tz) = hovered.block_origin();
        let min = transform.transform_point2(DVec2::new(tx as f64, tz as f64));
        let max = transform.transform_point2(DVec2::new((tx + TILE_SIZE) as f64, (tz + TILE_SIZE) as f64));
        list.push(DrawCommand::Fill {
            min,
            max,
            color: HOVER_COLOR,
        });
        list.push(DrawCommand::Outline {
            min,
            max,
            color: HOVER_COLOR,
        });

        self.draw_waypoints(&mut list, mouse, waypoints);

        list.push(DrawCommand::Arrow {
            center: self.origin(),
            heading: self.viewer.heading(),
            size: ARROW_SIZE * 0.5 * self.arrow_scale as f64,
        });
        list
    }

    fn draw_waypoints(&mut self, list: &mut DrawList, mouse: DVec2, waypoints: &WaypointList) {
        self.hovered_waypoint = None;
        if !self.show_waypoints {
            return;
        }
        for waypoint in waypoints.in_dimension(&self.viewer.dimension) {
            let center = self.to_screen(DVec2::new(waypoint.x + 1.0, waypoint.z + 1.0));
            let half_size = label_half_size(&waypoint.display, MARKER_PAD);
            list.push(DrawCommand::Label {
                center,
                half_size,
                background: waypoint.color,
                text: waypoint.display.clone(),
            });

            let (min, max) = (center - half_size, center + half_size);
            let inside = mouse.x >= min.x && mouse.y >= min.y && mouse.x < max.x && mouse.y < max.y;
            if self.hovered_waypoint.is_none() && inside {
                self.hovered_waypoint = Some(waypoint.clone());
                list.push(DrawCommand::Outline {
                    min,
                    max,
                    color: 0xFFFF_FFFF,
                });
            }
        }
    }

    /// Coordinates shown in the status line under the cursor.
    pub fn position_label(&self, mouse: DVec2, cache: &TileCache) -> String {
        let (x, z) = self.block_at(mouse);
        let y = cache.height_at(x, z).unwrap_or(self.bounds.min_y);
        format!("{}, {}, {}", x, y, z)
    }

    /// What a right click at `mouse` targets, using the hover state of the last frame.
    pub fn context_target(&self, mouse: DVec2, cache: &TileCache) -> ContextTarget {
        if let Some(waypoint) = &self.hovered_waypoint {
            return ContextTarget::Waypoint(waypoint.clone());
        }
        let (x, z) = self.block_at(mouse);
        ContextTarget::Block {
            dimension: self.viewer.dimension.clone(),
            x,
            y: cache.height_at(x, z).unwrap_or(self.bounds.min_y),
            z,
        }
    }

    /// Text of the cave slider.
    pub fn slider_label(&self) -> String {
        if self.slider == 0.0 {
            "Player Y".to_string()
        } else {
            (self.cave_y - 1).to_string()
        }
    }

    /// Move the cave slider. 0 follows the viewer, anything else slices at a
    /// fixed height between just below and just above the world.
    /// Ignored while caves are not allowed.
    pub fn set_slider(&mut self, value: f64, cache: &TileCache) {
        if !self.caves_active {
            return;
        }
        self.slider = value.clamp(0.0, 1.0);
        let min = (self.bounds.min_y - 1) as f64;
        let max = (self.bounds.max_y() + 1) as f64;
        self.cave_y = (min + (max - min) * self.slider) as i32;
        self.at_surface = false;
        if self.slider == 0.0 {
            self.collect_viewer_y(cache);
        }
        cache.update_all(self.raster_params());
    }

    /// Apply new cave permissions. Losing access flips the map to the surface;
    /// regaining it re-applies the slider.
    pub fn set_cave_access(&mut self, caves: CaveAccess, cache: &TileCache) {
        self.caves = caves;
        let allowed = caves.world_map_allows(&self.bounds);
        if allowed == self.caves_active {
            return;
        }
        self.caves_active = allowed;
        if allowed {
            self.set_slider(self.slider, cache);
        } else {
            self.at_surface = true;
            cache.update_all(self.raster_params());
        }
    }

    /// Persist every tile and free their surfaces.
    pub fn close(&mut self, cache: &TileCache, surface: &mut dyn DrawSurface) -> Option<SaveReport> {
        let report = match cache.store() {
            Some(_) => match cache.save_all() {
                Ok(report) => Some(report),
                Err(e) => {
                    log::error!("Failed to save world map: {}", e);
                    None
                }
            },
            None => None,
        };
        cache.release_all(surface);
        self.hovered_waypoint = None;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheOptions;
    use crate::map::{build_runtime, MemorySurface, TileStatus, TileStore};
    use crate::world::{BlockRegistry, ChunkPos, ChunkSnapshot, ChunkSource, MemoryWorld};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::runtime::Runtime;

    const WAIT: Duration = Duration::from_secs(10);

    fn view() -> WorldMapView {
        WorldMapView::new(
            800,
            600,
            WorldBounds::overworld(),
            CaveAccess::default(),
            ViewerState::new(8.5, 70.0, 8.5),
        )
    }

    fn flat_world(registry: &BlockRegistry, radius: i32) -> Arc<MemoryWorld> {
        let stone = registry.state("stone").unwrap();
        let world = MemoryWorld::new(WorldBounds::overworld());
        for cx in -radius..=radius {
            for cz in -radius..=radius {
                let pos = ChunkPos::new(cx, cz);
                let mut chunk = ChunkSnapshot::new(pos, WorldBounds::overworld());
                for x in 0..16 {
                    for z in 0..16 {
                        for y in 60..=64 {
                            chunk.set_block(pos.min_block_x() + x, y, pos.min_block_z() + z, stone, registry);
                        }
                    }
                }
                chunk.prime_client_heightmaps(registry);
                world.insert(chunk);
            }
        }
        Arc::new(world)
    }

    fn setup(radius: i32) -> (Runtime, TileCache) {
        let options = CacheOptions::default();
        let rt = build_runtime(&options).unwrap();
        let registry = Arc::new(BlockRegistry::standard());
        let world: Arc<dyn ChunkSource> = flat_world(&registry, radius);
        let cache = TileCache::new(world, registry, rt.handle().clone(), options, RasterParameters::surface());
        (rt, cache)
    }

    #[test]
    fn test_zoom_in_then_out_restores_view() {
        let mut view = view();
        view.drag(DVec2::new(30.0, -12.0));
        let cursor = DVec2::new(610.0, 140.0);
        let under_cursor = view.to_world(cursor);

        view.scroll(cursor, 1.0);
        assert_eq!(view.scale(), 2.0);
        assert!((view.to_world(cursor) - under_cursor).length() < 1e-9);
        view.scroll(cursor, -1.0);

        assert_eq!(view.scale(), 1.0);
        assert!((view.drag_offset() - DVec2::new(30.0, -12.0)).length() < 1e-9);
        assert!((view.to_world(cursor) - under_cursor).length() < 1e-9);
    }

    #[test]
    fn test_hit_testing_inverts_drawing() {
        let mut view = view();
        view.drag(DVec2::new(-40.0, 25.0));
        view.scroll(DVec2::new(100.0, 100.0), 1.0);

        let world = DVec2::new(-37.25, 112.5);
        let screen = view.to_screen(world);
        assert!((view.to_world(screen) - world).length() < 1e-9);

        // the viewer sits at the panned centre
        let centre = view.to_screen(DVec2::new(8.5, 8.5));
        assert!((centre - (DVec2::new(400.0, 300.0) + view.drag_offset())).length() < 1e-9);
    }

    #[test]
    fn test_block_at_floors_negative_coordinates() {
        let view = WorldMapView::new(
            100,
            100,
            WorldBounds::overworld(),
            CaveAccess::default(),
            ViewerState::new(0.0, 64.0, 0.0),
        );
        // half a block left of and above the viewer
        assert_eq!(view.block_at(DVec2::new(49.5, 49.5)), (-1, -1));
        assert_eq!(view.block_at(DVec2::new(50.5, 50.5)), (0, 0));
        let (min, max) = view.visible_range();
        assert_eq!((min.x, min.y), (-4, -4));
        assert_eq!((max.x, max.y), (3, 3));
    }

    #[test]
    fn test_open_populates_and_frame_draws_tiles() {
        let (_rt, cache) = setup(1);
        let mut view = view();
        let mut surface = MemorySurface::new();

        assert_eq!(view.open(&cache), 9);
        assert!(view.at_surface());
        assert!(cache.drain(&mut surface, WAIT));
        assert_eq!(cache.status(TileCoordinate::new(0, 0)), TileStatus::Ready);

        let list = view.frame(&cache, &mut surface, DVec2::new(400.0, 300.0), &WaypointList::new());
        assert_eq!(list.surfaces().count(), 9);
        assert!(list
            .commands
            .iter()
            .any(|c| matches!(c, DrawCommand::Fill { color, .. } if *color == HOVER_COLOR)));

        // a second open keeps what is there
        assert_eq!(view.open(&cache), 0);
    }

    #[test]
    fn test_frame_skips_tiles_outside_viewport() {
        let (_rt, cache) = setup(1);
        let mut view = view();
        let mut surface = MemorySurface::new();
        view.open(&cache);
        assert!(cache.drain(&mut surface, WAIT));

        // panned so far right that every cached tile is off screen
        view.drag(DVec2::new(5000.0, 0.0));
        let list = view.frame(&cache, &mut surface, DVec2::new(400.0, 300.0), &WaypointList::new());
        assert_eq!(list.surfaces().count(), 0);
        assert!(cache.coordinates().iter().all(|c| !view.is_visible(*c)));

        view.drag(DVec2::new(-5000.0, 0.0));
        let list = view.frame(&cache, &mut surface, DVec2::new(400.0, 300.0), &WaypointList::new());
        assert_eq!(list.surfaces().count(), 9);
    }

    #[test]
    fn test_follow_creates_tiles_once() {
        let (_rt, cache) = setup(0);
        let mut view = view();
        let mut surface = MemorySurface::new();
        assert_eq!(view.follow(ViewerState::new(3.0, 70.0, 3.0), &cache), 1);
        assert_eq!(view.follow(ViewerState::new(5.0, 70.0, 9.0), &cache), 0);
        // no chunk out there
        assert_eq!(view.follow(ViewerState::new(100.0, 70.0, 9.0), &cache), 0);
        assert!(cache.drain(&mut surface, WAIT));
    }

    #[test]
    fn test_cave_slider_and_access() {
        let (_rt, cache) = setup(0);
        let mut view = view();
        let mut surface = MemorySurface::new();
        view.open(&cache);
        assert!(cache.drain(&mut surface, WAIT));

        view.set_slider(0.5, &cache);
        assert_eq!(view.cave_y(), 127);
        assert_eq!(view.slider_label(), "126");
        assert!(!cache.params().surface_only);

        let no_caves = CaveAccess {
            world_map_caves: false,
            ..CaveAccess::default()
        };
        view.set_cave_access(no_caves, &cache);
        assert!(view.at_surface());
        assert!(cache.params().surface_only);
        view.set_slider(0.9, &cache);
        assert_eq!(view.cave_y(), 127);

        view.set_cave_access(CaveAccess::default(), &cache);
        assert!(!cache.params().surface_only);

        view.set_slider(0.0, &cache);
        assert_eq!(view.slider_label(), "Player Y");
        assert_eq!(view.cave_y(), 70);
        assert!(cache.drain(&mut surface, WAIT));
    }

    #[test]
    fn test_context_target() {
        let (_rt, cache) = setup(0);
        let mut view = view();
        let mut surface = MemorySurface::new();
        view.open(&cache);
        assert!(cache.drain(&mut surface, WAIT));

        let mut waypoints = WaypointList::new();
        waypoints.add(Waypoint::new("overworld", 20.0, 64.0, 20.0, "mine"));
        waypoints.add(Waypoint::new("the_nether", 20.0, 64.0, 20.0, "fort"));

        let marker = view.to_screen(DVec2::new(21.0, 21.0));
        let list = view.frame(&cache, &mut surface, marker, &waypoints);
        assert_eq!(list.labels().collect::<Vec<_>>(), vec!["M"]);
        assert_eq!(view.hovered_waypoint().map(|w| w.name.as_str()), Some("mine"));
        assert!(matches!(view.context_target(marker, &cache), ContextTarget::Waypoint(w) if w.name == "mine"));

        let block = view.to_screen(DVec2::new(4.5, 6.5));
        view.frame(&cache, &mut surface, block, &waypoints);
        assert_eq!(
            view.context_target(block, &cache),
            ContextTarget::Block {
                dimension: "overworld".to_string(),
                x: 4,
                y: 64,
                z: 6,
            }
        );
        assert_eq!(view.position_label(block, &cache), "4, 64, 6");
    }

    #[test]
    fn test_close_saves_and_releases() {
        let dir = tempfile::tempdir().unwrap();
        let (_rt, cache) = setup(0);
        let cache = cache.with_store(TileStore::for_save(dir.path()));
        let mut view = view();
        let mut surface = MemorySurface::new();
        view.open(&cache);
        assert!(cache.drain(&mut surface, WAIT));

        let report = view.close(&cache, &mut surface).unwrap();
        assert_eq!(report.saved, 1);
        assert!(cache.is_empty());
        assert_eq!(surface.live(), 0);
    }
}
