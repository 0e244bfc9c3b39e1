// src/main.rs
//! Voxel Map - render world maps and minimaps of a demo voxel world

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glam::DVec2;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use voxel_map::display::{composite, MINIMAP_SIZE};
use voxel_map::map::{build_runtime, codec, rasterize_chunk, store, MemorySurface, PixelBuffer, RasterParameters};
use voxel_map::world::{ChunkPos, SyntheticWorld, WorldBounds};
use voxel_map::*;

const LOAD_TIMEOUT: Duration = Duration::from_secs(60);
const BACKGROUND: u32 = 0xFF10_1010;

#[derive(Parser)]
#[command(name = "voxel-map", about = "Top-down maps of voxel worlds")]
struct Cli {
    /// Config file (defaults to ~/.config/voxel-map/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render the world map of a generated world to a PNG, persisting its tiles
    Render {
        #[arg(long, default_value_t = 1)]
        seed: u32,
        /// Viewer block position
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        x: i32,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        z: i32,
        /// Loaded chunk radius around the viewer
        #[arg(long, default_value_t = 8)]
        radius: i32,
        #[arg(long, default_value_t = 800)]
        width: u32,
        #[arg(long, default_value_t = 600)]
        height: u32,
        /// Zoom steps; negative zooms out
        #[arg(long, default_value_t = 1, allow_hyphen_values = true)]
        zoom: i32,
        /// Cave slider position in 0..=1; 0 follows the viewer
        #[arg(long)]
        cave_slider: Option<f64>,
        /// Save directory holding `worldmap/` and `waypoints.json`
        #[arg(long)]
        save: Option<PathBuf>,
        #[arg(long, short, default_value = "worldmap.png")]
        output: PathBuf,
    },
    /// Render the minimap around a viewer to a PNG
    Minimap {
        #[arg(long, default_value_t = 1)]
        seed: u32,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        x: i32,
        #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
        z: i32,
        /// Viewer height; defaults to standing on the terrain
        #[arg(long, allow_hyphen_values = true)]
        y: Option<i32>,
        /// Facing, degrees
        #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
        yaw: f32,
        #[arg(long, default_value_t = 8)]
        radius: i32,
        #[arg(long, short, default_value = "minimap.png")]
        output: PathBuf,
    },
    /// Decode a tile file and print what it holds
    Inspect {
        file: PathBuf,
        /// Also write the tile's surface raster as a PNG
        #[arg(long)]
        png: Option<PathBuf>,
    },
    /// Print the effective configuration, optionally writing it back
    Config {
        #[arg(long)]
        write: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => MapConfig::load_from(path).with_context(|| format!("loading {}", path.display()))?,
        None => MapConfig::load().unwrap_or_default(),
    };

    match cli.command {
        Command::Render {
            seed,
            x,
            z,
            radius,
            width,
            height,
            zoom,
            cave_slider,
            save,
            output,
        } => {
            let save = match save {
                Some(dir) => dir,
                None => config.storage_root()?.join(format!("seed-{}", seed)),
            };
            let args = RenderArgs {
                seed,
                x,
                z,
                radius,
                width,
                height,
                zoom,
                cave_slider,
            };
            render_world_map(&config, &args, &save, &output)
        }
        Command::Minimap {
            seed,
            x,
            z,
            y,
            yaw,
            radius,
            output,
        } => render_minimap(&config, seed, (x, y, z), yaw, radius, &output),
        Command::Inspect { file, png } => inspect(&file, png.as_deref()),
        Command::Config { write } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if write {
                match &cli.config {
                    Some(path) => config.save_to(path)?,
                    None => config.save()?,
                }
                println!("Configuration saved");
            }
            Ok(())
        }
    }
}

struct RenderArgs {
    seed: u32,
    x: i32,
    z: i32,
    radius: i32,
    width: u32,
    height: u32,
    zoom: i32,
    cave_slider: Option<f64>,
}

fn demo_world(seed: u32, radius: i32, x: i32, z: i32, store: Option<&TileStore>) -> (Arc<BlockRegistry>, Arc<SyntheticWorld>) {
    let registry = Arc::new(BlockRegistry::standard());
    let mut world = SyntheticWorld::new(seed, Arc::clone(&registry), radius);
    if let Some(store) = store {
        world = world.with_unload_hook(store.unload_hook());
    }
    let world = Arc::new(world);
    world.set_center(ChunkPos::containing(x, z));
    (registry, world)
}

fn render_world_map(config: &MapConfig, args: &RenderArgs, save: &Path, output: &Path) -> Result<()> {
    let store = TileStore::for_save(save);
    let (registry, world) = demo_world(args.seed, args.radius, args.x, args.z, Some(&store));
    let runtime = build_runtime(&config.cache).context("starting tile workers")?;
    let cache = TileCache::new(
        world.clone(),
        registry,
        runtime.handle().clone(),
        config.cache.clone(),
        RasterParameters::surface(),
    )
    .with_store(store);

    let ground = world.terrain_height(args.x, args.z) + 1;
    let viewer = ViewerState::new(args.x as f64 + 0.5, ground as f64, args.z as f64 + 0.5);
    let mut view = WorldMapView::new(args.width, args.height, world.bounds(), config.caves, viewer)
        .with_arrow_scale(config.minimap.arrow_scale)
        .with_waypoints(config.minimap.show_waypoints);
    let waypoints = WaypointList::load(&save.join("waypoints.json"))?;
    let mut surface = MemorySurface::new();

    let centre = DVec2::new(args.width as f64 / 2.0, args.height as f64 / 2.0);
    for _ in 0..args.zoom.unsigned_abs() {
        view.scroll(centre, args.zoom.signum() as f64);
    }

    println!("Opening world map with {} tiles registered", view.open(&cache));
    if let Some(value) = args.cave_slider {
        view.set_slider(value, &cache);
        println!("Cave slice: {}", view.slider_label());
    }
    if !cache.drain(&mut surface, LOAD_TIMEOUT) {
        log::warn!("Tiles still loading after {:?}", LOAD_TIMEOUT);
    }

    // the first frame requests visible saved tiles
    view.frame(&cache, &mut surface, centre, &waypoints);
    cache.drain(&mut surface, LOAD_TIMEOUT);
    let list = view.frame(&cache, &mut surface, centre, &waypoints);

    let image = composite(&list, &surface, args.width, args.height, BACKGROUND);
    image
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote {}", output.display());
    println!("Under the cursor: {}", view.position_label(centre, &cache));

    let stats = cache.stats();
    println!(
        "Tiles: {} ready, {} failed, {} idle; {} chunk fetches, {} disk reads",
        stats.ready, stats.failed, stats.idle, stats.chunk_fetches, stats.disk_reads
    );

    if let Some(report) = view.close(&cache, &mut surface) {
        println!(
            "Saved {} tiles to {} ({} skipped, {} failed)",
            report.saved,
            save.display(),
            report.skipped,
            report.failed
        );
    }
    Ok(())
}

fn render_minimap(
    config: &MapConfig,
    seed: u32,
    (x, y, z): (i32, Option<i32>, i32),
    yaw: f32,
    radius: i32,
    output: &Path,
) -> Result<()> {
    let (registry, world) = demo_world(seed, radius, x, z, None);
    let y = y.unwrap_or_else(|| world.terrain_height(x, z) + 1);
    let mut viewer = ViewerState::new(x as f64 + 0.5, y as f64, z as f64 + 0.5);
    viewer.yaw = yaw;

    let mut minimap = Minimap::new(config.minimap.clone(), config.caves);
    let mut surface = MemorySurface::new();
    minimap.update(&viewer, world.as_ref(), &registry, &mut surface);
    if let Some(duration) = minimap.update_duration() {
        println!(
            "Minimap updated in {:?} ({})",
            duration,
            if minimap.at_surface() { "surface" } else { "caves" }
        );
    }

    let size = (MINIMAP_SIZE + 20.0) as u32;
    let list = minimap.frame(&viewer, &WaypointList::new());
    let image = composite(&list, &surface, size, size, BACKGROUND);
    image
        .save(output)
        .with_context(|| format!("writing {}", output.display()))?;
    println!("Wrote {}", output.display());
    Ok(())
}

fn inspect(file: &Path, png: Option<&Path>) -> Result<()> {
    let registry = BlockRegistry::standard();
    let chunk = codec::read_file(file, &WorldBounds::overworld(), &registry)
        .with_context(|| format!("reading {}", file.display()))?;

    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    match store::parse_file_name(name) {
        Ok(coord) if coord.chunk_pos() != chunk.pos() => {
            println!("Warning: file name says {} but the tile holds chunk {:?}", coord, chunk.pos())
        }
        Ok(_) => {}
        Err(e) => println!("Warning: {}", e),
    }

    println!("Chunk: {:?}", chunk.pos());
    if chunk.is_placeholder() {
        println!("Placeholder (section count did not match the world)");
        return Ok(());
    }
    let filled = chunk.sections().iter().filter(|s| !s.has_only_air()).count();
    println!("Sections: {} ({} with blocks)", chunk.sections().len(), filled);
    for kind in chunk.heightmaps().keys() {
        println!("Heightmap: {:?}", kind);
    }
    let min = chunk.pos();
    println!(
        "Surface at corner: {}",
        chunk.surface_height(min.min_block_x(), min.min_block_z())
    );

    if let Some(path) = png {
        let mut pixels = PixelBuffer::new(16, 16);
        rasterize_chunk(&chunk, &registry, &RasterParameters::surface(), &mut pixels);
        pixels
            .to_rgba_image()
            .save(path)
            .with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}
