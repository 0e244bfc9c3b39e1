// src/config.rs
//! Configuration management: cave access, minimap and tile cache options

use crate::error::{MapError, Result};
use crate::world::WorldBounds;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which views may show caves. Replaces the server-pushed global toggles;
/// whoever receives the server payload updates this and hands it to the views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaveAccess {
    pub minimap_caves: bool,
    pub world_map_caves: bool,
    pub world_map_nether_caves: bool,
}

impl Default for CaveAccess {
    fn default() -> Self {
        Self {
            minimap_caves: true,
            world_map_caves: true,
            world_map_nether_caves: false,
        }
    }
}

impl CaveAccess {
    /// Whether the world map may slice below the surface in this dimension.
    pub fn world_map_allows(&self, bounds: &WorldBounds) -> bool {
        self.world_map_caves || (self.world_map_nether_caves && bounds.has_ceiling)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MinimapOptions {
    pub enabled: bool,
    /// 1..=5; larger values zoom in.
    pub map_scale: u32,
    /// 1..=4
    pub arrow_scale: u32,
    pub lock_north: bool,
    pub show_waypoints: bool,
    pub show_cardinal_directions: bool,
    pub outline: bool,
    pub outline_color: u32,
    /// Edge of the square of blocks rasterized around the viewer.
    pub view_distance: u32,
}

impl Default for MinimapOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            map_scale: 1,
            arrow_scale: 2,
            lock_north: true,
            show_waypoints: true,
            show_cardinal_directions: true,
            outline: true,
            outline_color: 0xFFFF_FFFF,
            view_distance: 128,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheOptions {
    /// Threads loading and rasterizing tiles.
    pub worker_threads: usize,
    /// How far (in tiles) neighbour prefetch may wander from its origin.
    pub prefetch_radius: i32,
    /// Resubmit failed tiles on the next request instead of leaving them blank.
    pub retry_failed: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            worker_threads: 4,
            prefetch_radius: 32,
            retry_failed: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MapConfig {
    pub caves: CaveAccess,
    pub minimap: MinimapOptions,
    pub cache: CacheOptions,
    /// Where per-save map data lives; `None` uses the config directory.
    pub storage_dir: Option<PathBuf>,
}

impl MapConfig {
    /// Load configuration from `$HOME/.config/voxel-map/config.json`,
    /// falling back to defaults when no file exists yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        Ok(config.sanitized())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn get_config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    fn config_dir() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| MapError::Config("HOME environment variable not set".to_string()))?;
        Ok(PathBuf::from(home).join(".config").join("voxel-map"))
    }

    /// Root for per-save map data such as persisted tiles.
    pub fn storage_root(&self) -> Result<PathBuf> {
        match &self.storage_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(Self::config_dir()?.join("saves")),
        }
    }

    /// Clamp numeric options into their valid ranges.
    pub fn sanitized(mut self) -> Self {
        self.minimap.map_scale = self.minimap.map_scale.clamp(1, 5);
        self.minimap.arrow_scale = self.minimap.arrow_scale.clamp(1, 4);
        self.minimap.view_distance = self.minimap.view_distance.clamp(16, 512);
        self.cache.worker_threads = self.cache.worker_threads.clamp(1, 64);
        self.cache.prefetch_radius = self.cache.prefetch_radius.max(1);
        self
    }
}
