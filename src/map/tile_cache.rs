// src/map/tile_cache.rs
//! Tile cache: background loading, neighbour prefetch, persistence and resource release
//!
//! Loads and re-rasterizations run on the tokio blocking pool. Their results
//! come back over a channel and are only attached to drawable surfaces when the
//! render thread calls [`TileCache::pump`].

use super::coords::TileCoordinate;
use super::raster::{rasterize_chunk, sample_column, PixelBuffer, RasterParameters, WorldWindow};
use super::store::{self, TileStore};
use super::surface::{DrawSurface, SurfaceHandle};
use super::tile::Tile;
use crate::config::CacheOptions;
use crate::error::{MapError, Result};
use crate::world::{BlockRegistry, ChunkSnapshot, ChunkSource};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::runtime::{Handle, Runtime};
use tokio::sync::watch;

/// Neighbour offsets in the order prefetch discovers them.
const NEIGHBOURS: [(i32, i32); 8] = [(-1, -1), (-1, 0), (-1, 1), (0, 1), (1, 1), (1, 0), (1, -1), (0, -1)];

/// Build the worker runtime tile loads run on.
pub fn build_runtime(options: &CacheOptions) -> std::io::Result<Runtime> {
    let threads = options.worker_threads.max(1);
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(threads)
        .max_blocking_threads(threads)
        .thread_name("tile-worker")
        .enable_all()
        .build()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileStatus {
    /// No entry for the coordinate.
    Absent,
    /// Registered but never submitted.
    Idle,
    Loading,
    Ready,
    /// The load produced nothing; stays blank unless retried.
    Failed,
    Released,
}

impl TileStatus {
    pub fn is_settled(self) -> bool {
        !matches!(self, TileStatus::Idle | TileStatus::Loading)
    }
}

/// Where an entry's chunk comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileSource {
    World,
    Disk(PathBuf),
}

enum EntryState {
    Idle,
    Loading,
    Ready(Tile),
    Failed(String),
    Released,
}

impl EntryState {
    fn status(&self) -> TileStatus {
        match self {
            EntryState::Idle => TileStatus::Idle,
            EntryState::Loading => TileStatus::Loading,
            EntryState::Ready(_) => TileStatus::Ready,
            EntryState::Failed(_) => TileStatus::Failed,
            EntryState::Released => TileStatus::Released,
        }
    }
}

struct Slot {
    state: EntryState,
    source: TileSource,
}

struct TileEntry {
    slot: Mutex<Slot>,
    status: watch::Sender<TileStatus>,
}

impl TileEntry {
    fn new(source: TileSource) -> Arc<Self> {
        let (status, _) = watch::channel(TileStatus::Idle);
        Arc::new(Self {
            slot: Mutex::new(Slot {
                state: EntryState::Idle,
                source,
            }),
            status,
        })
    }

    fn set(&self, slot: &mut Slot, state: EntryState) {
        slot.state = state;
        self.status.send_replace(slot.state.status());
    }

    fn ready_chunk(&self) -> Option<Arc<ChunkSnapshot>> {
        let slot = self.slot.lock().unwrap();
        match &slot.state {
            EntryState::Ready(tile) => Some(Arc::clone(tile.chunk())),
            _ => None,
        }
    }
}

/// Handle on a requested tile; resolves once the render thread has installed
/// the result (or recorded the failure).
pub struct LoadTicket {
    coord: TileCoordinate,
    status: watch::Receiver<TileStatus>,
}

impl LoadTicket {
    pub fn coord(&self) -> TileCoordinate {
        self.coord
    }

    pub fn status(&self) -> TileStatus {
        *self.status.borrow()
    }

    /// Wait until the tile is ready, failed or released.
    pub async fn settled(&mut self) -> TileStatus {
        match self.status.wait_for(|status| status.is_settled()).await {
            Ok(status) => *status,
            Err(_) => TileStatus::Released,
        }
    }
}

enum Completion {
    Loaded {
        coord: TileCoordinate,
        generation: u64,
        result: Result<Option<Tile>>,
    },
    Rerasterized {
        coord: TileCoordinate,
        generation: u64,
        /// `None` when nothing changed.
        pixels: Option<PixelBuffer>,
    },
}

/// Outcome of [`TileCache::save_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveReport {
    pub saved: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub idle: usize,
    pub loading: usize,
    pub ready: usize,
    pub failed: usize,
    pub chunk_fetches: usize,
    pub disk_reads: usize,
    pub disk_tiles: usize,
    pub disk_size_mb: f64,
}

pub struct TileCache {
    world: Arc<dyn ChunkSource>,
    registry: Arc<BlockRegistry>,
    runtime: Handle,
    options: CacheOptions,
    store: Option<TileStore>,
    entries: RwLock<HashMap<TileCoordinate, Arc<TileEntry>>>,
    params: RwLock<RasterParameters>,
    generation: AtomicU64,
    completions: Sender<Completion>,
    inbox: Mutex<Receiver<Completion>>,
    in_flight: AtomicUsize,
    chunk_fetches: Arc<AtomicUsize>,
    disk_reads: Arc<AtomicUsize>,
}

impl TileCache {
    pub fn new(
        world: Arc<dyn ChunkSource>,
        registry: Arc<BlockRegistry>,
        runtime: Handle,
        options: CacheOptions,
        params: RasterParameters,
    ) -> Self {
        let (completions, inbox) = mpsc::channel();
        Self {
            world,
            registry,
            runtime,
            options,
            store: None,
            entries: RwLock::new(HashMap::new()),
            params: RwLock::new(params),
            generation: AtomicU64::new(0),
            completions,
            inbox: Mutex::new(inbox),
            in_flight: AtomicUsize::new(0),
            chunk_fetches: Arc::new(AtomicUsize::new(0)),
            disk_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Persist tiles in `store`.
    pub fn with_store(mut self, store: TileStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn world(&self) -> &Arc<dyn ChunkSource> {
        &self.world
    }

    pub fn registry(&self) -> &Arc<BlockRegistry> {
        &self.registry
    }

    pub fn store(&self) -> Option<&TileStore> {
        self.store.as_ref()
    }

    pub fn params(&self) -> RasterParameters {
        *self.params.read().unwrap()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, coord: TileCoordinate) -> bool {
        self.entries.read().unwrap().contains_key(&coord)
    }

    pub fn coordinates(&self) -> Vec<TileCoordinate> {
        self.entries.read().unwrap().keys().copied().collect()
    }

    pub fn status(&self, coord: TileCoordinate) -> TileStatus {
        match self.entry(coord) {
            Some(entry) => *entry.status.borrow(),
            None => TileStatus::Absent,
        }
    }

    /// Loads submitted or re-rasterizations whose results have not been pumped yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn chunk_fetches(&self) -> usize {
        self.chunk_fetches.load(Ordering::SeqCst)
    }

    fn entry(&self, coord: TileCoordinate) -> Option<Arc<TileEntry>> {
        self.entries.read().unwrap().get(&coord).cloned()
    }

    fn snapshot(&self) -> Vec<(TileCoordinate, Arc<TileEntry>)> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|(coord, entry)| (*coord, Arc::clone(entry)))
            .collect()
    }

    fn insert_if_absent(&self, coord: TileCoordinate, source: TileSource) -> Arc<TileEntry> {
        let mut entries = self.entries.write().unwrap();
        Arc::clone(entries.entry(coord).or_insert_with(|| TileEntry::new(source)))
    }

    /// Return the tile at `coord`, starting a background load if it has none yet.
    /// Repeated calls while a load is running never start a second one.
    pub fn get_or_load(&self, coord: TileCoordinate) -> LoadTicket {
        let entry = match self.entry(coord) {
            Some(entry) => entry,
            None => self.insert_if_absent(coord, TileSource::World),
        };
        self.submit(coord, &entry, self.options.retry_failed);
        LoadTicket {
            coord,
            status: entry.status.subscribe(),
        }
    }

    /// Resubmit a failed tile, reading it from the live world. Returns whether a load started.
    pub fn retry(&self, coord: TileCoordinate) -> bool {
        match self.entry(coord) {
            Some(entry) => self.submit(coord, &entry, true),
            None => false,
        }
    }

    fn submit(&self, coord: TileCoordinate, entry: &TileEntry, retry_failed: bool) -> bool {
        let mut slot = entry.slot.lock().unwrap();
        match slot.state {
            EntryState::Idle => {}
            EntryState::Failed(_) if retry_failed => {
                slot.source = TileSource::World;
            }
            _ => return false,
        }
        entry.set(&mut slot, EntryState::Loading);
        let source = slot.source.clone();
        drop(slot);

        self.spawn_load(coord, source);
        true
    }

    fn spawn_load(&self, coord: TileCoordinate, source: TileSource) {
        let generation = self.generation.load(Ordering::SeqCst);
        let params = self.params();
        let world = Arc::clone(&self.world);
        let registry = Arc::clone(&self.registry);
        let completions = self.completions.clone();
        let chunk_fetches = Arc::clone(&self.chunk_fetches);
        let disk_reads = Arc::clone(&self.disk_reads);

        log::debug!("Loading tile {} from {:?}", coord, source);
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.runtime.spawn_blocking(move || {
            let load = panic::catch_unwind(AssertUnwindSafe(|| {
                let chunk = match &source {
                    TileSource::World => {
                        chunk_fetches.fetch_add(1, Ordering::SeqCst);
                        Ok(world.chunk(coord.chunk_pos()))
                    }
                    TileSource::Disk(path) => {
                        disk_reads.fetch_add(1, Ordering::SeqCst);
                        store::load_file(path, coord, &world.bounds(), &registry).map(|c| Some(Arc::new(c)))
                    }
                };
                chunk.map(|chunk| chunk.map(|chunk| Tile::rasterize(coord, chunk, &registry, &params)))
            }));
            let result = load.unwrap_or_else(|payload| Err(worker_panic(coord, payload)));
            let _ = completions.send(Completion::Loaded {
                coord,
                generation,
                result,
            });
        });
    }

    fn spawn_rerasterize(&self, coord: TileCoordinate, entry: &TileEntry) {
        let job = {
            let slot = entry.slot.lock().unwrap();
            match &slot.state {
                EntryState::Ready(tile) => Some((Arc::clone(tile.chunk()), tile.pixels().clone())),
                _ => None,
            }
        };
        let Some((chunk, mut pixels)) = job else {
            return;
        };

        let generation = self.generation.load(Ordering::SeqCst);
        let params = self.params();
        let registry = Arc::clone(&self.registry);
        let completions = self.completions.clone();

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.runtime.spawn_blocking(move || {
            let redraw = AssertUnwindSafe(|| rasterize_chunk(&chunk, &registry, &params, &mut pixels));
            let changed = panic::catch_unwind(redraw).unwrap_or_else(|payload| {
                log::error!("{}", worker_panic(coord, payload));
                false
            });
            let _ = completions.send(Completion::Rerasterized {
                coord,
                generation,
                pixels: changed.then_some(pixels),
            });
        });
    }

    /// Create entries for every absent tile reachable from `origin` through
    /// loaded chunks, then start their loads. The walk is depth first and
    /// descends into the most recently discovered neighbour first. Persisted
    /// tiles that have not been loaded yet give way to the live chunk.
    /// Returns the tiles created, in creation order.
    pub fn prefetch_neighbours(&self, origin: TileCoordinate) -> Vec<TileCoordinate> {
        let mut created = Vec::new();
        let mut stack = vec![origin];

        while let Some(tile) = stack.pop() {
            for (dx, dy) in NEIGHBOURS {
                let neighbour = tile.offset(dx, dy);
                if neighbour == origin
                    || neighbour.distance(origin) > self.options.prefetch_radius
                    || !self.world.is_loaded(neighbour.chunk_pos())
                {
                    continue;
                }
                if self.claim_for_world(neighbour) {
                    created.push(neighbour);
                    stack.push(neighbour);
                }
            }
        }

        for coord in &created {
            if let Some(entry) = self.entry(*coord) {
                self.submit(*coord, &entry, false);
            }
        }
        log::debug!("Prefetch from {} created {} tiles", origin, created.len());
        created
    }

    fn claim_for_world(&self, coord: TileCoordinate) -> bool {
        let mut entries = self.entries.write().unwrap();
        match entries.get(&coord) {
            None => {
                entries.insert(coord, TileEntry::new(TileSource::World));
                true
            }
            Some(entry) => {
                let mut slot = entry.slot.lock().unwrap();
                if matches!(slot.state, EntryState::Idle) && matches!(slot.source, TileSource::Disk(_)) {
                    slot.source = TileSource::World;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Register every persisted tile not already in the cache. Nothing is read
    /// until the tile is requested.
    pub fn register_persisted(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let files = store.scan()?;
        let mut entries = self.entries.write().unwrap();
        let mut registered = 0;
        for (coord, path) in files {
            if !entries.contains_key(&coord) {
                entries.insert(coord, TileEntry::new(TileSource::Disk(path)));
                registered += 1;
            }
        }
        log::debug!("Registered {} persisted tiles", registered);
        Ok(registered)
    }

    /// Apply new view parameters: every ready tile is re-rasterized from its
    /// kept chunk. Nothing is fetched again.
    pub fn update_all(&self, params: RasterParameters) {
        *self.params.write().unwrap() = params;
        self.generation.fetch_add(1, Ordering::SeqCst);
        for (coord, entry) in self.snapshot() {
            self.spawn_rerasterize(coord, &entry);
        }
    }

    /// Install finished work. Must be called from the thread that owns `surface`.
    /// Returns the number of results applied.
    pub fn pump(&self, surface: &mut dyn DrawSurface) -> usize {
        let completions: Vec<Completion> = self.inbox.lock().unwrap().try_iter().collect();
        let applied = completions.len();
        for completion in completions {
            self.apply(completion, surface);
        }
        applied
    }

    /// Pump until nothing is in flight or `timeout` passes. Returns whether everything settled.
    pub fn drain(&self, surface: &mut dyn DrawSurface, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.pump(surface);
            if self.in_flight() == 0 {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let next = self.inbox.lock().unwrap().recv_timeout(deadline - now);
            match next {
                Ok(completion) => self.apply(completion, surface),
                Err(RecvTimeoutError::Timeout) => return false,
                Err(RecvTimeoutError::Disconnected) => return true,
            }
        }
    }

    fn apply(&self, completion: Completion, surface: &mut dyn DrawSurface) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match completion {
            Completion::Loaded {
                coord,
                generation,
                result,
            } => {
                let Some(entry) = self.entry(coord) else {
                    log::debug!("Dropping load of released tile {}", coord);
                    return;
                };
                let mut slot = entry.slot.lock().unwrap();
                if !matches!(slot.state, EntryState::Loading) {
                    return;
                }
                match result {
                    Ok(Some(mut tile)) => {
                        tile.publish(surface);
                        entry.set(&mut slot, EntryState::Ready(tile));
                        drop(slot);
                        if generation != self.generation.load(Ordering::SeqCst) {
                            self.spawn_rerasterize(coord, &entry);
                        }
                    }
                    Ok(None) => {
                        log::debug!("No chunk for tile {}", coord);
                        entry.set(&mut slot, EntryState::Failed("chunk not loaded".to_string()));
                    }
                    Err(e) => {
                        log::warn!("Failed to load tile at {}: {}", coord, e);
                        entry.set(&mut slot, EntryState::Failed(e.to_string()));
                    }
                }
            }
            Completion::Rerasterized {
                coord,
                generation,
                pixels,
            } => {
                // a newer pass is already queued for this tile
                if generation != self.generation.load(Ordering::SeqCst) {
                    return;
                }
                let (Some(entry), Some(pixels)) = (self.entry(coord), pixels) else {
                    return;
                };
                let mut slot = entry.slot.lock().unwrap();
                if let EntryState::Ready(tile) = &mut slot.state {
                    tile.replace_pixels(pixels, surface);
                }
            }
        }
    }

    /// Why a tile failed, if it did.
    pub fn failure(&self, coord: TileCoordinate) -> Option<String> {
        let entry = self.entry(coord)?;
        let slot = entry.slot.lock().unwrap();
        match &slot.state {
            EntryState::Failed(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    pub fn with_tile<R>(&self, coord: TileCoordinate, f: impl FnOnce(&Tile) -> R) -> Option<R> {
        let entry = self.entry(coord)?;
        let slot = entry.slot.lock().unwrap();
        match &slot.state {
            EntryState::Ready(tile) => Some(f(tile)),
            _ => None,
        }
    }

    pub fn surface_handle(&self, coord: TileCoordinate) -> Option<SurfaceHandle> {
        self.with_tile(coord, Tile::surface).flatten()
    }

    /// Y of the column the map shows at a block, read from the cached tile's
    /// chunk when there is one and from the live world otherwise.
    pub fn height_at(&self, x: i32, z: i32) -> Option<i32> {
        let params = self.params();
        let coord = TileCoordinate::from_block(x, z);
        let sample = match self.entry(coord).and_then(|entry| entry.ready_chunk()) {
            Some(chunk) => sample_column(chunk.as_ref(), &self.registry, &params, x, z),
            None => sample_column(&WorldWindow::new(self.world.as_ref()), &self.registry, &params, x, z),
        };
        sample.map(|s| s.y)
    }

    /// Write every ready tile to the store. One tile failing does not stop the others.
    pub fn save_all(&self) -> Result<SaveReport> {
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| MapError::Config("tile cache has no store".to_string()))?;
        if let Err(e) = std::fs::create_dir_all(store.dir()) {
            log::error!("Failed to create world map save dir {}: {}", store.dir().display(), e);
            return Err(e.into());
        }

        let mut report = SaveReport::default();
        for (coord, entry) in self.snapshot() {
            match entry.ready_chunk() {
                Some(chunk) if !chunk.is_placeholder() => match store.save(coord, &chunk) {
                    Ok(()) => report.saved += 1,
                    Err(e) => {
                        log::warn!("Failed to save tile at {}: {}", coord, e);
                        report.failed += 1;
                    }
                },
                _ => report.skipped += 1,
            }
        }
        log::info!(
            "Saved {} world map tiles ({} skipped, {} failed)",
            report.saved,
            report.skipped,
            report.failed
        );
        Ok(report)
    }

    /// Free every surface and empty the cache.
    pub fn release_all(&self, surface: &mut dyn DrawSurface) {
        let entries: Vec<Arc<TileEntry>> = self.entries.write().unwrap().drain().map(|(_, e)| e).collect();
        for entry in entries {
            release_entry(&entry, surface);
        }
    }

    /// Evict one tile, freeing its surface.
    pub fn release(&self, coord: TileCoordinate, surface: &mut dyn DrawSurface) -> bool {
        let removed = self.entries.write().unwrap().remove(&coord);
        match removed {
            Some(entry) => {
                release_entry(&entry, surface);
                true
            }
            None => false,
        }
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats {
            chunk_fetches: self.chunk_fetches(),
            disk_reads: self.disk_reads.load(Ordering::SeqCst),
            ..CacheStats::default()
        };
        for (_, entry) in self.snapshot() {
            stats.entries += 1;
            match *entry.status.borrow() {
                TileStatus::Idle => stats.idle += 1,
                TileStatus::Loading => stats.loading += 1,
                TileStatus::Ready => stats.ready += 1,
                TileStatus::Failed => stats.failed += 1,
                TileStatus::Absent | TileStatus::Released => {}
            }
        }
        if let Some(store) = &self.store {
            match store.disk_usage() {
                Ok((tiles, bytes)) => {
                    stats.disk_tiles = tiles;
                    stats.disk_size_mb = bytes as f64 / 1_048_576.0;
                }
                Err(e) => log::warn!("Failed to measure {}: {}", store.dir().display(), e),
            }
        }
        stats
    }
}

// A panicking worker still has to report back, or its tile would stay loading.
fn worker_panic(coord: TileCoordinate, payload: Box<dyn Any + Send>) -> MapError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    MapError::Other(format!("tile worker for {} panicked: {}", coord, message))
}

fn release_entry(entry: &TileEntry, surface: &mut dyn DrawSurface) {
    let mut slot = entry.slot.lock().unwrap();
    if let EntryState::Ready(tile) = &mut slot.state {
        tile.release(surface);
    }
    entry.set(&mut slot, EntryState::Released);
}
