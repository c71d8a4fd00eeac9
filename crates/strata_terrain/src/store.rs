//! # Terrain Store
//!
//! The storage engine: owns the terrain file, computes record offsets from
//! chunk coordinates, and serves chunk reads and writes through the LRU
//! cache with write-back on eviction.
//!
//! ## File Format
//!
//! ```text
//! [4 bytes: width  (u32 LE), chunks along x]
//! [4 bytes: height (u32 LE), chunks along z]
//! [width * height records, 65 bytes each]
//! ```
//!
//! The record for chunk `(x, z)` lives at `8 + (x + z * width) * 65`, so
//! every offset is computable without an index structure. The file is
//! extended to its full fixed size at creation; never-written records
//! decode as flat biome-0 terrain.
//!
//! ## Caching Contract
//!
//! `set` lands in the cache only. Bytes reach disk when the entry is
//! evicted or when the store is closed; readers always observe the cached
//! value in between. There is no fsync policy.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::warn;

use crate::biome::{BiomeRegistry, BiomeSettings};
use crate::cache::ChunkCache;
use crate::chunk::{TerrainChunk, CHUNK_RECORD_BYTES};
use crate::coord::{ChunkCoord, Vec2};
use crate::error::{TerrainError, TerrainResult};
use crate::streaming::{worker_loop, HandleShared, StreamingHandle};

/// Bytes occupied by the file header.
const HEADER_LEN: u64 = 8;

/// Subscriber callback for chunk-loaded notifications.
type ChunkLoadedFn = Box<dyn Fn(ChunkCoord) + Send + Sync>;

/// Tuning knobs for a terrain store.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Maximum decoded chunks held in memory.
    pub cache_capacity: usize,
    /// Delay between streaming worker passes.
    pub worker_interval: Duration,
    /// Capacity of the pending chunk-loaded notification queue. When the
    /// queue saturates, the oldest pending notification is dropped rather
    /// than blocking I/O.
    pub event_queue_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 64,
            worker_interval: Duration::from_millis(500),
            event_queue_depth: 1024,
        }
    }
}

/// State shared between client calls and the streaming worker.
pub(crate) struct StoreShared<S> {
    /// All seek/read/write sequences happen under this lock; region sweeps
    /// hold it for the whole sweep so the cursor is not disturbed.
    file: Mutex<File>,
    width: u32,
    height: u32,
    biomes: BiomeRegistry<S>,
    cache: ChunkCache,
    events_tx: Sender<ChunkCoord>,
    events_rx: Receiver<ChunkCoord>,
    subscribers: Mutex<Vec<ChunkLoadedFn>>,
    pub(crate) handles: Mutex<Vec<Weak<HandleShared>>>,
    pub(crate) stop: AtomicBool,
}

impl<S: BiomeSettings> StoreShared<S> {
    fn record_offset(&self, coord: ChunkCoord) -> u64 {
        let index = u64::from(coord.z) * u64::from(self.width) + u64::from(coord.x);
        HEADER_LEN + index * CHUNK_RECORD_BYTES as u64
    }

    fn read_record(&self, file: &mut File, coord: ChunkCoord) -> TerrainResult<TerrainChunk> {
        file.seek(SeekFrom::Start(self.record_offset(coord)))?;
        let mut buf = [0u8; CHUNK_RECORD_BYTES];
        file.read_exact(&mut buf).map_err(|e| truncated(coord, &e))?;
        TerrainChunk::decode(&buf, &self.biomes)
    }

    fn write_record(
        &self,
        file: &mut File,
        coord: ChunkCoord,
        chunk: &TerrainChunk,
    ) -> TerrainResult<()> {
        file.seek(SeekFrom::Start(self.record_offset(coord)))?;
        file.write_all(&chunk.to_record())?;
        Ok(())
    }

    fn check_bounds(&self, coord: ChunkCoord) -> TerrainResult<()> {
        if coord.x >= self.width {
            return Err(TerrainError::OutOfRange {
                what: "chunk x coordinate",
                value: u64::from(coord.x),
                max: u64::from(self.width) - 1,
            });
        }
        if coord.z >= self.height {
            return Err(TerrainError::OutOfRange {
                what: "chunk z coordinate",
                value: u64::from(coord.z),
                max: u64::from(self.height) - 1,
            });
        }
        Ok(())
    }

    fn get(&self, coord: ChunkCoord) -> TerrainResult<TerrainChunk> {
        self.check_bounds(coord)?;
        if let Some(chunk) = self.cache.get(coord) {
            return Ok(chunk);
        }

        let mut file = self.file.lock();
        let chunk = self.read_record(&mut file, coord)?;
        if let Some((evicted_coord, evicted_chunk)) = self.cache.put(coord, chunk.clone()) {
            self.write_record(&mut file, evicted_coord, &evicted_chunk)?;
        }
        Ok(chunk)
    }

    fn set(&self, coord: ChunkCoord, chunk: TerrainChunk) -> TerrainResult<()> {
        self.check_bounds(coord)?;
        if let Some((evicted_coord, evicted_chunk)) = self.cache.put(coord, chunk) {
            let mut file = self.file.lock();
            self.write_record(&mut file, evicted_coord, &evicted_chunk)?;
        }
        Ok(())
    }

    /// Queues a chunk-loaded notification, dropping the oldest pending one
    /// when the queue is full.
    fn queue_loaded(&self, coord: ChunkCoord) {
        if let Err(TrySendError::Full(coord)) = self.events_tx.try_send(coord) {
            let dropped = self.events_rx.try_recv().ok();
            let _ = self.events_tx.try_send(coord);
            if let Some(dropped) = dropped {
                warn!(x = dropped.x, z = dropped.z, "chunk-loaded queue full, dropping oldest");
            }
        }
    }

    /// Drains queued notifications to the subscribers. Called outside the
    /// file lock so slow subscribers cannot block I/O.
    fn dispatch_loaded(&self) {
        let subscribers = self.subscribers.lock();
        while let Ok(coord) = self.events_rx.try_recv() {
            for subscriber in subscribers.iter() {
                subscriber(coord);
            }
        }
    }

    /// Prefetches the rectangular chunk region around `center` into the
    /// cache, writing back any evictees.
    ///
    /// The whole sweep runs under one file-lock acquisition. Reads are
    /// sequential along each row; the cursor is re-seeked only when a cache
    /// hit or a row boundary breaks contiguity.
    pub(crate) fn load_region(&self, center: Vec2, radius: u8) -> TerrainResult<()> {
        let r = f32::from(radius);
        let grid = ChunkCoord::new(self.width, self.height);
        let top_left =
            ChunkCoord::from_world(Vec2::new(center.x - r, center.y - r)).min(grid);
        let bottom_right =
            ChunkCoord::from_world(Vec2::new(center.x + r, center.y + r)).min(grid);

        let span = bottom_right - top_left;
        if span.x == 0 || span.z == 0 {
            return Ok(());
        }

        let mut evicted = Vec::new();
        {
            let mut file = self.file.lock();
            let mut cursor = self.record_offset(top_left);
            file.seek(SeekFrom::Start(cursor))?;

            for i in 0..span.area() {
                let coord = ChunkCoord::new(
                    top_left.x + (i % u64::from(span.x)) as u32,
                    top_left.z + (i / u64::from(span.x)) as u32,
                );

                if self.cache.get(coord).is_none() {
                    let wanted = self.record_offset(coord);
                    if cursor != wanted {
                        file.seek(SeekFrom::Start(wanted))?;
                        cursor = wanted;
                    }
                    let mut buf = [0u8; CHUNK_RECORD_BYTES];
                    file.read_exact(&mut buf).map_err(|e| truncated(coord, &e))?;
                    cursor += CHUNK_RECORD_BYTES as u64;

                    let chunk = TerrainChunk::decode(&buf, &self.biomes)?;
                    if let Some(entry) = self.cache.put(coord, chunk) {
                        evicted.push(entry);
                    }
                }
                self.queue_loaded(coord);
            }

            for (coord, chunk) in evicted {
                self.write_record(&mut file, coord, &chunk)?;
            }
        }
        self.dispatch_loaded();
        Ok(())
    }
}

fn truncated(coord: ChunkCoord, err: &io::Error) -> TerrainError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        TerrainError::Malformed(format!(
            "truncated chunk record at ({}, {})",
            coord.x, coord.z
        ))
    } else {
        TerrainError::Io(io::Error::new(err.kind(), err.to_string()))
    }
}

/// On-disk, streamable store for chunked 2D voxel terrain.
///
/// Client threads may call [`get`](TerrainStore::get),
/// [`set`](TerrainStore::set), and the sampling methods concurrently; one
/// background worker per store prefetches regions for streaming handles.
pub struct TerrainStore<S: BiomeSettings> {
    shared: Arc<StoreShared<S>>,
    config: StoreConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl<S: BiomeSettings> TerrainStore<S> {
    /// Creates a new terrain file of `width` by `height` chunks.
    ///
    /// The file is extended to its full fixed size up front.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyExists` if `path` names an existing file,
    /// `Malformed` for zero-area dimensions, or `Io` on any other file
    /// failure.
    pub fn create<P: AsRef<Path>>(
        width: u32,
        height: u32,
        path: P,
        biomes: BiomeRegistry<S>,
    ) -> TerrainResult<Self> {
        Self::create_with(width, height, path, biomes, StoreConfig::default())
    }

    /// Creates a new terrain file with explicit tuning.
    ///
    /// # Errors
    ///
    /// See [`TerrainStore::create`].
    pub fn create_with<P: AsRef<Path>>(
        width: u32,
        height: u32,
        path: P,
        biomes: BiomeRegistry<S>,
        config: StoreConfig,
    ) -> TerrainResult<Self> {
        let path = path.as_ref();
        if width == 0 || height == 0 {
            return Err(TerrainError::Malformed(format!(
                "terrain dimensions must be nonzero, got {width}x{height}"
            )));
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::AlreadyExists {
                    TerrainError::AlreadyExists(path.to_path_buf())
                } else {
                    TerrainError::Io(e)
                }
            })?;

        file.write_all(&width.to_le_bytes())?;
        file.write_all(&height.to_le_bytes())?;
        file.set_len(file_size(width, height))?;

        Ok(Self::assemble(file, width, height, biomes, config))
    }

    /// Opens an existing terrain file.
    ///
    /// # Errors
    ///
    /// Returns `Missing` if `path` does not exist, `Malformed` if the
    /// header is truncated, declares a zero area, or disagrees with the
    /// file size, or `Io` on any other file failure.
    pub fn open<P: AsRef<Path>>(path: P, biomes: BiomeRegistry<S>) -> TerrainResult<Self> {
        Self::open_with(path, biomes, StoreConfig::default())
    }

    /// Opens an existing terrain file with explicit tuning.
    ///
    /// # Errors
    ///
    /// See [`TerrainStore::open`].
    pub fn open_with<P: AsRef<Path>>(
        path: P,
        biomes: BiomeRegistry<S>,
        config: StoreConfig,
    ) -> TerrainResult<Self> {
        let path = path.as_ref();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == io::ErrorKind::NotFound {
                    TerrainError::Missing(path.to_path_buf())
                } else {
                    TerrainError::Io(e)
                }
            })?;

        let mut header = [0u8; HEADER_LEN as usize];
        file.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                TerrainError::Malformed("truncated terrain header".to_string())
            } else {
                TerrainError::Io(e)
            }
        })?;
        let width = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let height = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        if width == 0 || height == 0 {
            return Err(TerrainError::Malformed(format!(
                "terrain header declares zero area: {width}x{height}"
            )));
        }
        let actual = file.metadata()?.len();
        let expected = file_size(width, height);
        if actual != expected {
            return Err(TerrainError::Malformed(format!(
                "terrain file is {actual} bytes, header implies {expected}"
            )));
        }

        Ok(Self::assemble(file, width, height, biomes, config))
    }

    fn assemble(
        file: File,
        width: u32,
        height: u32,
        biomes: BiomeRegistry<S>,
        config: StoreConfig,
    ) -> Self {
        let (events_tx, events_rx) = bounded(config.event_queue_depth);
        let shared = Arc::new(StoreShared {
            file: Mutex::new(file),
            width,
            height,
            biomes,
            cache: ChunkCache::new(config.cache_capacity),
            events_tx,
            events_rx,
            subscribers: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            stop: AtomicBool::new(false),
        });
        Self {
            shared,
            config,
            worker: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Terrain width in chunks.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.shared.width
    }

    /// Terrain height in chunks.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.shared.height
    }

    /// Reads the chunk at `coord`, consulting the cache first.
    ///
    /// A miss reads and decodes the record from disk and caches it; an
    /// entry evicted by the insert is written back under the same file-lock
    /// acquisition.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for coordinates outside the grid, `Malformed`
    /// for an undecodable record, or `Io`.
    pub fn get(&self, coord: ChunkCoord) -> TerrainResult<TerrainChunk> {
        self.shared.get(coord)
    }

    /// Stores a chunk at `coord`.
    ///
    /// The chunk lands in the cache only; it reaches disk when evicted or
    /// at close (the caching contract).
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for coordinates outside the grid, or `Io` if
    /// writing back an evictee fails.
    pub fn set(&self, coord: ChunkCoord, chunk: TerrainChunk) -> TerrainResult<()> {
        self.shared.set(coord, chunk)
    }

    /// Samples biome settings at a chunk coordinate.
    ///
    /// Starts from the center chunk's settings, aggregates the `(+x, 0)`,
    /// `(0, +z)`, `(+x, +z)`, and `(-x, +z)` neighbors that exist within
    /// bounds, and divides by the number of contributors.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` for a center outside the grid, or any error
    /// loading a contributing chunk.
    pub fn sample_chunk(&self, coord: ChunkCoord) -> TerrainResult<S> {
        let shared = &self.shared;
        shared.check_bounds(coord)?;

        let center = shared.get(coord)?;
        let mut settings = shared.biomes.get(center.biome_id())?.settings.clone();
        let mut samples = 1u32;

        const NEIGHBORS: [(i64, i64); 4] = [(1, 0), (0, 1), (1, 1), (-1, 1)];
        for (dx, dz) in NEIGHBORS {
            let nx = i64::from(coord.x) + dx;
            let nz = i64::from(coord.z) + dz;
            if nx < 0
                || nz < 0
                || nx >= i64::from(shared.width)
                || nz >= i64::from(shared.height)
            {
                continue;
            }
            let neighbor = shared.get(ChunkCoord::new(nx as u32, nz as u32))?;
            settings.aggregate(&shared.biomes.get(neighbor.biome_id())?.settings);
            samples += 1;
        }

        settings.divide(samples);
        Ok(settings)
    }

    /// Samples biome settings at a world position.
    ///
    /// # Errors
    ///
    /// See [`TerrainStore::sample_chunk`].
    pub fn sample_world(&self, pos: Vec2) -> TerrainResult<S> {
        self.sample_chunk(ChunkCoord::from_world(pos))
    }

    /// Registers a callback invoked for every chunk visited by a streaming
    /// region load. Callbacks run on the worker thread, outside the file
    /// lock, in sweep order.
    pub fn on_chunk_loaded<F>(&self, callback: F)
    where
        F: Fn(ChunkCoord) + Send + Sync + 'static,
    {
        self.shared.subscribers.lock().push(Box::new(callback));
    }

    /// Creates a streaming handle with the given prefetch radius and starts
    /// the background worker if it is not already running.
    ///
    /// The handle starts dirty, so the region around its (zero) position is
    /// prefetched on the next worker pass. Dropping the handle ends its
    /// servicing; the worker prunes dead registrations.
    pub fn create_streaming_handle(&self, radius: u8) -> StreamingHandle {
        let handle = StreamingHandle::new(radius);
        self.shared.handles.lock().push(handle.downgrade());

        let mut worker = self.worker.lock();
        if worker.is_none() {
            let shared = Arc::clone(&self.shared);
            let interval = self.config.worker_interval;
            *worker = Some(thread::spawn(move || worker_loop(&shared, interval)));
        }
        handle
    }

    /// Stops the worker, flushes every cached chunk to disk, and closes the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the flush fails; the store is still torn down.
    pub fn close(self) -> TerrainResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdown()
    }

    fn shutdown(&self) -> TerrainResult<()> {
        self.shared.stop.store(true, Ordering::SeqCst);
        let worker = self.worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.join();
        }

        let mut file = self.shared.file.lock();
        for (coord, chunk) in self.shared.cache.entries() {
            self.shared.write_record(&mut file, coord, &chunk)?;
        }
        Ok(())
    }
}

impl<S: BiomeSettings> Drop for TerrainStore<S> {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            if let Err(error) = self.shutdown() {
                warn!(%error, "terrain store flush failed during drop");
            }
        }
    }
}

const fn file_size(width: u32, height: u32) -> u64 {
    HEADER_LEN + width as u64 * height as u64 * CHUNK_RECORD_BYTES as u64
}
