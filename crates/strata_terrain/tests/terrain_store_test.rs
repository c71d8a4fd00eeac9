//! End-to-end tests for the terrain store: file layout, close flush,
//! streaming dirtiness, and corner sampling.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use strata_terrain::{
    Biome, BiomeRegistry, ChunkCoord, MaterialPalette, StoreConfig, TerrainChunk, TerrainError,
    TerrainStore, TerrainVertex, Vec2, CHUNK_RECORD_BYTES,
};

fn temp_terrain_path(tag: &str) -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("strata_{tag}_{id}.terrain"))
}

fn four_biome_registry() -> BiomeRegistry<f32> {
    let palette = MaterialPalette::new([1, 2, 3, 4]).unwrap();
    BiomeRegistry::new(vec![
        Biome::new(palette, 10.0),
        Biome::new(palette, 20.0),
        Biome::new(palette, 30.0),
        Biome::new(palette, 40.0),
    ])
    .unwrap()
}

fn filled_chunk(biome_id: u8, base_height: u8, vertex: TerrainVertex) -> TerrainChunk {
    let palette = MaterialPalette::new([1, 2, 3, 4]).unwrap();
    let mut chunk = TerrainChunk::new(biome_id, base_height, palette).unwrap();
    chunk.fill(vertex);
    chunk
}

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    condition()
}

#[test]
fn test_file_layout_and_eviction_write_back() {
    let path = temp_terrain_path("layout");
    let config = StoreConfig {
        cache_capacity: 1,
        ..StoreConfig::default()
    };
    let store =
        TerrainStore::create_with(2, 2, &path, four_biome_registry(), config).unwrap();

    let a = filled_chunk(0, 10, TerrainVertex::new(45, 2));
    let b = filled_chunk(1, 12, TerrainVertex::new(50, 3));

    store.set(ChunkCoord::new(0, 0), a.clone()).unwrap();
    // Inserting B exceeds the capacity-1 cache: A is evicted and written.
    store.set(ChunkCoord::new(1, 0), b.clone()).unwrap();

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[8..8 + CHUNK_RECORD_BYTES], &a.to_record()[..]);

    // B is still cached; the close flush puts it on disk.
    store.close().unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[73..73 + CHUNK_RECORD_BYTES], &b.to_record()[..]);

    let reopened = TerrainStore::open(&path, four_biome_registry()).unwrap();
    assert_eq!(reopened.get(ChunkCoord::new(0, 0)).unwrap(), a);
    assert_eq!(reopened.get(ChunkCoord::new(1, 0)).unwrap(), b);
    reopened.close().unwrap();

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_close_flushes_without_eviction() {
    let path = temp_terrain_path("flush");
    let store = TerrainStore::create(2, 2, &path, four_biome_registry()).unwrap();

    let chunk = filled_chunk(2, 8, TerrainVertex::new(20, 4));
    store.set(ChunkCoord::new(0, 0), chunk.clone()).unwrap();
    store.close().unwrap();

    let reopened = TerrainStore::open(&path, four_biome_registry()).unwrap();
    assert_eq!(reopened.get(ChunkCoord::new(0, 0)).unwrap(), chunk);
    reopened.close().unwrap();

    std::fs::remove_file(&path).ok();
}

#[test]
fn test_streaming_dirtiness_lifecycle() {
    let path = temp_terrain_path("streaming");
    let config = StoreConfig {
        worker_interval: Duration::from_millis(50),
        ..StoreConfig::default()
    };
    let store =
        TerrainStore::create_with(4, 4, &path, four_biome_registry(), config).unwrap();

    let loaded = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loaded);
    store.on_chunk_loaded(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let handle = store.create_streaming_handle(4);
    assert!(
        wait_until(|| !handle.is_dirty(), Duration::from_secs(5)),
        "worker never serviced the initial region"
    );

    handle.set_position(Vec2::new(10.0, 5.0));
    assert!(handle.is_dirty());
    assert!(
        wait_until(|| !handle.is_dirty(), Duration::from_secs(5)),
        "worker never serviced the moved region"
    );

    // Shrinking the radius does not schedule a load; growing it does.
    handle.set_radius(2);
    assert!(!handle.is_dirty());
    handle.set_radius(8);
    assert!(handle.is_dirty());

    assert!(
        wait_until(|| loaded.load(Ordering::SeqCst) > 0, Duration::from_secs(5)),
        "no chunk-loaded notifications arrived"
    );

    store.close().unwrap();
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_dropped_handle_stops_being_serviced() {
    let path = temp_terrain_path("dropped");
    let config = StoreConfig {
        worker_interval: Duration::from_millis(50),
        ..StoreConfig::default()
    };
    let store =
        TerrainStore::create_with(4, 4, &path, four_biome_registry(), config).unwrap();

    let handle = store.create_streaming_handle(4);
    assert!(wait_until(|| !handle.is_dirty(), Duration::from_secs(5)));
    drop(handle);

    // The worker prunes the dead registration on its next pass and the
    // store still shuts down cleanly.
    std::thread::sleep(Duration::from_millis(150));
    store.close().unwrap();
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_bilinear_sample_at_corner() {
    let path = temp_terrain_path("sample");
    let store = TerrainStore::create(2, 2, &path, four_biome_registry()).unwrap();

    let vertex = TerrainVertex::new(10, 1);
    store
        .set(ChunkCoord::new(0, 0), filled_chunk(0, 3, vertex))
        .unwrap();
    store
        .set(ChunkCoord::new(1, 0), filled_chunk(1, 3, vertex))
        .unwrap();
    store
        .set(ChunkCoord::new(0, 1), filled_chunk(2, 3, vertex))
        .unwrap();
    store
        .set(ChunkCoord::new(1, 1), filled_chunk(3, 3, vertex))
        .unwrap();

    // At (0,0) the (-x,+z) neighbor is skipped: (10+20+30+40)/4.
    let sampled = store.sample_chunk(ChunkCoord::new(0, 0)).unwrap();
    assert!((sampled - 25.0).abs() < f32::EPSILON);

    // World position (1,1) lies inside chunk (0,0).
    let sampled = store.sample_world(Vec2::new(1.0, 1.0)).unwrap();
    assert!((sampled - 25.0).abs() < f32::EPSILON);

    assert!(matches!(
        store.sample_chunk(ChunkCoord::new(2, 0)),
        Err(TerrainError::OutOfRange { .. })
    ));

    store.close().unwrap();
    std::fs::remove_file(&path).ok();
}

#[test]
fn test_create_and_open_error_paths() {
    let path = temp_terrain_path("errors");

    assert!(matches!(
        TerrainStore::open(&path, four_biome_registry()),
        Err(TerrainError::Missing(_))
    ));

    let store = TerrainStore::create(2, 2, &path, four_biome_registry()).unwrap();
    store.close().unwrap();

    assert!(matches!(
        TerrainStore::create(2, 2, &path, four_biome_registry()),
        Err(TerrainError::AlreadyExists(_))
    ));

    std::fs::remove_file(&path).ok();
}
