//! # STRATA Terrain
//!
//! Streamable on-disk storage for chunked 2D voxel terrain.
//!
//! ## Design Principles
//!
//! 1. **Compact**: every chunk is a fixed 65-byte bit-packed record
//! 2. **Random access**: record offsets are computed from chunk coordinates
//! 3. **Cached**: decoded chunks live in a write-back LRU
//! 4. **Streamable**: a background worker prefetches regions around
//!    client-declared positions
//!
//! ## Core Components
//!
//! - `MaterialPalette`: four 4-bit material ids packed into 16 bits
//! - `TerrainChunk`: 8x8 vertex grid with biome and base-height metadata
//! - `BiomeRegistry`: read-only biome table resolving palettes and settings
//! - `ChunkCache`: thread-safe fixed-capacity LRU with eviction return
//! - `TerrainStore`: the file-backed store with cached access and sampling
//! - `StreamingHandle`: client-declared prefetch position and radius
//!
//! ## Example
//!
//! ```rust,ignore
//! use strata_terrain::{Biome, BiomeRegistry, ChunkCoord, MaterialPalette, TerrainStore};
//!
//! let palette = MaterialPalette::new([1, 2, 3, 4])?;
//! let biomes = BiomeRegistry::new(vec![Biome::new(palette, 1.0f32)])?;
//! let store = TerrainStore::create(64, 64, "world.terrain", biomes)?;
//!
//! let chunk = store.get(ChunkCoord::new(3, 7))?;
//! let handle = store.create_streaming_handle(8);
//! handle.set_position(strata_terrain::Vec2::new(100.0, 250.0));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod biome;
pub mod cache;
pub mod chunk;
pub mod coord;
pub mod error;
pub mod palette;
pub mod store;
pub mod streaming;

pub use biome::{Biome, BiomeRegistry, BiomeSettings, MAX_BIOMES};
pub use cache::ChunkCache;
pub use chunk::{
    TerrainChunk, TerrainVertex, CHUNK_DIM, CHUNK_RECORD_BYTES, MAX_BASE_HEIGHT, MAX_BIOME_ID,
    VERTS_PER_CHUNK,
};
pub use coord::{ChunkCoord, Vec2, CHUNK_WORLD_SIZE};
pub use error::{TerrainError, TerrainResult};
pub use palette::{MaterialId, MaterialPalette, MAX_MATERIAL_ID, PALETTE_SLOTS};
pub use store::{StoreConfig, TerrainStore};
pub use streaming::{StreamingHandle, DEFAULT_STREAMING_RADIUS};
