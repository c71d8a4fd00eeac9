//! # Biome Registry
//!
//! Read-only table mapping biome ids to a material palette and an opaque
//! settings payload.
//!
//! The chunk codec only consumes the palette; settings exist for bilinear
//! sampling, which accumulates neighbor settings and divides by the sample
//! count. The registry is built once and shared read-only for the lifetime
//! of a terrain.

use crate::chunk::MAX_BIOME_ID;
use crate::error::{TerrainError, TerrainResult};
use crate::palette::MaterialPalette;

/// Maximum number of biomes a registry can hold (3 id bits per chunk).
pub const MAX_BIOMES: usize = MAX_BIOME_ID as usize + 1;

/// Per-biome payload consumed by bilinear sampling.
///
/// Implementations only need to support commutative, associative
/// accumulation and pointwise division by a sample count.
pub trait BiomeSettings: Clone + Send + Sync + 'static {
    /// Accumulates `other` into `self`.
    fn aggregate(&mut self, other: &Self);

    /// Divides `self` pointwise by `count`, which is at least 1.
    fn divide(&mut self, count: u32);
}

impl BiomeSettings for f32 {
    fn aggregate(&mut self, other: &Self) {
        *self += *other;
    }

    fn divide(&mut self, count: u32) {
        *self /= count as f32;
    }
}

impl BiomeSettings for f64 {
    fn aggregate(&mut self, other: &Self) {
        *self += *other;
    }

    fn divide(&mut self, count: u32) {
        *self /= f64::from(count);
    }
}

/// A registered biome: the palette its chunks encode against, plus the
/// sampling payload.
#[derive(Clone, Debug)]
pub struct Biome<S> {
    /// Materials available to chunks of this biome.
    pub palette: MaterialPalette,
    /// Opaque payload aggregated by bilinear sampling.
    pub settings: S,
}

impl<S> Biome<S> {
    /// Creates a new biome entry.
    #[must_use]
    pub const fn new(palette: MaterialPalette, settings: S) -> Self {
        Self { palette, settings }
    }
}

/// Read-only sequence of biomes keyed by biome id.
///
/// Every biome id appearing in a terrain file must resolve here; all
/// access goes through the checked [`BiomeRegistry::get`], which surfaces
/// unknown ids as errors rather than panicking.
#[derive(Clone, Debug)]
pub struct BiomeRegistry<S> {
    biomes: Vec<Biome<S>>,
}

impl<S: BiomeSettings> BiomeRegistry<S> {
    /// Builds a registry from an ordered biome list; index is biome id.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the list is empty or holds more than
    /// [`MAX_BIOMES`] entries.
    pub fn new(biomes: Vec<Biome<S>>) -> TerrainResult<Self> {
        if biomes.is_empty() {
            return Err(TerrainError::Malformed(
                "biome registry must hold at least one biome".to_string(),
            ));
        }
        if biomes.len() > MAX_BIOMES {
            return Err(TerrainError::Malformed(format!(
                "biome registry holds {} biomes, max {MAX_BIOMES}",
                biomes.len()
            )));
        }
        Ok(Self { biomes })
    }

    /// Returns the biome registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if no biome is registered under `id`.
    pub fn get(&self, id: u8) -> TerrainResult<&Biome<S>> {
        self.biomes
            .get(usize::from(id))
            .ok_or(TerrainError::OutOfRange {
                what: "biome id",
                value: u64::from(id),
                max: self.biomes.len() as u64 - 1,
            })
    }

    /// Number of registered biomes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.biomes.len()
    }

    /// True iff the registry holds no biomes (never true post-construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.biomes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_settings() {
        let mut settings = 10.0f32;
        settings.aggregate(&20.0);
        settings.aggregate(&30.0);
        settings.aggregate(&40.0);
        settings.divide(4);
        assert_eq!(settings, 25.0);
    }

    #[test]
    fn test_registry_bounds() {
        let palette = MaterialPalette::default();
        let registry =
            BiomeRegistry::new(vec![Biome::new(palette, 1.0f32), Biome::new(palette, 2.0)])
                .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(1).unwrap().settings, 2.0);
        assert!(registry.get(2).is_err());
    }

    #[test]
    fn test_registry_rejects_bad_sizes() {
        let palette = MaterialPalette::default();

        assert!(BiomeRegistry::<f32>::new(Vec::new()).is_err());

        let too_many: Vec<_> = (0u8..9).map(|i| Biome::new(palette, f32::from(i))).collect();
        assert!(BiomeRegistry::new(too_many).is_err());
    }
}
