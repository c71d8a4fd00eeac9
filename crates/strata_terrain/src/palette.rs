//! # Material Palettes
//!
//! Four 4-bit material ids packed into a 16-bit map.
//!
//! Every vertex byte selects one of the four slots with a 2-bit index, so a
//! chunk can reference at most four distinct materials. Slot `i` occupies
//! bits `[4i, 4i + 4)` of the packed value.

use bytemuck::{Pod, Zeroable};

use crate::error::{TerrainError, TerrainResult};

/// An identifier for a terrain material. Valid ids are `0..=15`.
pub type MaterialId = u8;

/// Largest representable material id (one nibble).
pub const MAX_MATERIAL_ID: MaterialId = 15;

/// Number of material slots in a palette.
pub const PALETTE_SLOTS: usize = 4;

/// Four material ids packed into 16 bits.
///
/// Two palettes are equal iff their packed representations match.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct MaterialPalette(u16);

impl MaterialPalette {
    /// Creates a palette from four material ids.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if any id exceeds [`MAX_MATERIAL_ID`].
    pub fn new(ids: [MaterialId; PALETTE_SLOTS]) -> TerrainResult<Self> {
        let mut palette = Self(0);
        for (slot, id) in ids.into_iter().enumerate() {
            palette.set(slot, id)?;
        }
        Ok(palette)
    }

    /// Creates a palette from a byte slice.
    ///
    /// # Errors
    ///
    /// Returns `Malformed` if the slice is not exactly four bytes long or
    /// any byte exceeds [`MAX_MATERIAL_ID`].
    pub fn try_from_slice(bytes: &[u8]) -> TerrainResult<Self> {
        if bytes.len() != PALETTE_SLOTS {
            return Err(TerrainError::Malformed(format!(
                "palette source must be {PALETTE_SLOTS} bytes, got {}",
                bytes.len()
            )));
        }
        let mut palette = Self(0);
        for (slot, &id) in bytes.iter().enumerate() {
            palette.set(slot, id).map_err(|_| {
                TerrainError::Malformed(format!("palette byte {slot} is not a material id: {id}"))
            })?;
        }
        Ok(palette)
    }

    /// Reconstructs a palette from its packed representation.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Returns the packed 16-bit representation.
    #[inline]
    #[must_use]
    pub const fn to_bits(self) -> u16 {
        self.0
    }

    /// Returns the material id stored in `slot`.
    ///
    /// Slot indices are not validated on read; only the low two bits of
    /// `slot` are honored.
    #[inline]
    #[must_use]
    pub const fn get(self, slot: usize) -> MaterialId {
        ((self.0 >> ((slot & 3) * 4)) & 0xF) as MaterialId
    }

    /// Stores `id` in `slot`, clearing the previous value.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` if `slot` is not in `0..4` or `id` exceeds
    /// [`MAX_MATERIAL_ID`].
    pub fn set(&mut self, slot: usize, id: MaterialId) -> TerrainResult<()> {
        if slot >= PALETTE_SLOTS {
            return Err(TerrainError::OutOfRange {
                what: "palette slot",
                value: slot as u64,
                max: PALETTE_SLOTS as u64 - 1,
            });
        }
        if id > MAX_MATERIAL_ID {
            return Err(TerrainError::OutOfRange {
                what: "material id",
                value: u64::from(id),
                max: u64::from(MAX_MATERIAL_ID),
            });
        }
        let shift = slot as u16 * 4;
        self.0 = (self.0 & !(0xF_u16 << shift)) | (u16::from(id) << shift);
        Ok(())
    }

    /// Returns the first slot holding `id`, scanning slots `0..4` in order.
    #[must_use]
    pub fn index_of(self, id: MaterialId) -> Option<u8> {
        (0..PALETTE_SLOTS).find(|&slot| self.get(slot) == id).map(|slot| slot as u8)
    }
}
