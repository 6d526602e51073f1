//! # Block Registry
//!
//! Block properties live in a fixed lookup table indexed by type code, built once from a
//! declarative list of [`BlockDefinition`]s. The default set is loaded from the JSON file
//! embedded at `assets/blocks.json`; callers can supply their own list to change, for
//! example, which blocks count as transparent.
//!
//! ## Lookup Cost
//!
//! Transparency is stored in its own dense table so the face visibility rule, which runs
//! once per block face during meshing, is a single indexed load with no hashing and no
//! branching on block kind.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{BlockTypeSize, MAX_TYPE_CODE};

/// Number of entries in the lookup table, one per representable type code.
pub const BLOCK_TABLE_SIZE: usize = MAX_TYPE_CODE as usize + 1;

/// Largest static brightness a block may declare.
pub const MAX_BRIGHTNESS: u8 = 15;

const DEFAULT_BLOCKS_JSON: &str = include_str!("../../../../assets/blocks.json");

/// Errors raised while building a [`BlockRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The definition uses a type code that does not fit a block record.
    #[error("block '{name}' uses type code {code}, above the maximum of {MAX_TYPE_CODE}")]
    CodeOutOfRange {
        /// Name of the offending block.
        name: String,
        /// The requested code.
        code: u32,
    },
    /// Two definitions share a type code.
    #[error("type code {code} is defined twice ('{first}' and '{second}')")]
    DuplicateCode {
        /// The shared code.
        code: BlockTypeSize,
        /// Name registered first.
        first: String,
        /// Name registered second.
        second: String,
    },
    /// Two definitions share a name.
    #[error("block name '{0}' is defined twice")]
    DuplicateName(String),
    /// Type code 0 is reserved for Air.
    #[error("type code 0 is reserved for air, found '{0}'")]
    ReservedAirCode(String),
    /// Brightness above [`MAX_BRIGHTNESS`].
    #[error("block '{name}' declares brightness {brightness}, above the maximum of {MAX_BRIGHTNESS}")]
    BrightnessOutOfRange {
        /// Name of the offending block.
        name: String,
        /// Declared brightness.
        brightness: u8,
    },
    /// A name was looked up that the registry does not contain.
    #[error("unknown block '{0}'")]
    UnknownBlock(String),
    /// The registry JSON could not be parsed.
    #[error("invalid block registry JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Declarative description of one block type.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockDefinition {
    /// Type code stored in block records.
    pub code: u32,
    /// Unique human-readable name.
    pub name: String,
    /// Whether faces behind this block stay visible.
    #[serde(default)]
    pub transparent: bool,
    /// Base colour used by renderers.
    #[serde(default)]
    pub base_color: [u8; 3],
    /// Static per-block brightness in `0..=15`.
    #[serde(default)]
    pub brightness: u8,
}

#[derive(Deserialize)]
struct BlocksFile {
    blocks: Vec<BlockDefinition>,
}

/// Properties of a registered block type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockProperties {
    /// Unique name.
    pub name: String,
    /// Whether faces behind this block stay visible.
    pub transparent: bool,
    /// Base colour used by renderers.
    pub base_color: [u8; 3],
    /// Static brightness.
    pub brightness: u8,
}

/// Lookup table of block capabilities indexed by type code.
///
/// Air (code 0) is always present and always transparent. Codes with no definition are
/// treated as opaque, so unknown blocks hide the faces behind them rather than leaking
/// geometry.
#[derive(Clone, Debug)]
pub struct BlockRegistry {
    transparent: Vec<bool>,
    properties: Vec<Option<BlockProperties>>,
    codes_by_name: HashMap<String, BlockTypeSize>,
}

impl BlockRegistry {
    /// Creates a registry that only knows about Air.
    pub fn air_only() -> Self {
        let mut transparent = vec![false; BLOCK_TABLE_SIZE];
        transparent[0] = true;
        let mut properties = vec![None; BLOCK_TABLE_SIZE];
        properties[0] = Some(BlockProperties {
            name: "air".to_string(),
            transparent: true,
            base_color: [0, 0, 0],
            brightness: 0,
        });
        let mut codes_by_name = HashMap::new();
        codes_by_name.insert("air".to_string(), 0);

        BlockRegistry {
            transparent,
            properties,
            codes_by_name,
        }
    }

    /// Builds a registry from a list of definitions.
    ///
    /// # Arguments
    /// * `definitions` - Block types to register; an entry for code 0 must be named `air`
    ///
    /// # Returns
    /// The registry, or the first invalid definition encountered.
    pub fn from_definitions<I>(definitions: I) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = BlockDefinition>,
    {
        let mut registry = Self::air_only();
        for definition in definitions {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// Parses a `{ "blocks": [...] }` document and builds a registry from it.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let file: BlocksFile = serde_json::from_str(json)?;
        Self::from_definitions(file.blocks)
    }

    fn register(&mut self, definition: BlockDefinition) -> Result<(), RegistryError> {
        let BlockDefinition {
            code,
            name,
            transparent,
            base_color,
            brightness,
        } = definition;

        if code > MAX_TYPE_CODE as u32 {
            return Err(RegistryError::CodeOutOfRange { name, code });
        }
        if brightness > MAX_BRIGHTNESS {
            return Err(RegistryError::BrightnessOutOfRange { name, brightness });
        }
        if code == 0 {
            // Air is pre-registered; accept a matching entry so files can list it.
            return if name == "air" {
                Ok(())
            } else {
                Err(RegistryError::ReservedAirCode(name))
            };
        }

        let code = code as BlockTypeSize;
        let slot = code as usize;
        if let Some(existing) = &self.properties[slot] {
            return Err(RegistryError::DuplicateCode {
                code,
                first: existing.name.clone(),
                second: name,
            });
        }
        if self.codes_by_name.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        self.transparent[slot] = transparent;
        self.codes_by_name.insert(name.clone(), code);
        self.properties[slot] = Some(BlockProperties {
            name,
            transparent,
            base_color,
            brightness,
        });
        Ok(())
    }

    /// Whether blocks of this type let the faces behind them show.
    #[inline]
    pub fn is_transparent(&self, type_code: BlockTypeSize) -> bool {
        self.transparent
            .get(type_code as usize)
            .copied()
            .unwrap_or(false)
    }

    /// Properties of a registered type, or `None` for unregistered codes.
    pub fn properties(&self, type_code: BlockTypeSize) -> Option<&BlockProperties> {
        self.properties.get(type_code as usize)?.as_ref()
    }

    /// Looks up a type code by name.
    pub fn code_of(&self, name: &str) -> Option<BlockTypeSize> {
        self.codes_by_name.get(name).copied()
    }

    /// Looks up a type code by name, failing with [`RegistryError::UnknownBlock`].
    pub fn require(&self, name: &str) -> Result<BlockTypeSize, RegistryError> {
        self.code_of(name)
            .ok_or_else(|| RegistryError::UnknownBlock(name.to_string()))
    }

    /// Number of registered block types, Air included.
    pub fn len(&self) -> usize {
        self.codes_by_name.len()
    }

    /// Always false: Air is always registered.
    pub fn is_empty(&self) -> bool {
        self.codes_by_name.is_empty()
    }
}

impl Default for BlockRegistry {
    /// The block set shipped in `assets/blocks.json`.
    fn default() -> Self {
        Self::from_json(DEFAULT_BLOCKS_JSON).unwrap_or_else(|error| {
            log::error!("Built-in block registry is invalid, falling back to air only: {error}");
            Self::air_only()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(code: u32, name: &str, transparent: bool) -> BlockDefinition {
        BlockDefinition {
            code,
            name: name.to_string(),
            transparent,
            base_color: [0, 0, 0],
            brightness: 0,
        }
    }

    #[test]
    fn default_registry_marks_water_glass_and_leaves_transparent() {
        let registry = BlockRegistry::default();
        for name in ["water", "glass", "leaves"] {
            let code = registry.require(name).unwrap();
            assert!(registry.is_transparent(code), "{name} should be transparent");
        }
        let stone = registry.require("stone").unwrap();
        assert!(!registry.is_transparent(stone));
        assert!(registry.is_transparent(0));
        assert_eq!(registry.properties(10).map(|p| p.brightness), Some(15));
    }

    #[test]
    fn transparency_set_is_configurable() {
        let registry = BlockRegistry::from_definitions([
            definition(1, "stone", false),
            definition(2, "ice", true),
            definition(3, "water", false),
        ])
        .unwrap();
        assert!(registry.is_transparent(2));
        assert!(!registry.is_transparent(3));
    }

    #[test]
    fn unregistered_codes_are_opaque() {
        let registry = BlockRegistry::air_only();
        assert!(!registry.is_transparent(42));
        assert!(registry.properties(42).is_none());
    }

    #[test]
    fn duplicates_rejected() {
        let duplicate_code = BlockRegistry::from_definitions([
            definition(1, "stone", false),
            definition(1, "granite", false),
        ]);
        assert!(matches!(duplicate_code, Err(RegistryError::DuplicateCode { code: 1, .. })));

        let duplicate_name = BlockRegistry::from_definitions([
            definition(1, "stone", false),
            definition(2, "stone", false),
        ]);
        assert!(matches!(duplicate_name, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn air_code_is_reserved() {
        let result = BlockRegistry::from_definitions([definition(0, "void", false)]);
        assert!(matches!(result, Err(RegistryError::ReservedAirCode(_))));
    }

    #[test]
    fn codes_above_twelve_bits_rejected() {
        let result = BlockRegistry::from_definitions([definition(5000, "huge", false)]);
        assert!(matches!(result, Err(RegistryError::CodeOutOfRange { code: 5000, .. })));
    }
}
