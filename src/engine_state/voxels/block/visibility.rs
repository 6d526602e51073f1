//! Face visibility rule.
//!
//! A face is meshed when the block owning it is solid and the block across the face
//! does not hide it. Each side of a shared face is decided on its own: water above
//! stone shows the stone's top face (water is transparent) but hides the water's
//! bottom face (stone is opaque).

use super::{block_registry::BlockRegistry, BlockRecord};

/// Whether the face of `block` that touches `neighbor` must be meshed.
///
/// # Arguments
/// * `block` - The block owning the face
/// * `neighbor` - The block on the other side of the face
/// * `registry` - Source of the transparency table
#[inline]
pub fn is_face_visible(block: BlockRecord, neighbor: BlockRecord, registry: &BlockRegistry) -> bool {
    !block.is_air() && (neighbor.is_air() || registry.is_transparent(neighbor.type_code()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(registry: &BlockRegistry, name: &str) -> BlockRecord {
        BlockRecord::from_type(registry.require(name).unwrap() as u32).unwrap()
    }

    #[test]
    fn air_never_has_visible_faces() {
        let registry = BlockRegistry::default();
        let stone = block(&registry, "stone");
        assert!(!is_face_visible(BlockRecord::AIR, BlockRecord::AIR, &registry));
        assert!(!is_face_visible(BlockRecord::AIR, stone, &registry));
    }

    #[test]
    fn opaque_neighbors_hide_faces() {
        let registry = BlockRegistry::default();
        let stone = block(&registry, "stone");
        let dirt = block(&registry, "dirt");
        assert!(!is_face_visible(stone, dirt, &registry));
        assert!(!is_face_visible(dirt, stone, &registry));
        assert!(is_face_visible(stone, BlockRecord::AIR, &registry));
    }

    #[test]
    fn water_over_stone_is_asymmetric() {
        let registry = BlockRegistry::default();
        let stone = block(&registry, "stone");
        let water = block(&registry, "water");
        // stone's top face looks into water
        assert!(is_face_visible(stone, water, &registry));
        // water's bottom face looks into stone
        assert!(!is_face_visible(water, stone, &registry));
    }

    #[test]
    fn metadata_does_not_change_visibility() {
        let registry = BlockRegistry::default();
        let stone = block(&registry, "stone");
        let tinted_glass = BlockRecord::new(registry.require("glass").unwrap() as u32, 9).unwrap();
        assert!(is_face_visible(stone, tinted_glass, &registry));
    }
}
