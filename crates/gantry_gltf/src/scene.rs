//! Node naming, local transforms, and the auto-scale computation. The
//! depth-first instantiation itself lives with the import steps; these are
//! the pure pieces it and the animation builder share.

use glam::{Mat4, Quat, Vec3};

use crate::convert_coordinates::ConvertCoordinates;
use crate::document::Node;
use crate::host::{Aabb, Transform};

pub fn node_name(node: &Node, index: usize) -> String {
    node.name.clone().unwrap_or_else(|| format!("Node{index}"))
}

/// Local transform of a node, converted to host coordinates. Decomposed
/// TRS fields win over the matrix form when both are present (exporters
/// that emit TRS are the common case and decomposition loses nothing).
pub fn node_transform(node: &Node) -> Transform {
    if node.translation.is_some() || node.rotation.is_some() || node.scale.is_some() {
        let translation = Vec3::from(node.translation.unwrap_or([0.0; 3])).convert_coordinates();
        let rotation = node
            .rotation
            .map(|r| Quat::from_xyzw(r[0], r[1], r[2], r[3]).convert_coordinates())
            .unwrap_or(Quat::IDENTITY);
        let scale = Vec3::from(node.scale.unwrap_or([1.0; 3]));
        return Transform {
            translation,
            rotation,
            scale,
        };
    }
    if let Some(matrix) = node.matrix {
        let (scale, rotation, translation) =
            Mat4::from_cols_array(&matrix).to_scale_rotation_translation();
        return Transform {
            translation: translation.convert_coordinates(),
            rotation: rotation.convert_coordinates(),
            scale,
        };
    }
    Transform::IDENTITY
}

/// Uniform factor scaling `bounds` to the target size, or `None` when
/// there is nothing meaningful to scale.
pub fn auto_scale_factor(bounds: Option<Aabb>, target_size: f32) -> Option<f32> {
    const MIN_EXTENT: f32 = 1.0e-5;
    let extent = bounds?.max_extent();
    (extent > MIN_EXTENT && target_size > 0.0).then(|| target_size / extent)
}
