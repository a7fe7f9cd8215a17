//! Geometry assembly for mesh primitives.
//!
//! Each glTF primitive becomes one [`GeometryData`]: attribute arrays
//! decoded through the accessor layer, converted to host coordinates,
//! bone weights renormalized, and indices chosen at 16-bit width whenever
//! the vertex count allows it. Primitives with no index accessor get
//! sequential indices synthesized.

use thiserror::Error;

use crate::accessor::AccessorReader;
use crate::convert_coordinates::{ConvertCoordinates, convert_tangent};
use crate::document::{DocumentError, MODE_TRIANGLES, Primitive};
use crate::host::{BlendFrame, GeometryData, Indices, MAX_UV_SETS};

#[derive(Error, Debug)]
pub enum MeshError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("primitive has no POSITION attribute")]
    MissingPositions,
    #[error("unsupported primitive mode {0}; only triangle lists are imported")]
    UnsupportedMode(u32),
}

/// Renormalizes per-vertex bone weights to sum to 1.
pub fn renormalize_weights(weights: &mut [[f32; 4]]) {
    for weight in weights {
        let sum: f32 = weight.iter().sum();
        if sum > 0.0 {
            for w in weight.iter_mut() {
                *w /= sum;
            }
        }
    }
}

/// Reverses each triangle's winding, compensating for the Z mirror of the
/// coordinate conversion.
fn flip_winding(indices: &mut [u32]) {
    for triangle in indices.chunks_exact_mut(3) {
        triangle.swap(0, 2);
    }
}

pub fn build_primitive<'a, F>(
    reader: &AccessorReader<'a, F>,
    primitive: &Primitive,
) -> Result<GeometryData, MeshError>
where
    F: Fn(usize) -> Option<&'a [u8]>,
{
    if primitive.mode != MODE_TRIANGLES {
        return Err(MeshError::UnsupportedMode(primitive.mode));
    }

    let position_accessor = *primitive
        .attributes
        .get("POSITION")
        .ok_or(MeshError::MissingPositions)?;
    let mut positions = reader.vec3(position_accessor)?;
    for p in &mut positions {
        *p = p.convert_coordinates();
    }

    let normals = match primitive.attributes.get("NORMAL") {
        Some(&accessor) => {
            let mut normals = reader.vec3(accessor)?;
            for n in &mut normals {
                *n = n.convert_coordinates();
            }
            Some(normals)
        }
        None => None,
    };

    let tangents = match primitive.attributes.get("TANGENT") {
        Some(&accessor) => {
            let mut tangents = reader.vec4(accessor)?;
            for t in &mut tangents {
                *t = convert_tangent(*t);
            }
            Some(tangents)
        }
        None => None,
    };

    let mut uvs: [Option<Vec<[f32; 2]>>; MAX_UV_SETS] = Default::default();
    for (set, slot) in uvs.iter_mut().enumerate() {
        if let Some(&accessor) = primitive.attributes.get(&format!("TEXCOORD_{set}")) {
            *slot = Some(reader.vec2(accessor)?);
        }
    }

    let colors = match primitive.attributes.get("COLOR_0") {
        Some(&accessor) => Some(reader.colors(accessor)?),
        None => None,
    };

    let joints = match primitive.attributes.get("JOINTS_0") {
        Some(&accessor) => Some(reader.joints(accessor)?),
        None => None,
    };

    let weights = match primitive.attributes.get("WEIGHTS_0") {
        Some(&accessor) => {
            let mut weights = reader.vec4(accessor)?;
            renormalize_weights(&mut weights);
            Some(weights)
        }
        None => None,
    };

    let mut raw_indices = match primitive.indices {
        Some(accessor) => reader.uints(accessor)?,
        // No index accessor: synthesize a sequential triangle list.
        None => (0..positions.len() as u32).collect(),
    };
    flip_winding(&mut raw_indices);

    // 16-bit indices whenever every vertex is addressable in them.
    let indices = if positions.len() <= usize::from(u16::MAX) {
        Indices::U16(raw_indices.into_iter().map(|i| i as u16).collect())
    } else {
        Indices::U32(raw_indices)
    };

    Ok(GeometryData {
        positions,
        normals,
        tangents,
        uvs,
        colors,
        joints,
        weights,
        indices,
    })
}

/// Extracts one primitive's morph targets as named blend frames.
pub fn extract_blend_frames<'a, F>(
    reader: &AccessorReader<'a, F>,
    primitive: &Primitive,
    target_names: Option<&[String]>,
) -> Result<Vec<BlendFrame>, MeshError>
where
    F: Fn(usize) -> Option<&'a [u8]>,
{
    let mut frames = Vec::with_capacity(primitive.targets.len());
    for (index, target) in primitive.targets.iter().enumerate() {
        let name = target_names
            .and_then(|names| names.get(index).cloned())
            .unwrap_or_else(|| format!("morph{index}"));

        let position_deltas = match target.get("POSITION") {
            Some(&accessor) => {
                let mut deltas = reader.vec3(accessor)?;
                for d in &mut deltas {
                    *d = d.convert_coordinates();
                }
                deltas
            }
            None => Vec::new(),
        };
        let normal_deltas = match target.get("NORMAL") {
            Some(&accessor) => {
                let mut deltas = reader.vec3(accessor)?;
                for d in &mut deltas {
                    *d = d.convert_coordinates();
                }
                Some(deltas)
            }
            None => None,
        };
        frames.push(BlendFrame {
            name,
            position_deltas,
            normal_deltas,
        });
    }
    Ok(frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::document::extensions::ExtensionRegistry;

    fn le_f32(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    /// One mesh, one primitive, `count` vertices at the origin, optional
    /// u32 indices.
    fn document_with_vertices(count: usize, indexed: bool) -> (Document, Vec<u8>) {
        let position_bytes = count * 12;
        let mut buffer = vec![0u8; position_bytes];
        let mut accessors = vec![serde_json::json!({
            "bufferView": 0, "componentType": 5126, "count": count, "type": "VEC3"
        })];
        let mut views = vec![serde_json::json!({ "buffer": 0, "byteLength": position_bytes })];
        let mut primitive = serde_json::json!({ "attributes": { "POSITION": 0 } });
        if indexed {
            let indices: Vec<u32> = (0..count as u32).collect();
            let index_bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
            views.push(serde_json::json!({
                "buffer": 0, "byteOffset": position_bytes, "byteLength": index_bytes.len()
            }));
            accessors.push(serde_json::json!({
                "bufferView": 1, "componentType": 5125, "count": count, "type": "SCALAR"
            }));
            buffer.extend(index_bytes);
            primitive["indices"] = serde_json::json!(1);
        }
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [] }],
            "buffers": [{ "byteLength": buffer.len() }],
            "bufferViews": views,
            "accessors": accessors,
            "meshes": [{ "primitives": [primitive] }]
        })
        .to_string()
        .into_bytes();
        (
            Document::parse(&json, &ExtensionRegistry::default()).unwrap(),
            buffer,
        )
    }

    #[test]
    fn positions_are_converted_and_indices_synthesized() {
        let positions = le_f32(&[0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0]);
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [] }],
            "buffers": [{ "byteLength": positions.len() }],
            "bufferViews": [{ "buffer": 0, "byteLength": positions.len() }],
            "accessors": [{
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"
            }],
            "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 } }] }]
        })
        .to_string()
        .into_bytes();
        let document = Document::parse(&json, &ExtensionRegistry::default()).unwrap();
        let reader = AccessorReader::new(&document, |_| Some(positions.as_slice()));
        let geometry = build_primitive(&reader, &document.meshes[0].primitives[0]).unwrap();

        assert_eq!(geometry.positions[0], [0.0, 0.0, -1.0]);
        assert_eq!(geometry.triangle_count(), 1);
        // Sequential fan with the winding reversed for the Z mirror.
        assert_eq!(geometry.indices, Indices::U16(vec![2, 1, 0]));
    }

    #[test]
    fn index_width_switches_at_the_vertex_count_boundary() {
        let (document, buffer) = document_with_vertices(65535, true);
        let reader = AccessorReader::new(&document, |_| Some(buffer.as_slice()));
        let geometry = build_primitive(&reader, &document.meshes[0].primitives[0]).unwrap();
        assert!(matches!(geometry.indices, Indices::U16(_)));

        let (document, buffer) = document_with_vertices(65536, true);
        let reader = AccessorReader::new(&document, |_| Some(buffer.as_slice()));
        let geometry = build_primitive(&reader, &document.meshes[0].primitives[0]).unwrap();
        assert!(matches!(geometry.indices, Indices::U32(_)));
    }

    #[test]
    fn bone_weights_renormalize_to_one() {
        let mut weights = [[0.5, 0.5, 0.5, 0.5], [0.0, 0.0, 0.0, 0.0]];
        renormalize_weights(&mut weights);
        assert_eq!(weights[0], [0.25, 0.25, 0.25, 0.25]);
        // All-zero weights stay zero rather than dividing by zero.
        assert_eq!(weights[1], [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn non_triangle_modes_are_rejected() {
        let (mut document, buffer) = document_with_vertices(3, false);
        document.meshes[0].primitives[0].mode = 1; // LINES
        let reader = AccessorReader::new(&document, |_| Some(buffer.as_slice()));
        assert!(matches!(
            build_primitive(&reader, &document.meshes[0].primitives[0]),
            Err(MeshError::UnsupportedMode(1))
        ));
    }

    #[test]
    fn blend_frames_take_names_from_extras() {
        let deltas = le_f32(&[0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [] }],
            "buffers": [{ "byteLength": deltas.len() }],
            "bufferViews": [{ "buffer": 0, "byteLength": deltas.len() }],
            "accessors": [{
                "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"
            }],
            "meshes": [{
                "primitives": [{
                    "attributes": { "POSITION": 0 },
                    "targets": [{ "POSITION": 0 }, { "POSITION": 0 }]
                }],
                "extras": { "targetNames": ["smile"] }
            }]
        })
        .to_string()
        .into_bytes();
        let document = Document::parse(&json, &ExtensionRegistry::default()).unwrap();
        let reader = AccessorReader::new(&document, |_| Some(deltas.as_slice()));
        let names = document.meshes[0].target_names();
        let frames = extract_blend_frames(
            &reader,
            &document.meshes[0].primitives[0],
            names.as_deref(),
        )
        .unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].name, "smile");
        assert_eq!(frames[1].name, "morph1"); // past the extras list
        assert_eq!(frames[0].position_deltas[0], [0.0, 1.0, -2.0]);
    }
}
