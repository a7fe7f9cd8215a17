//! Skin data extraction.
//!
//! A skin is imported only when its joint count matches its inverse-bind-
//! matrix count; a mismatch is a logged, non-fatal skip. Missing bind
//! matrices default to identity per the glTF spec.

use glam::Mat4;
use thiserror::Error;

use crate::accessor::AccessorReader;
use crate::convert_coordinates::ConvertCoordinates;
use crate::document::{Document, DocumentError, get};

#[derive(Error, Debug)]
pub enum SkinError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error(
        "skin {skin} declares {joints} joints but {matrices} inverse bind matrices; skipping it"
    )]
    CountMismatch {
        skin: usize,
        joints: usize,
        matrices: usize,
    },
}

#[derive(Debug)]
pub struct SkinData {
    pub joints: Vec<usize>,
    pub inverse_bind_matrices: Vec<Mat4>,
}

pub fn build_skin<'a, F>(
    reader: &AccessorReader<'a, F>,
    document: &Document,
    skin_index: usize,
) -> Result<SkinData, SkinError>
where
    F: Fn(usize) -> Option<&'a [u8]>,
{
    let skin = get(&document.skins, skin_index, "skin")?;
    let inverse_bind_matrices = match skin.inverse_bind_matrices {
        Some(accessor) => reader
            .mat4(accessor)?
            .into_iter()
            .map(ConvertCoordinates::convert_coordinates)
            .collect(),
        None => vec![Mat4::IDENTITY; skin.joints.len()],
    };
    if inverse_bind_matrices.len() != skin.joints.len() {
        return Err(SkinError::CountMismatch {
            skin: skin_index,
            joints: skin.joints.len(),
            matrices: inverse_bind_matrices.len(),
        });
    }
    Ok(SkinData {
        joints: skin.joints.clone(),
        inverse_bind_matrices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::extensions::ExtensionRegistry;

    fn doc(skins: serde_json::Value, accessors: serde_json::Value, views: serde_json::Value) -> Document {
        let json = serde_json::json!({
            "asset": { "version": "2.0" },
            "scenes": [{ "nodes": [] }],
            "buffers": [{ "byteLength": 0 }],
            "bufferViews": views,
            "accessors": accessors,
            "skins": skins
        })
        .to_string()
        .into_bytes();
        Document::parse(&json, &ExtensionRegistry::default()).unwrap()
    }

    #[test]
    fn missing_bind_matrices_default_to_identity() {
        let document = doc(
            serde_json::json!([{ "joints": [0, 1] }]),
            serde_json::json!([]),
            serde_json::json!([]),
        );
        let reader = AccessorReader::new(&document, |_| None);
        let skin = build_skin(&reader, &document, 0).unwrap();
        assert_eq!(skin.joints, [0, 1]);
        assert_eq!(skin.inverse_bind_matrices, [Mat4::IDENTITY; 2]);
    }

    #[test]
    fn count_mismatch_is_rejected() {
        let matrices: Vec<u8> = Mat4::IDENTITY
            .to_cols_array()
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        let document = doc(
            serde_json::json!([{ "joints": [0, 1], "inverseBindMatrices": 0 }]),
            serde_json::json!([{
                "bufferView": 0, "componentType": 5126, "count": 1, "type": "MAT4"
            }]),
            serde_json::json!([{ "buffer": 0, "byteLength": 64 }]),
        );
        let reader = AccessorReader::new(&document, |_| Some(matrices.as_slice()));
        assert!(matches!(
            build_skin(&reader, &document, 0),
            Err(SkinError::CountMismatch { skin: 0, joints: 2, matrices: 1 })
        ));
    }
}
