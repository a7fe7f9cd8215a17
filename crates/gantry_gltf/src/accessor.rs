//! Typed reads through glTF's buffer → buffer-view → accessor indirection.
//!
//! Readers borrow the decoded buffer payloads through a lookup closure, so
//! the mesh, skin and animation builders stay independent of how buffers
//! were fetched. Integer attributes are normalized to float per the
//! accessor's `normalized` flag; sparse accessors apply their overrides on
//! top of the (possibly zero-filled) base.

use glam::Mat4;
use serde::Deserialize;

use crate::document::{Accessor, BufferView, Document, DocumentError, get};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u32")]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl TryFrom<u32> for ComponentType {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            5120 => Ok(ComponentType::I8),
            5121 => Ok(ComponentType::U8),
            5122 => Ok(ComponentType::I16),
            5123 => Ok(ComponentType::U16),
            5125 => Ok(ComponentType::U32),
            5126 => Ok(ComponentType::F32),
            other => Err(format!("unknown accessor component type {other}")),
        }
    }
}

impl ComponentType {
    pub fn size(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::U32 | ComponentType::F32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ElementType {
    #[serde(rename = "SCALAR")]
    Scalar,
    #[serde(rename = "VEC2")]
    Vec2,
    #[serde(rename = "VEC3")]
    Vec3,
    #[serde(rename = "VEC4")]
    Vec4,
    #[serde(rename = "MAT2")]
    Mat2,
    #[serde(rename = "MAT3")]
    Mat3,
    #[serde(rename = "MAT4")]
    Mat4,
}

impl ElementType {
    pub fn components(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 => 4,
            ElementType::Mat2 => 4,
            ElementType::Mat3 => 9,
            ElementType::Mat4 => 16,
        }
    }
}

fn scalar_at(bytes: &[u8], offset: usize, ty: ComponentType, normalized: bool) -> Option<f32> {
    let raw = bytes.get(offset..offset + ty.size())?;
    let value = match ty {
        ComponentType::I8 => {
            let v = raw[0] as i8;
            if normalized {
                f32::from(v) / 127.0
            } else {
                f32::from(v)
            }
        }
        ComponentType::U8 => {
            if normalized {
                f32::from(raw[0]) / 255.0
            } else {
                f32::from(raw[0])
            }
        }
        ComponentType::I16 => {
            let v = i16::from_le_bytes([raw[0], raw[1]]);
            if normalized {
                f32::from(v) / 32767.0
            } else {
                f32::from(v)
            }
        }
        ComponentType::U16 => {
            let v = u16::from_le_bytes([raw[0], raw[1]]);
            if normalized {
                f32::from(v) / 65535.0
            } else {
                f32::from(v)
            }
        }
        ComponentType::U32 => u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as f32,
        ComponentType::F32 => f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]),
    };
    let value = if normalized && matches!(ty, ComponentType::I8 | ComponentType::I16) {
        value.max(-1.0)
    } else {
        value
    };
    Some(value)
}

fn uint_at(bytes: &[u8], offset: usize, ty: ComponentType) -> Option<u32> {
    let raw = bytes.get(offset..offset + ty.size())?;
    match ty {
        ComponentType::U8 => Some(u32::from(raw[0])),
        ComponentType::U16 => Some(u32::from(u16::from_le_bytes([raw[0], raw[1]]))),
        ComponentType::U32 => Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])),
        _ => None,
    }
}

/// Borrowing reader over a document plus its decoded buffers.
pub struct AccessorReader<'a, F>
where
    F: Fn(usize) -> Option<&'a [u8]>,
{
    document: &'a Document,
    buffer: F,
}

impl<'a, F> AccessorReader<'a, F>
where
    F: Fn(usize) -> Option<&'a [u8]>,
{
    pub fn new(document: &'a Document, buffer: F) -> Self {
        Self { document, buffer }
    }

    fn accessor(&self, index: usize) -> Result<&'a Accessor, DocumentError> {
        get(&self.document.accessors, index, "accessor")
    }

    fn view_slice(
        &self,
        view_index: usize,
        accessor: usize,
    ) -> Result<(&'a [u8], &'a BufferView), DocumentError> {
        let view = get(&self.document.buffer_views, view_index, "buffer view")?;
        let bytes = (self.buffer)(view.buffer)
            .ok_or(DocumentError::BufferUnavailable { index: view.buffer })?;
        let slice = bytes
            .get(view.byte_offset..view.byte_offset + view.byte_length)
            .ok_or(DocumentError::AccessorOutOfBounds { accessor })?;
        Ok((slice, view))
    }

    /// Reads the accessor as floats, `components` per element. Missing
    /// buffer views yield zero-filled data per the glTF spec (the sparse
    /// overrides then land on top).
    pub fn floats(&self, index: usize) -> Result<(Vec<f32>, usize), DocumentError> {
        let accessor = self.accessor(index)?;
        let components = accessor.element_type.components();
        let element_size = components * accessor.component_type.size();
        let mut out = vec![0.0f32; accessor.count * components];

        if let Some(view_index) = accessor.buffer_view {
            let (slice, view) = self.view_slice(view_index, index)?;
            let stride = view.byte_stride.unwrap_or(element_size);
            for i in 0..accessor.count {
                for c in 0..components {
                    let offset =
                        accessor.byte_offset + i * stride + c * accessor.component_type.size();
                    out[i * components + c] =
                        scalar_at(slice, offset, accessor.component_type, accessor.normalized)
                            .ok_or(DocumentError::AccessorOutOfBounds { accessor: index })?;
                }
            }
        }

        if let Some(sparse) = &accessor.sparse {
            let (index_slice, _) = self.view_slice(sparse.indices.buffer_view, index)?;
            let (value_slice, _) = self.view_slice(sparse.values.buffer_view, index)?;
            for s in 0..sparse.count {
                let target = uint_at(
                    index_slice,
                    sparse.indices.byte_offset + s * sparse.indices.component_type.size(),
                    sparse.indices.component_type,
                )
                .ok_or(DocumentError::AccessorOutOfBounds { accessor: index })?
                    as usize;
                if target >= accessor.count {
                    return Err(DocumentError::AccessorOutOfBounds { accessor: index });
                }
                for c in 0..components {
                    let offset = sparse.values.byte_offset
                        + s * element_size
                        + c * accessor.component_type.size();
                    out[target * components + c] = scalar_at(
                        value_slice,
                        offset,
                        accessor.component_type,
                        accessor.normalized,
                    )
                    .ok_or(DocumentError::AccessorOutOfBounds { accessor: index })?;
                }
            }
        }

        Ok((out, components))
    }

    fn fixed<const N: usize>(
        &self,
        index: usize,
        expected: ElementType,
        expected_name: &'static str,
    ) -> Result<Vec<[f32; N]>, DocumentError> {
        let accessor = self.accessor(index)?;
        if accessor.element_type != expected {
            return Err(DocumentError::AccessorShape {
                accessor: index,
                expected: expected_name,
            });
        }
        let (flat, _) = self.floats(index)?;
        Ok(flat
            .chunks_exact(N)
            .map(|c| {
                let mut arr = [0.0f32; N];
                arr.copy_from_slice(c);
                arr
            })
            .collect())
    }

    pub fn scalars(&self, index: usize) -> Result<Vec<f32>, DocumentError> {
        let accessor = self.accessor(index)?;
        if accessor.element_type != ElementType::Scalar {
            return Err(DocumentError::AccessorShape {
                accessor: index,
                expected: "SCALAR",
            });
        }
        Ok(self.floats(index)?.0)
    }

    pub fn vec2(&self, index: usize) -> Result<Vec<[f32; 2]>, DocumentError> {
        self.fixed::<2>(index, ElementType::Vec2, "VEC2")
    }

    pub fn vec3(&self, index: usize) -> Result<Vec<[f32; 3]>, DocumentError> {
        self.fixed::<3>(index, ElementType::Vec3, "VEC3")
    }

    pub fn vec4(&self, index: usize) -> Result<Vec<[f32; 4]>, DocumentError> {
        self.fixed::<4>(index, ElementType::Vec4, "VEC4")
    }

    /// COLOR_0 in any of its legal shapes, widened to RGBA.
    pub fn colors(&self, index: usize) -> Result<Vec<[f32; 4]>, DocumentError> {
        let (flat, components) = self.floats(index)?;
        match components {
            3 => Ok(flat
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2], 1.0])
                .collect()),
            4 => Ok(flat
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2], c[3]])
                .collect()),
            _ => Err(DocumentError::AccessorShape {
                accessor: index,
                expected: "VEC3 or VEC4",
            }),
        }
    }

    /// Unsigned integer scalars (index data), read at their stored width.
    pub fn uints(&self, index: usize) -> Result<Vec<u32>, DocumentError> {
        let accessor = self.accessor(index)?;
        if accessor.element_type != ElementType::Scalar
            || matches!(
                accessor.component_type,
                ComponentType::I8 | ComponentType::I16 | ComponentType::F32
            )
        {
            return Err(DocumentError::AccessorShape {
                accessor: index,
                expected: "unsigned SCALAR",
            });
        }
        let Some(view_index) = accessor.buffer_view else {
            return Ok(vec![0; accessor.count]);
        };
        let (slice, view) = self.view_slice(view_index, index)?;
        let stride = view.byte_stride.unwrap_or(accessor.component_type.size());
        (0..accessor.count)
            .map(|i| {
                uint_at(
                    slice,
                    accessor.byte_offset + i * stride,
                    accessor.component_type,
                )
                .ok_or(DocumentError::AccessorOutOfBounds { accessor: index })
            })
            .collect()
    }

    /// JOINTS_0: VEC4 of u8/u16 joint indices.
    pub fn joints(&self, index: usize) -> Result<Vec<[u16; 4]>, DocumentError> {
        let accessor = self.accessor(index)?;
        if accessor.element_type != ElementType::Vec4
            || !matches!(accessor.component_type, ComponentType::U8 | ComponentType::U16)
        {
            return Err(DocumentError::AccessorShape {
                accessor: index,
                expected: "VEC4 of u8/u16",
            });
        }
        let (flat, _) = self.floats(index)?;
        Ok(flat
            .chunks_exact(4)
            .map(|c| [c[0] as u16, c[1] as u16, c[2] as u16, c[3] as u16])
            .collect())
    }

    pub fn mat4(&self, index: usize) -> Result<Vec<Mat4>, DocumentError> {
        let accessor = self.accessor(index)?;
        if accessor.element_type != ElementType::Mat4 {
            return Err(DocumentError::AccessorShape {
                accessor: index,
                expected: "MAT4",
            });
        }
        let (flat, _) = self.floats(index)?;
        Ok(flat
            .chunks_exact(16)
            .map(|c| {
                let mut arr = [0.0f32; 16];
                arr.copy_from_slice(c);
                Mat4::from_cols_array(&arr)
            })
            .collect())
    }
}
