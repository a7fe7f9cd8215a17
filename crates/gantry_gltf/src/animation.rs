//! Animation channels → host keyframe curves.
//!
//! Coordinate conversion negates Z components (and W for quaternions).
//! Tangents follow the sampler interpolation: cubic-spline data supplies
//! them, linear channels get secant slopes, and step channels get infinite
//! tangents for a hard discontinuity. A synthetic "static pose" clip is
//! appended after all real clips so playback can reset the model.

use thiserror::Error;

use crate::accessor::AccessorReader;
use crate::document::{Document, DocumentError, Interpolation, TargetPath, get};
use crate::host::{ClipData, ClipFlavor, ComponentCurve, CurveData, CurveProperty, Keyframe};
use crate::scene::node_transform;

pub const STATIC_POSE_NAME: &str = "Static Pose";

#[derive(Error, Debug)]
pub enum ClipError {
    #[error(transparent)]
    Document(#[from] DocumentError),
    #[error("animation {animation} channel targets nonexistent node {node}")]
    MissingTargetNode { animation: usize, node: usize },
    #[error("animation {animation} sampler output length does not match its input")]
    OutputMismatch { animation: usize },
}

fn negate_components(flat: &mut [f32], components: usize, negated: &[usize]) {
    for element in flat.chunks_exact_mut(components) {
        for &c in negated {
            element[c] = -element[c];
        }
    }
}

/// Splits a flat sampler output into per-component curves with tangents
/// per the interpolation mode.
fn curves_from(
    times: &[f32],
    flat: &[f32],
    components: usize,
    interpolation: Interpolation,
) -> Vec<ComponentCurve> {
    let mut curves = vec![ComponentCurve::default(); components];
    let value_at = |key: usize, component: usize| -> f32 {
        match interpolation {
            Interpolation::CubicSpline => flat[(key * 3 + 1) * components + component],
            _ => flat[key * components + component],
        }
    };
    for (c, curve) in curves.iter_mut().enumerate() {
        for k in 0..times.len() {
            let value = value_at(k, c);
            let (in_tangent, out_tangent) = match interpolation {
                Interpolation::Step => (f32::INFINITY, f32::INFINITY),
                Interpolation::CubicSpline => (
                    flat[(k * 3) * components + c],
                    flat[(k * 3 + 2) * components + c],
                ),
                Interpolation::Linear => {
                    let secant = |a: usize, b: usize| -> f32 {
                        let dt = times[b] - times[a];
                        if dt.abs() < f32::EPSILON {
                            0.0
                        } else {
                            (value_at(b, c) - value_at(a, c)) / dt
                        }
                    };
                    let incoming = if k > 0 { secant(k - 1, k) } else { 0.0 };
                    let outgoing = if k + 1 < times.len() { secant(k, k + 1) } else { 0.0 };
                    (
                        if k > 0 { incoming } else { outgoing },
                        if k + 1 < times.len() { outgoing } else { incoming },
                    )
                }
            };
            curve.keys.push(Keyframe {
                time: times[k],
                value,
                in_tangent,
                out_tangent,
            });
        }
    }
    curves
}

/// Builds one animation's clip. Failure is contained to this animation:
/// a channel referencing a nonexistent node fails the clip, not the
/// import.
pub fn build_clip<'a, F>(
    reader: &AccessorReader<'a, F>,
    document: &Document,
    animation_index: usize,
    node_paths: &[String],
    flavor: ClipFlavor,
) -> Result<ClipData, ClipError>
where
    F: Fn(usize) -> Option<&'a [u8]>,
{
    let animation = get(&document.animations, animation_index, "animation")?;
    let name = animation
        .name
        .clone()
        .unwrap_or_else(|| format!("Animation{animation_index}"));

    let mut duration = 0.0f32;
    let mut curves = Vec::new();
    for channel in &animation.channels {
        // Channels without a node target come from extensions we do not
        // animate; skip them.
        let Some(node) = channel.target.node else {
            continue;
        };
        if node >= node_paths.len() {
            return Err(ClipError::MissingTargetNode {
                animation: animation_index,
                node,
            });
        }
        let sampler = get(&animation.samplers, channel.sampler, "animation sampler")?;
        let times = reader.scalars(sampler.input)?;
        if let Some(last) = times.last() {
            duration = duration.max(*last);
        }
        let (mut flat, components) = reader.floats(sampler.output)?;
        let keys_factor = match sampler.interpolation {
            Interpolation::CubicSpline => 3,
            _ => 1,
        };

        let (property, components) = match channel.target.path {
            TargetPath::Translation => {
                negate_components(&mut flat, components, &[2]);
                (CurveProperty::Translation, 3)
            }
            TargetPath::Rotation => {
                negate_components(&mut flat, components, &[2, 3]);
                (CurveProperty::Rotation, 4)
            }
            TargetPath::Scale => (CurveProperty::Scale, 3),
            TargetPath::Weights => {
                // Output is `targets` scalars per keyframe; the per-key
                // element width is what the curve split needs.
                let per_key = times.len() * keys_factor;
                if per_key == 0 || flat.len() % per_key != 0 {
                    return Err(ClipError::OutputMismatch {
                        animation: animation_index,
                    });
                }
                (CurveProperty::BlendWeights, flat.len() / per_key)
            }
        };
        if flat.len() != times.len() * components * keys_factor {
            return Err(ClipError::OutputMismatch {
                animation: animation_index,
            });
        }

        curves.push(CurveData {
            node_path: node_paths[node].clone(),
            property,
            components: curves_from(&times, &flat, components, sampler.interpolation),
        });
    }

    Ok(ClipData {
        name,
        duration,
        flavor,
        curves,
    })
}

fn constant_curve(value: f32) -> ComponentCurve {
    ComponentCurve {
        keys: vec![Keyframe {
            time: 0.0,
            value,
            in_tangent: f32::INFINITY,
            out_tangent: f32::INFINITY,
        }],
    }
}

/// Synthesizes the static-pose clip: every instantiated node's current
/// transform (and blend weights, via `default_weights`) as single-key step
/// curves at time zero.
pub fn build_static_pose(
    document: &Document,
    node_paths: &[String],
    default_weights: impl Fn(usize) -> Option<Vec<f32>>,
    flavor: ClipFlavor,
) -> ClipData {
    let mut curves = Vec::new();
    for (index, node) in document.nodes.iter().enumerate() {
        let path = &node_paths[index];
        if path.is_empty() {
            continue; // not part of the instantiated scene
        }
        let transform = node_transform(node);
        curves.push(CurveData {
            node_path: path.clone(),
            property: CurveProperty::Translation,
            components: transform
                .translation
                .to_array()
                .into_iter()
                .map(constant_curve)
                .collect(),
        });
        curves.push(CurveData {
            node_path: path.clone(),
            property: CurveProperty::Rotation,
            components: transform
                .rotation
                .to_array()
                .into_iter()
                .map(constant_curve)
                .collect(),
        });
        curves.push(CurveData {
            node_path: path.clone(),
            property: CurveProperty::Scale,
            components: transform
                .scale
                .to_array()
                .into_iter()
                .map(constant_curve)
                .collect(),
        });
        if let Some(weights) = default_weights(index) {
            curves.push(CurveData {
                node_path: path.clone(),
                property: CurveProperty::BlendWeights,
                components: weights.into_iter().map(constant_curve).collect(),
            });
        }
    }
    ClipData {
        name: STATIC_POSE_NAME.to_string(),
        duration: 0.0,
        flavor,
        curves,
    }
}
