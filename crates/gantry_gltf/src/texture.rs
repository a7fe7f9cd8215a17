//! Raw image bytes → host-ready [`DecodedImage`].
//!
//! Format detection is by magic bytes: the fixed 12-byte KTX2 signature
//! routes to an optional supercompressed backend, everything else is
//! treated as PNG/JPEG. Backends report their vertical orientation as a
//! capability bit; nothing here probes platforms.

#[cfg(feature = "basis-universal")]
pub mod basisu;

use thiserror::Error;

use crate::document::{Sampler, sampler_values};
use crate::host::{DecodedImage, FilterMode, SamplerSettings, WrapMode};

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("image decode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("supercompressed transcode failed: {0}")]
    Transcode(String),
    #[error("invalid texture data: {0}")]
    InvalidData(String),
}

/// Why a texture slot ended up failed. `BackendMissing` and
/// `BackendOutdated` get their own log guidance so users know to install
/// or update the decode backend rather than suspect the asset.
#[derive(Debug)]
pub enum TextureFailure {
    BackendMissing,
    BackendOutdated { found: u32, required: u32 },
    Decode(TextureError),
}

/// Fixed 12-byte KTX2 container signature.
pub const KTX2_MAGIC: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x32, 0x30, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageEncoding {
    /// KTX2/Basis supercompressed container.
    Ktx2,
    /// Anything else; handed to the PNG/JPEG decoder.
    Standard,
}

pub fn sniff(bytes: &[u8]) -> ImageEncoding {
    if bytes.starts_with(&KTX2_MAGIC) {
        ImageEncoding::Ktx2
    } else {
        ImageEncoding::Standard
    }
}

fn wrap_mode(value: u32) -> WrapMode {
    match value {
        sampler_values::CLAMP_TO_EDGE => WrapMode::ClampToEdge,
        sampler_values::MIRRORED_REPEAT => WrapMode::MirroredRepeat,
        _ => WrapMode::Repeat,
    }
}

fn filter_mode(value: u32) -> FilterMode {
    match value {
        sampler_values::NEAREST
        | sampler_values::NEAREST_MIPMAP_NEAREST
        | sampler_values::NEAREST_MIPMAP_LINEAR => FilterMode::Nearest,
        _ => FilterMode::Linear,
    }
}

/// Maps a glTF sampler onto host sampler settings; absent samplers and
/// absent filters take the glTF defaults (repeat wrapping, linear
/// filtering).
pub fn sampler_settings(sampler: Option<&Sampler>) -> SamplerSettings {
    let Some(sampler) = sampler else {
        return SamplerSettings::default();
    };
    SamplerSettings {
        wrap_u: wrap_mode(sampler.wrap_s),
        wrap_v: wrap_mode(sampler.wrap_t),
        min_filter: sampler.min_filter.map_or(FilterMode::Linear, filter_mode),
        mag_filter: sampler.mag_filter.map_or(FilterMode::Linear, filter_mode),
    }
}

/// One poll of an in-flight decode.
pub enum DecodePoll {
    Pending,
    Ready(DecodedImage),
}

/// PNG/JPEG decoding with begin/poll semantics.
///
/// The built-in [`ImagePixelDecoder`] completes on its first poll. A host
/// whose platform decodes off-thread implements this trait and returns
/// [`DecodePoll::Pending`] until its own work finishes; the import step
/// yields between polls either way, so the host loop is never blocked on a
/// large decode while running live.
pub trait PixelDecoder {
    /// Whether decoded rows come out bottom-up relative to glTF's
    /// expected orientation.
    fn flips_vertically(&self) -> bool {
        false
    }

    fn begin(&mut self, bytes: Vec<u8>) -> Result<(), TextureError>;
    fn poll(&mut self) -> Result<DecodePoll, TextureError>;
}

/// Synchronous decoder over the `image` crate.
#[derive(Default)]
pub struct ImagePixelDecoder {
    pending: Option<Vec<u8>>,
}

impl ImagePixelDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PixelDecoder for ImagePixelDecoder {
    fn begin(&mut self, bytes: Vec<u8>) -> Result<(), TextureError> {
        self.pending = Some(bytes);
        Ok(())
    }

    fn poll(&mut self) -> Result<DecodePoll, TextureError> {
        let Some(bytes) = self.pending.take() else {
            return Err(TextureError::InvalidData("poll before begin".to_string()));
        };
        let decoded = image::load_from_memory(&bytes)?.into_rgba8();
        Ok(DecodePoll::Ready(DecodedImage {
            width: decoded.width(),
            height: decoded.height(),
            rgba8: decoded.into_raw(),
            flipped: self.flips_vertically(),
        }))
    }
}

/// Minimum backend version the importer understands.
pub const MIN_SUPERCOMPRESSED_VERSION: u32 = 1;

/// Optional platform backend for KTX2/Basis supercompressed textures.
/// Absence, or a version below [`MIN_SUPERCOMPRESSED_VERSION`], is a
/// soft failure of the affected textures, never of the import.
pub trait SupercompressedDecoder {
    fn version(&self) -> u32;
    fn flips_vertically(&self) -> bool;
    fn decode(&mut self, bytes: &[u8]) -> Result<DecodedImage, TextureError>;
}

/// Runs the KTX2 path against whatever backend is available, reducing the
/// outcome to an image or a classified soft failure.
pub fn decode_supercompressed(
    backend: Option<&mut (dyn SupercompressedDecoder + 'static)>,
    bytes: &[u8],
) -> Result<DecodedImage, TextureFailure> {
    let Some(backend) = backend else {
        return Err(TextureFailure::BackendMissing);
    };
    let found = backend.version();
    if found < MIN_SUPERCOMPRESSED_VERSION {
        return Err(TextureFailure::BackendOutdated {
            found,
            required: MIN_SUPERCOMPRESSED_VERSION,
        });
    }
    let flipped = backend.flips_vertically();
    backend
        .decode(bytes)
        .map(|mut image| {
            image.flipped = flipped;
            image
        })
        .map_err(TextureFailure::Decode)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_png() -> Vec<u8> {
        // 2x2 opaque gray, encoded through the same crate that decodes it.
        let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([90, 90, 90, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut bytes, image::ImageFormat::Png)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn magic_split_routes_ktx2() {
        let mut ktx2 = KTX2_MAGIC.to_vec();
        ktx2.extend_from_slice(&[0; 16]);
        assert_eq!(sniff(&ktx2), ImageEncoding::Ktx2);
        assert_eq!(sniff(&tiny_png()), ImageEncoding::Standard);
    }

    #[test]
    fn image_decoder_round_trips_a_png() {
        let mut decoder = ImagePixelDecoder::new();
        decoder.begin(tiny_png()).unwrap();
        let DecodePoll::Ready(image) = decoder.poll().unwrap() else {
            panic!("built-in decoder completes on first poll");
        };
        assert_eq!((image.width, image.height), (2, 2));
        assert_eq!(image.rgba8.len(), 16);
        assert!(!image.flipped);
    }

    #[test]
    fn sampler_constants_map_to_host_settings() {
        let sampler = Sampler {
            mag_filter: Some(sampler_values::NEAREST),
            min_filter: Some(sampler_values::LINEAR_MIPMAP_LINEAR),
            wrap_s: sampler_values::CLAMP_TO_EDGE,
            wrap_t: sampler_values::MIRRORED_REPEAT,
        };
        let settings = sampler_settings(Some(&sampler));
        assert_eq!(settings.mag_filter, FilterMode::Nearest);
        assert_eq!(settings.min_filter, FilterMode::Linear);
        assert_eq!(settings.wrap_u, WrapMode::ClampToEdge);
        assert_eq!(settings.wrap_v, WrapMode::MirroredRepeat);
        assert_eq!(sampler_settings(None), SamplerSettings::default());
    }

    #[test]
    fn missing_backend_is_a_classified_soft_failure() {
        let result = decode_supercompressed(None, &KTX2_MAGIC);
        assert!(matches!(result, Err(TextureFailure::BackendMissing)));
    }

    #[test]
    fn outdated_backend_is_distinguished_from_decode_failure() {
        struct Stale;
        impl SupercompressedDecoder for Stale {
            fn version(&self) -> u32 {
                0
            }
            fn flips_vertically(&self) -> bool {
                true
            }
            fn decode(&mut self, _: &[u8]) -> Result<DecodedImage, TextureError> {
                unreachable!("version gate rejects first")
            }
        }
        let mut stale = Stale;
        let result =
            decode_supercompressed(Some(&mut stale as &mut dyn SupercompressedDecoder), &KTX2_MAGIC);
        assert!(matches!(
            result,
            Err(TextureFailure::BackendOutdated { found: 0, required: _ })
        ));
    }

    #[test]
    fn backend_orientation_lands_on_the_image() {
        struct Upside;
        impl SupercompressedDecoder for Upside {
            fn version(&self) -> u32 {
                MIN_SUPERCOMPRESSED_VERSION
            }
            fn flips_vertically(&self) -> bool {
                true
            }
            fn decode(&mut self, _: &[u8]) -> Result<DecodedImage, TextureError> {
                Ok(DecodedImage {
                    width: 1,
                    height: 1,
                    rgba8: vec![0; 4],
                    flipped: false,
                })
            }
        }
        let mut upside = Upside;
        let image =
            decode_supercompressed(Some(&mut upside as &mut dyn SupercompressedDecoder), &KTX2_MAGIC)
                .unwrap();
        assert!(image.flipped);
    }
}
