//! Built-in supercompressed backend over `basis-universal`.
//!
//! Transcodes KTX2/Basis (ETC1S and UASTC) to RGBA32, the lowest common
//! denominator every host accepts. Transcoding to GPU block formats is the
//! host's business through its own [`SupercompressedDecoder`] if it wants
//! them.

use basis_universal::{DecodeFlags, Ktx2TranscodeParameters, Ktx2Transcoder, TranscoderTextureFormat};

use super::{MIN_SUPERCOMPRESSED_VERSION, SupercompressedDecoder, TextureError};
use crate::host::DecodedImage;

#[derive(Debug, Default)]
pub struct BasisuDecoder;

impl BasisuDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl SupercompressedDecoder for BasisuDecoder {
    fn version(&self) -> u32 {
        MIN_SUPERCOMPRESSED_VERSION
    }

    /// The transcoder emits rows in the opposite vertical order to the
    /// PNG/JPEG path.
    fn flips_vertically(&self) -> bool {
        true
    }

    fn decode(&mut self, bytes: &[u8]) -> Result<DecodedImage, TextureError> {
        let mut transcoder = Ktx2Transcoder::new(bytes).map_err(|_| {
            TextureError::Transcode(
                "failed to open KTX2; check that it is a valid ETC1S or UASTC texture".to_string(),
            )
        })?;

        let Some(info) = transcoder.image_level_info(0, 0, 0) else {
            return Err(TextureError::InvalidData(
                "KTX2 has no image level info".to_string(),
            ));
        };

        transcoder.prepare_transcoding().map_err(|_| {
            TextureError::Transcode("failed to prepare KTX2 transcoding".to_string())
        })?;

        let data = transcoder
            .transcode_image_level(
                TranscoderTextureFormat::RGBA32,
                Ktx2TranscodeParameters {
                    layer_index: 0,
                    level_index: 0,
                    face_index: 0,
                    decode_flags: Some(DecodeFlags::HIGH_QUALITY),
                    ..Default::default()
                },
            )
            .map_err(|error| {
                TextureError::Transcode(format!("failed to transcode level 0: {error:?}"))
            })?;

        Ok(DecodedImage {
            width: info.orig_width,
            height: info.orig_height,
            rgba8: data,
            flipped: true,
        })
    }
}
