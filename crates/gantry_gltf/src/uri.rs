//! URI resolution for buffers and images.
//!
//! Resolution is a deliberate policy ladder: self-contained containers
//! (`.glb`, `.zip`) always resolve, loose `.gltf` files with external
//! resources only resolve when the host's I/O model permits it. The
//! refusals carry user-actionable messages for exactly that reason.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;
use thiserror::Error;

use gantry_asset::Endpoint;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error(
        "cannot resolve '{uri}' in a sandboxed host with no base URL; \
         use a self-contained .glb or .zip instead"
    )]
    Sandboxed { uri: String },
    #[error(
        "the host denies file access through '{scheme}:' URIs, so '{uri}' cannot be read; \
         use a self-contained .glb or .zip instead"
    )]
    DeniedScheme { uri: String, scheme: String },
    #[error(
        "unsupported URI scheme '{scheme}:' in '{uri}'; \
         use a self-contained .glb or .zip instead"
    )]
    UnsupportedScheme { uri: String, scheme: String },
    #[error(
        "'{uri}' is relative but the input has no base location; \
         use a self-contained .glb or .zip instead"
    )]
    NoBase { uri: String },
    #[error("'{uri}' is not valid percent-encoded UTF-8")]
    InvalidEncoding { uri: String },
}

/// What the current platform's I/O model permits. Injected rather than
/// probed with platform checks so the policy is testable everywhere.
#[derive(Debug, Clone)]
pub struct SourcePolicy {
    /// Arbitrary local file reads are allowed.
    pub filesystem_access: bool,
    /// Browser-style sandbox: no ambient filesystem, relative URIs only
    /// resolve against an absolute remote base.
    pub sandboxed: bool,
    /// URI schemes the platform refuses to read through (for example
    /// `content` on mobile platforms with mediated storage).
    pub denied_schemes: Vec<String>,
}

impl SourcePolicy {
    pub fn host_default() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self {
                filesystem_access: false,
                sandboxed: true,
                denied_schemes: Vec::new(),
            }
        } else if cfg!(target_os = "android") {
            Self {
                filesystem_access: true,
                sandboxed: false,
                denied_schemes: vec!["content".to_string()],
            }
        } else {
            Self {
                filesystem_access: true,
                sandboxed: false,
                denied_schemes: Vec::new(),
            }
        }
    }
}

impl Default for SourcePolicy {
    fn default() -> Self {
        Self::host_default()
    }
}

/// Where the input container itself came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportSource {
    File(PathBuf),
    Remote(String),
    /// Bytes handed over with no ambient location; only self-contained
    /// inputs are importable this way.
    Memory,
}

/// A fetchable location for one buffer or image URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedLocation {
    /// A local path or remote URL, openable through a source provider.
    Endpoint(Endpoint),
    /// A path inside the input archive.
    ArchiveEntry(String),
    /// An inline `data:` URI, decoded in place.
    Data(String),
}

fn scheme_of(uri: &str) -> Option<&str> {
    let colon = uri.find(':')?;
    let scheme = &uri[..colon];
    // Two characters minimum, so Windows drive prefixes are not schemes.
    if scheme.len() < 2 {
        return None;
    }
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic() && chars.all(|c| c.is_ascii_alphanumeric() || "+-.".contains(c))
    {
        Some(scheme)
    } else {
        None
    }
}

fn decode(uri: &str) -> Result<String, ResolveError> {
    percent_decode_str(uri)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| ResolveError::InvalidEncoding {
            uri: uri.to_string(),
        })
}

/// Resolves `uri` against the import's container context.
///
/// Priority order: absolute URIs pass through (subject to scheme policy),
/// then the archive's internal directory, then platform refusals, then the
/// input file's own location.
pub fn resolve(
    uri: &str,
    source: &ImportSource,
    archive_dir: Option<&str>,
    policy: &SourcePolicy,
) -> Result<ResolvedLocation, ResolveError> {
    if uri.starts_with("data:") {
        return Ok(ResolvedLocation::Data(uri.to_string()));
    }

    if let Some(scheme) = scheme_of(uri) {
        if policy.denied_schemes.iter().any(|denied| denied == scheme) {
            return Err(ResolveError::DeniedScheme {
                uri: uri.to_string(),
                scheme: scheme.to_string(),
            });
        }
        return match scheme {
            "http" | "https" => Ok(ResolvedLocation::Endpoint(Endpoint::Url(uri.to_string()))),
            "file" => {
                let path = decode(uri.trim_start_matches("file://"))?;
                Ok(ResolvedLocation::Endpoint(Endpoint::Path(PathBuf::from(path))))
            }
            _ => Err(ResolveError::UnsupportedScheme {
                uri: uri.to_string(),
                scheme: scheme.to_string(),
            }),
        };
    }

    if let Some(dir) = archive_dir {
        let decoded = decode(uri)?;
        let entry = if dir.is_empty() {
            decoded
        } else {
            format!("{dir}/{decoded}")
        };
        return Ok(ResolvedLocation::ArchiveEntry(entry));
    }

    if policy.sandboxed && !matches!(source, ImportSource::Remote(_)) {
        return Err(ResolveError::Sandboxed {
            uri: uri.to_string(),
        });
    }

    match source {
        ImportSource::File(path) => {
            if !policy.filesystem_access {
                return Err(ResolveError::Sandboxed {
                    uri: uri.to_string(),
                });
            }
            let decoded = decode(uri)?;
            let parent = path.parent().unwrap_or_else(|| std::path::Path::new(""));
            Ok(ResolvedLocation::Endpoint(Endpoint::Path(parent.join(decoded))))
        }
        ImportSource::Remote(base) => {
            let split = base.rfind('/').map_or(base.len(), |i| i + 1);
            Ok(ResolvedLocation::Endpoint(Endpoint::Url(format!(
                "{}{uri}",
                &base[..split]
            ))))
        }
        ImportSource::Memory => Err(ResolveError::NoBase {
            uri: uri.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_policy() -> SourcePolicy {
        SourcePolicy {
            filesystem_access: true,
            sandboxed: false,
            denied_schemes: Vec::new(),
        }
    }

    #[test]
    fn relative_uri_joins_the_gltf_parent_dir() {
        let resolved = resolve(
            "tex.png",
            &ImportSource::File(PathBuf::from("/a/b/model.gltf")),
            None,
            &open_policy(),
        )
        .unwrap();
        assert_eq!(
            resolved,
            ResolvedLocation::Endpoint(Endpoint::Path(PathBuf::from("/a/b/tex.png")))
        );
    }

    #[test]
    fn archive_entries_join_the_internal_dir() {
        let resolved = resolve(
            "tex.png",
            &ImportSource::Memory,
            Some("models/scene"),
            &open_policy(),
        )
        .unwrap();
        assert_eq!(
            resolved,
            ResolvedLocation::ArchiveEntry("models/scene/tex.png".to_string())
        );
    }

    #[test]
    fn absolute_uris_pass_through_unchanged() {
        for source in [
            ImportSource::Memory,
            ImportSource::File(PathBuf::from("/a/b/model.gltf")),
        ] {
            let resolved = resolve("http://x/y.png", &source, None, &open_policy()).unwrap();
            assert_eq!(
                resolved,
                ResolvedLocation::Endpoint(Endpoint::Url("http://x/y.png".to_string()))
            );
        }
    }

    #[test]
    fn remote_base_joins_relative_uris() {
        let resolved = resolve(
            "bin/data.bin",
            &ImportSource::Remote("https://cdn.example/models/model.gltf".to_string()),
            None,
            &open_policy(),
        )
        .unwrap();
        assert_eq!(
            resolved,
            ResolvedLocation::Endpoint(Endpoint::Url(
                "https://cdn.example/models/bin/data.bin".to_string()
            ))
        );
    }

    #[test]
    fn sandboxed_hosts_refuse_relative_uris_without_a_base() {
        let policy = SourcePolicy {
            filesystem_access: false,
            sandboxed: true,
            denied_schemes: Vec::new(),
        };
        let err = resolve("tex.png", &ImportSource::Memory, None, &policy).unwrap_err();
        assert!(err.to_string().contains(".glb or .zip"));
    }

    #[test]
    fn denied_schemes_are_refused_with_guidance() {
        let policy = SourcePolicy {
            filesystem_access: true,
            sandboxed: false,
            denied_schemes: vec!["content".to_string()],
        };
        let err = resolve(
            "content://media/external/12",
            &ImportSource::Memory,
            None,
            &policy,
        )
        .unwrap_err();
        assert!(matches!(err, ResolveError::DeniedScheme { .. }));
        assert!(err.to_string().contains(".glb or .zip"));
    }

    #[test]
    fn memory_input_without_archive_has_no_base() {
        let err = resolve("tex.png", &ImportSource::Memory, None, &open_policy()).unwrap_err();
        assert!(matches!(err, ResolveError::NoBase { .. }));
    }

    #[test]
    fn percent_encoding_is_decoded_for_paths() {
        let resolved = resolve(
            "my%20tex.png",
            &ImportSource::File(PathBuf::from("/a/model.gltf")),
            None,
            &open_policy(),
        )
        .unwrap();
        assert_eq!(
            resolved,
            ResolvedLocation::Endpoint(Endpoint::Path(PathBuf::from("/a/my tex.png")))
        );
    }

    #[test]
    fn data_uris_resolve_in_place() {
        let resolved = resolve(
            "data:application/octet-stream;base64,AAA=",
            &ImportSource::Memory,
            None,
            &open_policy(),
        )
        .unwrap();
        assert!(matches!(resolved, ResolvedLocation::Data(_)));
    }
}
