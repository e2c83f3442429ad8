//! Docker v2 registry manifest (schema 1) parsing and validation.
//!
//! The manifest is kept in wire order: `history[0]` describes the most
//! recently added layer. `fs_layers[i]` and `history[i]` correspond
//! positionally.

use serde::Deserialize;

use dockyard_core::error::{DockError, Result};

/// A content-addressed layer blob reference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FsLayer {
    /// Blob digest, e.g. "sha256:a3ed95c..."
    #[serde(rename = "blobSum")]
    pub blob_sum: String,
}

/// Per-layer identity embedded in a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct V1Compatibility {
    /// Layer id
    pub id: String,
    /// Id of the layer beneath this one; empty for the base layer
    #[serde(default)]
    pub parent: String,
}

/// One history entry; corresponds positionally to an `FsLayer`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct History {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: V1Compatibility,
}

/// A manifest signature. The contents are carried but not verified.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub header: serde_json::Value,
    #[serde(default)]
    pub signature: String,
    #[serde(default, rename = "protected")]
    pub protected: String,
}

/// A validated image manifest.
#[derive(Debug, Clone)]
pub struct DockerImageManifest {
    pub name: String,
    pub tag: String,
    pub architecture: String,
    pub schema_version: u32,
    /// Layer blobs, top layer first
    pub fs_layers: Vec<FsLayer>,
    /// Layer identities, top layer first
    pub history: Vec<History>,
    pub signatures: Vec<Signature>,
}

/// Raw wire form; every field optional so validation can name what is
/// missing instead of surfacing a serde error.
#[derive(Deserialize)]
struct RawManifest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    architecture: String,
    #[serde(rename = "schemaVersion")]
    schema_version: Option<u32>,
    #[serde(default, rename = "fsLayers")]
    fs_layers: Vec<FsLayer>,
    #[serde(default)]
    history: Vec<History>,
    #[serde(default)]
    signatures: Vec<Signature>,
}

/// Parse and validate a manifest document.
///
/// Fails with a validation error naming the missing or empty field; no
/// partial recovery is attempted.
pub fn parse(body: &str) -> Result<DockerImageManifest> {
    let raw: RawManifest = serde_json::from_str(body)
        .map_err(|e| DockError::ManifestInvalid(format!("not a manifest document: {}", e)))?;

    let schema_version = raw
        .schema_version
        .ok_or_else(|| DockError::ManifestInvalid("schemaVersion must be present".to_string()))?;

    if raw.fs_layers.is_empty() {
        return Err(DockError::ManifestInvalid(
            "fsLayers must have at least one blobSum".to_string(),
        ));
    }

    if raw.history.is_empty() {
        return Err(DockError::ManifestInvalid(
            "history must have at least one v1Compatibility".to_string(),
        ));
    }

    if raw.signatures.is_empty() {
        return Err(DockError::ManifestInvalid(
            "signatures must have at least one signature".to_string(),
        ));
    }

    if raw.fs_layers.len() != raw.history.len() {
        return Err(DockError::ManifestInvalid(format!(
            "fsLayers ({}) and history ({}) must be the same length",
            raw.fs_layers.len(),
            raw.history.len()
        )));
    }

    for fs_layer in &raw.fs_layers {
        if !fs_layer.blob_sum.contains(':') {
            return Err(DockError::ManifestInvalid(format!(
                "malformed blobSum '{}'",
                fs_layer.blob_sum
            )));
        }
    }

    Ok(DockerImageManifest {
        name: raw.name,
        tag: raw.tag,
        architecture: raw.architecture,
        schema_version,
        fs_layers: raw.fs_layers,
        history: raw.history,
        signatures: raw.signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIGNATURES: &str = r#"[
        {
            "header": {
                "jwk": {
                    "crv": "P-256",
                    "kid": "OOI5:SI3T:LC7D:O7DX:FY6S:IAYW:WDRN:VQEM:BCFL:OIST:Q3LO:GTQQ",
                    "kty": "EC",
                    "x": "J2N5ePGhlblMI2cdsR6NrAG_xbNC_X7s1HRtk5GXvzM",
                    "y": "Idr-tEBjnNnfq6_71aeXBi3Z9ah_rrE209l4wiaohk0"
                },
                "alg": "ES256"
            },
            "signature": "65vq57TakC_yperuhfefF4uvTbKO2L45gYGDs5bIEgOEarAs",
            "protected": "eyJmb3JtYXRMZW5ndGgiOjYwNjMsImZvcm1hdFRhaWwiOiJDbjAifQ"
        }
    ]"#;

    fn full_manifest() -> String {
        format!(
            r#"{{
                "name": "library/busybox",
                "tag": "latest",
                "architecture": "amd64",
                "schemaVersion": 1,
                "fsLayers": [
                    {{"blobSum": "sha256:aaa111"}},
                    {{"blobSum": "sha256:bbb222"}},
                    {{"blobSum": "sha256:aaa111"}}
                ],
                "history": [
                    {{"v1Compatibility": {{"id": "layer-top", "parent": "layer-mid"}}}},
                    {{"v1Compatibility": {{"id": "layer-mid", "parent": "layer-base"}}}},
                    {{"v1Compatibility": {{"id": "layer-base", "parent": ""}}}}
                ],
                "signatures": {}
            }}"#,
            SIGNATURES
        )
    }

    #[test]
    fn test_parse_full_manifest() {
        let manifest = parse(&full_manifest()).unwrap();
        assert_eq!(manifest.name, "library/busybox");
        assert_eq!(manifest.tag, "latest");
        assert_eq!(manifest.architecture, "amd64");
        assert_eq!(manifest.schema_version, 1);
        assert_eq!(manifest.fs_layers.len(), 3);
        assert_eq!(manifest.history.len(), 3);
        assert_eq!(manifest.signatures.len(), 1);
    }

    #[test]
    fn test_wire_order_preserved() {
        // Index 0 stays the top layer; fs_layers[i] matches history[i].
        let manifest = parse(&full_manifest()).unwrap();
        assert_eq!(manifest.history[0].v1_compatibility.id, "layer-top");
        assert_eq!(manifest.history[2].v1_compatibility.id, "layer-base");
        assert_eq!(manifest.history[2].v1_compatibility.parent, "");
        assert_eq!(manifest.fs_layers[0].blob_sum, "sha256:aaa111");
        assert_eq!(manifest.fs_layers[1].blob_sum, "sha256:bbb222");
    }

    #[test]
    fn test_missing_fs_layers() {
        let body = format!(
            r#"{{
                "name": "x", "tag": "latest", "architecture": "amd64",
                "schemaVersion": 1,
                "history": [{{"v1Compatibility": {{"id": "a"}}}}],
                "signatures": {}
            }}"#,
            SIGNATURES
        );
        let err = parse(&body).unwrap_err();
        assert!(err.to_string().contains("fsLayers"));
    }

    #[test]
    fn test_missing_history() {
        let body = format!(
            r#"{{
                "name": "x", "tag": "latest", "architecture": "amd64",
                "schemaVersion": 1,
                "fsLayers": [{{"blobSum": "sha256:aaa"}}],
                "signatures": {}
            }}"#,
            SIGNATURES
        );
        let err = parse(&body).unwrap_err();
        assert!(err.to_string().contains("history"));
    }

    #[test]
    fn test_missing_schema_version() {
        let body = format!(
            r#"{{
                "name": "x", "tag": "latest", "architecture": "amd64",
                "fsLayers": [{{"blobSum": "sha256:aaa"}}],
                "history": [{{"v1Compatibility": {{"id": "a"}}}}],
                "signatures": {}
            }}"#,
            SIGNATURES
        );
        let err = parse(&body).unwrap_err();
        assert!(err.to_string().contains("schemaVersion"));
    }

    #[test]
    fn test_missing_signatures() {
        let body = r#"{
            "name": "x", "tag": "latest", "architecture": "amd64",
            "schemaVersion": 1,
            "fsLayers": [{"blobSum": "sha256:aaa"}],
            "history": [{"v1Compatibility": {"id": "a"}}]
        }"#;
        let err = parse(body).unwrap_err();
        assert!(err.to_string().contains("signatures"));
    }

    #[test]
    fn test_length_mismatch() {
        let body = format!(
            r#"{{
                "name": "x", "tag": "latest", "architecture": "amd64",
                "schemaVersion": 1,
                "fsLayers": [{{"blobSum": "sha256:aaa"}}, {{"blobSum": "sha256:bbb"}}],
                "history": [{{"v1Compatibility": {{"id": "a"}}}}],
                "signatures": {}
            }}"#,
            SIGNATURES
        );
        assert!(parse(&body).is_err());
    }

    #[test]
    fn test_malformed_blob_sum() {
        let body = format!(
            r#"{{
                "name": "x", "tag": "latest", "architecture": "amd64",
                "schemaVersion": 1,
                "fsLayers": [{{"blobSum": "not-a-digest"}}],
                "history": [{{"v1Compatibility": {{"id": "a"}}}}],
                "signatures": {}
            }}"#,
            SIGNATURES
        );
        let err = parse(&body).unwrap_err();
        assert!(err.to_string().contains("blobSum"));
    }

    #[test]
    fn test_not_json() {
        assert!(parse("not json at all").is_err());
    }

    #[test]
    fn test_bare_metadata_is_rejected() {
        // Name/tag/architecture alone do not make a manifest.
        let body = r#"{"name": "x", "tag": "latest", "architecture": "amd64"}"#;
        assert!(parse(body).is_err());
    }
}
