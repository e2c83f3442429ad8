use thiserror::Error;

/// Dockyard error types.
///
/// The enum is `Clone` because the outcome of a coalesced pull is broadcast
/// to every waiter; variants therefore carry rendered cause text rather
/// than source errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DockError {
    /// Registry 401 response without a usable challenge
    #[error("Authentication challenge missing or malformed: {0}")]
    AuthChallenge(String),

    /// Token endpoint unreachable or returned a bad status
    #[error("Token request failed: {0}")]
    TokenRequest(String),

    /// Bearer token failed structural parsing
    #[error("Malformed bearer token: {0}")]
    TokenMalformed(String),

    /// Bearer token parsed but is expired or not yet valid
    #[error("Token not usable: {0}")]
    TokenInvalid(String),

    /// Image manifest failed validation
    #[error("Invalid image manifest: {0}")]
    ManifestInvalid(String),

    /// Registry request failed without a recognized error body
    #[error("Registry request failed: {0}")]
    RegistryRequest(String),

    /// Registry reported errors in its response body
    #[error("Registry error response: {0}")]
    RegistryResponse(String),

    /// Archive extraction failed
    #[error("Layer extraction failed: {0}")]
    Extraction(String),

    /// Local image archive is missing pieces or inconsistent
    #[error("Malformed local image archive: {0}")]
    LocalArchive(String),

    /// Store directory create/read/write failure
    #[error("Store I/O error: {0}")]
    StoreIo(String),

    /// Image reference string could not be parsed
    #[error("Invalid image reference: {0}")]
    ImageReference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),

    /// A coalesced pull terminated without delivering an outcome
    #[error("Pull failed: {0}")]
    Pull(String),
}

impl From<std::io::Error> for DockError {
    fn from(err: std::io::Error) -> Self {
        DockError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for DockError {
    fn from(err: serde_json::Error) -> Self {
        DockError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DockError {
    fn from(err: serde_yaml::Error) -> Self {
        DockError::Serialization(err.to_string())
    }
}

/// Result type alias for Dockyard operations
pub type Result<T> = std::result::Result<T, DockError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_challenge_display() {
        let error = DockError::AuthChallenge("no WWW-Authenticate header".to_string());
        assert_eq!(
            error.to_string(),
            "Authentication challenge missing or malformed: no WWW-Authenticate header"
        );
    }

    #[test]
    fn test_token_errors_are_distinguishable() {
        let malformed = DockError::TokenMalformed("expected three segments".to_string());
        let invalid = DockError::TokenInvalid("token expired".to_string());
        assert!(malformed.to_string().contains("Malformed"));
        assert!(invalid.to_string().contains("not usable"));
        assert_ne!(malformed, invalid);
    }

    #[test]
    fn test_manifest_invalid_display() {
        let error = DockError::ManifestInvalid("fsLayers must have at least one blobSum".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid image manifest: fsLayers must have at least one blobSum"
        );
    }

    #[test]
    fn test_registry_response_display() {
        let error = DockError::RegistryResponse("[Error1, Error2]".to_string());
        assert!(error.to_string().contains("Error1"));
        assert!(error.to_string().contains("Error2"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let dock_error: DockError = io_error.into();
        assert!(matches!(dock_error, DockError::Io(_)));
        assert!(dock_error.to_string().contains("file not found"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_str = "{ invalid json }";
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str(json_str);
        let dock_error: DockError = result.unwrap_err().into();
        assert!(matches!(dock_error, DockError::Serialization(_)));
    }

    #[test]
    fn test_error_is_cloneable() {
        let error = DockError::Pull("network unreachable".to_string());
        let cloned = error.clone();
        assert_eq!(error, cloned);
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(DockError::Config("missing store dir".to_string()))
        }

        assert_eq!(returns_ok().unwrap(), 42);
        assert!(returns_err().is_err());
    }
}
