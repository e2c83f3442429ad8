//! Image reference parsing.
//!
//! Parses references like `registry.io:5000/library/busybox:1.36` into
//! structured components. References are inherently ambiguous when
//! repository names include slashes; the first component is taken to be a
//! registry only when it contains a `.` or `:` or equals `localhost`, the
//! same disambiguation rule the Docker CLI applies.

use dockyard_core::error::{DockError, Result};

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Parsed image reference.
///
/// A digest reference (`repo@sha256:...`) stores the digest string verbatim
/// in the `tag` field. The registry is optional; when absent, the caller's
/// configured registry endpoint applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageName {
    /// Registry host, e.g. "registry.io:5000"
    pub registry: Option<String>,
    /// Repository path, e.g. "library/busybox"
    pub repository: String,
    /// Tag, or a digest string stored verbatim
    pub tag: String,
}

impl ImageName {
    /// Parse an image reference string.
    ///
    /// Supported forms:
    /// - `busybox` → busybox:latest
    /// - `library/busybox:1.36` → library/busybox:1.36
    /// - `registry.io:80/library/busybox` → registry + repository + latest
    /// - `library/busybox@sha256:...` → digest stored as the tag
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(DockError::ImageReference(
                "empty image reference".to_string(),
            ));
        }

        let mut tag: Option<String> = None;

        // Extract the digest. It is kept verbatim in the tag field.
        let mut rest = match reference.split_once('@') {
            Some((head, digest)) => {
                tag = Some(digest.to_string());
                head.to_string()
            }
            None => reference.to_string(),
        };

        // Remove the tag, minding host:port registries: the tag must be the
        // last `:`-component, and only if no slash follows it.
        let split = rest
            .rsplit_once(':')
            .map(|(head, last)| (head.to_string(), last.to_string()));
        if let Some((head, last)) = split {
            if !last.contains('/') {
                tag = Some(last);
                rest = head;
            }
        }

        let tag = match tag {
            Some(t) if !t.is_empty() => t,
            _ => DEFAULT_TAG.to_string(),
        };

        // The first component is a registry only if it looks like a host.
        let (registry, repository) = match rest.split_once('/') {
            Some((first, remainder))
                if first.contains('.') || first.contains(':') || first == "localhost" =>
            {
                (Some(first.to_string()), remainder.to_string())
            }
            _ => (None, rest.clone()),
        };

        if repository.is_empty() {
            return Err(DockError::ImageReference(format!(
                "no repository in reference '{}'",
                reference
            )));
        }

        Ok(ImageName {
            registry,
            repository,
            tag,
        })
    }

    /// Canonical string form, used as the store cache key and as the local
    /// archive file name.
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for ImageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(ref registry) = self.registry {
            write!(f, "{}/{}", registry, self.repository)?;
        } else {
            write!(f, "{}", self.repository)?;
        }
        // A digest stored in the tag field renders back with `@`, so the
        // rendered form parses to the same components.
        if self.tag.contains(':') {
            write!(f, "@{}", self.tag)
        } else {
            write!(f, ":{}", self.tag)
        }
    }
}

impl std::str::FromStr for ImageName {
    type Err = DockError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s)
    }
}
