//! Registry error types, generalized from `registry::error::RegistryError`
//! from the flat-address-space `app/stream` keying to arbitrary element
//! paths.

use super::Path;

#[derive(Debug, Clone)]
pub enum RegistryError {
    /// No element is registered to serve this path.
    PathNotFound(Path),
    /// An element at this path already has an active publisher/source.
    AlreadyPublishing(Path),
    /// The caller's identity didn't match the path's current owner.
    PublisherMismatch,
    /// The element exists but is not currently accepting requests (e.g.
    /// in a grace period with no publisher).
    NotActive(Path),
    /// A request's advertised capabilities don't intersect what the
    /// element serves.
    CapabilityMismatch { path: Path, reason: String },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::PathNotFound(p) => write!(f, "no element provides path: {p}"),
            RegistryError::AlreadyPublishing(p) => write!(f, "path already has a publisher: {p}"),
            RegistryError::PublisherMismatch => write!(f, "publisher identity mismatch"),
            RegistryError::NotActive(p) => write!(f, "path not active: {p}"),
            RegistryError::CapabilityMismatch { path, reason } => {
                write!(f, "capability mismatch at {path}: {reason}")
            }
        }
    }
}

impl std::error::Error for RegistryError {}
