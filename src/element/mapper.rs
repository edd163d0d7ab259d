//! Path → element resolution and capability negotiation, generalizing
//! `registry::store::StreamRegistry`'s flat `app/name` table to arbitrary
//! named [`Element`]s.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use super::{Capabilities, Element, Path, RegistryError, Request, RequestId};
use crate::tag::Tag;

/// Registry of named elements, resolved by [`Path`]. Where
/// `StreamRegistry` hard-coded "a stream is a GOP buffer plus a broadcast
/// channel", `ElementMapper` only knows how to find the `Element` that
/// owns a path and hand it the request — what that element does with it
/// (source, filter, switcher) is up to the element.
#[derive(Default)]
pub struct ElementMapper {
    elements: RwLock<HashMap<Path, Arc<dyn Element>>>,
}

impl ElementMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_element(&self, path: Path, element: Arc<dyn Element>) {
        tracing::info!(path = %path, "element registered");
        self.elements.write().await.insert(path, element);
    }

    pub async fn unregister_element(&self, path: &Path) {
        if self.elements.write().await.remove(path).is_some() {
            tracing::info!(path = %path, "element unregistered");
        }
    }

    pub async fn lookup(&self, path: &Path) -> Option<Arc<dyn Element>> {
        self.elements.read().await.get(path).cloned()
    }

    /// Resolve `request.path` to an element and hand off the request,
    /// enforcing capability negotiation against `caps` first
    /// (spec §3.3: `caps` is the tag_type/flavour_mask the client accepts).
    pub async fn add_request(
        &self,
        request: Request,
    ) -> Result<mpsc::UnboundedReceiver<Tag>, RegistryError> {
        let element = self
            .lookup(&request.path)
            .await
            .ok_or_else(|| RegistryError::PathNotFound(request.path.clone()))?;

        negotiate_capabilities(&request.caps, &request.path)?;
        element.add_request(request)
    }

    pub async fn remove_request(&self, path: &Path, id: RequestId) {
        if let Some(element) = self.lookup(path).await {
            element.remove_request(id);
        }
    }
}

/// Placeholder negotiation hook: a request whose `flavour_mask` is zero
/// can never match any tag and is rejected up front rather than silently
/// starved (mirrors the original failing fast on an unserviceable
/// capability set instead of registering a callback that never fires).
fn negotiate_capabilities(caps: &Capabilities, path: &Path) -> Result<(), RegistryError> {
    if caps.flavour_mask == 0 {
        return Err(RegistryError::CapabilityMismatch {
            path: path.clone(),
            reason: "empty flavour mask can never match any tag".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ServingInfo;

    struct StubElement {
        name: String,
    }

    impl Element for StubElement {
        fn name(&self) -> &str {
            &self.name
        }

        fn add_request(
            &self,
            _request: Request,
        ) -> Result<mpsc::UnboundedReceiver<Tag>, RegistryError> {
            let (_tx, rx) = mpsc::unbounded_channel();
            Ok(rx)
        }

        fn remove_request(&self, _id: RequestId) {}

        fn serving_info(&self) -> Option<ServingInfo> {
            None
        }
    }

    #[tokio::test]
    async fn lookup_missing_path_errors() {
        let mapper = ElementMapper::new();
        let req = Request::new(Path::new("live/missing"), 1, "client", Capabilities::any());
        let err = mapper.add_request(req).await.unwrap_err();
        assert!(matches!(err, RegistryError::PathNotFound(_)));
    }

    #[tokio::test]
    async fn registered_element_resolves() {
        let mapper = ElementMapper::new();
        mapper
            .register_element(
                Path::new("live/camera1"),
                Arc::new(StubElement { name: "camera1".into() }),
            )
            .await;
        let req = Request::new(Path::new("live/camera1"), 1, "client", Capabilities::any());
        assert!(mapper.add_request(req).await.is_ok());
    }

    #[tokio::test]
    async fn empty_flavour_mask_is_rejected() {
        let mapper = ElementMapper::new();
        mapper
            .register_element(
                Path::new("live/camera1"),
                Arc::new(StubElement { name: "camera1".into() }),
            )
            .await;
        let req = Request::new(
            Path::new("live/camera1"),
            1,
            "client",
            Capabilities { flavour_mask: 0 },
        );
        let err = mapper.add_request(req).await.unwrap_err();
        assert!(matches!(err, RegistryError::CapabilityMismatch { .. }));
    }
}
