//! Resolves a `module:callable`-style target string to a boxed [`Application`] factory.
//!
//! Rust has no runtime module loader, so the source's `importlib.import_module` + `getattr` is
//! re-grounded here as a small static registry built once at startup.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::app::Application;
use crate::demos::chat::ChatDemo;

type Factory = fn() -> Arc<dyn Application>;

static REGISTRY: Lazy<HashMap<&'static str, Factory>> = Lazy::new(|| {
    let mut map: HashMap<&'static str, Factory> = HashMap::new();
    map.insert("demos.chat:app", || Arc::new(ChatDemo::new()) as Arc<dyn Application>);
    map
});

/// Error resolving an application target; unknown targets are a startup-time configuration
/// error, never a per-connection one.
#[derive(Debug, thiserror::Error)]
#[error("unknown application target {0:?}; known targets: {1:?}")]
pub struct UnknownTarget(pub String, pub Vec<&'static str>);

/// Resolves `target` (e.g. `"demos.chat:app"`) to a freshly constructed application instance.
pub fn resolve(target: &str) -> Result<Arc<dyn Application>, UnknownTarget> {
    match REGISTRY.get(target) {
        Some(factory) => Ok(factory()),
        None => Err(UnknownTarget(target.to_string(), REGISTRY.keys().copied().collect())),
    }
}
