//! Values threaded through every resolution call.

use super::assembly::ConfigData;
use arc_swap::ArcSwapOption;
use std::sync::Arc;

/// Config servers found through discovery.
///
/// All instances share one credential.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveredInstances {
    /// Base URIs of the discovered servers, in preference order
    pub uris: Vec<String>,
    /// Shared username
    pub username: Option<String>,
    /// Shared password
    pub password: Option<String>,
}

/// Immutable inputs for one resolution.
///
/// Build one per call, typically from a [`ClientState`] snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadContext {
    /// State token from a previous resolution
    pub state: Option<Arc<String>>,
    /// Discovered servers, used when discovery is enabled
    pub discovered: Option<DiscoveredInstances>,
}

impl LoadContext {
    /// A context with no state and no discovered servers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the state token.
    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(Arc::new(state.into()));
        self
    }

    /// Set the discovered servers.
    pub fn with_discovered(mut self, discovered: DiscoveredInstances) -> Self {
        self.discovered = Some(discovered);
        self
    }

    /// The state token as a string slice.
    pub fn state(&self) -> Option<&str> {
        self.state.as_deref().map(String::as_str)
    }
}

/// Process-wide holder for the latest state token.
///
/// Reads are lock-free and never block the writer, so any number of
/// concurrent resolutions can snapshot it.
///
/// # Examples
///
/// ```rust
/// use confhub::client::ClientState;
///
/// let state = ClientState::new();
/// state.set("v42");
/// assert_eq!(state.snapshot().state(), Some("v42"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct ClientState {
    current: Arc<ArcSwapOption<String>>,
}

impl ClientState {
    /// Create an empty holder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the state token.
    pub fn set(&self, state: impl Into<String>) {
        self.current.store(Some(Arc::new(state.into())));
    }

    /// Forget the state token.
    pub fn clear(&self) {
        self.current.store(None);
    }

    /// The current token.
    pub fn get(&self) -> Option<Arc<String>> {
        self.current.load_full()
    }

    /// Carry the state returned with `data` into later resolutions.
    ///
    /// Leaves the holder untouched when the server returned no state.
    pub fn record(&self, data: &ConfigData) {
        if let Some(state) = data.state() {
            self.set(state);
        }
    }

    /// A load context carrying the current token.
    pub fn snapshot(&self) -> LoadContext {
        LoadContext {
            state: self.get(),
            discovered: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let state = ClientState::new();
        assert!(state.get().is_none());

        state.set("s1");
        assert_eq!(state.get().as_deref().map(String::as_str), Some("s1"));

        state.clear();
        assert!(state.snapshot().state().is_none());
    }

    #[test]
    fn test_clones_share_the_token() {
        let state = ClientState::new();
        let other = state.clone();
        state.set("shared");
        assert_eq!(other.snapshot().state(), Some("shared"));
    }

    #[test]
    fn test_snapshot_is_immutable() {
        let state = ClientState::new();
        state.set("before");
        let context = state.snapshot();
        state.set("after");
        assert_eq!(context.state(), Some("before"));
    }

    #[test]
    fn test_concurrent_readers() {
        let state = ClientState::new();
        state.set("s");
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = state.clone();
                std::thread::spawn(move || state.snapshot().state().map(str::to_string))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_deref(), Some("s"));
        }
    }
}
