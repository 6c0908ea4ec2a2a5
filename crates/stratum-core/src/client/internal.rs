use std::sync::Arc;

use stratum_persistence::registry::SessionRegistry;

/// The state shared by all clones of a [super::Client].
pub struct InternalClient {
    registry: Arc<SessionRegistry>,
}

impl std::fmt::Debug for InternalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InternalClient").finish()
    }
}

impl InternalClient {
    pub(crate) fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The client's session registry, for bootstrap code that registers
    /// factories.
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}
