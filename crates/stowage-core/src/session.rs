//! Session context consumed by the orphanage.
//!
//! The HTTP layer owns the session; this crate only sees an explicit context
//! object passed into the orphanage at construction time. There is no ambient
//! or global session state.

use std::sync::Arc;

/// Liveness and identity of the current upload session.
pub trait SessionContext: Send + Sync {
    /// Whether a session is currently active. Orphanage uploads are refused
    /// without one.
    fn is_active(&self) -> bool;

    /// The session identifier used as the staging isolation prefix.
    fn id(&self) -> String;
}

/// A fixed session value, for wiring code that resolves the session once per
/// request and for tests.
#[derive(Clone, Debug)]
pub struct FixedSession {
    id: String,
    active: bool,
}

impl FixedSession {
    pub fn active(id: impl Into<String>) -> Arc<Self> {
        Arc::new(FixedSession {
            id: id.into(),
            active: true,
        })
    }

    pub fn inactive() -> Arc<Self> {
        Arc::new(FixedSession {
            id: String::new(),
            active: false,
        })
    }
}

impl SessionContext for FixedSession {
    fn is_active(&self) -> bool {
        self.active
    }

    fn id(&self) -> String {
        self.id.clone()
    }
}
