use serde::{Deserialize, Serialize};

use crate::UserId;

/// The authenticated identity attempting an operation.
///
/// Construction happens at the transport boundary from whatever session
/// or token layer the embedding service uses; the core only consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    user_id: UserId,
    ip_address: Option<String>,
}

impl ActorContext {
    /// Creates an actor context from session data.
    #[must_use]
    pub fn new(user_id: UserId, ip_address: Option<String>) -> Self {
        Self {
            user_id,
            ip_address,
        }
    }

    /// Returns the acting user's identifier.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the source address recorded on audit entries, if known.
    #[must_use]
    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }
}
