use std::sync::{Arc, Mutex, MutexGuard};

use crate::types::BearerToken;

/// Proof of an installed bearer rule. Pass it back to
/// [`BearerAuth::eject`] to retire the rule.
///
/// Not `Clone`: a rule has exactly one owner.
#[derive(Debug, PartialEq, Eq)]
#[must_use = "dropping a Registration leaves its rule installed with no way to eject it"]
pub struct Registration {
    id: u64,
}

impl Registration {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }
}

#[derive(Debug, Default)]
struct Slot {
    next_id: u64,
    active: Option<(u64, BearerToken)>,
}

/// Request augmentation rule shared by every clone of an
/// [`ApiClient`](crate::ApiClient).
///
/// At most one rule is active. While it is, every outgoing request gets an
/// `Authorization: Bearer <token>` header; otherwise requests go out
/// unauthenticated.
#[derive(Debug, Clone, Default)]
pub struct BearerAuth {
    slot: Arc<Mutex<Slot>>,
}

impl BearerAuth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a rule attaching `token`.
    ///
    /// An already active rule is replaced, so two tokens are never sent at
    /// once; its handle becomes stale.
    pub fn install(&self, token: BearerToken) -> Registration {
        let mut slot = self.lock();
        slot.next_id += 1;
        let id = slot.next_id;
        if let Some((previous, _)) = slot.active.replace((id, token)) {
            tracing::warn!(previous, id, "Replacing active bearer rule");
        } else {
            tracing::debug!(id, "Bearer rule installed");
        }
        Registration { id }
    }

    /// Retire the rule identified by `registration`.
    ///
    /// Returns `false` when the handle is stale (its rule was already
    /// replaced); the active rule is left untouched in that case.
    pub fn eject(&self, registration: Registration) -> bool {
        let mut slot = self.lock();
        match slot.active {
            Some((id, _)) if id == registration.id => {
                slot.active = None;
                tracing::debug!(id, "Bearer rule ejected");
                true
            }
            _ => false,
        }
    }

    /// Token of the active rule, if any.
    #[must_use]
    pub fn current(&self) -> Option<BearerToken> {
        self.lock().active.as_ref().map(|(_, token)| token.clone())
    }

    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.lock().active.is_some()
    }

    /// Attach the active token to `request`.
    #[cfg(feature = "client")]
    pub(crate) fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.current() {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }

    // Slot updates are single assignments; a poisoned slot is still consistent.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }
}
