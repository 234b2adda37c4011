//! # Reaction Service
//!
//! Tracks which punchlines the signed-in user liked or disliked. This is
//! separate from the aggregate counts on jokes and punchlines.

use std::sync::Arc;

use jb_core::{AppError, LocalCache, ReactionKind, ReactionMap, Result};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::gateway::RemoteGateway;
use crate::state::{Optimistic, ReactionSession};

/// Where the map published by `sign_in` came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionSource {
    Remote,
    Cache,
}

pub struct ReactionService {
    gateway: Arc<RemoteGateway>,
    cache: Arc<dyn LocalCache>,
    session: watch::Sender<ReactionSession>,
}

impl ReactionService {
    pub fn new(gateway: Arc<RemoteGateway>, cache: Arc<dyn LocalCache>) -> Self {
        let (session, _) = watch::channel(ReactionSession::default());
        Self { gateway, cache, session }
    }

    pub fn subscribe(&self) -> watch::Receiver<ReactionSession> {
        self.session.subscribe()
    }

    pub fn snapshot(&self) -> ReactionSession {
        self.session.borrow().clone()
    }

    pub fn reaction(&self, punchline_id: &str) -> Option<ReactionKind> {
        self.session.borrow().reactions.get(punchline_id).copied()
    }

    /// Publishes the cached map, then replaces it wholesale with the remote one.
    /// When the remote is unreachable the cached map stays.
    pub async fn sign_in(&self, user_id: &str) -> ReactionSource {
        let cached = self.cache.load_reactions(user_id);
        self.session.send_replace(ReactionSession {
            user_id: Some(user_id.to_string()),
            reactions: cached,
        });

        let remote = match self.gateway.load_reactions(user_id).await {
            Ok(map) => map,
            Err(err) => {
                warn!(user = user_id, error = %err, "reaction sync failed, using cached reactions");
                return ReactionSource::Cache;
            }
        };

        let mut applied = false;
        self.session.send_if_modified(|s| {
            // The user may have signed out while the request was in flight.
            if s.user_id.as_deref() != Some(user_id) {
                return false;
            }
            s.reactions = remote.clone();
            applied = true;
            true
        });
        if applied {
            self.persist(user_id, &remote).await;
            info!(user = user_id, count = remote.len(), "reactions synced from remote");
        }
        ReactionSource::Remote
    }

    pub fn sign_out(&self) {
        self.session.send_replace(ReactionSession::default());
    }

    /// Same reaction as stored removes it; anything else sets or overwrites.
    /// Returns the punchline's new reaction.
    pub async fn toggle(&self, punchline_id: &str, kind: ReactionKind) -> Result<Optimistic<Option<ReactionKind>>> {
        let mut change = None;
        self.session.send_if_modified(|s| {
            let Some(user_id) = s.user_id.clone() else {
                return false;
            };
            let next = match s.reactions.get(punchline_id) {
                Some(current) if *current == kind => None,
                _ => Some(kind),
            };
            match next {
                Some(kind) => s.reactions.insert(punchline_id.to_string(), kind),
                None => s.reactions.remove(punchline_id),
            };
            change = Some((user_id, next, s.reactions.clone()));
            true
        });
        let Some((user_id, next, reactions)) = change else {
            return Err(AppError::Unauthorized("sign in to react".to_string()));
        };

        self.persist(&user_id, &reactions).await;

        let gateway = Arc::clone(&self.gateway);
        let punchline_id = punchline_id.to_string();
        let remote = tokio::spawn(async move {
            if let Err(err) = gateway.set_reaction(&user_id, &punchline_id, next).await {
                warn!(user = %user_id, punchline = %punchline_id, error = %err, "remote reaction write failed");
            }
        });
        Ok(Optimistic { value: next, remote })
    }

    async fn persist(&self, user_id: &str, reactions: &ReactionMap) {
        if let Err(err) = self.cache.store_reactions(user_id, reactions).await {
            warn!(user = user_id, error = %err, "failed to persist reactions");
        }
    }
}
