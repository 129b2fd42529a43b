//! Process-wide session registry.
//!
//! Maps session ids to metadata and the single authoritative live channel.
//! Built on `DashMap` so mutation stays per-key: binding or sweeping one
//! session never serializes unrelated sessions.

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use std::time::Duration;

use crmpilot_types::session::{SessionId, SessionMeta};

use crate::channel::ChannelHandle;

struct SessionEntry {
    meta: SessionMeta,
    channel: Option<ChannelHandle>,
}

/// Registry of known sessions and their live channel bindings.
///
/// At most one channel is bound per session at any instant: `bind` swaps
/// atomically under the entry lock and closes the superseded channel.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionEntry>,
}

/// Counts reported by the status endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct RegistryStats {
    pub sessions: usize,
    pub connected: usize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get-or-create a session, returning its metadata snapshot.
    pub fn ensure(&self, session_id: &SessionId) -> SessionMeta {
        self.sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionEntry {
                meta: SessionMeta::new(session_id.clone()),
                channel: None,
            })
            .meta
            .clone()
    }

    /// Metadata snapshot for an existing session.
    pub fn meta(&self, session_id: &SessionId) -> Option<SessionMeta> {
        self.sessions.get(session_id).map(|e| e.meta.clone())
    }

    /// Atomically attach `channel` as the session's authoritative channel.
    ///
    /// Any previously bound channel is closed and discarded; rebinding is
    /// the client's reconnect-and-resume flow, so no error is surfaced.
    /// Rebinding the already-bound channel is a no-op: the socket handler
    /// binds on upgrade and the client's `join_session` frame re-announces
    /// the same connection, which must not close it. Creates the session on
    /// first contact.
    pub fn bind(&self, session_id: &SessionId, channel: ChannelHandle) {
        let mut entry = self
            .sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionEntry {
                meta: SessionMeta::new(session_id.clone()),
                channel: None,
            });
        let already_bound = entry
            .channel
            .as_ref()
            .is_some_and(|current| current.id() == channel.id());
        if !already_bound {
            if let Some(old) = entry.channel.replace(channel) {
                tracing::debug!(session = %session_id, superseded = %old.id(), "rebinding live channel");
                old.close();
            }
        }
        if let Some(current) = entry.channel.as_ref() {
            current.open();
        }
        entry.meta.last_activity = Utc::now();
    }

    /// Detach a channel, but only if it is still the bound one.
    ///
    /// A superseded socket reporting its own disconnect must not unbind the
    /// replacement that took its place.
    pub fn unbind(&self, session_id: &SessionId, channel_id: Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            if entry
                .channel
                .as_ref()
                .is_some_and(|c| c.id() == channel_id)
            {
                if let Some(old) = entry.channel.take() {
                    old.close();
                }
            }
        }
    }

    /// The session's live channel, if one is bound.
    ///
    /// Absent means "cannot deliver live"; callers fall back to
    /// history-only persistence, never treat this as fatal.
    pub fn resolve(&self, session_id: &SessionId) -> Option<ChannelHandle> {
        self.sessions
            .get(session_id)
            .and_then(|e| e.channel.clone())
    }

    /// Refresh last-activity.
    pub fn touch(&self, session_id: &SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.meta.last_activity = Utc::now();
        }
    }

    /// Refresh last-activity and bump the message counter.
    pub fn record_message(&self, session_id: &SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(session_id) {
            entry.meta.last_activity = Utc::now();
            entry.meta.message_count += 1;
        }
    }

    /// Remove sessions idle longer than `ttl` with no open channel.
    ///
    /// Returns the removed ids so the orchestrator can tear down their
    /// workers. Runs on a periodic task, never inline with requests.
    pub fn sweep(&self, ttl: Duration) -> Vec<SessionId> {
        let cutoff = Utc::now()
            - ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(1800));
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|e| {
                e.meta.last_activity < cutoff
                    && !e.channel.as_ref().is_some_and(ChannelHandle::is_open)
            })
            .map(|e| e.key().clone())
            .collect();

        for id in &expired {
            if let Some((_, entry)) = self.sessions.remove(id) {
                if let Some(channel) = entry.channel {
                    channel.close();
                }
                tracing::info!(session = %id, "swept inactive session");
            }
        }
        expired
    }

    pub fn stats(&self) -> RegistryStats {
        let connected = self
            .sessions
            .iter()
            .filter(|e| e.channel.as_ref().is_some_and(ChannelHandle::is_open))
            .count();
        RegistryStats {
            sessions: self.sessions.len(),
            connected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::ChannelState;

    #[test]
    fn bind_opens_and_resolves() {
        let registry = SessionRegistry::new();
        let session = SessionId::from("s1");
        let (channel, _rx) = ChannelHandle::new(4);

        registry.bind(&session, channel.clone());
        let resolved = registry.resolve(&session).unwrap();
        assert_eq!(resolved.id(), channel.id());
        assert_eq!(resolved.state(), ChannelState::Open);
    }

    #[test]
    fn rebind_supersedes_and_closes_old_channel() {
        let registry = SessionRegistry::new();
        let session = SessionId::from("s1");
        let (first, _rx1) = ChannelHandle::new(4);
        let (second, _rx2) = ChannelHandle::new(4);

        registry.bind(&session, first.clone());
        registry.bind(&session, second.clone());

        assert_eq!(first.state(), ChannelState::Closed);
        let resolved = registry.resolve(&session).unwrap();
        assert_eq!(resolved.id(), second.id());
        assert!(resolved.is_open());
    }

    #[test]
    fn rebinding_same_channel_keeps_it_open() {
        // Bind happens on socket upgrade; the client's join_session frame
        // then rebinds the same connection. That must not close it.
        let registry = SessionRegistry::new();
        let session = SessionId::from("s1");
        let (channel, _rx) = ChannelHandle::new(4);

        registry.bind(&session, channel.clone());
        registry.bind(&session, channel.clone());

        assert_eq!(channel.state(), ChannelState::Open);
        assert!(!channel.closed().is_cancelled());
        let resolved = registry.resolve(&session).unwrap();
        assert_eq!(resolved.id(), channel.id());
        assert!(resolved.is_open());
    }

    #[test]
    fn superseded_socket_cannot_unbind_replacement() {
        let registry = SessionRegistry::new();
        let session = SessionId::from("s1");
        let (first, _rx1) = ChannelHandle::new(4);
        let (second, _rx2) = ChannelHandle::new(4);

        registry.bind(&session, first.clone());
        registry.bind(&session, second.clone());
        registry.unbind(&session, first.id());

        assert!(registry.resolve(&session).is_some());
        registry.unbind(&session, second.id());
        assert!(registry.resolve(&session).is_none());
    }

    #[test]
    fn resolve_unknown_session_is_absent_not_error() {
        let registry = SessionRegistry::new();
        assert!(registry.resolve(&SessionId::from("missing")).is_none());
    }

    #[test]
    fn sweep_removes_idle_disconnected_sessions() {
        let registry = SessionRegistry::new();
        let idle = SessionId::from("idle");
        let live = SessionId::from("live");

        registry.ensure(&idle);
        let (channel, _rx) = ChannelHandle::new(4);
        registry.bind(&live, channel);

        // Both are "fresh", so a zero-ttl sweep with a bound channel keeps `live`.
        let removed = registry.sweep(Duration::from_secs(0));
        assert_eq!(removed, vec![idle.clone()]);
        assert!(registry.meta(&idle).is_none());
        assert!(registry.meta(&live).is_some());
    }

    #[test]
    fn record_message_bumps_counter() {
        let registry = SessionRegistry::new();
        let session = SessionId::from("s1");
        registry.ensure(&session);
        registry.record_message(&session);
        registry.record_message(&session);
        assert_eq!(registry.meta(&session).unwrap().message_count, 2);
    }

    #[test]
    fn stats_count_open_channels() {
        let registry = SessionRegistry::new();
        registry.ensure(&SessionId::from("a"));
        let (channel, _rx) = ChannelHandle::new(4);
        registry.bind(&SessionId::from("b"), channel);

        let stats = registry.stats();
        assert_eq!(stats.sessions, 2);
        assert_eq!(stats.connected, 1);
    }
}
