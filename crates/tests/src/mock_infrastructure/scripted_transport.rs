//! Transport whose per-peer behaviour is scripted up front.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{
    transport::{Transport, TransportError},
    types::{Peer, PeerId, RelayEnvelope},
};
use std::{collections::HashMap, time::Duration};

/// What a peer does when called.
#[derive(Debug, Clone)]
pub enum PeerScript {
    /// Answers with `response` after `delay`.
    Respond { response: String, delay: Duration },
    /// Answers with an in-band error after `delay`.
    Error { error: String, delay: Duration },
    /// Sets both fields at once, as a misbehaving peer might.
    Conflicting { response: String, error: String },
    /// Comes back with neither response nor error.
    Empty,
    /// Never answers before the caller's timeout.
    Hang,
    /// Connection refused.
    Refuse,
}

impl PeerScript {
    #[must_use]
    pub fn respond(response: impl Into<String>) -> Self {
        Self::Respond { response: response.into(), delay: Duration::ZERO }
    }

    #[must_use]
    pub fn respond_after(response: impl Into<String>, delay: Duration) -> Self {
        Self::Respond { response: response.into(), delay }
    }

    #[must_use]
    pub fn error(error: impl Into<String>) -> Self {
        Self::Error { error: error.into(), delay: Duration::ZERO }
    }
}

/// In-process [`Transport`] driven by a script per peer uid.
///
/// Unscripted peers refuse the connection. Every call is logged in arrival order.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<PeerId, PeerScript>>,
    calls: Mutex<Vec<PeerId>>,
}

impl ScriptedTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(self, uid: u16, script: PeerScript) -> Self {
        self.script(uid, script);
        self
    }

    pub fn script(&self, uid: u16, script: PeerScript) {
        self.scripts.lock().insert(PeerId(uid), script);
    }

    /// Uids called so far, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<PeerId> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        peer: &Peer,
        envelope: &RelayEnvelope,
        timeout: Duration,
    ) -> Result<RelayEnvelope, TransportError> {
        self.calls.lock().push(peer.uid);
        let script = self.scripts.lock().get(&peer.uid).cloned().unwrap_or(PeerScript::Refuse);

        match script {
            PeerScript::Respond { response, delay } => {
                tokio::time::sleep(delay).await;
                Ok(envelope.clone().with_response(response))
            }
            PeerScript::Error { error, delay } => {
                tokio::time::sleep(delay).await;
                Ok(envelope.clone().with_error(error))
            }
            PeerScript::Conflicting { response, error } => Ok(RelayEnvelope {
                response: Some(response),
                error: Some(error),
                ..envelope.clone()
            }),
            PeerScript::Empty => Ok(envelope.clone()),
            PeerScript::Hang => {
                tokio::time::sleep(timeout + Duration::from_secs(3600)).await;
                Err(TransportError::Timeout)
            }
            PeerScript::Refuse => {
                Err(TransportError::ConnectionFailed(format!("peer {} refused", peer.uid)))
            }
        }
    }
}
