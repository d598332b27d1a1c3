//! Core type definitions shared by the broker, the worker and the ingress layers.
//!
//! # Type Categories
//!
//! ## Identity
//! - [`PeerId`]: roster uid of a worker peer
//! - [`Peer`]: uid plus the network address the transport dials
//!
//! ## Routing
//! - [`Channel`]: the static set of chain identifiers a request may be routed on
//!
//! ## Envelopes
//! - [`RelayEnvelope`]: the request/response body exchanged between broker and peers
//! - [`RelayReply`]: what the broker hands back to its own caller, exactly one of
//!   `response` or `error`

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, str::FromStr, sync::LazyLock};

/// Channel identifiers recognised by default, in declaration order.
pub const SUPPORTED_CHANNELS: &[&str] = &[
    "eth-mainnet",
    "eth-sepolia",
    "linea-mainnet",
    "linea-sepolia",
    "polygon-mainnet",
    "optimism-mainnet",
    "optimism-sepolia",
    "arbitrum-mainnet",
    "arbitrum-sepolia",
    "avalanche-mainnet",
    "avalanche-fuji",
    "base-mainnet",
    "base-sepolia",
];

static SUPPORTED_CHANNELS_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| SUPPORTED_CHANNELS.iter().copied().collect());

/// Check if a channel id is in the default routing table (O(1) lookup)
#[inline]
#[must_use]
pub fn is_channel_supported(channel_id: &str) -> bool {
    SUPPORTED_CHANNELS_SET.contains(channel_id)
}

/// Opaque identifier of a worker peer.
///
/// Peers are identified by their uid on the ledger. Ordering follows the roster's
/// index order, which is also the order weights are submitted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(pub u16);

impl PeerId {
    #[must_use]
    pub const fn new(uid: u16) -> Self {
        Self(uid)
    }

    #[must_use]
    pub const fn uid(self) -> u16 {
        self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for PeerId {
    fn from(uid: u16) -> Self {
        Self(uid)
    }
}

/// A roster entry: the peer's uid and the address its worker endpoint listens on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub uid: PeerId,
    /// `host:port` (or a full base URL) of the peer's relay endpoint.
    pub address: String,
}

impl Peer {
    #[must_use]
    pub fn new(uid: impl Into<PeerId>, address: impl Into<String>) -> Self {
        Self { uid: uid.into(), address: address.into() }
    }
}

/// Chains a worker can forward to.
///
/// The string form is the channel id carried in [`RelayEnvelope::channel_id`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Channel {
    EthMainnet,
    EthSepolia,
    LineaMainnet,
    LineaSepolia,
    PolygonMainnet,
    OptimismMainnet,
    OptimismSepolia,
    ArbitrumMainnet,
    ArbitrumSepolia,
    AvalancheMainnet,
    AvalancheFuji,
    BaseMainnet,
    BaseSepolia,
}

impl Channel {
    pub const ALL: [Channel; 13] = [
        Self::EthMainnet,
        Self::EthSepolia,
        Self::LineaMainnet,
        Self::LineaSepolia,
        Self::PolygonMainnet,
        Self::OptimismMainnet,
        Self::OptimismSepolia,
        Self::ArbitrumMainnet,
        Self::ArbitrumSepolia,
        Self::AvalancheMainnet,
        Self::AvalancheFuji,
        Self::BaseMainnet,
        Self::BaseSepolia,
    ];

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EthMainnet => "eth-mainnet",
            Self::EthSepolia => "eth-sepolia",
            Self::LineaMainnet => "linea-mainnet",
            Self::LineaSepolia => "linea-sepolia",
            Self::PolygonMainnet => "polygon-mainnet",
            Self::OptimismMainnet => "optimism-mainnet",
            Self::OptimismSepolia => "optimism-sepolia",
            Self::ArbitrumMainnet => "arbitrum-mainnet",
            Self::ArbitrumSepolia => "arbitrum-sepolia",
            Self::AvalancheMainnet => "avalanche-mainnet",
            Self::AvalancheFuji => "avalanche-fuji",
            Self::BaseMainnet => "base-mainnet",
            Self::BaseSepolia => "base-sepolia",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known [`Channel`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unsupported channel: {0}")]
pub struct UnknownChannel(pub String);

impl FromStr for Channel {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|channel| channel.as_str() == s)
            .ok_or_else(|| UnknownChannel(s.to_string()))
    }
}

impl TryFrom<String> for Channel {
    type Error = UnknownChannel;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Channel> for String {
    fn from(channel: Channel) -> Self {
        channel.as_str().to_string()
    }
}

/// Request/response envelope exchanged with peers.
///
/// The broker sends it with only `channel_id` and `payload` populated; a peer fills in
/// exactly one of `response` or `error`. An envelope that comes back with neither set
/// is a valid "no answer" outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub channel_id: String,
    /// Opaque request body, forwarded untouched.
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayEnvelope {
    /// Creates an unanswered request envelope.
    #[must_use]
    pub fn request(channel_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self { channel_id: channel_id.into(), payload: payload.into(), response: None, error: None }
    }

    /// Returns a copy of this envelope answered with `response`.
    #[must_use]
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self.error = None;
        self
    }

    /// Returns a copy of this envelope answered with an in-band `error`.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.response = None;
        self
    }

    /// `true` when the peer filled in either a response or an error.
    #[must_use]
    pub fn is_answered(&self) -> bool {
        self.response.is_some() || self.error.is_some()
    }
}

/// Inbound request body accepted by the broker's ingress endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub channel_id: String,
    pub payload: String,
}

impl From<RelayRequest> for RelayEnvelope {
    fn from(request: RelayRequest) -> Self {
        Self::request(request.channel_id, request.payload)
    }
}

/// Reply handed back to the broker's caller. Serializes as `{"response": ..}` or
/// `{"error": ..}`, never both.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayReply {
    Response(String),
    Error(String),
}

impl RelayReply {
    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}
