/// Failures surfaced to the broker's caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The channel id is not in the routing table. No peer was contacted.
    #[error("Unsupported channel: {0}")]
    UnsupportedChannel(String),

    /// The selected peer answered with an in-band error; carried verbatim.
    #[error("{0}")]
    UpstreamError(String),

    #[error("No usable response from sampled peers")]
    NoUsableResponse,
}

impl BrokerError {
    /// `true` for errors caused by the request itself rather than the peers.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidRequest(_) | Self::UnsupportedChannel(_))
    }
}
