use futures_util::{SinkExt, StreamExt};
use std::{sync::Arc, time::Duration};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::{handle_frame, IngressError};
use crate::broker::RequestBroker;

/// How a connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionEnd {
    Closed,
    Shutdown,
}

/// Client for a persistent entrypoint that pushes requests over a websocket.
///
/// Every text frame is a `{channel_id, payload}` request. Each frame is served in its own
/// task and the reply is written back on the same connection, so replies may be
/// interleaved in completion order. When the connection drops the client waits
/// `reconnect_delay` and dials again until shutdown.
pub struct StreamIngress {
    url: String,
    reconnect_delay: Duration,
    broker: Arc<RequestBroker>,
}

impl StreamIngress {
    #[must_use]
    pub fn new(url: impl Into<String>, reconnect_delay: Duration, broker: Arc<RequestBroker>) -> Self {
        Self { url: url.into(), reconnect_delay, broker }
    }

    #[must_use]
    pub fn start_with_shutdown(
        self: Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match self.run_connection(&mut shutdown_rx).await {
                    Ok(ConnectionEnd::Shutdown) => break,
                    Ok(ConnectionEnd::Closed) => {
                        warn!(url = %self.url, "entrypoint stream closed, reconnecting");
                    }
                    Err(e) => {
                        error!(url = %self.url, error = %e, "entrypoint stream failed");
                    }
                }

                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    () = tokio::time::sleep(self.reconnect_delay) => {}
                }
            }
            info!("stream ingress shutting down");
        })
    }

    async fn run_connection(
        &self,
        shutdown_rx: &mut broadcast::Receiver<()>,
    ) -> Result<ConnectionEnd, IngressError> {
        let (ws_stream, response) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| IngressError::ConnectionFailed(e.to_string()))?;
        info!(
            url = %self.url,
            status = response.status().as_u16(),
            "connected to entrypoint stream"
        );

        let (mut write, mut read) = ws_stream.split();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

        // Outlives the reader so replies for in-flight requests still go out after the
        // stream stops being read.
        tokio::spawn(async move {
            while let Some(reply) = reply_rx.recv().await {
                if let Err(e) = write.send(Message::Text(reply.into())).await {
                    debug!(error = %e, "dropping reply, stream is gone");
                    break;
                }
            }
        });

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.recv() => return Ok(ConnectionEnd::Shutdown),
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let broker = Arc::clone(&self.broker);
                        let reply_tx = reply_tx.clone();
                        let frame = text.as_str().to_owned();
                        tokio::spawn(async move {
                            let reply = handle_frame(&broker, &frame).await;
                            let _ = reply_tx.send(reply);
                        });
                    }
                    Some(Ok(Message::Close(_))) | None => return Ok(ConnectionEnd::Closed),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(IngressError::Stream(e.to_string())),
                },
            }
        }
    }
}
