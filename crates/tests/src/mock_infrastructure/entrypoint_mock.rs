//! Mock entrypoint that pushes requests to a broker over a websocket.
//!
//! The broker dials in as a client. Tests push request frames with [`MockEntrypoint::push`]
//! and read back whatever the broker replied with [`MockEntrypoint::next_reply`].

use futures_util::{SinkExt, StreamExt};
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{broadcast, mpsc, Mutex},
    task::JoinHandle,
};
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub struct MockEntrypoint {
    addr: SocketAddr,
    outbound: broadcast::Sender<Message>,
    replies: Mutex<mpsc::UnboundedReceiver<String>>,
    connections: Arc<AtomicUsize>,
    server_handle: JoinHandle<()>,
}

impl MockEntrypoint {
    /// Binds on a random local port.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind.
    pub async fn new() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (outbound, _) = broadcast::channel(64);
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let connections = Arc::new(AtomicUsize::new(0));

        let server_handle = {
            let outbound = outbound.clone();
            let connections = connections.clone();
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let frames = outbound.subscribe();
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(Self::handle_connection(stream, frames, reply_tx.clone()));
                }
            })
        };

        Ok(Self { addr, outbound, replies: Mutex::new(reply_rx), connections, server_handle })
    }

    async fn handle_connection(
        stream: TcpStream,
        mut outbound: broadcast::Receiver<Message>,
        replies: mpsc::UnboundedSender<String>,
    ) {
        let Ok(ws_stream) = accept_async(stream).await else { return };
        let (mut write, mut read) = ws_stream.split();

        loop {
            tokio::select! {
                message = outbound.recv() => {
                    let Ok(message) = message else { return };
                    let closing = matches!(message, Message::Close(_));
                    if write.send(message).await.is_err() || closing {
                        return;
                    }
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        let _ = replies.send(text.as_str().to_owned());
                    }
                    Some(Ok(Message::Close(_)) | Err(_)) | None => return,
                    Some(Ok(_)) => {}
                },
            }
        }
    }

    #[must_use]
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of connections accepted so far.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Waits until at least `count` connections were accepted.
    pub async fn wait_for_connections(&self, count: usize, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while self.connection_count() < count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }

    /// Sends a request frame to every connected broker.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.outbound.send(Message::Text(frame.into().into()));
    }

    /// Closes every open connection.
    pub fn disconnect_all(&self) {
        let _ = self.outbound.send(Message::Close(None));
    }

    /// Next reply written by a broker, or `None` if none arrives within `within`.
    pub async fn next_reply(&self, within: Duration) -> Option<String> {
        let mut replies = self.replies.lock().await;
        tokio::time::timeout(within, replies.recv()).await.ok().flatten()
    }
}

impl Drop for MockEntrypoint {
    fn drop(&mut self) {
        self.server_handle.abort();
    }
}
