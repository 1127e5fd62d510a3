// In-memory loopback transport
//
// Each connect() hands a fresh ServerEnd to the paired ChannelServer, so a
// test (or an embedding host) can play the Brain endpoint without sockets.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::transport::{Connection, Transport};
use crate::protocol::{ClientCommand, ServerMessage};
use crate::{BrainwireError, Result};

#[derive(Debug, Default)]
struct Shared {
    refusing: AtomicBool,
    connects: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct ChannelTransport {
    accept_tx: mpsc::UnboundedSender<ServerEnd>,
    shared: Arc<Shared>,
}

/// Accepting side of a [`ChannelTransport`].
#[derive(Debug)]
pub struct ChannelServer {
    accept_rx: mpsc::UnboundedReceiver<ServerEnd>,
    shared: Arc<Shared>,
}

impl ChannelTransport {
    pub fn pair() -> (ChannelTransport, ChannelServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared::default());
        (
            ChannelTransport {
                accept_tx,
                shared: shared.clone(),
            },
            ChannelServer { accept_rx, shared },
        )
    }

    /// Connection attempts so far, refused ones included.
    pub fn connect_attempts(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

impl ChannelServer {
    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accept_rx.recv().await
    }

    /// While set, connect() fails as if the endpoint were down.
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    pub fn connect_attempts(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>> {
        self.shared.connects.fetch_add(1, Ordering::SeqCst);
        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(BrainwireError::Transport(format!(
                "connection to {} refused",
                url
            )));
        }

        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        self.accept_tx
            .send(ServerEnd {
                to_client,
                from_client,
            })
            .map_err(|_| BrainwireError::Transport("no channel server listening".into()))?;
        debug!(%url, "Channel connection opened");

        Ok(Box::new(ChannelConnection {
            to_server: Some(to_server),
            from_server,
        }))
    }
}

/// Server half of one loopback connection. Dropping it closes the connection.
#[derive(Debug)]
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Push a raw frame. False once the client side is gone.
    pub fn send_raw(&self, frame: impl Into<String>) -> bool {
        self.to_client.send(frame.into()).is_ok()
    }

    pub fn send(&self, message: &ServerMessage) -> bool {
        match serde_json::to_string(message) {
            Ok(frame) => self.send_raw(frame),
            Err(_) => false,
        }
    }

    /// Next raw frame from the client; `None` once the client closed.
    pub async fn recv_raw(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next client command. Undecodable frames are skipped.
    pub async fn recv(&mut self) -> Option<ClientCommand> {
        while let Some(frame) = self.from_client.recv().await {
            if let Ok(command) = serde_json::from_str(&frame) {
                return Some(command);
            }
        }
        None
    }

    /// Next command that is not a ping.
    pub async fn recv_non_ping(&mut self) -> Option<ClientCommand> {
        loop {
            match self.recv().await? {
                ClientCommand::Ping { .. } => continue,
                other => return Some(other),
            }
        }
    }

    /// Drain whatever the client already sent.
    pub fn drain(&mut self) -> Vec<ClientCommand> {
        let mut commands = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            if let Ok(command) = serde_json::from_str(&frame) {
                commands.push(command);
            }
        }
        commands
    }

    pub fn is_client_connected(&self) -> bool {
        !self.to_client.is_closed()
    }
}

struct ChannelConnection {
    to_server: Option<mpsc::UnboundedSender<String>>,
    from_server: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Connection for ChannelConnection {
    async fn send(&mut self, frame: String) -> Result<()> {
        match &self.to_server {
            Some(tx) => tx.send(frame).map_err(|_| BrainwireError::ConnectionClosed),
            None => Err(BrainwireError::ConnectionClosed),
        }
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.to_server = None;
        self.from_server.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_carries_frames_both_ways() {
        let (transport, mut server) = ChannelTransport::pair();
        let mut conn = transport.connect("ws://test").await.unwrap();
        let mut end = server.accept().await.unwrap();

        conn.send(r#"{"type":"ping","timestamp":1}"#.to_string())
            .await
            .unwrap();
        assert_eq!(end.recv().await, Some(ClientCommand::Ping { timestamp: 1 }));

        assert!(end.send(&ServerMessage::Heartbeat { timestamp: None }));
        let frame = conn.recv().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"type":"heartbeat"}"#);
    }

    #[tokio::test]
    async fn dropping_server_end_closes_client() {
        let (transport, mut server) = ChannelTransport::pair();
        let mut conn = transport.connect("ws://test").await.unwrap();
        let end = server.accept().await.unwrap();
        drop(end);
        assert!(conn.recv().await.is_none());
        assert!(conn.send("x".into()).await.is_err());
    }

    #[tokio::test]
    async fn refusing_server_fails_connect_and_counts_attempts() {
        let (transport, server) = ChannelTransport::pair();
        server.set_refusing(true);
        assert!(transport.connect("ws://test").await.is_err());
        assert!(transport.connect("ws://test").await.is_err());
        assert_eq!(server.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn client_close_is_visible_to_server() {
        let (transport, mut server) = ChannelTransport::pair();
        let mut conn = transport.connect("ws://test").await.unwrap();
        let mut end = server.accept().await.unwrap();
        conn.close().await.unwrap();
        assert!(end.recv_raw().await.is_none());
        assert!(!end.is_client_connected());
    }
}
