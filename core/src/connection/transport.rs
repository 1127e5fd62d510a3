use async_trait::async_trait;

use crate::Result;

/// Opens connections to the realtime endpoint.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>>;
}

/// One open, message-oriented, bidirectional connection carrying text frames.
#[async_trait]
pub trait Connection: Send {
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Next inbound text frame. `None` once the peer has closed.
    ///
    /// Must be cancel safe: the manager polls it inside `select!`.
    async fn recv(&mut self) -> Option<Result<String>>;

    async fn close(&mut self) -> Result<()>;
}
