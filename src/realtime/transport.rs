//! Transport seam between the client actor and the WebSocket library

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message as WsMessage},
};
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

/// Outbound half of a link
pub type FrameSink = Pin<Box<dyn Sink<WsMessage, Error = WsError> + Send>>;

/// Inbound half of a link
pub type FrameStream = Pin<Box<dyn Stream<Item = std::result::Result<WsMessage, WsError>> + Send>>;

/// One established connection. Replaced, never reused, on reconnect.
pub struct Link {
    pub url: Url,
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Link {
    pub fn new(url: Url, sink: FrameSink, stream: FrameStream) -> Self {
        Self { url, sink, stream }
    }
}

/// Opens links to the push endpoint
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, url: &Url) -> Result<Link>;
}

/// Production connector backed by tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<Link> {
        let (ws_stream, response) = connect_async(url.as_str())
            .await
            .map_err(|e| Error::connection_failed(url.as_str(), e.to_string()))?;

        debug!(url = %url, status = %response.status(), "WebSocket handshake complete");

        let (write, read) = ws_stream.split();
        Ok(Link::new(url.clone(), Box::pin(write), Box::pin(read)))
    }
}
