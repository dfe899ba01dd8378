/// Transport seam between the connection manager and the network
///
/// The manager only sees text frames. `WebSocketConnector` is the production
/// implementation; tests provide in-memory connectors.
use crate::error::{AlertError, Result};
use async_trait::async_trait;
use futures_util::future;
use futures_util::stream::BoxStream;
use futures_util::{Sink, SinkExt, StreamExt};
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

/// Frame read from the server
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    Text(String),
    /// Peer closed the socket, with its close reason when one was given
    Closed(Option<String>),
}

pub type FrameSink = Pin<Box<dyn Sink<String, Error = AlertError> + Send>>;
pub type FrameStream = BoxStream<'static, Result<InboundFrame>>;

/// An open, authenticated duplex connection
pub struct Transport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl Transport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

/// Opens connections on behalf of the connection manager
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a connection authenticated with `token`
    async fn open(&self, token: &str) -> Result<Transport>;
}

/// WebSocket connector over tokio-tungstenite.
///
/// The bearer token travels in the `Authorization` header of the upgrade request.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, token: &str) -> Result<Transport> {
        let mut request = self.url.as_str().into_client_request()?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
            .map_err(|e| AlertError::Config(format!("token is not a valid header value: {}", e)))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (socket, response) = connect_async(request).await?;
        debug!(url = %self.url, status = %response.status(), "WebSocket upgrade accepted");

        let (sink, stream) = socket.split();

        let sink = sink
            .sink_map_err(AlertError::from)
            .with(|text: String| future::ready(Ok::<_, AlertError>(Message::text(text))));

        let stream = stream.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(InboundFrame::Text(text.as_str().to_owned()))),
                Ok(Message::Close(frame)) => Some(Ok(InboundFrame::Closed(
                    frame.map(|f| f.reason.as_str().to_owned()),
                ))),
                // Control frames are answered by tungstenite itself
                Ok(_) => None,
                Err(e) => Some(Err(AlertError::from(e))),
            })
        });

        Ok(Transport::new(Box::pin(sink), stream.boxed()))
    }
}
