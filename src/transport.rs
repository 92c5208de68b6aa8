use crate::error::{Error, ErrorKind};
use crate::message::{ClientMessage, RelayMessage};
use crate::relay::RelayUrl;
use crate::settings::Settings;
use crate::USER_AGENT;
use async_trait::async_trait;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use http::Uri;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tungstenite::protocol::{Message as WsMessage, WebSocketConfig};

/// Opens connections to relays
#[async_trait]
pub trait RelayTransport: Send + Sync {
    async fn connect(&self, url: &RelayUrl) -> Result<Box<dyn RelayConnection>, Error>;
}

/// One open connection to a relay
#[async_trait]
pub trait RelayConnection: Send {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), Error>;

    /// The next relay message. `Ok(None)` means the relay closed the
    /// connection. Frames that do not parse are logged and skipped.
    async fn next_message(&mut self) -> Result<Option<RelayMessage>, Error>;

    async fn close(&mut self) -> Result<(), Error>;
}

/// Connects over websockets
#[derive(Debug, Clone)]
pub struct WebsocketTransport {
    max_message_size: usize,
    max_frame_size: usize,
}

impl WebsocketTransport {
    pub fn new(settings: &Settings) -> WebsocketTransport {
        WebsocketTransport {
            max_message_size: settings.max_websocket_message_size_kb * 1024,
            max_frame_size: settings.max_websocket_frame_size_kb * 1024,
        }
    }
}

#[async_trait]
impl RelayTransport for WebsocketTransport {
    async fn connect(&self, url: &RelayUrl) -> Result<Box<dyn RelayConnection>, Error> {
        let key: [u8; 16] = rand::random();

        let uri: Uri = url.as_str().parse::<Uri>()?;
        let host = match uri.authority() {
            Some(authority) => authority.as_str().to_owned(),
            None => return Err(ErrorKind::UrlHasNoHostname.into()),
        };
        let req = http::request::Request::builder()
            .method("GET")
            .header("User-Agent", USER_AGENT)
            .header("Host", host)
            .header("Connection", "Upgrade")
            .header("Upgrade", "websocket")
            .header("Sec-WebSocket-Version", "13")
            .header(
                "Sec-WebSocket-Key",
                base64::engine::general_purpose::STANDARD.encode(key),
            )
            .uri(uri)
            .body(())?;

        let config: WebSocketConfig = WebSocketConfig {
            max_message_size: Some(self.max_message_size),
            max_frame_size: Some(self.max_frame_size),
            ..Default::default()
        };

        let (stream, _response) =
            match tokio_tungstenite::connect_async_with_config(req, Some(config), false).await {
                Ok(pair) => pair,
                Err(e) => {
                    return Err(ErrorKind::ConnectionFailed(format!("{url}: {e}")).into());
                }
            };

        tracing::debug!("{}: Connected", url);

        Ok(Box::new(WebsocketConnection {
            url: url.clone(),
            stream,
        }))
    }
}

struct WebsocketConnection {
    url: RelayUrl,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RelayConnection for WebsocketConnection {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), Error> {
        let wire = message.to_json()?;
        tracing::trace!("{}: Sending {}", &self.url, &wire);
        self.stream.send(WsMessage::Text(wire)).await?;
        Ok(())
    }

    async fn next_message(&mut self) -> Result<Option<RelayMessage>, Error> {
        loop {
            let ws_message = match self.stream.next().await {
                Some(m) => m?,
                None => return Ok(None),
            };
            match ws_message {
                WsMessage::Text(t) => {
                    tracing::trace!("{}: Received {}", &self.url, &t);
                    match RelayMessage::from_json(&t) {
                        Ok(m) => return Ok(Some(m)),
                        Err(e) => tracing::warn!("{}: {}", &self.url, e),
                    }
                }
                WsMessage::Binary(_) => tracing::warn!("{}, Unexpected binary message", &self.url),
                WsMessage::Ping(_) => {} // tungstenite automatically pongs.
                WsMessage::Pong(_) => {}
                WsMessage::Close(_) => {
                    tracing::debug!("{}: Relay closed the connection", &self.url);
                    return Ok(None);
                }
                WsMessage::Frame(_) => tracing::warn!("{}: Unexpected frame message", &self.url),
            }
        }
    }

    async fn close(&mut self) -> Result<(), Error> {
        match self.stream.close(None).await {
            Ok(()) => Ok(()),
            // Already closed is fine
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
