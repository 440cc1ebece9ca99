use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info};
use url::Url;

use scriptdeck_core::backend::PushChannel;
use scriptdeck_core::config::ClientConfig;
use scriptdeck_core::error::ClientError;
use scriptdeck_core::socketio::{self, CONNECT_PACKET, Frame, PONG_FRAME, PushEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long to wait for an Engine.IO open packet before assuming plain frames
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(2);

/// WebSocket URL for the push endpoint, derived from the HTTP origin
pub fn push_url(config: &ClientConfig) -> Result<Url, ClientError> {
    let origin = Url::parse(config.origin())
        .map_err(|e| ClientError::push(format!("bad base_url: {}", e)))?;
    let mut url = origin
        .join(&config.push.path)
        .map_err(|e| ClientError::push(format!("bad push path: {}", e)))?;
    let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme)
        .map_err(|_| ClientError::push("cannot derive websocket scheme"))?;
    Ok(url)
}

/// Socket.IO (or plain JSON frame) push channel over a WebSocket
pub struct WsPushChannel {
    url: Url,
    token: Option<String>,
    stream: Option<WsStream>,
    pending: VecDeque<PushEvent>,
}

impl WsPushChannel {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Ok(Self {
            url: push_url(config)?,
            token: config.auth_token.clone(),
            stream: None,
            pending: VecDeque::new(),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn send_text(ws: &mut WsStream, text: &str) -> Result<(), ClientError> {
        ws.send(Message::Text(text.to_string()))
            .await
            .map_err(|e| ClientError::push(e.to_string()))
    }

    /// Next text frame, answering pings on the way. `None` on close or error.
    async fn next_frame(ws: &mut WsStream) -> Option<Result<Frame, ClientError>> {
        loop {
            match ws.next().await? {
                Ok(Message::Text(text)) => {
                    let frame = socketio::decode_frame(&text);
                    if let Ok(Frame::Ping) = frame {
                        if Self::send_text(ws, PONG_FRAME).await.is_err() {
                            return None;
                        }
                        continue;
                    }
                    return Some(frame);
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => continue,
                Err(e) => {
                    debug!(error = %e, "push read failed");
                    return None;
                }
            }
        }
    }

    /// Engine.IO open, namespace join, and its acknowledgement
    async fn handshake(&mut self, ws: &mut WsStream) -> Result<(), ClientError> {
        let first = match tokio::time::timeout(HANDSHAKE_TIMEOUT, Self::next_frame(ws)).await {
            // Server speaks plain frames and stays quiet until it has news
            Err(_) => return Ok(()),
            Ok(None) => return Err(ClientError::push("closed during handshake")),
            Ok(Some(frame)) => frame?,
        };

        match first {
            Frame::Open(_) => {}
            Frame::Event(event) => {
                self.pending.push_back(event);
                return Ok(());
            }
            other => {
                debug!(frame = ?other, "unexpected first frame");
                return Ok(());
            }
        }

        Self::send_text(ws, CONNECT_PACKET).await?;
        loop {
            let frame = tokio::time::timeout(HANDSHAKE_TIMEOUT, Self::next_frame(ws))
                .await
                .map_err(|_| ClientError::push("namespace join timed out"))?
                .ok_or_else(|| ClientError::push("closed during handshake"))??;
            match frame {
                Frame::Event(PushEvent::Connected) => return Ok(()),
                Frame::ConnectError(message) => return Err(ClientError::push(message)),
                Frame::Event(event) => self.pending.push_back(event),
                _ => {}
            }
        }
    }
}

#[async_trait]
impl PushChannel for WsPushChannel {
    async fn connect(&mut self) -> Result<(), ClientError> {
        self.close().await;

        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::push(e.to_string()))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| ClientError::push(e.to_string()))?;
            request.headers_mut().insert("Authorization", value);
        }

        let (mut ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, connect_async(request))
            .await
            .map_err(|_| ClientError::push("connect timed out"))?
            .map_err(|e| ClientError::push(e.to_string()))?;

        if let Err(err) = self.handshake(&mut ws).await {
            let _ = ws.close(None).await;
            return Err(err);
        }
        info!(url = %self.url, "push channel open");
        self.stream = Some(ws);
        Ok(())
    }

    async fn next_event(&mut self) -> Option<Result<PushEvent, ClientError>> {
        if let Some(event) = self.pending.pop_front() {
            return Some(Ok(event));
        }
        let ws = self.stream.as_mut()?;
        loop {
            match Self::next_frame(ws).await? {
                Ok(Frame::Event(event)) => return Some(Ok(event)),
                Ok(Frame::Close) | Ok(Frame::ConnectError(_)) => return None,
                Ok(_) => continue,
                Err(err) => return Some(Err(err)),
            }
        }
    }

    async fn close(&mut self) {
        self.pending.clear();
        if let Some(mut ws) = self.stream.take() {
            let _ = ws.close(None).await;
        }
    }
}
