//! tokio-tungstenite implementation of [`TransportFactory`].
//!
//! The handshake completes inside `open`; after that a writer task drains an
//! unbounded queue (so `send` never blocks) and a reader task turns the
//! stream into [`TransportEvent`]s, answering protocol pings on the way.

use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};

use anyhow::{anyhow, Context};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{
    client::IntoClientRequest,
    http::{HeaderName, HeaderValue},
    protocol::{frame::coding::CloseCode, CloseFrame, WebSocketConfig},
    Message,
};
use tokio_tungstenite::connect_async_with_config;
use tracing::{debug, info, warn};

use super::{ConnectRequest, ReadyState, Transport, TransportEvent, TransportFactory, TransportHandle};
use crate::config::SessionConfig;
use crate::error::TransportError;

const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Opens WebSocket connections over plain TCP or rustls
#[derive(Debug, Clone)]
pub struct WebSocketTransportFactory {
    max_message_bytes: usize,
}

impl WebSocketTransportFactory {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            max_message_bytes: config.max_message_bytes,
        }
    }

    fn ws_config(&self) -> WebSocketConfig {
        WebSocketConfig {
            max_message_size: Some(self.max_message_bytes),
            max_frame_size: Some(self.max_message_bytes.min(MAX_FRAME_BYTES)),
            accept_unmasked_frames: false,
            ..Default::default()
        }
    }
}

impl Default for WebSocketTransportFactory {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

/// Reject anything tungstenite cannot dial before touching the network
fn check_endpoint(raw: &str) -> Result<(), TransportError> {
    let url = url::Url::parse(raw)
        .map_err(|e| TransportError::Unavailable(format!("invalid endpoint url: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(TransportError::Unavailable(format!(
            "unsupported endpoint scheme: {other}"
        ))),
    }
}

#[async_trait::async_trait]
impl TransportFactory for WebSocketTransportFactory {
    async fn open(&self, request: ConnectRequest) -> Result<TransportHandle, TransportError> {
        check_endpoint(&request.url)?;

        // A request that cannot be built now never can; don't let it be retried.
        let mut ws_request = request
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidRequest(format!("websocket request: {e}")))?;

        for (name, value) in &request.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                TransportError::InvalidRequest(format!("invalid header name {name}: {e}"))
            })?;
            // Value may be a credential; keep it out of the error.
            let header_value = HeaderValue::from_str(value).map_err(|_| {
                TransportError::InvalidRequest(format!("invalid value for header {name}"))
            })?;
            ws_request.headers_mut().insert(header_name, header_value);
        }

        let (ws_stream, response) =
            connect_async_with_config(ws_request, Some(self.ws_config()), true)
                .await
                .context("Failed to connect to WebSocket")
                .map_err(TransportError::Connect)?;

        info!(status = %response.status(), "websocket_connected");

        let (mut write, mut read) = ws_stream.split();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<TransportEvent>();
        let state = Arc::new(AtomicU8::new(ReadyState::Open as u8));

        let _ = event_tx.send(TransportEvent::Opened);

        tokio::spawn(async move {
            while let Some(msg) = outbound_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    debug!(error = %e, "websocket_write_failed");
                    break;
                }
                if closing {
                    break;
                }
            }
            let _ = write.close().await;
        });

        let reader_state = state.clone();
        let pong_tx = outbound_tx.clone();
        tokio::spawn(async move {
            let mut close_code = None;
            let mut close_reason = String::new();

            while let Some(msg) = read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if event_tx.send(TransportEvent::Message(text)).is_err() {
                            break;
                        }
                    }
                    Ok(Message::Binary(data)) => match String::from_utf8(data) {
                        Ok(text) => {
                            if event_tx.send(TransportEvent::Message(text)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(bytes = e.as_bytes().len(), "non_utf8_binary_frame_dropped");
                        }
                    },
                    Ok(Message::Ping(payload)) => {
                        let _ = pong_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                    Ok(Message::Close(frame)) => {
                        if let Some(frame) = frame {
                            close_code = Some(u16::from(frame.code));
                            close_reason = frame.reason.into_owned();
                        }
                        debug!(code = ?close_code, reason = %close_reason, "websocket_close_received");
                        break;
                    }
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Errored(e.to_string()));
                        break;
                    }
                }
            }

            reader_state.store(ReadyState::Closed as u8, Ordering::Release);
            let _ = event_tx.send(TransportEvent::Closed {
                code: close_code,
                reason: close_reason,
            });
        });

        Ok(TransportHandle {
            socket: Arc::new(WebSocketTransport {
                outbound: outbound_tx,
                state,
            }),
            events: event_rx,
        })
    }
}

struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Message>,
    state: Arc<AtomicU8>,
}

impl Transport for WebSocketTransport {
    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn send(&self, text: String) -> anyhow::Result<()> {
        let state = self.ready_state();
        if state != ReadyState::Open {
            return Err(anyhow!("socket is {state:?}"));
        }
        self.outbound
            .send(Message::Text(text))
            .map_err(|_| anyhow!("socket writer has shut down"))
    }

    fn close(&self, code: u16, reason: &str) {
        let prev = self.state.swap(ReadyState::Closing as u8, Ordering::AcqRel);
        if ReadyState::from_u8(prev) == ReadyState::Closed {
            self.state.store(ReadyState::Closed as u8, Ordering::Release);
            return;
        }
        let _ = self.outbound.send(Message::Close(Some(CloseFrame {
            code: CloseCode::from(code),
            reason: reason.to_string().into(),
        })));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_endpoint() {
        assert!(check_endpoint("ws://127.0.0.1:8787/v1/realtime").is_ok());
        assert!(check_endpoint("wss://example.test/rt?x=1").is_ok());
        assert!(matches!(
            check_endpoint("https://example.test/rt"),
            Err(TransportError::Unavailable(_))
        ));
        assert!(matches!(
            check_endpoint("not a url"),
            Err(TransportError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_unsendable_token_is_not_retryable() {
        let factory = WebSocketTransportFactory::default();
        let result = factory
            .open(ConnectRequest {
                url: "ws://127.0.0.1:9/rt".into(),
                headers: vec![("Authorization".into(), "Bearer sec\nret".into())],
            })
            .await;
        match result {
            Err(TransportError::InvalidRequest(reason)) => {
                assert!(reason.contains("Authorization"));
                assert!(!reason.contains("sec"));
            }
            other => panic!("expected invalid request, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_open_refused_is_transient() {
        let factory = WebSocketTransportFactory::default();
        // Port 9 (discard) on loopback is essentially never listening.
        let result = factory
            .open(ConnectRequest {
                url: "ws://127.0.0.1:9/rt".into(),
                headers: vec![("Authorization".into(), "Bearer secret".into())],
            })
            .await;
        match result {
            Err(TransportError::Connect(e)) => {
                assert!(!format!("{e:#}").contains("secret"));
            }
            other => panic!("expected transient connect error, got {other:?}"),
        }
    }
}
