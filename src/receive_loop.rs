//! Receive loop (C7, §4.7): the long-lived WebSocket consumer task.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::router::MessageRouter;

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

pub struct ReceiveLoop {
    url: String,
    router: MessageRouter,
    cancellation: CancellationToken,
}

impl ReceiveLoop {
    pub fn new(gateway_base_url: &str, account: &str, router: MessageRouter, cancellation: CancellationToken) -> Self {
        let ws_base = gateway_base_url
            .replacen("http://", "ws://", 1)
            .replacen("https://", "wss://", 1);
        let url = format!("{ws_base}/v1/receive/{account}");
        Self { url, router, cancellation }
    }

    /// Runs the connect/receive/reconnect cycle until cancelled.
    pub async fn run(&self) {
        loop {
            if self.cancellation.is_cancelled() {
                info!("receive loop cancelled before connecting, exiting");
                return;
            }

            info!(url = %self.url, "connecting to gateway");
            let stream = tokio::select! {
                () = self.cancellation.cancelled() => {
                    info!("receive loop cancelled while connecting, exiting");
                    return;
                }
                result = tokio_tungstenite::connect_async(&self.url) => result,
            };

            let mut stream = match stream {
                Ok((stream, _response)) => stream,
                Err(err) => {
                    error!(error = %err, "failed to connect, retrying in 5s");
                    self.sleep_or_cancel().await;
                    continue;
                }
            };

            info!("connected, receiving");
            let disconnect_reason = self.receive_until_closed(&mut stream).await;

            match disconnect_reason {
                Disconnect::Cancelled => {
                    let _ = stream
                        .close(Some(CloseFrame {
                            code: CloseCode::Normal,
                            reason: "Host shutting down".into(),
                        }))
                        .await;
                    info!("receive loop cancelled, connection closed cleanly");
                    return;
                }
                Disconnect::ServerClosed => {
                    info!("server closed the connection normally, reconnecting in 5s");
                    self.sleep_or_cancel().await;
                }
                Disconnect::Error(err) => {
                    warn!(error = %err, "connection error, reconnecting in 5s");
                    self.sleep_or_cancel().await;
                }
            }

            if self.cancellation.is_cancelled() {
                return;
            }
        }
    }

    async fn receive_until_closed(&self, stream: &mut WsStream) -> Disconnect {
        loop {
            tokio::select! {
                () = self.cancellation.cancelled() => return Disconnect::Cancelled,
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.router.handle_payload(&text).await;
                        }
                        Some(Ok(Message::Close(_))) => {
                            let _ = stream
                                .send(Message::Close(Some(CloseFrame {
                                    code: CloseCode::Normal,
                                    reason: "".into(),
                                })))
                                .await;
                            return Disconnect::ServerClosed;
                        }
                        Some(Ok(_)) => {
                            // Ping/Pong/Binary frames are not part of this protocol; ignore.
                        }
                        Some(Err(err)) => return Disconnect::Error(err.to_string()),
                        None => return Disconnect::ServerClosed,
                    }
                }
            }
        }
    }

    async fn sleep_or_cancel(&self) {
        tokio::select! {
            () = self.cancellation.cancelled() => {}
            () = tokio::time::sleep(RECONNECT_DELAY) => {}
        }
    }
}

type WsStream = tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

enum Disconnect {
    Cancelled,
    ServerClosed,
    Error(String),
}
