//! Channel Manager: one WebSocket transport per channel.
//!
//! Each transport announces its handle to the workspace once connected, pumps
//! frames both ways, announces the close, and reconnects with backoff until
//! shutdown or until the attempt budget runs out.

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};
use url::Url;

use workbench_sync::{ChannelHandle, ChannelSpec, ReconnectPolicy, WorkspaceEvent};

use crate::error::DaemonError;

/// Where a channel connects and how it authenticates.
#[derive(Debug, Clone)]
pub struct ChannelEndpoint {
    pub url: Url,
    pub token: Option<String>,
}

impl ChannelEndpoint {
    pub fn parse(url: &str, token: Option<String>) -> Result<Self, DaemonError> {
        let url = Url::parse(url).map_err(|source| DaemonError::Url {
            url: url.to_owned(),
            source,
        })?;
        Ok(Self { url, token })
    }

    fn request(&self) -> Result<Request, DaemonError> {
        let mut request = self.url.as_str().into_client_request()?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|err| DaemonError::Protocol(format!("invalid auth token: {err}")))?;
            request.headers_mut().insert("Authorization", value);
        }
        Ok(request)
    }
}

/// Why a connected session ended.
#[derive(Debug, PartialEq, Eq)]
pub enum PumpEnd {
    Shutdown,
    /// The workspace is gone; nobody is listening.
    MailboxClosed,
    /// The workspace released the channel.
    Released,
    Dropped(String),
}

/// Keep `C` connected for the whole session.
pub async fn run_channel<C: ChannelSpec>(
    endpoint: ChannelEndpoint,
    policy: ReconnectPolicy,
    mailbox: mpsc::Sender<WorkspaceEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut attempt = 0u32;
    loop {
        let request = endpoint.request()?;
        let connected = tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            result = connect_async(request) => result,
        };

        match connected {
            Ok((stream, _)) => {
                attempt = 0;
                tracing::info!(channel = %C::KIND, url = %endpoint.url, "channel connected");
                let end = pump::<C, _>(stream, &mailbox, &mut shutdown_rx).await;
                if mailbox
                    .send(WorkspaceEvent::ChannelClosed(C::KIND))
                    .await
                    .is_err()
                {
                    return Ok(());
                }
                match end {
                    PumpEnd::Shutdown | PumpEnd::MailboxClosed => return Ok(()),
                    PumpEnd::Released => {
                        tracing::info!(channel = %C::KIND, "channel released by workspace");
                    }
                    PumpEnd::Dropped(reason) => {
                        tracing::warn!(channel = %C::KIND, %reason, "channel dropped");
                    }
                }
            }
            Err(err) => {
                tracing::warn!(channel = %C::KIND, error = %err, attempt, "channel connect failed");
            }
        }

        let Some(delay) = policy.delay_for(attempt) else {
            tracing::error!(channel = %C::KIND, attempts = attempt, "giving up on channel");
            return Ok(());
        };
        attempt += 1;
        tracing::debug!(channel = %C::KIND, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::select! {
            _ = shutdown_rx.recv() => return Ok(()),
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

/// Pump one connected session until either side goes away.
pub async fn pump<C, S>(
    stream: WebSocketStream<S>,
    mailbox: &mpsc::Sender<WorkspaceEvent>,
    shutdown_rx: &mut broadcast::Receiver<()>,
) -> PumpEnd
where
    C: ChannelSpec,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (handle, mut outbound_rx) = ChannelHandle::<C::Outbound>::new(C::KIND);
    if mailbox.send(C::opened(handle)).await.is_err() {
        return PumpEnd::MailboxClosed;
    }
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                let _ = write.send(Message::Close(None)).await;
                return PumpEnd::Shutdown;
            }
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<C::Inbound>(&text) {
                        Ok(message) => {
                            if mailbox.send(C::inbound(message)).await.is_err() {
                                return PumpEnd::MailboxClosed;
                            }
                        }
                        Err(err) => {
                            tracing::warn!(channel = %C::KIND, error = %err, "skipping undecodable frame");
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    return PumpEnd::Dropped("closed by peer".to_owned());
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => return PumpEnd::Dropped(err.to_string()),
            },
            outbound = outbound_rx.recv() => {
                let Some(message) = outbound else {
                    let _ = write.send(Message::Close(None)).await;
                    return PumpEnd::Released;
                };
                let text = match serde_json::to_string(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(channel = %C::KIND, error = %err, "failed to encode frame");
                        continue;
                    }
                };
                if let Err(err) = write.send(Message::Text(text)).await {
                    return PumpEnd::Dropped(err.to_string());
                }
            }
        }
    }
}
