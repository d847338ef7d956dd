//! Managed WebSocket connection using tokio-tungstenite.
//!
//! The connection loop owns the transport. On every (re)connect it runs the
//! authenticate handshake from scratch — the server keeps no state across a
//! transport drop — and re-issues the monitoring subscription when one was
//! active. Unexpected drops retry with linear backoff up to the configured
//! ceiling, after which the client lands in a terminal `GaveUp` state.
//! Dropping the [`FloorcastClient`] and every [`ClientHandle`] closes the
//! command channel, which shuts the loop down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use floorcast_shared::{ClientCommand, Envelope, ServerEvent};

use crate::{ClientConfig, ClientHandle, ConnectionState};

/// Why the active transport session ended.
enum SessionEnd {
    /// Transport dropped; subject to the reconnect budget.
    Transport,
    /// Every command sender is gone; the client is shutting down.
    HandleDropped,
}

/// A managed connection to the floorcast router.
pub struct FloorcastClient {
    state: watch::Receiver<ConnectionState>,
    sender: UnboundedSender<Envelope<ClientCommand>>,
    monitoring: Arc<AtomicBool>,
}

impl FloorcastClient {
    /// Start the connection loop in a background task.
    ///
    /// `on_event` is called for every server event, including the ones the
    /// loop itself inspects for the handshake. The loop holds no command
    /// sender of its own: once this client and every [`ClientHandle`] are
    /// dropped, the channel closes and the background task exits.
    pub fn connect(
        config: ClientConfig,
        on_event: impl Fn(Envelope<ServerEvent>) + Send + Sync + 'static,
    ) -> Self {
        let (sender, receiver) = unbounded();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let monitoring = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_connection_loop(
            config,
            Arc::new(state_tx),
            receiver,
            Arc::new(on_event),
            monitoring.clone(),
        ));

        Self {
            state: state_rx,
            sender,
            monitoring,
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    /// Watch channel for observing state transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Handle for sending commands.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle::new(self.sender.clone(), self.monitoring.clone())
    }
}

async fn run_connection_loop(
    config: ClientConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    mut receiver: UnboundedReceiver<Envelope<ClientCommand>>,
    on_event: Arc<dyn Fn(Envelope<ServerEvent>) + Send + Sync>,
    monitoring: Arc<AtomicBool>,
) {
    let mut attempt = 0u32;

    loop {
        let _ = state.send(ConnectionState::Connecting { attempt });

        match connect_async(config.url.as_str()).await {
            Ok((ws_stream, _response)) => {
                attempt = 0;
                let _ = state.send(ConnectionState::Connected);
                tracing::info!(url = %config.url, "websocket connected");

                match run_session(
                    ws_stream,
                    &config,
                    &state,
                    &mut receiver,
                    &on_event,
                    &monitoring,
                )
                .await
                {
                    SessionEnd::Transport => {
                        let _ = state.send(ConnectionState::Disconnected);
                        tracing::info!("websocket session ended");
                    }
                    SessionEnd::HandleDropped => {
                        let _ = state.send(ConnectionState::Disconnected);
                        tracing::info!("all client handles dropped, shutting down");
                        return;
                    }
                }
            }
            Err(err) => {
                tracing::error!(%err, url = %config.url, "websocket connect failed");
            }
        }

        attempt += 1;
        if attempt > config.reconnect.max_attempts {
            let reason = format!(
                "max reconnect attempts ({}) exceeded",
                config.reconnect.max_attempts
            );
            tracing::error!("{reason}");
            let _ = state.send(ConnectionState::GaveUp { reason });
            return;
        }
        let delay = config.reconnect.delay_for_attempt(attempt);
        tracing::info!(attempt, delay_ms = delay.as_millis() as u64, "reconnecting");
        tokio::time::sleep(delay).await;
    }
}

/// Run one transport session to completion.
///
/// A single loop owns both halves of the socket: inbound frames drive the
/// handshake and the event callback, outbound commands drain from the shared
/// channel. The channel reporting closed means no command sender is left
/// alive, which ends the session and the whole connection loop.
async fn run_session(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    config: &ClientConfig,
    state: &Arc<watch::Sender<ConnectionState>>,
    receiver: &mut UnboundedReceiver<Envelope<ClientCommand>>,
    on_event: &Arc<dyn Fn(Envelope<ServerEvent>) + Send + Sync>,
    monitoring: &Arc<AtomicBool>,
) -> SessionEnd {
    let (mut write, mut read) = ws_stream.split();

    // Authenticate handshake, re-run on every session.
    let auth = Envelope::new(ClientCommand::Authenticate {
        principal_id: config.credentials.principal_id.clone(),
        display_name: config.credentials.display_name.clone(),
        role: config.credentials.role,
    });
    let json = match serde_json::to_string(&auth) {
        Ok(json) => json,
        Err(err) => {
            tracing::error!(%err, "failed to serialize handshake");
            return SessionEnd::Transport;
        }
    };
    if write.send(Message::Text(json.into())).await.is_err() {
        return SessionEnd::Transport;
    }
    let _ = state.send(ConnectionState::Authenticating);

    loop {
        tokio::select! {
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<Envelope<ServerEvent>>(&text) {
                        Ok(event) => {
                            if let ServerEvent::Authenticated { success: true, .. } = event.payload
                            {
                                let _ = state.send(ConnectionState::Ready);
                                // Re-subscribe: monitoring state does not
                                // survive a transport drop on the server.
                                if monitoring.load(Ordering::SeqCst) {
                                    let resub = Envelope::new(ClientCommand::StartMonitoring);
                                    match serde_json::to_string(&resub) {
                                        Ok(json) => {
                                            if write.send(Message::Text(json.into())).await.is_err()
                                            {
                                                return SessionEnd::Transport;
                                            }
                                        }
                                        Err(err) => {
                                            tracing::error!(%err, "failed to serialize command")
                                        }
                                    }
                                }
                            }
                            on_event(event);
                        }
                        Err(err) => tracing::error!(%err, "failed to parse server event"),
                    }
                }
                Some(Ok(Message::Close(_))) | None => return SessionEnd::Transport,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    tracing::error!(%err, "websocket read error");
                    return SessionEnd::Transport;
                }
            },
            cmd = receiver.next() => match cmd {
                Some(cmd) => match serde_json::to_string(&cmd) {
                    Ok(json) => {
                        if let Err(err) = write.send(Message::Text(json.into())).await {
                            tracing::error!(%err, "websocket send failed");
                            return SessionEnd::Transport;
                        }
                    }
                    Err(err) => tracing::error!(%err, "failed to serialize command"),
                },
                None => return SessionEnd::HandleDropped,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Credentials, ReconnectConfig};
    use floorcast_shared::Role;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::{TcpListener, TcpStream};
    use tokio::time::timeout;

    fn test_config(addr: SocketAddr) -> ClientConfig {
        ClientConfig {
            url: format!("ws://{addr}/ws"),
            credentials: Credentials {
                principal_id: "u1".into(),
                display_name: "Ada".into(),
                role: Role::Seller,
            },
            reconnect: ReconnectConfig {
                max_attempts: 5,
                base_delay: Duration::from_millis(10),
            },
        }
    }

    async fn accept_and_authenticate(
        listener: &TcpListener,
    ) -> tokio_tungstenite::WebSocketStream<TcpStream> {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let frame = ws.next().await.unwrap().unwrap();
        let cmd: Envelope<ClientCommand> = serde_json::from_str(frame.to_text().unwrap()).unwrap();
        assert!(matches!(cmd.payload, ClientCommand::Authenticate { .. }));
        let reply = Envelope::new(ServerEvent::Authenticated {
            success: true,
            role: Role::Seller,
            message: "ok".into(),
        });
        ws.send(Message::Text(
            serde_json::to_string(&reply).unwrap().into(),
        ))
        .await
        .unwrap();
        ws
    }

    #[tokio::test]
    async fn dropping_every_handle_stops_the_connection_loop() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let mut ws = accept_and_authenticate(&listener).await;
            // Hold the socket open; the client closing it is the signal that
            // its loop terminated rather than lingering forever.
            while let Some(Ok(_)) = ws.next().await {}
        });

        let client = FloorcastClient::connect(test_config(addr), |_| {});
        let mut states = client.state_changes();
        timeout(Duration::from_secs(5), states.wait_for(|s| s.is_ready()))
            .await
            .unwrap()
            .unwrap();

        drop(client);

        timeout(
            Duration::from_secs(5),
            states.wait_for(|s| *s == ConnectionState::Disconnected),
        )
        .await
        .unwrap()
        .unwrap();
        timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn reconnect_reissues_monitoring_subscription() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            // First session: authenticate, then drop the transport.
            let ws = accept_and_authenticate(&listener).await;
            drop(ws);

            // Second session: the client must re-subscribe on its own.
            let mut ws = accept_and_authenticate(&listener).await;
            loop {
                let frame = ws.next().await.unwrap().unwrap();
                let cmd: Envelope<ClientCommand> =
                    serde_json::from_str(frame.to_text().unwrap()).unwrap();
                if matches!(cmd.payload, ClientCommand::StartMonitoring) {
                    return;
                }
            }
        });

        let client = FloorcastClient::connect(test_config(addr), |_| {});
        let mut states = client.state_changes();
        timeout(Duration::from_secs(5), states.wait_for(|s| s.is_ready()))
            .await
            .unwrap()
            .unwrap();
        client.handle().start_monitoring().unwrap();

        timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        drop(client);
    }
}
