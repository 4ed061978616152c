//! Tunnel client connecting the hub to the control plane.
//!
//! `run` is the entry point: it registers the hub once, opens the
//! WebSocket, authenticates with `hub_hello`/`hub_welcome`, and services the
//! session until it drops. Reconnects back off exponentially; exhausting the
//! attempt budget parks the tunnel in FAILED for five minutes before the
//! cycle restarts from OFFLINE.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::Connector;
use tracing::{debug, info, warn};

use printhub_core::settings::{
    ACTIVITY_TIMEOUT, AUTH_TIMEOUT, FAILED_RESET_DELAY, PING_INTERVAL, STATUS_BROADCAST_INTERVAL,
};
use printhub_proto::types::WS_HUB_PATH;
use printhub_proto::HubHello;

use super::config::TunnelConfig;
use super::error::TunnelError;
use super::handler::{SessionEvent, TunnelHandler};
use super::registration::register_hub;
use super::state::{TunnelState, TunnelStateHandle};
use crate::hub::HubContext;
use crate::storage::{TenantBinding, NS_TUNNEL};

/// Pause between binding checks while the tunnel has nothing to do.
const IDLE_POLL_DELAY: Duration = Duration::from_secs(5);

/// Grace period letting the final ack drain before an orderly close.
const DISCONNECT_GRACE: Duration = Duration::from_millis(100);

/// Watchdog granularity for the auth and activity deadlines.
const WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// How a session ended, beyond transport errors.
enum SessionEnd {
    Shutdown,
    CloudDisabled,
}

/// Tunnel client with automatic reconnection.
pub struct TunnelClient {
    config: TunnelConfig,
    hub: Arc<HubContext>,
    handler: TunnelHandler,
    state: TunnelStateHandle,
    attempts: AtomicU32,
}

impl TunnelClient {
    pub fn new(config: TunnelConfig, hub: Arc<HubContext>) -> Self {
        let handler = TunnelHandler::new(Arc::clone(&hub));
        Self {
            config,
            hub,
            handler,
            state: TunnelStateHandle::new(),
            attempts: AtomicU32::new(0),
        }
    }

    /// Observable tunnel state.
    pub fn state(&self) -> TunnelStateHandle {
        self.state.clone()
    }

    /// Run the tunnel until shutdown. Never returns an error: every failure
    /// feeds the reconnect machinery.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                info!("Tunnel client shutting down");
                return;
            }

            if self.hub.cloud_disabled() {
                self.state.set(TunnelState::Offline);
                if Self::wait(IDLE_POLL_DELAY, &mut shutdown).await {
                    return;
                }
                continue;
            }

            // An incomplete tenant binding keeps the tunnel offline.
            let binding = match TenantBinding::load(&self.hub.store).await {
                Ok(Some(binding)) => binding,
                Ok(None) => {
                    self.state.set(TunnelState::Offline);
                    if Self::wait(IDLE_POLL_DELAY, &mut shutdown).await {
                        return;
                    }
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load tenant binding");
                    if Self::wait(IDLE_POLL_DELAY, &mut shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            match self.connect_and_run(&binding, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => {
                    info!("Tunnel client shutting down");
                    return;
                }
                Ok(SessionEnd::CloudDisabled) => {
                    self.state.set(TunnelState::Offline);
                }
                Err(e) => {
                    let attempt = self.attempts.load(Ordering::Relaxed);
                    self.state.set(TunnelState::Reconnecting);

                    if !self.config.reconnect.should_retry(attempt) {
                        warn!(error = %e, attempt, "Max reconnect attempts reached");
                        self.state.set(TunnelState::Failed);
                        if Self::wait(FAILED_RESET_DELAY, &mut shutdown).await {
                            return;
                        }
                        self.attempts.store(0, Ordering::Relaxed);
                        self.state.set(TunnelState::Offline);
                        continue;
                    }

                    let delay = self.config.reconnect.delay_for_attempt(attempt);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis(), "Reconnecting");
                    if Self::wait(delay, &mut shutdown).await {
                        return;
                    }
                    self.attempts.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    /// Sleep, returning `true` when shutdown fired first.
    async fn wait(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = sleep(delay) => false,
            _ = shutdown.changed() => true,
        }
    }

    /// Register if needed, open the socket, authenticate, and service the
    /// session.
    async fn connect_and_run(
        &self,
        binding: &TenantBinding,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, TunnelError> {
        let tunnel_ns = self.hub.store.namespace(NS_TUNNEL);

        if !tunnel_ns.get_bool("registered", false).await? {
            self.state.set(TunnelState::Registering);
            register_hub(&self.config, binding).await?;
            tunnel_ns.put_bool("registered", true).await?;
        }

        self.state.set(TunnelState::Connecting);
        let url = self.websocket_url(binding);
        info!(url = %url, "Connecting to cloud");

        let connector = self.tls_connector(&url)?;
        let (socket, _response) =
            tokio_tungstenite::connect_async_tls_with_config(url.as_str(), None, false, connector)
                .await
                .map_err(|e| TunnelError::Connection(e.to_string()))?;

        let (mut sink, mut stream) = socket.split();

        self.state.set(TunnelState::Authenticating);
        let hello = HubHello::new(
            self.config.hub_id.clone(),
            self.config.firmware_version.clone(),
            self.config.hardware_version.clone(),
            self.config.mac_address.clone(),
        );
        let hello_text =
            serde_json::to_string(&hello).map_err(|e| TunnelError::Auth(e.to_string()))?;
        sink.send(Message::Text(hello_text))
            .await
            .map_err(|e| TunnelError::Stream(e.to_string()))?;

        let auth_started = Instant::now();
        let mut last_activity = Instant::now();
        let mut authenticated = false;

        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.tick().await; // Skip first immediate tick
        let mut broadcast = tokio::time::interval(STATUS_BROADCAST_INTERVAL);
        broadcast.tick().await;
        let mut watchdog = tokio::time::interval(WATCHDOG_TICK);
        watchdog.tick().await;

        loop {
            tokio::select! {
                frame = stream.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            let dispatch = self.handler.handle_text(&text).await;
                            for reply in dispatch.replies {
                                sink.send(Message::Text(reply))
                                    .await
                                    .map_err(|e| TunnelError::Stream(e.to_string()))?;
                            }
                            match dispatch.event {
                                Some(SessionEvent::Authenticated) => {
                                    // CONNECTED is only reachable from
                                    // AUTHENTICATING; repeats are ignored.
                                    if !authenticated {
                                        authenticated = true;
                                        self.attempts.store(0, Ordering::Relaxed);
                                        self.state.set(TunnelState::Connected);
                                        info!(hub_id = %self.config.hub_id, "Tunnel connected");
                                        self.broadcast_statuses(&mut sink).await?;
                                    }
                                }
                                Some(SessionEvent::DisconnectRequested) => {
                                    self.hub.set_cloud_disabled(true);
                                    sleep(DISCONNECT_GRACE).await;
                                    let _ = sink.send(Message::Close(None)).await;
                                    info!("Tunnel disabled by cloud command");
                                    return Ok(SessionEnd::CloudDisabled);
                                }
                                None => {}
                            }
                        }
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                            last_activity = Instant::now();
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            return Err(TunnelError::Connection("Closed by peer".into()));
                        }
                        Some(Ok(_)) => {
                            debug!("Ignoring non-text frame");
                        }
                        Some(Err(e)) => {
                            return Err(TunnelError::Stream(e.to_string()));
                        }
                    }
                }
                _ = ping.tick() => {
                    if authenticated {
                        sink.send(Message::Ping(Vec::new()))
                            .await
                            .map_err(|e| TunnelError::Stream(e.to_string()))?;
                    }
                }
                _ = broadcast.tick() => {
                    if authenticated {
                        self.broadcast_statuses(&mut sink).await?;
                    }
                }
                _ = watchdog.tick() => {
                    if !authenticated && auth_started.elapsed() > AUTH_TIMEOUT {
                        let _ = sink.send(Message::Close(None)).await;
                        return Err(TunnelError::Auth(
                            "Timed out waiting for hub_welcome".into(),
                        ));
                    }
                    if last_activity.elapsed() > ACTIVITY_TIMEOUT {
                        let _ = sink.send(Message::Close(None)).await;
                        return Err(TunnelError::Connection("Activity timeout".into()));
                    }
                }
                _ = shutdown.changed() => {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Shutdown);
                }
            }
        }
    }

    fn websocket_url(&self, binding: &TenantBinding) -> String {
        let mut base = binding.cloud_url.clone();
        while base.ends_with('/') {
            base.pop();
        }
        format!("{base}{WS_HUB_PATH}{}", self.config.hub_id)
    }

    /// TLS connector for `wss://` endpoints. Verification is skipped in the
    /// development profile.
    fn tls_connector(&self, url: &str) -> Result<Option<Connector>, TunnelError> {
        if !url.starts_with("wss://") || !self.config.accept_invalid_certs {
            return Ok(None);
        }
        let connector = native_tls::TlsConnector::builder()
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| TunnelError::Connection(e.to_string()))?;
        Ok(Some(Connector::NativeTls(connector)))
    }

    async fn broadcast_statuses<S>(&self, sink: &mut S) -> Result<(), TunnelError>
    where
        S: SinkExt<Message> + Unpin,
        S::Error: std::fmt::Display,
    {
        let frames = self.handler.build_status_broadcast().await;
        let count = frames.len();
        for frame in frames {
            sink.send(Message::Text(frame))
                .await
                .map_err(|e| TunnelError::Stream(e.to_string()))?;
        }
        debug!(printers = count, "Status broadcast sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConfigStore, HubIdentity};
    use printhub_core::settings::Settings;

    async fn client() -> TunnelClient {
        let store = ConfigStore::open_in_memory().await.unwrap();
        let identity = HubIdentity::load_or_derive(&store).await.unwrap();
        let config = TunnelConfig::new(&identity, &Settings::default());
        TunnelClient::new(config, Arc::new(HubContext::new(store)))
    }

    #[tokio::test]
    async fn websocket_url_includes_hub_id() {
        let client = client().await;
        let binding = TenantBinding {
            tenant_id: "t-1".into(),
            claim_token: "ct".into(),
            cloud_url: "ws://h:8787/".into(),
        };
        let url = client.websocket_url(&binding);
        assert_eq!(url, format!("ws://h:8787/ws/hub/{}", client.config.hub_id));
    }

    #[tokio::test]
    async fn plain_ws_needs_no_connector() {
        let client = client().await;
        assert!(client.tls_connector("ws://h:8787/ws/hub/x").unwrap().is_none());
        assert!(client
            .tls_connector("wss://h:443/ws/hub/x")
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn run_stays_offline_without_binding() {
        let client = client().await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let state = client.state();
        let run = client.run(shutdown_rx);
        tokio::pin!(run);

        // Give the loop one pass, then shut down.
        tokio::select! {
            _ = &mut run => {}
            _ = sleep(Duration::from_millis(50)) => {}
        }
        assert_eq!(state.get(), TunnelState::Offline);
        shutdown_tx.send(true).unwrap();
        run.await;
    }
}
