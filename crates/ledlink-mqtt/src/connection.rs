//! Broker connection manager.
//!
//! Handles the connection lifecycle: initial connect bounded by a CONNACK
//! timeout, fixed-delay reconnection, subscription restoration after every
//! CONNACK, and graceful disconnect. Every outbound publish and every inbound
//! message is appended to the traffic log.

use crate::config::{BrokerConfig, PublishOptions};
use crate::error::{MqttError, MqttResult};
use ledlink_core::TrafficLogEntry;
use ledlink_store::Store;
use ledlink_telemetry::Metrics;
use parking_lot::RwLock;
use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, Incoming, Outgoing, Publish, QoS,
};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the connection state machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub phase: ConnectionState,
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.phase == ConnectionState::Connected
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self {
            phase: ConnectionState::Disconnected,
            last_error: None,
        }
    }
}

/// MQTT connection manager.
///
/// One instance per process, shared as `Arc<ConnectionManager>`. Only this
/// type writes the connection status.
pub struct ConnectionManager {
    config: BrokerConfig,
    client: AsyncClient,
    /// Taken by the first successful `connect()`, handed to the loop task.
    event_loop: TokioMutex<Option<EventLoop>>,
    status: RwLock<ConnectionStatus>,
    store: Arc<Store>,
    subscribe_qos: QoS,
    loop_handle: TokioMutex<Option<JoinHandle<()>>>,
    /// Cancellation token for graceful shutdown.
    shutdown_token: CancellationToken,
}

impl ConnectionManager {
    /// Create a manager. No network activity happens until `connect()`.
    pub fn new(config: BrokerConfig, store: Arc<Store>) -> MqttResult<Self> {
        let options = config.mqtt_options()?;
        let subscribe_qos = config.qos_level()?;
        let (client, event_loop) = AsyncClient::new(options, config.request_capacity);

        Ok(Self {
            config,
            client,
            event_loop: TokioMutex::new(Some(event_loop)),
            status: RwLock::new(ConnectionStatus::default()),
            store,
            subscribe_qos,
            loop_handle: TokioMutex::new(None),
            shutdown_token: CancellationToken::new(),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Current state snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        self.status.read().phase
    }

    fn set_state(&self, phase: ConnectionState, last_error: Option<String>) {
        {
            let mut status = self.status.write();
            status.phase = phase;
            if last_error.is_some() || phase == ConnectionState::Connected {
                status.last_error = last_error;
            }
        }
        Metrics::broker_state_set(phase.as_str());
    }

    /// Establish the broker connection.
    ///
    /// Waits for CONNACK up to `connect_timeout`. On success the configured
    /// topics are subscribed and the event loop keeps running in the
    /// background (reconnecting as needed) until `close()`.
    pub async fn connect(self: &Arc<Self>) -> MqttResult<()> {
        let mut guard = self.event_loop.lock().await;
        let Some(mut event_loop) = guard.take() else {
            return Err(MqttError::Connect(format!(
                "connection already started (state: {})",
                self.state()
            )));
        };

        info!(
            host = %self.config.host,
            port = self.config.port,
            tls = self.config.use_tls,
            client_id = %self.config.client_id,
            "Connecting to MQTT broker"
        );
        self.set_state(ConnectionState::Connecting, None);

        let outcome = tokio::time::timeout(
            self.config.connect_timeout(),
            wait_for_connack(&mut event_loop),
        )
        .await;

        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!(
                "no CONNACK within {}s",
                self.config.connect_timeout_secs
            )),
        };

        if let Some(reason) = failure {
            error!(reason = %reason, "MQTT connect failed");
            *guard = Some(event_loop);
            self.set_state(ConnectionState::Disconnected, Some(reason.clone()));
            return Err(MqttError::Connect(reason));
        }
        drop(guard);

        self.set_state(ConnectionState::Connected, None);
        info!("MQTT broker connected");
        self.restore_subscriptions();

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_event_loop(event_loop).await });
        *self.loop_handle.lock().await = Some(handle);

        Ok(())
    }

    /// Subscribe every configured topic. Non-blocking: requests are queued
    /// on the client channel and sent by the event loop.
    fn restore_subscriptions(&self) {
        for topic in &self.config.subscribe_topics {
            match self.client.try_subscribe(topic.as_str(), self.subscribe_qos) {
                Ok(()) => debug!(topic = %topic, "Subscription requested"),
                Err(e) => warn!(topic = %topic, error = %e, "Failed to queue subscription"),
            }
        }
    }

    async fn run_event_loop(self: Arc<Self>, mut event_loop: EventLoop) {
        loop {
            let event = tokio::select! {
                biased;
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in MQTT event loop");
                    break;
                }
                event = event_loop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    if self.state() != ConnectionState::Connected {
                        info!("MQTT broker reconnected");
                        self.set_state(ConnectionState::Connected, None);
                        self.restore_subscriptions();
                    }
                }
                Ok(Event::Incoming(Incoming::Publish(publish))) => {
                    self.record_inbound(&publish);
                }
                Ok(Event::Incoming(Incoming::SubAck(ack))) => {
                    debug!(pkid = ack.pkid, "Subscription acknowledged");
                }
                Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                    info!("MQTT disconnect sent");
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    if self.shutdown_token.is_cancelled() {
                        break;
                    }

                    let reason = e.to_string();
                    warn!(
                        error = %reason,
                        delay_secs = self.config.reconnect_delay_secs,
                        "MQTT connection lost, reconnecting"
                    );
                    self.set_state(ConnectionState::Reconnecting, Some(reason));
                    Metrics::broker_reconnect(reconnect_reason(&e));

                    tokio::select! {
                        () = tokio::time::sleep(self.config.reconnect_delay()) => {}
                        () = self.shutdown_token.cancelled() => {
                            info!("Shutdown requested during reconnect delay");
                            break;
                        }
                    }
                }
            }
        }

        self.set_state(ConnectionState::Disconnected, None);
    }

    fn record_inbound(&self, publish: &Publish) {
        Metrics::inbound();
        let payload = String::from_utf8_lossy(&publish.payload);
        debug!(topic = %publish.topic, bytes = publish.payload.len(), "Inbound message");

        let entry = TrafficLogEntry::subscribe(publish.topic.clone(), payload.into_owned());
        if let Err(e) = self.store.insert_log(&entry) {
            warn!(topic = %publish.topic, error = %e, "Failed to record inbound message");
        }
    }

    /// Publish `payload` on `topic`.
    ///
    /// Fails fast with [`MqttError::NotConnected`] unless the state is
    /// `Connected`; nothing is queued and nothing is logged in that case.
    /// The packet is handed to the client without waiting for the broker's
    /// acknowledgement, then exactly one traffic log entry is written.
    pub async fn publish(
        &self,
        topic: &str,
        payload: &str,
        options: PublishOptions,
    ) -> MqttResult<()> {
        let phase = self.state();
        if phase != ConnectionState::Connected {
            Metrics::publish(topic, "not_connected");
            return Err(MqttError::NotConnected { phase });
        }

        if let Err(e) = self
            .client
            .publish(topic, options.qos, options.retain, payload.as_bytes().to_vec())
            .await
        {
            Metrics::publish(topic, "error");
            return Err(MqttError::Publish(e.to_string()));
        }
        Metrics::publish(topic, "ok");
        debug!(topic = %topic, bytes = payload.len(), "Published");

        self.store
            .insert_log(&TrafficLogEntry::publish(topic, payload))?;
        Ok(())
    }

    /// Graceful disconnect. Safe to call more than once.
    pub async fn close(&self) -> MqttResult<()> {
        let handle = self.loop_handle.lock().await.take();

        let Some(mut handle) = handle else {
            self.shutdown_token.cancel();
            if self.state() != ConnectionState::Disconnected {
                self.set_state(ConnectionState::Disconnected, None);
            }
            return Ok(());
        };

        info!("Closing MQTT connection");
        if self.state() == ConnectionState::Connected {
            if let Err(e) = self.client.try_disconnect() {
                warn!(error = %e, "Failed to queue MQTT disconnect");
                self.shutdown_token.cancel();
            }
        } else {
            self.shutdown_token.cancel();
        }

        if tokio::time::timeout(self.config.close_timeout(), &mut handle)
            .await
            .is_err()
        {
            warn!(
                timeout_secs = self.config.close_timeout_secs,
                "MQTT event loop did not stop in time, aborting"
            );
            self.shutdown_token.cancel();
            handle.abort();
        }

        self.shutdown_token.cancel();
        self.set_state(ConnectionState::Disconnected, None);
        info!("MQTT connection closed");
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, phase: ConnectionState) {
        self.set_state(phase, None);
    }
}

async fn wait_for_connack(event_loop: &mut EventLoop) -> Result<(), ConnectionError> {
    loop {
        if let Event::Incoming(Incoming::ConnAck(_)) = event_loop.poll().await? {
            return Ok(());
        }
    }
}

fn reconnect_reason(error: &ConnectionError) -> &'static str {
    match error {
        ConnectionError::Io(_) => "io",
        ConnectionError::ConnectionRefused(_) => "refused",
        ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => "timeout",
        ConnectionError::MqttState(_) => "protocol",
        _ => "other",
    }
}
