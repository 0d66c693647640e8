use anyhow::{bail, Context, Result};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::messaging::{InboundMessage, MessagingDriver};

// ---------------------------------------------------------------------------
// Topic layout
// ---------------------------------------------------------------------------

/// `<prefix>/sensors`: periodic telemetry.
pub fn telemetry_topic(prefix: &str) -> String {
    format!("{prefix}/sensors")
}

/// `<prefix>/events`: best-effort device events.
pub fn events_topic(prefix: &str) -> String {
    format!("{prefix}/events")
}

/// `<prefix>/commands`: inbound command channel.
pub fn commands_topic(prefix: &str) -> String {
    format!("{prefix}/commands")
}

/// Commands are recognised by topic suffix, whatever the prefix.
pub fn is_command_topic(topic: &str) -> bool {
    topic.ends_with("/commands")
}

// ---------------------------------------------------------------------------
// rumqttc driver
// ---------------------------------------------------------------------------

/// [`MessagingDriver`] over a rumqttc client. The event loop runs in a
/// spawned task that tracks session status and forwards inbound publishes;
/// everything the tick calls goes through the client's non-blocking `try_*`
/// surface.
pub struct MqttDriver {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    inbound: UnboundedReceiver<InboundMessage>,
}

impl MqttDriver {
    /// Create the client and spawn its event loop. Must be called from
    /// within a tokio runtime.
    pub fn spawn(
        client_id: &str,
        host: &str,
        port: u16,
        credentials: Option<(&str, &str)>,
    ) -> Self {
        let mut options = MqttOptions::new(client_id, host, port);
        options.set_keep_alive(Duration::from_secs(30));
        if let Some((user, pass)) = credentials {
            options.set_credentials(user, pass);
        }

        let (client, mut eventloop) = AsyncClient::new(options, 20);
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();

        let flag = Arc::clone(&connected);
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt session established");
                        flag.store(true, Ordering::SeqCst);
                    }
                    Ok(Event::Incoming(Packet::Publish(p))) => {
                        let msg = InboundMessage {
                            topic: p.topic.clone(),
                            payload: p.payload.to_vec(),
                        };
                        if tx.send(msg).is_err() {
                            // Driver dropped; nothing left to feed.
                            return;
                        }
                    }
                    Ok(Event::Incoming(Packet::Disconnect)) => {
                        warn!("mqtt session closed by broker");
                        flag.store(false, Ordering::SeqCst);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("mqtt event loop error: {e}");
                        flag.store(false, Ordering::SeqCst);
                        sleep(Duration::from_secs(2)).await;
                    }
                }
            }
        });

        Self {
            client,
            connected,
            inbound: rx,
        }
    }
}

impl MessagingDriver for MqttDriver {
    fn connect(&mut self) -> Result<()> {
        // The event loop owns session establishment and retries on its own;
        // a connect attempt here just reports whether the broker has
        // acknowledged the session yet.
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            bail!("broker session not established")
        }
    }

    fn subscribe(&mut self, topic: &str) -> Result<()> {
        self.client
            .try_subscribe(topic, QoS::AtLeastOnce)
            .context("subscribe")
    }

    fn publish(&mut self, topic: &str, payload: Vec<u8>) -> Result<()> {
        self.client
            .try_publish(topic, QoS::AtLeastOnce, false, payload)
            .context("publish")
    }

    fn try_recv(&mut self) -> Option<InboundMessage> {
        self.inbound.try_recv().ok()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

// ===========================================================================
// Tests
// ===========================================================================
