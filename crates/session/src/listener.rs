//! ConnectionListener - turns connect events into session controllers
//!
//! Subscribes to the connectivity topic. For every `{"active": true}` event
//! with a valid device id it claims an admission slot, subscribes to the
//! device's telemetry topic, creates the session, then spawns a
//! `SessionController`. Disconnect events on this topic are ignored;
//! sessions end on their own telemetry topic.
//!
//! A controller task that panics still ends its session: the listener maps
//! task ids back to sessions and marks the session failed.

use std::collections::HashMap;

use bytes::Bytes;
use chrono::Utc;
use contracts::{
    BrokerConfig, ContractError, DatumStore, DeviceId, NewSession, SensorRegistry, ServiceConfig,
    Session, SessionStore,
};
use ingestion::{decode_connectivity, Broker, Subscription};
use observability::{record_message_dropped, record_session_rejected, record_session_started};
use tokio::sync::mpsc;
use tokio::task::{Id, JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::controller::SessionController;
use crate::error::Result;
use crate::services::{SessionReport, SessionServices};
use crate::supervisor::{ActiveSessions, SessionSlot};

/// Listener counters, returned when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListenerStats {
    /// Connectivity payloads received
    pub events: u64,
    /// Controllers spawned
    pub sessions_started: u64,
    /// Connect events refused by admission control or a failed session create
    pub rejected: u64,
    /// Undecodable payloads or invalid device ids
    pub malformed: u64,
    /// Controllers that finished
    pub sessions_finished: u64,
    /// Controllers that panicked or were cancelled
    pub aborted: u64,
}

/// Long-lived connectivity listener
pub struct ConnectionListener<B, S, R, D> {
    broker: B,
    broker_config: BrokerConfig,
    services: SessionServices<S, R, D>,
    active: ActiveSessions,
    reports: Option<mpsc::UnboundedSender<SessionReport>>,
    controllers: JoinSet<SessionReport>,
    running: HashMap<Id, Session>,
    stats: ListenerStats,
}

impl<B, S, R, D> ConnectionListener<B, S, R, D>
where
    B: Broker + Sync + 'static,
    S: SessionStore + Sync + 'static,
    R: SensorRegistry + Sync + 'static,
    D: DatumStore + Sync + 'static,
{
    pub fn new(broker: B, config: &ServiceConfig, services: SessionServices<S, R, D>) -> Self {
        Self {
            broker,
            broker_config: config.broker.clone(),
            services: services.with_tick_limit(config.supervision.max_session_ticks),
            active: ActiveSessions::new(&config.supervision),
            reports: None,
            controllers: JoinSet::new(),
            running: HashMap::new(),
            stats: ListenerStats::default(),
        }
    }

    /// Forward every finished session's report to `tx`
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<SessionReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Shared view of the active sessions
    pub fn active_sessions(&self) -> ActiveSessions {
        self.active.clone()
    }

    /// Subscribe, then run in a background task.
    ///
    /// The connectivity subscription exists when this returns, so events
    /// published afterwards are not missed.
    ///
    /// # Errors
    /// Fails if the connectivity topic cannot be subscribed.
    pub async fn spawn(self) -> Result<JoinHandle<ListenerStats>> {
        let subscription = self
            .broker
            .subscribe(&self.broker_config.connectivity_topic)
            .await?;
        Ok(tokio::spawn(self.listen(subscription)))
    }

    /// Subscribe and listen until the broker closes the subscription.
    ///
    /// Running controllers are awaited before returning.
    ///
    /// # Errors
    /// Fails if the connectivity topic cannot be subscribed.
    pub async fn run(self) -> Result<ListenerStats> {
        let subscription = self
            .broker
            .subscribe(&self.broker_config.connectivity_topic)
            .await?;
        Ok(self.listen(subscription).await)
    }

    #[instrument(name = "connection_listener", skip_all, fields(topic = %subscription.topic()))]
    async fn listen(mut self, subscription: Subscription) -> ListenerStats {
        info!("Listening for device connections");

        loop {
            tokio::select! {
                payload = subscription.recv() => match payload {
                    Some(payload) => self.on_event(subscription.topic(), payload).await,
                    None => break,
                },
                Some(joined) = self.controllers.join_next_with_id(), if !self.controllers.is_empty() => {
                    self.on_finished(joined).await;
                }
            }
        }

        info!(
            running = self.controllers.len(),
            "Connectivity subscription closed, waiting for controllers"
        );
        while let Some(joined) = self.controllers.join_next_with_id().await {
            self.on_finished(joined).await;
        }

        info!(
            events = self.stats.events,
            sessions = self.stats.sessions_started,
            rejected = self.stats.rejected,
            "Listener stopped"
        );
        self.stats
    }

    async fn on_event(&mut self, topic: &str, payload: Bytes) {
        self.stats.events += 1;

        // 1. Decode, connect events only
        let event = match decode_connectivity(topic, &payload) {
            Ok(event) => event,
            Err(e) => return self.malformed(e),
        };

        if !event.active {
            debug!(device = %event.device, "Disconnect on connectivity topic ignored");
            return;
        }

        // 2. Validate the device id
        let device_id = match event.device_id() {
            Ok(id) => id,
            Err(e) => return self.malformed(e),
        };

        // 3. Admission
        let slot = match self.active.try_claim(device_id) {
            Ok(slot) => slot,
            Err(e) => return self.rejected(device_id, e),
        };

        // 4. Subscribe + create session, then hand off to a controller
        match self.open_session(device_id).await {
            Ok((session, subscription)) => self.start_controller(session, subscription, slot),
            Err(e) => self.rejected(device_id, e),
        }
    }

    /// Subscribe to the telemetry topic first, then create the session, so
    /// nothing the device sends after its connect event is lost.
    async fn open_session(
        &self,
        device_id: DeviceId,
    ) -> std::result::Result<(Session, Subscription), ContractError> {
        let topic = self.broker_config.telemetry_topic(&device_id);
        let subscription = self.broker.subscribe(&topic).await?;

        let start_time = Utc::now().timestamp_millis();
        match self
            .services
            .sessions()
            .create_session(NewSession::generated(device_id, start_time))
            .await
        {
            Ok(session) => Ok((session, subscription)),
            Err(e) => {
                subscription.unsubscribe();
                Err(e)
            }
        }
    }

    fn start_controller(&mut self, session: Session, subscription: Subscription, slot: SessionSlot) {
        info!(
            session_id = %session.id,
            device_id = %session.device_id,
            name = %session.name,
            "Session opened"
        );

        let controller = SessionController::new(session.clone(), subscription, self.services.clone())
            .with_slot(slot);
        let task = self.controllers.spawn(controller.run());
        self.running.insert(task.id(), session);
        self.stats.sessions_started += 1;
        record_session_started();
    }

    async fn on_finished(&mut self, joined: std::result::Result<(Id, SessionReport), JoinError>) {
        self.stats.sessions_finished += 1;
        let report = match joined {
            Ok((id, report)) => {
                self.running.remove(&id);
                report
            }
            Err(e) => {
                self.stats.aborted += 1;
                let Some(session) = self.running.remove(&e.id()) else {
                    error!(error = %e, "Unknown session controller task aborted");
                    return;
                };
                // the slot and subscription were dropped with the task
                let cause = if e.is_panic() {
                    ContractError::Other(format!("session controller panicked: {e}"))
                } else {
                    ContractError::Other(format!("session controller cancelled: {e}"))
                };
                self.services.fail(&session, 0, 0, cause).await
            }
        };

        if let Some(tx) = &self.reports {
            if tx.send(report).is_err() {
                debug!("Report receiver dropped");
            }
        }
    }

    fn malformed(&mut self, err: ContractError) {
        self.stats.malformed += 1;
        record_message_dropped("connectivity", err.kind());
        warn!(error = %err, "Skipping connectivity event");
    }

    fn rejected(&mut self, device_id: DeviceId, err: ContractError) {
        self.stats.rejected += 1;
        record_session_rejected(err.kind());
        warn!(device_id = %device_id, error = %err, "Connect rejected");
    }
}
