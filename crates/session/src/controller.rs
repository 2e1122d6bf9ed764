//! SessionController - one device connection from connect to disconnect
//!
//! Buffers every data message from the device's telemetry topic in arrival
//! order. A `{"active": false}` control message ends collection; the buffer
//! is then handed to `SessionServices::finalize`. There is no timeout: a
//! device that never disconnects keeps its controller alive.

use contracts::{ContractError, DatumStore, RawSample, SensorRegistry, Session, SessionStore};
use ingestion::{decode_telemetry, Subscription, TelemetryMessage};
use observability::{record_message_dropped, record_sample_buffered, record_session_finished};
use tracing::{debug, info, instrument, trace, warn};

use crate::services::{SessionReport, SessionServices};
use crate::supervisor::SessionSlot;

enum Collected {
    Disconnected,
    SubscriptionClosed,
}

/// Per-device telemetry collector
pub struct SessionController<S, R, D> {
    session: Session,
    subscription: Subscription,
    buffer: Vec<RawSample>,
    malformed: usize,
    services: SessionServices<S, R, D>,
    slot: Option<SessionSlot>,
}

impl<S, R, D> SessionController<S, R, D>
where
    S: SessionStore + Sync,
    R: SensorRegistry + Sync,
    D: DatumStore + Sync,
{
    pub fn new(
        session: Session,
        subscription: Subscription,
        services: SessionServices<S, R, D>,
    ) -> Self {
        Self {
            session,
            subscription,
            buffer: Vec::new(),
            malformed: 0,
            services,
            slot: None,
        }
    }

    /// Hold an admission slot until this controller finishes
    pub fn with_slot(mut self, slot: SessionSlot) -> Self {
        self.slot = Some(slot);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Collect until disconnect, then finalise.
    ///
    /// If the subscription closes first the buffer is discarded and the
    /// session is marked failed.
    #[instrument(
        name = "session_controller_run",
        skip(self),
        fields(session_id = %self.session.id, device_id = %self.session.device_id)
    )]
    pub async fn run(mut self) -> SessionReport {
        info!(topic = %self.subscription.topic(), "Collecting telemetry");

        let collected = self.collect().await;

        let Self {
            session,
            subscription,
            buffer,
            malformed,
            services,
            slot,
        } = self;
        let topic = subscription.topic().to_string();
        subscription.unsubscribe();

        let report = match collected {
            Collected::Disconnected => {
                debug!(samples = buffer.len(), malformed, "Device disconnected");
                services.finalize(&session, &buffer).await
            }
            Collected::SubscriptionClosed => {
                let err = ContractError::SubscriptionClosed { topic };
                warn!(discarded = buffer.len(), error = %err, "Telemetry ended without disconnect");
                services.fail(&session, buffer.len(), 0, err).await
            }
        };

        record_session_finished(
            report.outcome.as_str(),
            report.samples,
            report.rows,
            report.datums,
        );
        info!(
            outcome = %report.outcome,
            samples = report.samples,
            rows = report.rows,
            datums = report.datums,
            "Session finished"
        );

        drop(slot);
        report
    }

    async fn collect(&mut self) -> Collected {
        while let Some(payload) = self.subscription.recv().await {
            match decode_telemetry(self.subscription.topic(), &payload) {
                Ok(TelemetryMessage::Data(sample)) => {
                    trace!(tick = sample.tick, channels = sample.channels.len(), "Sample buffered");
                    self.buffer.push(sample);
                    record_sample_buffered();
                }
                Ok(TelemetryMessage::Control { active: false }) => return Collected::Disconnected,
                Ok(TelemetryMessage::Control { active: true }) => {
                    debug!("Repeated connect on telemetry topic ignored");
                }
                Err(e) => {
                    self.malformed += 1;
                    record_message_dropped("telemetry", e.kind());
                    warn!(error = %e, "Skipping malformed telemetry message");
                }
            }
        }
        Collected::SubscriptionClosed
    }
}
