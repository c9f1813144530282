//! Per-session detection polling.
//!
//! A [`DetectionMonitor`] periodically asks the recognition service who is in
//! frame and records attendance for students not yet counted present. Each
//! monitor owns its task and is cancelled when dropped, so a session's polling
//! never outlives the registry entry that holds it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::db::AttendanceStore;
use crate::error::Result;
use crate::services::attendance::{
    load_session, present_students, record_detections, recordable_student,
};
use crate::services::recognition::RecognitionService;

#[derive(Debug, Clone, Copy)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub min_confidence: f64,
}

impl MonitorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            interval: Duration::from_secs(config.detection_poll_interval_secs),
            min_confidence: config.detection_confidence_threshold,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Recorded(usize),
    SessionEnded,
}

/// Runs one detection round for a session
///
/// The set of students already present is rebuilt from the store on every
/// round, so a student marked absent is submitted again when seen.
pub async fn poll_once(
    store: &dyn AttendanceStore,
    recognition: &dyn RecognitionService,
    session_id: Uuid,
    min_confidence: f64,
) -> Result<PollOutcome> {
    let session = load_session(store, session_id).await?;
    if !session.is_active() {
        return Ok(PollOutcome::SessionEnded);
    }

    let already_present = present_students(store, session_id).await?;
    let detections = recognition.detect().await?;

    let fresh: Vec<_> = detections
        .into_iter()
        .filter(|d| {
            recordable_student(d, min_confidence)
                .is_some_and(|id| !already_present.contains(id))
        })
        .collect();

    if fresh.is_empty() {
        return Ok(PollOutcome::Recorded(0));
    }

    let recorded = record_detections(store, &session, &fresh, min_confidence).await?;
    Ok(PollOutcome::Recorded(recorded.len()))
}

pub struct DetectionMonitor {
    session_id: Uuid,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl DetectionMonitor {
    /// Spawns the polling task on the current runtime
    pub fn spawn(
        session_id: Uuid,
        store: Arc<dyn AttendanceStore>,
        recognition: Arc<dyn RecognitionService>,
        settings: MonitorSettings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(
            session_id,
            store,
            recognition,
            settings,
            cancel.clone(),
        ));

        Self {
            session_id,
            cancel,
            handle,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for DetectionMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    session_id: Uuid,
    store: Arc<dyn AttendanceStore>,
    recognition: Arc<dyn RecognitionService>,
    settings: MonitorSettings,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        session_id = %session_id,
        interval_ms = settings.interval.as_millis() as u64,
        "Detection monitor started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = poll_once(
                store.as_ref(),
                recognition.as_ref(),
                session_id,
                settings.min_confidence,
            ) => outcome,
        };

        match outcome {
            Ok(PollOutcome::Recorded(0)) => {}
            Ok(PollOutcome::Recorded(count)) => {
                tracing::debug!(session_id = %session_id, count, "Detection round recorded attendance");
            }
            Ok(PollOutcome::SessionEnded) => {
                tracing::info!(session_id = %session_id, "Session no longer active, monitor exiting");
                break;
            }
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Detection round failed");
            }
        }
    }

    tracing::info!(session_id = %session_id, "Detection monitor stopped");
}

/// Owns at most one running monitor per session
#[derive(Default)]
pub struct MonitorRegistry {
    monitors: Mutex<HashMap<Uuid, DetectionMonitor>>,
}

impl MonitorRegistry {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, DetectionMonitor>> {
        self.monitors.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a monitor, cancelling any previous one for the same session
    pub fn start(&self, monitor: DetectionMonitor) {
        let mut monitors = self.lock();
        monitors.retain(|_, m| !m.is_finished());
        if monitors.insert(monitor.session_id(), monitor).is_some() {
            tracing::debug!("Replaced existing detection monitor");
        }
    }

    /// Cancels the session's monitor; returns whether one was registered
    pub fn stop(&self, session_id: Uuid) -> bool {
        self.lock().remove(&session_id).is_some()
    }

    pub fn is_running(&self, session_id: Uuid) -> bool {
        self.lock()
            .get(&session_id)
            .is_some_and(|m| !m.is_finished())
    }

    /// Cancels every monitor
    pub fn shutdown(&self) {
        let drained: Vec<_> = self.lock().drain().map(|(_, m)| m).collect();
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "Cancelling detection monitors");
        }
    }
}
