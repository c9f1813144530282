use std::sync::Arc;

use axum::extract::FromRef;

use crate::config::Config;
use crate::db::AttendanceStore;
use crate::services::monitor::{DetectionMonitor, MonitorRegistry, MonitorSettings};
use crate::services::recognition::RecognitionService;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn AttendanceStore>,
    pub recognition: Arc<dyn RecognitionService>,
    pub monitors: Arc<MonitorRegistry>,
    pub config: Config,
}

impl AppState {
    pub fn min_confidence(&self) -> f64 {
        self.config.detection_confidence_threshold
    }

    /// Starts (or restarts) the detection monitor for a session
    pub fn start_monitor(&self, session_id: uuid::Uuid) {
        let monitor = DetectionMonitor::spawn(
            session_id,
            self.store.clone(),
            self.recognition.clone(),
            MonitorSettings::from_config(&self.config),
        );
        self.monitors.start(monitor);
    }
}

impl FromRef<AppState> for Arc<dyn AttendanceStore> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Arc<dyn RecognitionService> {
    fn from_ref(state: &AppState) -> Self {
        state.recognition.clone()
    }
}
