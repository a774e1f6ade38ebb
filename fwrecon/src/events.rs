//! Structured engine events for external subscribers.

use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::drift::DriftSeverity;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    DeploymentCompleted {
        device: String,
        attempt_id: String,
        diff_id: String,
    },
    DeploymentFailed {
        device: String,
        attempt_id: String,
        outcome: String,
        error_kind: String,
        message: String,
    },
    GuardrailBlocked {
        device: String,
        attempt_id: String,
        violations: Vec<String>,
    },
    DriftDetected {
        device: String,
        report_id: String,
        severity: DriftSeverity,
        changes: usize,
    },
    /// Operator attention; `page` is set only for deployment-locked devices.
    Alert {
        device: String,
        page: bool,
        reason: String,
    },
}

impl EngineEvent {
    pub fn device(&self) -> &str {
        match self {
            EngineEvent::DeploymentCompleted { device, .. }
            | EngineEvent::DeploymentFailed { device, .. }
            | EngineEvent::GuardrailBlocked { device, .. }
            | EngineEvent::DriftDetected { device, .. }
            | EngineEvent::Alert { device, .. } => device,
        }
    }
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Emits each event as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        let payload = serde_json::to_string(&event).unwrap_or_default();
        match &event {
            EngineEvent::Alert { page: true, .. } => {
                tracing::error!(device = event.device(), event = %payload, "operator page")
            }
            EngineEvent::Alert { .. }
            | EngineEvent::DeploymentFailed { .. }
            | EngineEvent::GuardrailBlocked { .. } => {
                tracing::warn!(device = event.device(), event = %payload, "engine event")
            }
            _ => tracing::info!(device = event.device(), event = %payload, "engine event"),
        }
    }
}

/// Collects events in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<EngineEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn pages(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, EngineEvent::Alert { page: true, .. }))
            .count()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: EngineEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
