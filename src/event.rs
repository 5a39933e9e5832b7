use std::sync::{LazyLock, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EventLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PipelineStep {
    Load,
    Stitch,
    Trim,
    Detect,
    Ocr,
    Save,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineEvent {
    pub level: EventLevel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<PipelineStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

impl PipelineEvent {
    pub fn new(level: EventLevel, step: Option<PipelineStep>, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            step,
            data: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `LOG: {json}` line as read by the progress bridge.
    pub fn to_log_line(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|e| e.to_string());
        format!("LOG: {json}")
    }
}

static EVENTS: LazyLock<Mutex<Vec<PipelineEvent>>> = LazyLock::new(Mutex::default);

pub fn emit_event(event: PipelineEvent) {
    let step = event.step.map(|s| s.to_string()).unwrap_or_default();
    match event.level {
        EventLevel::Info => info!("[{step}] {}", event.message),
        EventLevel::Warn => warn!("[{step}] {}", event.message),
        EventLevel::Error => error!("[{step}] {}", event.message),
    }

    EVENTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(event);
}

/// Drains all events emitted since the last call.
pub fn get_events() -> Vec<PipelineEvent> {
    EVENTS
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain(..)
        .collect()
}

pub fn emit_info(step: PipelineStep, message: impl Into<String>, data: Option<Value>) {
    let event = PipelineEvent::new(EventLevel::Info, Some(step), message);
    emit_event(match data {
        Some(data) => event.with_data(data),
        None => event,
    });
}

pub fn emit_warning(step: PipelineStep, warning: &crate::PipelineWarning) {
    let data = serde_json::to_value(warning).ok();
    let event = PipelineEvent::new(EventLevel::Warn, Some(step), warning.to_string());
    emit_event(match data {
        Some(data) => event.with_data(data),
        None => event,
    });
}
