//! Forwards error events to an external tracker over HTTP.
//!
//! Installed once at startup when `ERROR_REPORT_URL` is configured. Sending is
//! fire-and-forget: a tracker outage is logged and never fails a request.

use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

static REPORTER: OnceCell<ErrorReporter> = OnceCell::new();

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEvent {
    pub source: String,
    pub level: String,
    pub message: String,
    pub stack: Option<String>,
    pub url: Option<String>,
    pub user_id: Option<i64>,
    pub environment: String,
    pub context: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ErrorReporter {
    client: Client,
    endpoint: String,
    environment: String,
}

impl ErrorReporter {
    pub fn new(endpoint: String, environment: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            endpoint,
            environment,
        }
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub async fn send(&self, event: &ErrorEvent) {
        match self.client.post(&self.endpoint).json(event).send().await {
            Ok(resp) if resp.status().is_success() => {
                debug!(status = %resp.status(), "Error event forwarded");
            }
            Ok(resp) => {
                warn!(status = %resp.status(), "Error tracker rejected event");
            }
            Err(e) => {
                warn!(error = %e, "Failed to forward error event");
            }
        }
    }
}

/// Installs the process-wide reporter. Later calls are ignored.
pub fn install(reporter: ErrorReporter) {
    if REPORTER.set(reporter).is_err() {
        warn!("Error reporter already installed");
    }
}

pub fn global() -> Option<&'static ErrorReporter> {
    REPORTER.get()
}

/// Queue an event on the current runtime without waiting for delivery.
pub fn dispatch(event: ErrorEvent) {
    if let Some(reporter) = global() {
        let reporter = reporter.clone();
        actix_web::rt::spawn(async move {
            reporter.send(&event).await;
        });
    }
}

pub fn report_backend_error(message: &str) {
    let Some(reporter) = global() else {
        return;
    };

    dispatch(ErrorEvent {
        source: "backend".to_string(),
        level: "error".to_string(),
        message: message.to_string(),
        stack: None,
        url: None,
        user_id: None,
        environment: reporter.environment().to_string(),
        context: None,
        timestamp: Utc::now(),
    });
}
