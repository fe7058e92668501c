//! On-demand function handlers.
//!
//! These adapt the agent and the alert reader to an event-in, response-out
//! shape: a JSON event goes in, and a `{statusCode, headers, body}` object
//! comes out with a JSON-encoded body. The HTTP server reuses the same
//! status and body mapping so both surfaces agree.
//!
//! User-facing bodies never carry internal error detail.

use crate::ledger::RunLedger;
use crate::pipeline::{Agent, AgentError, IdentityStrategy, Outcome, RunReport};
use crate::store::{AlertOrder, AlertReader, Datastore};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

/// Body returned for any unexpected server-side failure.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal server error occurred";

/// Response shape of a function invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    /// JSON-encoded body
    pub body: String,
}

impl FunctionResponse {
    /// Build a response with a JSON body.
    pub fn json(status_code: u16, body: &Value) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            status_code,
            headers,
            body: body.to_string(),
        }
    }

    /// Decode the body back into JSON.
    pub fn body_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::from_str(&self.body)
    }
}

/// Event accepted by the run-agent function.
#[derive(Debug, Clone, Deserialize)]
pub struct RunAgentEvent {
    pub filepath: String,
}

fn message(text: impl Into<String>) -> Value {
    json!({ "message": text.into() })
}

fn error(text: impl Into<String>) -> Value {
    json!({ "error": text.into() })
}

/// Map a run result to a status code and JSON body.
pub fn run_result_body(result: &Result<RunReport, AgentError>) -> (u16, Value) {
    match result {
        Ok(report) => match report.outcome {
            Outcome::NoAlerts => (
                200,
                message(format!(
                    "No high stress subjects found in {}",
                    report.source.display()
                )),
            ),
            Outcome::Persisted { count } => (
                200,
                message(format!(
                    "Agent run complete: {} alerts stored from {}",
                    count,
                    report.source.display()
                )),
            ),
        },
        Err(AgentError::Schema(e)) => (
            400,
            error(format!("Missing required column(s): {}", e.missing.join(", "))),
        ),
        Err(AgentError::SourceNotFound(path)) => {
            (404, error(format!("File not found: {}", path.display())))
        }
        Err(AgentError::SourceUnreadable { .. }) => (500, error("Failed to read input file")),
        Err(AgentError::Persistence(_)) => (500, error("Failed to store alerts")),
    }
}

/// Body for a request that is missing its `filepath`.
pub fn missing_filepath_body() -> (u16, Value) {
    (400, error("Missing required field: filepath"))
}

/// Extract the batch path from a run event.
pub fn parse_run_event(event: &Value) -> Option<RunAgentEvent> {
    serde_json::from_value::<RunAgentEvent>(event.clone())
        .ok()
        .filter(|e| !e.filepath.trim().is_empty())
}

/// Run the agent over the batch named in `event`.
///
/// When a ledger is given, the run's result is recorded in it. Rejected
/// events never start a run and are not recorded.
pub fn handle_run_event(
    event: &Value,
    store: &dyn Datastore,
    identity: IdentityStrategy,
    ledger: Option<&RunLedger>,
) -> FunctionResponse {
    tracing::info!("RunAgentFunction invoked");

    let Some(event) = parse_run_event(event) else {
        tracing::warn!("Run event rejected: missing filepath");
        let (status, body) = missing_filepath_body();
        return FunctionResponse::json(status, &body);
    };

    let result = Agent::new(store)
        .with_identity(identity)
        .run(&event.filepath);
    if let Some(ledger) = ledger {
        ledger.record_run(&result);
    }

    let (status, body) = run_result_body(&result);
    FunctionResponse::json(status, &body)
}

/// Fetch all alerts, newest first.
pub fn handle_get_alerts(store: &dyn Datastore) -> FunctionResponse {
    tracing::info!("GetAlertsFunction invoked");

    match AlertReader::new(store).fetch(AlertOrder::NewestFirst) {
        Ok(alerts) => match serde_json::to_value(&alerts) {
            Ok(body) => FunctionResponse::json(200, &body),
            Err(e) => {
                tracing::error!("Failed to encode alerts: {}", e);
                FunctionResponse::json(500, &error(INTERNAL_ERROR_MESSAGE))
            }
        },
        Err(e) => {
            tracing::error!("Error occurred: {}", e);
            FunctionResponse::json(500, &error(INTERNAL_ERROR_MESSAGE))
        }
    }
}
