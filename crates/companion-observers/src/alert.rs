//! Alerts written by the remapper to its status file.

use serde::{Deserialize, Serialize};

use crate::error::ObserverError;

/// One alert entry. The remapper decides the shape; the companion only
/// needs to know whether any are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alert(pub serde_json::Value);

#[derive(Deserialize)]
#[serde(untagged)]
enum AlertsDocument {
    Wrapped { alerts: Vec<Alert> },
    Bare(Vec<Alert>),
}

/// Parse the alerts file: either `{"alerts": [...]}` or a bare array.
pub fn parse_alerts(content: &[u8]) -> Result<Vec<Alert>, ObserverError> {
    let document: AlertsDocument =
        serde_json::from_slice(content).map_err(|e| ObserverError::Parse {
            what: "alerts file",
            reason: e.to_string(),
        })?;
    Ok(match document {
        AlertsDocument::Wrapped { alerts } | AlertsDocument::Bare(alerts) => alerts,
    })
}
