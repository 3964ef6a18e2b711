//! Response bodies for the REST API

use serde::{Deserialize, Serialize};

use crate::controller::conditions::is_min_available_breached;
use crate::crd::{Clique, CliqueStatus};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub leader: bool,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliqueSummary {
    pub name: String,
    pub namespace: String,
    pub replicas: i32,
    pub ready_replicas: i32,
    pub min_available: Option<i32>,
    pub min_available_breached: bool,
}

impl From<&Clique> for CliqueSummary {
    fn from(clique: &Clique) -> Self {
        let status = clique.status.as_ref();
        Self {
            name: clique.metadata.name.clone().unwrap_or_default(),
            namespace: clique.metadata.namespace.clone().unwrap_or_default(),
            replicas: status.map(|s| s.replicas).unwrap_or(0),
            ready_replicas: status.map(|s| s.ready_replicas).unwrap_or(0),
            min_available: clique.spec.min_available,
            min_available_breached: status
                .is_some_and(|s| is_min_available_breached(&s.conditions)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CliqueListResponse {
    pub items: Vec<CliqueSummary>,
    pub total: usize,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CliqueDetailResponse {
    pub name: String,
    pub namespace: String,
    pub scaling_group: Option<String>,
    pub status: CliqueStatus,
    pub created_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
        }
    }
}
