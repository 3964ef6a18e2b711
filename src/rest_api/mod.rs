//! REST API module for external integrations
//!
//! Serves health and Prometheus metrics, plus read-only views of Clique status.

mod dto;
mod handlers;
mod server;

pub use dto::{CliqueDetailResponse, CliqueListResponse, CliqueSummary, ErrorResponse};
pub use server::{router, run_server};
