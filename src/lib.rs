//! clique-operator: status synthesis and event routing for Group / ScalingGroup / Clique
//!
//! This crate provides a Kubernetes operator that keeps the status of Clique
//! resources in sync with their Pods and reconciles ScalingGroups when the
//! Groups and Cliques around them change.

pub mod controller;
pub mod crd;
pub mod error;
pub mod leader;
pub mod telemetry;

#[cfg(feature = "rest-api")]
pub mod rest_api;

pub use crate::error::{Error, Result};
