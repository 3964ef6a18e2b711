//! Lease-based leader election
//!
//! Every replica runs its controllers, but only the replica holding the
//! coordination Lease writes status. Others requeue until they take over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, ObjectMeta, Patch, PatchParams, PostParams};
use tracing::{info, warn};

pub const LEASE_NAME: &str = "clique-operator-leader";
const LEASE_DURATION_SECS: i32 = 15;
const RENEW_INTERVAL: Duration = Duration::from_secs(10);
const RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Holder identity for this replica: `$HOSTNAME`, then the system hostname.
pub fn holder_identity() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| {
        hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown-host".to_string())
    })
}

/// Whether a lease held by someone else can be taken over at `now`.
pub fn lease_expired(spec: Option<&LeaseSpec>, now: DateTime<Utc>) -> bool {
    let Some(renewed) = spec.and_then(|s| s.renew_time.as_ref()) else {
        return true;
    };
    let duration = spec
        .and_then(|s| s.lease_duration_seconds)
        .unwrap_or(LEASE_DURATION_SECS);
    now > renewed.0 + chrono::Duration::seconds(i64::from(duration))
}

fn renew_patch(now: DateTime<Utc>) -> serde_json::Value {
    serde_json::json!({
        "spec": {
            "renewTime": MicroTime(now),
            "leaseDurationSeconds": LEASE_DURATION_SECS,
        }
    })
}

/// Takeover of an expired lease.
///
/// Carries the resourceVersion the lease was read at, so when two replicas
/// race for it only the first patch is accepted.
fn takeover_patch(
    identity: &str,
    resource_version: Option<&str>,
    now: DateTime<Utc>,
) -> serde_json::Value {
    serde_json::json!({
        "metadata": {
            "resourceVersion": resource_version,
        },
        "spec": {
            "holderIdentity": identity,
            "acquireTime": MicroTime(now),
            "renewTime": MicroTime(now),
            "leaseDurationSeconds": LEASE_DURATION_SECS,
        }
    })
}

pub struct LeaderElector {
    leases: Api<Lease>,
    namespace: String,
    identity: String,
    is_leader: Arc<AtomicBool>,
}

impl LeaderElector {
    pub fn new(
        client: kube::Client,
        namespace: &str,
        identity: String,
        is_leader: Arc<AtomicBool>,
    ) -> Self {
        Self {
            leases: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
            identity,
            is_leader,
        }
    }

    /// Acquire and renew the lease forever, flipping `is_leader` as it changes hands.
    pub async fn run(self) {
        info!("Leader election using holder ID: {}", self.identity);
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => {
                    if !self.is_leader.swap(true, Ordering::Relaxed) {
                        info!("Acquired leadership for lease {}", LEASE_NAME);
                    }
                    tokio::time::sleep(RENEW_INTERVAL).await;
                }
                Ok(false) => {
                    if self.is_leader.swap(false, Ordering::Relaxed) {
                        warn!("Lost leadership for lease {}", LEASE_NAME);
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(e) => {
                    warn!("Leader election error: {:?}", e);
                    self.is_leader.store(false, Ordering::Relaxed);
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
            }
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, kube::Error> {
        let now = Utc::now();

        let existing = match self.leases.get_opt(LEASE_NAME).await? {
            Some(lease) => lease,
            None => {
                return match self
                    .leases
                    .create(&PostParams::default(), &self.new_lease(now))
                    .await
                {
                    Ok(_) => {
                        info!("Created lease {} with holder {}", LEASE_NAME, self.identity);
                        Ok(true)
                    }
                    // Another replica created it first
                    Err(kube::Error::Api(response)) if response.code == 409 => Ok(false),
                    Err(e) => Err(e),
                };
            }
        };

        let spec = existing.spec.as_ref();
        let current_holder = spec.and_then(|s| s.holder_identity.as_deref());

        let patch = if current_holder == Some(self.identity.as_str()) {
            renew_patch(now)
        } else if lease_expired(spec, now) {
            info!("Lease held by {:?} has expired, taking over", current_holder);
            takeover_patch(
                &self.identity,
                existing.metadata.resource_version.as_deref(),
                now,
            )
        } else {
            return Ok(false);
        };

        match self
            .leases
            .patch(LEASE_NAME, &PatchParams::default(), &Patch::Merge(&patch))
            .await
        {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(response)) if response.code == 409 => {
                info!("Lease {} changed hands concurrently", LEASE_NAME);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn new_lease(&self, now: DateTime<Utc>) -> Lease {
        Lease {
            metadata: ObjectMeta {
                name: Some(LEASE_NAME.to_string()),
                namespace: Some(self.namespace.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                acquire_time: Some(MicroTime(now)),
                renew_time: Some(MicroTime(now)),
                lease_duration_seconds: Some(LEASE_DURATION_SECS),
                ..Default::default()
            }),
        }
    }
}
