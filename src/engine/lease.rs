// src/engine/lease.rs

//! Lease guard: does this run currently own the testbed?

use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::{NightcheckError, Result};
use crate::exec::{Lease, LeaseService};
use crate::types::LeaseOwner;

/// Answers "who owns the testbed right now" for one resource and one
/// designated principal, both fixed at construction.
///
/// A single point-in-time query is authoritative: no retries, no caching.
pub struct LeaseGuard {
    service: Arc<dyn LeaseService>,
    resource: String,
    principal: String,
}

impl LeaseGuard {
    pub fn new(service: Arc<dyn LeaseService>, resource: &str, principal: &str) -> Self {
        Self {
            service,
            resource: resource.to_string(),
            principal: principal.to_string(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }

    pub async fn current_owner(&self) -> Result<LeaseOwner> {
        let lease = self
            .service
            .active_lease(&self.resource)
            .await
            .map_err(|e| NightcheckError::LeaseQuery(format!("{e:#}")))?;

        if let Some(ref lease) = lease {
            match lease.window {
                Some(window) => debug!(principal = %lease.principal, %window, "active lease"),
                None => debug!(principal = %lease.principal, "active lease"),
            }
        }

        let owner = owner_of(lease.as_ref(), &self.principal);
        info!(resource = %self.resource, ?owner, "lease checked");
        Ok(owner)
    }
}

/// Classify an active lease (or its absence) against our principal.
pub fn owner_of(lease: Option<&Lease>, principal: &str) -> LeaseOwner {
    match lease {
        None => LeaseOwner::Nobody,
        Some(lease) if lease.principal == principal => LeaseOwner::Us,
        Some(lease) => LeaseOwner::Other(lease.principal.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lease(principal: &str) -> Lease {
        Lease {
            principal: principal.to_string(),
            window: None,
        }
    }

    #[test]
    fn owner_classification() {
        assert_eq!(owner_of(None, "nightly"), LeaseOwner::Nobody);
        assert_eq!(owner_of(Some(&lease("nightly")), "nightly"), LeaseOwner::Us);
        assert_eq!(
            owner_of(Some(&lease("someone")), "nightly"),
            LeaseOwner::Other("someone".to_string())
        );
    }
}
