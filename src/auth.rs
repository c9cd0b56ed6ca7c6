//! Identity boundary
//!
//! Authentication and authorization live outside this crate. The core only
//! needs to know, per call, which tenant and actor it is working for; these
//! types mark that boundary.

use crate::config::TenantConfig;
use thiserror::Error;

/// Identity pre-condition failures
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    Unauthenticated,

    #[error("Not authorized for tenant {0}")]
    Unauthorized(String),
}

/// The tenant and actor a cache or queue operation runs under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantContext {
    /// Isolation boundary for snapshots and queue items
    pub tenant_id: String,
    /// Actor recorded on captures and enqueues
    pub actor_id: String,
}

impl TenantContext {
    pub fn new(tenant_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            actor_id: actor_id.into(),
        }
    }
}

/// Resolves the current tenant and actor
///
/// Implementations check whatever session mechanism the host application
/// uses; the core only calls `current` once per operation and treats a
/// failure as a hard error for the whole call.
pub trait Identity {
    fn current(&self) -> Result<TenantContext, AuthError>;
}

/// Config-backed identity for the command-line binary
pub struct StaticIdentity {
    context: TenantContext,
}

impl StaticIdentity {
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            context: TenantContext::new(&config.tenant_id, &config.actor_id),
        }
    }
}

impl Identity for StaticIdentity {
    fn current(&self) -> Result<TenantContext, AuthError> {
        Ok(self.context.clone())
    }
}
