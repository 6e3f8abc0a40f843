//! Domain Ports - the reconcile contract
//!
//! The orchestration host drives each resource through these four
//! lifecycle operations. It supplies desired state and persists whatever
//! observed state comes back; reconcilers never persist anything.

use crate::client::OpContext;
use crate::error::Result;
use async_trait::async_trait;

// =============================================================================
// Read Outcome
// =============================================================================

/// Result of refreshing a resource
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome<M> {
    /// Resource exists; here is its observed state
    Present(M),
    /// Resource is gone; the host should drop it from state
    Absent,
}

impl<M> ReadOutcome<M> {
    pub fn is_absent(&self) -> bool {
        matches!(self, ReadOutcome::Absent)
    }

    pub fn into_present(self) -> Option<M> {
        match self {
            ReadOutcome::Present(m) => Some(m),
            ReadOutcome::Absent => None,
        }
    }
}

// =============================================================================
// Service Lifecycle
// =============================================================================

/// Lifecycle call derived from an enable toggle's transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn method(&self) -> &'static str {
        match self {
            ServiceAction::Start => "service.start",
            ServiceAction::Stop => "service.stop",
            ServiceAction::Restart => "service.restart",
        }
    }

    /// Decide the lifecycle call for an update.
    ///
    /// `config_changed` only matters when the service stays enabled.
    pub fn for_transition(was_enabled: bool, enabled: bool, config_changed: bool) -> Option<Self> {
        match (was_enabled, enabled) {
            (false, true) => Some(ServiceAction::Start),
            (true, false) => Some(ServiceAction::Stop),
            (true, true) if config_changed => Some(ServiceAction::Restart),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceAction::Start => write!(f, "start"),
            ServiceAction::Stop => write!(f, "stop"),
            ServiceAction::Restart => write!(f, "restart"),
        }
    }
}

// =============================================================================
// Reconciler Port
// =============================================================================

/// One resource type's Create/Read/Update/Delete over its declarative model.
///
/// Every mutating operation awaits any job it starts before returning. On
/// error the host keeps its previously declared state.
#[async_trait]
pub trait Reconciler: Send + Sync {
    type Model: Send + Sync;

    /// Type name as the host knows it, e.g. `trueform_service_nfs`
    fn type_name(&self) -> &'static str;

    /// Absent -> Present
    async fn create(&self, ctx: &OpContext, plan: Self::Model) -> Result<Self::Model>;

    /// Refresh observed state; may report the resource gone
    async fn read(&self, ctx: &OpContext, state: Self::Model) -> Result<ReadOutcome<Self::Model>>;

    /// Present -> Present
    async fn update(
        &self,
        ctx: &OpContext,
        prior: &Self::Model,
        plan: Self::Model,
    ) -> Result<Self::Model>;

    /// Present -> Absent
    async fn delete(&self, ctx: &OpContext, state: Self::Model) -> Result<()>;
}
