//! NFS Service Resource
//!
//! Singleton resource: configures the appliance's NFS server and keeps the
//! service running (or stopped) to match `enabled`. Deleting it stops the
//! service; the configuration itself is left in place.

use crate::client::{Client, OpContext};
use crate::domain::{Field, Patch, ReadOutcome, Reconciler, ServiceAction};
use crate::error::Result;
use crate::resources::service::{query_service, run_service_action};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const NFS_SERVICE: &str = "nfs";
const RESOURCE: &str = "NFS service";

// =============================================================================
// Model
// =============================================================================

/// Declarative NFS service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct NfsServiceModel {
    /// Always `nfs`
    pub id: Field<String>,
    /// Service running
    pub enabled: Field<bool>,
    /// Number of server instances
    pub servers: Field<i64>,
    /// UDP transport (NFSv3 only)
    pub udp_enabled: Field<bool>,
    pub v4: Field<bool>,
    /// NFSv3 ownership model for NFSv4
    pub v4_v3owner: Field<bool>,
    pub v4_krb: Field<bool>,
    /// Addresses to bind; empty means all interfaces
    pub bindip: Field<Vec<String>>,
    /// 0 for a random port
    pub mountd_port: Field<i64>,
    /// 0 for a random port
    pub rpcstatd_port: Field<i64>,
    pub allow_nonroot: Field<bool>,
    pub managed_nfsv4_acl: Field<bool>,
}

impl NfsServiceModel {
    /// `nfs.update` payload with only the configured fields
    pub fn to_patch(&self) -> Patch {
        let mut patch = Patch::new();
        patch
            .set("servers", &self.servers)
            .set("udp", &self.udp_enabled)
            .set("v4", &self.v4)
            .set("v4_v3owner", &self.v4_v3owner)
            .set("v4_krb", &self.v4_krb)
            .set("bindip", &self.bindip)
            .set("mountd_port", &self.mountd_port)
            .set("rpcstatd_port", &self.rpcstatd_port)
            .set("allow_nonroot", &self.allow_nonroot)
            .set("managed_nfsv4_acl", &self.managed_nfsv4_acl);
        patch
    }

    fn apply_config(&mut self, config: NfsConfig) {
        fn merge<T>(field: &mut Field<T>, remote: Option<T>) {
            if let Some(value) = remote {
                *field = Field::Value(value);
            }
        }

        merge(&mut self.servers, config.servers);
        merge(&mut self.udp_enabled, config.udp);
        merge(&mut self.v4, config.v4);
        merge(&mut self.v4_v3owner, config.v4_v3owner);
        merge(&mut self.v4_krb, config.v4_krb);
        merge(&mut self.bindip, config.bindip);
        merge(&mut self.mountd_port, config.mountd_port);
        merge(&mut self.rpcstatd_port, config.rpcstatd_port);
        merge(&mut self.allow_nonroot, config.allow_nonroot);
        merge(&mut self.managed_nfsv4_acl, config.managed_nfsv4_acl);
    }
}

/// Result of `nfs.config`; keys missing or null remotely leave the model as is
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NfsConfig {
    servers: Option<i64>,
    udp: Option<bool>,
    v4: Option<bool>,
    v4_v3owner: Option<bool>,
    v4_krb: Option<bool>,
    bindip: Option<Vec<String>>,
    mountd_port: Option<i64>,
    rpcstatd_port: Option<i64>,
    allow_nonroot: Option<bool>,
    managed_nfsv4_acl: Option<bool>,
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct NfsServiceReconciler {
    client: Arc<Client>,
}

impl NfsServiceReconciler {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn configure(&self, ctx: &OpContext, plan: &NfsServiceModel) -> Result<()> {
        let patch = plan.to_patch();
        debug!("nfs.update payload: {:?}", patch);
        self.client
            .call_and_wait(ctx, "nfs.update", vec![patch.into_value()])
            .await?;
        Ok(())
    }

    async fn lifecycle(&self, ctx: &OpContext, action: ServiceAction) -> Result<()> {
        run_service_action(&self.client, ctx, NFS_SERVICE, action)
            .await
            .map_err(|e| e.context(RESOURCE, action.to_string()))
    }

    /// Overlay remote config and service state onto `model`
    async fn refresh(&self, ctx: &OpContext, model: &mut NfsServiceModel) -> Result<()> {
        let config: NfsConfig = self.client.call(ctx, "nfs.config", vec![]).await?;

        if let Some(entry) = query_service(&self.client, ctx, NFS_SERVICE).await? {
            model.enabled = Field::Value(entry.is_running());
        }
        model.apply_config(config);
        model.id = Field::Value(NFS_SERVICE.to_string());
        Ok(())
    }
}

#[async_trait]
impl Reconciler for NfsServiceReconciler {
    type Model = NfsServiceModel;

    fn type_name(&self) -> &'static str {
        "trueform_service_nfs"
    }

    async fn create(&self, ctx: &OpContext, mut plan: NfsServiceModel) -> Result<NfsServiceModel> {
        info!("Configuring NFS service");

        self.configure(ctx, &plan)
            .await
            .map_err(|e| e.context(RESOURCE, "configure"))?;

        if plan.enabled.is_true() {
            self.lifecycle(ctx, ServiceAction::Start).await?;
        }

        self.refresh(ctx, &mut plan)
            .await
            .map_err(|e| e.context(RESOURCE, "read back"))?;
        Ok(plan)
    }

    async fn read(
        &self,
        ctx: &OpContext,
        mut state: NfsServiceModel,
    ) -> Result<ReadOutcome<NfsServiceModel>> {
        match self.refresh(ctx, &mut state).await {
            Ok(()) => Ok(ReadOutcome::Present(state)),
            Err(e) if e.is_not_found() => {
                info!("NFS service not found, dropping from state");
                Ok(ReadOutcome::Absent)
            }
            Err(e) => Err(e.context(RESOURCE, "read")),
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &NfsServiceModel,
        mut plan: NfsServiceModel,
    ) -> Result<NfsServiceModel> {
        info!("Updating NFS service configuration");

        self.configure(ctx, &plan)
            .await
            .map_err(|e| e.context(RESOURCE, "update"))?;

        let was_enabled = prior.enabled.is_true();
        // Unknown toggle keeps the service where it is
        let enabled = plan.enabled.value().copied().unwrap_or(was_enabled);
        let changed = plan.to_patch().differs_from(&prior.to_patch());

        match ServiceAction::for_transition(was_enabled, enabled, changed) {
            Some(action) => self.lifecycle(ctx, action).await?,
            None => debug!("NFS service lifecycle unchanged"),
        }

        self.refresh(ctx, &mut plan)
            .await
            .map_err(|e| e.context(RESOURCE, "read back"))?;
        Ok(plan)
    }

    async fn delete(&self, ctx: &OpContext, _state: NfsServiceModel) -> Result<()> {
        info!("Disabling NFS service");
        self.lifecycle(ctx, ServiceAction::Stop).await
    }
}
