//! Docker (Apps) Service Resource
//!
//! Singleton resource whose defining attribute is the storage pool. There
//! is no remote delete verb: clearing the pool unconfigures the service.
//! Every `docker.update` runs as a job, and after configuring we wait for
//! the service to report RUNNING.

use crate::client::{Client, OpContext, PollStep};
use crate::domain::{Field, Patch, ReadOutcome, Reconciler};
use crate::error::{Error, Result};
use crate::resources::service::STATE_RUNNING;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const DOCKER_SERVICE: &str = "docker";
const RESOURCE: &str = "Docker service";

// =============================================================================
// Model
// =============================================================================

/// Declarative Docker/Apps service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct DockerServiceModel {
    /// Always `docker`
    pub id: Field<String>,
    /// Pool holding Docker/Apps data (required)
    pub pool: Field<String>,
    /// NVIDIA GPU support for containers
    pub nvidia: Field<bool>,
    pub enable_image_updates: Field<bool>,
    /// Computed: RUNNING, INITIALIZING, STOPPED, ...
    pub status: Field<String>,
}

impl DockerServiceModel {
    /// `docker.update` payload; the pool is always sent
    pub fn to_patch(&self) -> Result<Patch> {
        if !self.pool.is_present() {
            return Err(Error::Configuration(
                "pool is required for the Docker service".into(),
            ));
        }

        let mut patch = Patch::new();
        patch
            .set("pool", &self.pool)
            .set("nvidia", &self.nvidia)
            .set("enable_image_updates", &self.enable_image_updates);
        Ok(patch)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DockerConfig {
    pool: Option<String>,
    nvidia: Option<bool>,
    enable_image_updates: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DockerStatus {
    status: Option<String>,
    description: Option<String>,
}

// =============================================================================
// Reconciler
// =============================================================================

pub struct DockerServiceReconciler {
    client: Arc<Client>,
}

impl DockerServiceReconciler {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    async fn configure(&self, ctx: &OpContext, plan: &DockerServiceModel) -> Result<()> {
        let patch = plan.to_patch()?;
        self.client
            .call_and_wait(ctx, "docker.update", vec![patch.into_value()])
            .await?;
        Ok(())
    }

    /// Poll `docker.status` until RUNNING; query errors are retried
    async fn wait_for_running(&self, ctx: &OpContext) -> Result<()> {
        ctx.poller()
            .run(
                &ctx.cancel,
                "Docker service to become RUNNING",
                move || async move {
                    let status: DockerStatus =
                        self.client.call(ctx, "docker.status", vec![]).await?;
                    let state = status.status.unwrap_or_default();
                    debug!(
                        "Docker service status: {} {}",
                        state,
                        status.description.unwrap_or_default()
                    );
                    Ok(if state == STATE_RUNNING {
                        PollStep::Ready(())
                    } else {
                        PollStep::Pending
                    })
                },
            )
            .await
    }

    async fn refresh(&self, ctx: &OpContext, model: &mut DockerServiceModel) -> Result<()> {
        let config: DockerConfig = self.client.call(ctx, "docker.config", vec![]).await?;

        model.pool = Field::Value(config.pool.unwrap_or_default());
        if let Some(nvidia) = config.nvidia {
            model.nvidia = Field::Value(nvidia);
        }
        if let Some(updates) = config.enable_image_updates {
            model.enable_image_updates = Field::Value(updates);
        }

        let status: DockerStatus = self.client.call(ctx, "docker.status", vec![]).await?;
        if let Some(state) = status.status {
            model.status = Field::Value(state);
        }
        model.id = Field::Value(DOCKER_SERVICE.to_string());
        Ok(())
    }

    async fn apply(
        &self,
        ctx: &OpContext,
        mut plan: DockerServiceModel,
        action: &str,
    ) -> Result<DockerServiceModel> {
        info!(
            "Applying Docker service configuration (pool {})",
            plan.pool.value().map(String::as_str).unwrap_or("")
        );

        self.configure(ctx, &plan)
            .await
            .map_err(|e| e.context(RESOURCE, action))?;
        self.wait_for_running(ctx)
            .await
            .map_err(|e| e.context(RESOURCE, "wait for"))?;
        self.refresh(ctx, &mut plan)
            .await
            .map_err(|e| e.context(RESOURCE, "read back"))?;
        Ok(plan)
    }
}

#[async_trait]
impl Reconciler for DockerServiceReconciler {
    type Model = DockerServiceModel;

    fn type_name(&self) -> &'static str {
        "trueform_service_docker"
    }

    async fn create(&self, ctx: &OpContext, plan: DockerServiceModel) -> Result<DockerServiceModel> {
        self.apply(ctx, plan, "configure").await
    }

    async fn read(
        &self,
        ctx: &OpContext,
        mut state: DockerServiceModel,
    ) -> Result<ReadOutcome<DockerServiceModel>> {
        match self.refresh(ctx, &mut state).await {
            Ok(()) if !state.pool.is_present() => {
                info!("Docker service has no pool configured, dropping from state");
                Ok(ReadOutcome::Absent)
            }
            Ok(()) => Ok(ReadOutcome::Present(state)),
            Err(e) if e.is_not_found() => Ok(ReadOutcome::Absent),
            Err(e) => Err(e.context(RESOURCE, "read")),
        }
    }

    async fn update(
        &self,
        ctx: &OpContext,
        _prior: &DockerServiceModel,
        plan: DockerServiceModel,
    ) -> Result<DockerServiceModel> {
        self.apply(ctx, plan, "update").await
    }

    async fn delete(&self, ctx: &OpContext, _state: DockerServiceModel) -> Result<()> {
        info!("Unconfiguring Docker service");

        let mut patch = Patch::new();
        patch.clear("pool");
        self.client
            .call_and_wait(ctx, "docker.update", vec![patch.into_value()])
            .await
            .map_err(|e| e.context(RESOURCE, "unconfigure"))?;
        Ok(())
    }
}
