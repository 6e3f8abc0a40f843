//! Resource Reconcilers
//!
//! - NFS service: configuration plus start/stop/restart lifecycle
//! - Docker service: pool-owned singleton, job-backed updates
//!
//! [`ResourceSet`] dispatches a manifest entry to the matching reconciler.

pub mod docker;
pub mod nfs;
pub mod service;

pub use docker::*;
pub use nfs::*;

use crate::client::{Client, OpContext};
use crate::domain::{ReadOutcome, Reconciler};
use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

// =============================================================================
// Manifest
// =============================================================================

/// One declared resource, tagged by type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    ServiceNfs(NfsServiceModel),
    ServiceDocker(DockerServiceModel),
}

impl ResourceSpec {
    pub fn type_name(&self) -> &'static str {
        match self {
            ResourceSpec::ServiceNfs(_) => "trueform_service_nfs",
            ResourceSpec::ServiceDocker(_) => "trueform_service_docker",
        }
    }
}

/// Named resources, as declared by the user or observed after a reconcile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Manifest {
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceSpec>,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let manifest: Manifest = serde_yaml::from_str(&text)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Both service resources are singletons on the appliance
    pub fn validate(&self) -> Result<()> {
        let mut seen: BTreeMap<&'static str, &str> = BTreeMap::new();
        for (name, spec) in &self.resources {
            if let Some(other) = seen.insert(spec.type_name(), name) {
                return Err(Error::Configuration(format!(
                    "{} is a singleton but is declared twice ({} and {})",
                    spec.type_name(),
                    other,
                    name
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Resource Set
// =============================================================================

/// All reconcilers, sharing one client session
pub struct ResourceSet {
    nfs: NfsServiceReconciler,
    docker: DockerServiceReconciler,
}

impl ResourceSet {
    pub fn new(client: Arc<Client>) -> Self {
        Self {
            nfs: NfsServiceReconciler::new(client.clone()),
            docker: DockerServiceReconciler::new(client),
        }
    }

    /// Create when there is no prior state, otherwise update
    pub async fn apply(
        &self,
        ctx: &OpContext,
        prior: Option<&ResourceSpec>,
        plan: ResourceSpec,
    ) -> Result<ResourceSpec> {
        match (prior, plan) {
            (None, ResourceSpec::ServiceNfs(plan)) => {
                Ok(ResourceSpec::ServiceNfs(self.nfs.create(ctx, plan).await?))
            }
            (Some(ResourceSpec::ServiceNfs(prior)), ResourceSpec::ServiceNfs(plan)) => {
                Ok(ResourceSpec::ServiceNfs(self.nfs.update(ctx, prior, plan).await?))
            }
            (None, ResourceSpec::ServiceDocker(plan)) => {
                Ok(ResourceSpec::ServiceDocker(self.docker.create(ctx, plan).await?))
            }
            (Some(ResourceSpec::ServiceDocker(prior)), ResourceSpec::ServiceDocker(plan)) => {
                Ok(ResourceSpec::ServiceDocker(self.docker.update(ctx, prior, plan).await?))
            }
            (Some(prior), plan) => Err(Error::Configuration(format!(
                "cannot change resource type from {} to {}",
                prior.type_name(),
                plan.type_name()
            ))),
        }
    }

    pub async fn read(&self, ctx: &OpContext, state: ResourceSpec) -> Result<ReadOutcome<ResourceSpec>> {
        Ok(match state {
            ResourceSpec::ServiceNfs(state) => match self.nfs.read(ctx, state).await? {
                ReadOutcome::Present(m) => ReadOutcome::Present(ResourceSpec::ServiceNfs(m)),
                ReadOutcome::Absent => ReadOutcome::Absent,
            },
            ResourceSpec::ServiceDocker(state) => match self.docker.read(ctx, state).await? {
                ReadOutcome::Present(m) => ReadOutcome::Present(ResourceSpec::ServiceDocker(m)),
                ReadOutcome::Absent => ReadOutcome::Absent,
            },
        })
    }

    /// Refresh every resource in `prior`.
    ///
    /// Absent resources are dropped. A resource whose read fails keeps its
    /// prior entry and is reported alongside the error.
    pub async fn refresh(&self, ctx: &OpContext, prior: Manifest) -> (Manifest, Vec<(String, Error)>) {
        let mut observed = Manifest::default();
        let mut failures = Vec::new();

        for (name, spec) in prior.resources {
            match self.read(ctx, spec.clone()).await {
                Ok(ReadOutcome::Present(spec)) => {
                    observed.resources.insert(name, spec);
                }
                Ok(ReadOutcome::Absent) => warn!("{} no longer exists, dropping it", name),
                Err(e) => {
                    observed.resources.insert(name.clone(), spec);
                    failures.push((name, e));
                }
            }
        }

        (observed, failures)
    }

    pub async fn delete(&self, ctx: &OpContext, state: ResourceSpec) -> Result<()> {
        match state {
            ResourceSpec::ServiceNfs(state) => self.nfs.delete(ctx, state).await,
            ResourceSpec::ServiceDocker(state) => self.docker.delete(ctx, state).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::mock::MockTransport;
    use crate::domain::Field;
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MANIFEST: &str = r#"
resources:
  nfs:
    type: service_nfs
    enabled: true
    servers: 8
    bindip: []
  apps:
    type: service_docker
    pool: tank
"#;

    #[test]
    fn test_load_manifest() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();

        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.resources.len(), 2);
        assert_matches!(
            &manifest.resources["nfs"],
            ResourceSpec::ServiceNfs(m) if m.servers == Field::Value(8) && m.v4.is_unknown()
        );
        assert_matches!(
            &manifest.resources["apps"],
            ResourceSpec::ServiceDocker(m) if m.pool == Field::Value("tank".to_string())
        );
    }

    #[test]
    fn test_singletons_enforced() {
        let text = "resources:\n  a:\n    type: service_nfs\n  b:\n    type: service_nfs\n";
        let manifest: Manifest = serde_yaml::from_str(text).unwrap();
        assert_matches!(manifest.validate(), Err(Error::Configuration(msg)) if msg.contains("singleton"));
    }

    #[tokio::test]
    async fn test_apply_rejects_type_change() {
        let set = ResourceSet::new(Arc::new(Client::new(Arc::new(MockTransport::new()))));
        let prior = ResourceSpec::ServiceNfs(NfsServiceModel::default());
        let plan = ResourceSpec::ServiceDocker(DockerServiceModel::default());

        let err = set
            .apply(&OpContext::default(), Some(&prior), plan)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Configuration(_));
    }

    #[tokio::test]
    async fn test_refresh_keeps_prior_on_read_failure() {
        let mock = Arc::new(MockTransport::new());
        mock.fail("docker.config", -32603, "middleware busy")
            .reply("nfs.config", json!({"servers": 16, "v4": true}))
            .reply(
                "service.query",
                json!([{"service": "nfs", "state": "RUNNING", "enable": true}]),
            );
        let set = ResourceSet::new(Arc::new(Client::new(mock)));

        let docker = ResourceSpec::ServiceDocker(DockerServiceModel {
            pool: Field::Value("tank".into()),
            ..Default::default()
        });
        let mut prior = Manifest::default();
        prior.resources.insert("apps".into(), docker.clone());
        prior
            .resources
            .insert("nfs".into(), ResourceSpec::ServiceNfs(NfsServiceModel::default()));

        let (observed, failures) = set.refresh(&OpContext::default(), prior).await;

        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].0, "apps");
        assert_eq!(observed.resources["apps"], docker);
        assert_matches!(
            &observed.resources["nfs"],
            ResourceSpec::ServiceNfs(m) if m.servers == Field::Value(16) && m.enabled.is_true()
        );
    }

    #[tokio::test]
    async fn test_read_dispatches_absent() {
        let mock = Arc::new(MockTransport::new());
        mock.reply("docker.config", json!({"pool": ""}))
            .reply("docker.status", json!({"status": "UNCONFIGURED"}));
        let set = ResourceSet::new(Arc::new(Client::new(mock)));

        let outcome = set
            .read(
                &OpContext::default(),
                ResourceSpec::ServiceDocker(DockerServiceModel::default()),
            )
            .await
            .unwrap();
        assert!(outcome.is_absent());
    }
}
