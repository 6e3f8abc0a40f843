//! Shared service lifecycle calls

use crate::client::{Client, OpContext};
use crate::domain::ServiceAction;
use crate::error::Result;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// State string the appliance reports for a running service
pub const STATE_RUNNING: &str = "RUNNING";

/// Entry returned by `service.query`
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceEntry {
    pub service: String,
    pub state: String,
    #[serde(default)]
    pub enable: Option<bool>,
}

impl ServiceEntry {
    pub fn is_running(&self) -> bool {
        self.state == STATE_RUNNING
    }
}

/// Look up a service by name
pub async fn query_service(
    client: &Client,
    ctx: &OpContext,
    service: &str,
) -> Result<Option<ServiceEntry>> {
    let entries: Vec<ServiceEntry> = client
        .call(ctx, "service.query", vec![json!([["service", "=", service]])])
        .await?;
    Ok(entries.into_iter().find(|e| e.service == service))
}

/// Start, stop or restart a service, awaiting the job if one is returned
pub async fn run_service_action(
    client: &Client,
    ctx: &OpContext,
    service: &str,
    action: ServiceAction,
) -> Result<()> {
    info!("Running {} on service {}", action, service);
    client
        .call_and_wait(
            ctx,
            action.method(),
            vec![json!(service), json!({"silent": false})],
        )
        .await?;
    Ok(())
}
