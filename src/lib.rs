//! Trueform - declarative reconcile core for TrueNAS appliances
//!
//! Maps declarative resource definitions onto the appliance's JSON-RPC
//! management API. An orchestration host supplies desired state and
//! persists whatever observed state comes back.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      Orchestration Host / CLI                         │
//! └───────────────────────────────┬──────────────────────────────────────┘
//!                                 │ Create / Read / Update / Delete
//! ┌───────────────────────────────┴──────────────────────────────────────┐
//! │                       Resource Reconcilers                            │
//! │   ┌──────────────────────┐          ┌──────────────────────────┐      │
//! │   │     NFS service      │          │     Docker service       │      │
//! │   └──────────┬───────────┘          └────────────┬─────────────┘      │
//! ├──────────────┴───────────────────────────────────┴───────────────────┤
//! │                            Client                                     │
//! │   ┌──────────────┐   ┌────────────────┐   ┌──────────────────────┐    │
//! │   │ RPC Transport│──▶│ Error Classifier│   │ Job Waiter (Poller) │    │
//! │   └──────┬───────┘   └────────────────┘   └──────────────────────┘    │
//! └──────────┼───────────────────────────────────────────────────────────┘
//!            │ JSON-RPC 2.0
//!     ┌──────┴───────┐
//!     │   TrueNAS    │
//!     └──────────────┘
//! ```
//!
//! # Modules
//!
//! - [`client`]: transport, error classification, job waiting
//! - [`domain`]: reconcile contract and presence-tracking fields
//! - [`resources`]: NFS and Docker service reconcilers
//! - [`config`]: provider connection settings
//! - [`metrics`]: per-client Prometheus metrics
//! - [`error`]: Error types and handling

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod resources;

// Re-export commonly used types
pub use client::{
    is_auth_error, is_not_found_error, is_validation_error, ApiError, Client, ConnectionError,
    ErrorKind, HttpTransport, Job, JobState, OpContext, PollStep, Poller, Transport,
};

pub use config::ProviderConfig;

pub use domain::{Field, Patch, ReadOutcome, Reconciler, ServiceAction};

pub use error::{Error, Result};

pub use resources::{
    DockerServiceModel, DockerServiceReconciler, Manifest, NfsServiceModel,
    NfsServiceReconciler, ResourceSet, ResourceSpec,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
