//! Domain layer - reconcile contract and declarative model building blocks
//!
//! Resource reconcilers implement [`ports::Reconciler`]; their models are
//! built from [`field::Field`]s so partial updates only touch what the
//! caller configured.

pub mod field;
pub mod ports;

pub use field::*;
pub use ports::*;
