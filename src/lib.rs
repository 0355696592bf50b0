//! alb-ingress-sync keeps a fleet of load balancers in line with the Ingress objects of a cluster.
//!
//! The core is the sync loop of [`Controller`]: on every trigger it builds the full set of
//! load balancers that should exist from the current ingresses, deletes those that disappeared
//! since the previous pass and creates or updates the rest.
//! Passes are rate limited, never overlap and are not started once shutdown begins.
//!
//! Ingresses are read through an [`IngressStore`](subscriber::IngressStore),
//! typically a reflector fed by [`subscriber::ingresses`].
//! Load balancers are provisioned through a [`Backend`].

pub mod backend;
pub use backend::Backend;
pub mod config;
pub use config::Configuration;
mod controller;
pub use controller::{Controller, PassOutcome, PassSummary, SyncError};
pub mod desired;
pub mod limiter;
pub mod metrics;
pub mod reconcile;
pub mod resource;
mod runner;
pub use runner::{run, RunError};
pub mod shutdown;
pub mod subscriber;
