//! eduk8s - Kubernetes operator for multi-tenant training portals
//!
//! A TrainingPortal offers a catalog of Workshops. For each workshop the
//! operator provisions a WorkshopEnvironment, keeps a pool of pre-created
//! WorkshopSessions ready for learners, and hands them out on request.
//!
//! # Architecture
//!
//! Everything the operator creates is owned by the object that caused it,
//! so deleting a portal removes its environments, their namespaces and every
//! session through Kubernetes garbage collection. Handlers are idempotent
//! and the only cross-request coordination is the resource version on each
//! session.
//!
//! # Modules
//!
//! - [`crd`] - Custom Resource Definitions (TrainingPortal, Workshop, etc.)
//! - [`controller`] - Reconcile functions for each kind
//! - [`dispatcher`] - Controller wiring, error classification and backoff
//! - [`pool`] - Reserved-session pool and allocation
//! - [`allocation`] - HTTP API handing sessions to learners
//! - [`templates`] - Object templates for portals, environments and sessions
//! - [`owner`] - Owner references and cascade rules
//! - [`gateway`] - Cluster API abstraction
//! - [`credentials`] - Generated passwords and names
//! - [`config`] - Process configuration
//! - [`retry`] - Retry with backoff for startup operations
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod allocation;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod crd;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod owner;
pub mod pool;
pub mod retry;
pub mod templates;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;
