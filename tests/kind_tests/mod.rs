//! Integration tests for the eduk8s operator
//!
//! These tests require a Kubernetes cluster (kind) and tell the story of how
//! workshop administrators and learners interact with the training platform.
//!
//! # Test Organization
//!
//! - `crd_operations`: Stories about creating, reading, updating, and deleting
//!   training resources through the Kubernetes API
//!
//! - `portal_lifecycle`: Stories about the controllers provisioning a portal,
//!   filling session pools, allocating sessions and cascading deletion
//!
//! # Running These Tests
//!
//! ```bash
//! kind create cluster --name eduk8s-integration-test
//! cargo test --test kind -- --ignored
//! ```

mod crd_operations;
mod helpers;
mod portal_lifecycle;
