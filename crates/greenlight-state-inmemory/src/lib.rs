//! In-memory state store implementation for the Greenlight platform
//!
//! This crate provides in-memory implementations of the repository
//! interfaces defined in the greenlight-core crate, with optimistic
//! version stamps on flow instances. It is primarily useful for
//! development, testing, and single-process deployments where durable
//! persistence is not required.

pub mod provider;
pub mod publishers;
pub mod repositories;

pub use provider::StaticApproverProvider;
pub use publishers::{FailingEventPublisher, RecordingEventPublisher, TracingEventPublisher};
pub use repositories::{InMemoryFlowDefinitionRepository, InMemoryFlowInstanceRepository};
