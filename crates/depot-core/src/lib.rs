//! Regeneration pipeline for the depot distribution service.
//!
//! This crate provides the building blocks required to pull state from
//! upstream source repositories and release APIs, content-hash release
//! artifacts into an on-disk cache, publish normalized manifests into a
//! shared key-value registry, and invalidate dependent CDN caches.

pub mod cache;
pub mod cdn;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod source;
pub mod targets;

pub use cache::{ArtifactCache, ArtifactRecord};
pub use cdn::{CdnBackend, CdnKind};
pub use config::{RemoteRepo, Settings};
pub use error::{Error, Result};
pub use orchestrator::{CycleReport, JobOutcome, JobRunner, Orchestrator, PurgeOutcome};
pub use registry::{MemoryRegistry, RedisRegistry, Registry};
pub use source::{Release, ReleaseAsset, SourceFetcher};
pub use targets::{JobContext, Target};
