//! Tether Cache - Dependent Object Cache Engine
//!
//! Holds a partially-resolved object until every object it depends on has
//! arrived, without blocking the rest of the ingest pipeline.
//!
//! An incoming object flows through the [`DependencyResolver`]: the
//! [`DependencyExtractor`] walks it against the type graph to find the
//! dependencies it carries, already-tracked dependencies are merged with
//! the shared records in the store, the host's [`TargetSystem`] prunes
//! references that already exist downstream, and whatever remains parks the
//! object as a cache entry with a reference count. Background housekeeping
//! ([`jobs`]) then requests outstanding dependencies, applies expiry
//! policies and flushes fully resolved entries back to normal processing.
//!
//! [`DependentObjectCache`] bundles the whole engine behind one handle with
//! an explicit start/teardown lifecycle.

pub mod capabilities;
pub mod extract;
pub mod jobs;
pub mod resolver;
pub mod service;

pub use capabilities::{ProcessingSink, RequestChannel, TargetSystem};
pub use extract::{DependencyExtractor, DependencyReference};
pub use jobs::{
    ExpiryJobMetrics, ExpiryJobSnapshot, FlushJobMetrics, FlushJobSnapshot, HousekeepingScheduler,
    JobHandle, RequestJobMetrics, RequestJobSnapshot,
};
pub use resolver::{DependencyResolver, ResolvedDependencies};
pub use service::DependentObjectCache;
