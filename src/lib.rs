//! Gallery Downloader Core Library
//!
//! Resumable bulk download of a remote folder/gallery hierarchy into local
//! storage: enumerate (or reuse a cached snapshot of) the tree, plan one
//! transfer per item, run the transfers under bounded concurrency with retry
//! and integrity checks, and checkpoint every outcome so an interrupted run
//! picks up where it stopped.
//!
//! # Architecture
//!
//! - [`hierarchy`] - Remote data model, the [`RemoteSource`] seam and filters
//! - [`cache`] - Hierarchy snapshot cache with TTL
//! - [`db`] - SQLite connection and migrations
//! - [`checkpoint`] - Per-item outcome persistence
//! - [`download`] - Retry policy, transfer primitive, integrity, statistics, worker pool
//! - [`filesystem`] - Destination paths and file timestamps
//! - [`orchestrator`] - Run coordination and the outward operations

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod checkpoint;
pub mod clock;
pub mod db;
pub mod download;
pub mod failure;
pub mod filesystem;
pub mod hierarchy;
pub mod orchestrator;

// Re-export commonly used types
pub use cache::{CacheEntry, CacheError, CacheInfo, CacheStore};
pub use checkpoint::{CheckpointError, CheckpointRecord, CheckpointStore};
pub use db::{Database, DbError};
pub use download::{
    DEFAULT_CONCURRENCY, DEFAULT_MAX_RETRIES, DownloadError, DownloadTask, HttpTransfer,
    IntegrityVerifier, RetryDecision, RetryPolicy, Statistics, TaskOutcome, Transfer, WorkerPool,
};
pub use failure::{ErrorKind, ErrorScope};
pub use hierarchy::{
    GalleryFilter, ManifestLocation, ManifestSource, RemoteItem, RemoteNode, RemoteSource,
    SourceError,
};
pub use orchestrator::{
    Orchestrator, OrchestratorError, RunConfig, RunReport, RunState, RunStatus,
};
