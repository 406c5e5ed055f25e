//! Offline-first outbox sync for quiz attempts and assignment submissions.
//!
//! User actions land in local SQLite outbox tables as `pending` rows
//! ([`handlers`]). The [`engine`] uploads pending rows in per-table batches
//! when the [`connectivity`] monitor reports the network reachable, and flips
//! them to `synced` once the [`remote`] service accepts the batch. The
//! [`status`] projections expose the live pending count and engine state.

pub mod auto_sync;
pub mod config;
pub mod connectivity;
pub mod db;
pub mod engine;
pub mod handlers;
pub mod model;
pub mod remote;
pub mod status;
