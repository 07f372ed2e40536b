//! # push-relay
//!
//! Bridges Web Push deliveries from Mastodon-compatible instances to FCM.
//!
//! ## Architecture
//!
//! ```text
//! App ── POST /subscriptions ──►┌──────────────────────────┐── POST /api/v1/push/subscription ──► Instance
//!                               │       push-relay         │
//! Instance ── POST /subscriptions/{id} (aesgcm) ──►        │
//!                               │  decrypt ─► enrich ─► send ──► FCM ──► Device
//!                               │  ┌────────────────────┐  │
//!                               │  │ SQLite KV (subs)   │  │
//!                               │  └────────────────────┘  │
//!                               └──────────────────────────┘
//! ```
//!
//! ## Flow
//!
//! - [`lifecycle`]: subscribe (find-or-reuse, register with instance) and unsubscribe
//! - [`pipeline`]: look up the subscription and decrypt the `aesgcm` body
//! - [`notify`]: fetch notification detail, build the push, handle revoked tokens
//! - [`server::PushBridge`] ties them together with rate limits and metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod instance;
pub mod lifecycle;
pub mod limits;
pub mod notify;
pub mod pipeline;
pub mod provider;
pub mod server;
pub mod storage;
