//! # intent-sync
//!
//! Keeps a hosted natural-language-understanding model in sync with a local
//! intent corpus.
//!
//! A sync pass hashes the corpus, compares it (and the remote version's
//! last-modified marker) against the fingerprint recorded by the previous
//! successful pass, and only when something drifted rebuilds the provider
//! model, imports it, trains it, publishes it and records a new fingerprint.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Corpus    │──▶│  SyncEngine  │──▶│ LUIS-style   │
//! │ JSON files  │   │ check/build/ │   │ authoring API│
//! └─────────────┘   │ import/train │   └──────────────┘
//!                   └──────┬───────┘
//!                          ▼
//!                   ┌──────────────┐
//!                   │   SQLite     │
//!                   │ fingerprints │
//!                   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! isync init                 # create database
//! isync status               # show whether a sync is needed
//! isync build                # print the model payload
//! isync sync                 # import, train and publish to staging
//! isync sync --production    # publish to the production slot
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`traits`] | Collaborator traits consumed by the engine |
//! | [`sync`] | Sync orchestration state machine |
//! | [`fingerprint`] | Content hashing and change detection |
//! | [`payload`] | Provider payload construction |
//! | [`lifecycle`] | Remote version lookup/delete and app metadata |
//! | [`training`] | Training poll loop |
//! | [`gateway`] | HTTP gateway to the provider |
//! | [`labels`] | Canonical label extraction |
//! | [`entities`] | Entity type registry |
//! | [`corpus_fs`] | Filesystem corpus source |
//! | [`store`] | Fingerprint stores |
//! | [`progress`] | Training progress reporting |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod corpus_fs;
pub mod db;
pub mod entities;
pub mod fingerprint;
pub mod gateway;
pub mod labels;
pub mod lifecycle;
pub mod migrate;
pub mod models;
pub mod payload;
pub mod progress;
pub mod status;
pub mod store;
pub mod sync;
pub mod training;
pub mod traits;
