//! # Geolife Ingest
//!
//! Loader and query tool for the Geolife GPS trajectory dataset.
//!
//! The crate ingests per-user trajectory files into a three-table SQLite
//! hierarchy (users → activities → trackpoints), matching each trajectory to
//! a human-entered transportation-mode label by exact start/end timestamp
//! equality, then answers analytical queries over the loaded data.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────────┐   ┌───────────┐
//! │ Dataset scan │──▶│   Pipeline     │──▶│  SQLite    │
//! │ users/*.plt  │   │ parse + match │   │ 3 tables  │
//! └──────────────┘   └───────────────┘   └─────┬─────┘
//!                                              │
//!                                        ┌─────┴─────┐
//!                                        │    CLI    │
//!                                        │ (geolife) │
//!                                        └───────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! geolife init                  # create database
//! geolife ingest dataset/Data   # load trajectories
//! geolife mark-labeled          # apply the labeled-ids manifest
//! geolife stats                 # what got loaded
//! geolife query top-users       # analytical reports
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`dataset`] | Dataset directory traversal |
//! | [`labels`] | Label file parsing and exact-span lookup |
//! | [`trajectory`] | `.plt` trajectory file parsing |
//! | [`matcher`] | Size cap and label matching |
//! | [`store`] | Persistence boundary (trait + SQLite) |
//! | [`ingest`] | Pipeline orchestration |
//! | [`report`] | Analytical queries |
//! | [`stats`] | Database overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod dataset;
pub mod db;
pub mod error;
pub mod ingest;
pub mod labels;
pub mod matcher;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod report;
pub mod stats;
pub mod store;
pub mod trajectory;
