//! People Entity Resolution & Merge API Library
//!
//! Detects duplicate person records inside one project and merges them into a
//! surviving primary while keeping every relationship row unique.
//!
//! # Modules
//!
//! - `api`: API definitions.
//! - `core`: Detection and merge logic.
//! - `data`: Data access layer.
//! - `config`: Configuration management.
//! - `db`: Database connection and pool management.
//! - `errors`: Error handling types.
//! - `field_merge`: Back-fill of missing fields on the primary.
//! - `grouping`: Ordered matching passes producing duplicate groups.
//! - `handlers`: HTTP request handlers.
//! - `merge`: Merge orchestration for one primary and its duplicates.
//! - `models`: Core data models.
//! - `normalize`: Comparable keys for names, emails and profile URLs.
//! - `relationships`: Relationship-table transfer and reconciliation.
//! - `scoring`: Completeness scoring for primary selection.
//! - `services`: Detection, merge and auto-merge operations.
//! - `store`: Storage contract with Postgres and in-memory implementations.

pub mod api;
pub mod core;
pub mod data;

pub mod config;
pub mod db;
pub mod errors;
pub mod field_merge;
pub mod grouping;
pub mod handlers;
pub mod merge;
pub mod models;
pub mod normalize;
pub mod relationships;
pub mod scoring;
pub mod services;
pub mod store;
