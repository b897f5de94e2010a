//! Vitrine document store layer
//!
//! Collection-oriented JSON document storage with transactions, backed by memory or
//! PostgreSQL, and the repository used by the ingestion pipelines.

pub mod db;

pub use db::*;
