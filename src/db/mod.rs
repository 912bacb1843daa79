//! Database module for SQLite operations.
//!
//! This module provides:
//! - Database initialization and migrations
//! - SQLite pragma configuration
//! - Repository layer: pooled reads plus per-entity transactional writes

pub mod migrations;
pub mod repo;

pub use migrations::{init_db, init_db_with_config};
pub use repo::{balances, history, markets, shares, transactions, Repository};
