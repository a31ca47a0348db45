//! Assetwatch Graph — Neo4j backend for the discovery store.
//!
//! This crate is the single translation point between Neo4j nodes and the
//! typed records of `assetwatch-core`. All graph reads and writes flow through
//! `GraphClient`, which also implements `DiscoveryStore`.

pub mod client;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
