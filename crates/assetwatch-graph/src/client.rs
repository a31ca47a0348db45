//! Neo4j connection management and shared graph client.

use assetwatch_core::StoreError;
use neo4rs::{query, ConfigBuilder, Graph, Query};
use serde::Deserialize;

/// Errors from graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("Neo4j connection error: {0}")]
    Connection(String),

    #[error("Neo4j query error: {0}")]
    Query(#[from] neo4rs::Error),

    #[error("Node not found: {label} with id {id}")]
    NotFound { label: String, id: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<GraphError> for StoreError {
    fn from(e: GraphError) -> Self {
        match e {
            GraphError::Connection(msg) => StoreError::Unavailable(msg),
            GraphError::Query(err) => StoreError::Unavailable(err.to_string()),
            GraphError::NotFound { label, id } => StoreError::NotFound {
                kind: node_kind(&label),
                id,
            },
            GraphError::Serialization(msg) => StoreError::Malformed(msg),
        }
    }
}

fn node_kind(label: &str) -> &'static str {
    match label {
        "DiscoveredAddress" => "discovered address",
        "Alert" => "alert",
        "AlertType" => "alert type",
        _ => "node",
    }
}

/// Configuration for connecting to Neo4j.
///
/// Loaded from the `[neo4j]` section of the config file or
/// `ASSETWATCH__NEO4J__*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    pub max_connections: u32,
    pub fetch_size: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".to_string(),
            user: "neo4j".to_string(),
            password: "assetwatch-dev".to_string(),
            max_connections: 16,
            fetch_size: 256,
        }
    }
}

/// Thread-safe Neo4j graph client with connection pooling.
///
/// Clone is cheap (inner Arc); every scan worker holds its own clone and
/// draws connections from the shared pool.
#[derive(Clone)]
pub struct GraphClient {
    graph: Graph,
}

impl GraphClient {
    /// Connect to Neo4j with the given configuration.
    pub async fn connect(config: &GraphConfig) -> Result<Self, GraphError> {
        let neo_config = ConfigBuilder::default()
            .uri(&config.uri)
            .user(&config.user)
            .password(&config.password)
            .max_connections(config.max_connections as usize)
            .fetch_size(config.fetch_size)
            .build()
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        let graph = Graph::connect(neo_config)
            .await
            .map_err(|e| GraphError::Connection(e.to_string()))?;

        tracing::info!(uri = %config.uri, "Connected to Neo4j");
        Ok(Self { graph })
    }

    /// Create the uniqueness constraints the store relies on.
    pub async fn ensure_schema(&self) -> Result<(), GraphError> {
        for cypher in [
            "CREATE CONSTRAINT discovered_address_key IF NOT EXISTS
             FOR (n:DiscoveredAddress) REQUIRE n.address IS UNIQUE",
            "CREATE CONSTRAINT discovered_address_id IF NOT EXISTS
             FOR (n:DiscoveredAddress) REQUIRE n.id IS UNIQUE",
            "CREATE CONSTRAINT alert_type_name IF NOT EXISTS
             FOR (n:AlertType) REQUIRE n.name IS UNIQUE",
            "CREATE CONSTRAINT alert_id IF NOT EXISTS
             FOR (n:Alert) REQUIRE n.id IS UNIQUE",
        ] {
            self.run(query(cypher)).await?;
        }
        tracing::debug!("Graph schema constraints ensured");
        Ok(())
    }

    /// Execute a write-only query (CREATE, MERGE, DELETE, SET).
    pub async fn run(&self, query: Query) -> Result<(), GraphError> {
        self.graph.run(query).await?;
        Ok(())
    }

    /// Execute a read query and collect all rows.
    pub async fn query_rows(&self, query: Query) -> Result<Vec<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await? {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Execute a read query and return the first row, if any.
    pub async fn query_one(&self, query: Query) -> Result<Option<neo4rs::Row>, GraphError> {
        let mut stream = self.graph.execute(query).await?;
        Ok(stream.next().await?)
    }

    /// Begin a transaction.
    pub async fn start_txn(&self) -> Result<neo4rs::Txn, GraphError> {
        Ok(self.graph.start_txn().await?)
    }
}
