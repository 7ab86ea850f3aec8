//! Merged tool catalog
//!
//! Flattens per-provider snapshots into one name-indexed catalog for a turn.

use std::collections::HashMap;
use std::sync::Arc;

use crate::cache::CatalogSnapshot;
use crate::domain::ToolDescriptor;
use crate::error::{GatewayError, Result};

/// All tools visible to one turn, keyed by name
#[derive(Debug, Clone, Default)]
pub struct MergedCatalog {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl MergedCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge snapshots in the given order.
    ///
    /// A tool name claimed twice is a deployment defect and fails the merge.
    pub fn merge(snapshots: &[Arc<CatalogSnapshot>]) -> Result<Self> {
        let mut catalog = Self::new();
        for snapshot in snapshots {
            for tool in &snapshot.tools {
                catalog.add(tool.clone())?;
            }
        }
        Ok(catalog)
    }

    /// Add a tool, rejecting a name that is already present
    pub fn add(&mut self, tool: ToolDescriptor) -> Result<()> {
        if let Some(&existing) = self.index.get(&tool.name) {
            let owner = &self.tools[existing].provider_id;
            return Err(GatewayError::Configuration(format!(
                "Tool '{}' is offered by both '{}' and '{}'",
                tool.name, owner, tool.provider_id
            )));
        }
        self.index.insert(tool.name.clone(), self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|&i| &self.tools[i])
    }

    /// List all tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn descriptors(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn into_descriptors(self) -> Vec<ToolDescriptor> {
        self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(provider: &str, names: &[&str]) -> Arc<CatalogSnapshot> {
        let tools = names.iter().map(|n| ToolDescriptor::new(*n, "")).collect();
        Arc::new(CatalogSnapshot::fetched(provider, tools, Utc::now()))
    }

    #[test]
    fn test_merge_disjoint_providers() {
        let catalog = MergedCatalog::merge(&[
            snapshot("datetime", &["get_current_date", "get_current_time"]),
            snapshot("sqlite", &["read_query"]),
        ])
        .unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("read_query").unwrap().provider_id, "sqlite");
        assert_eq!(
            catalog.names(),
            vec!["get_current_date", "get_current_time", "read_query"]
        );
    }

    #[test]
    fn test_merge_collision_is_configuration_error() {
        let err = MergedCatalog::merge(&[snapshot("sql", &["read_query"]), snapshot("sql2", &["read_query"])])
            .unwrap_err();
        assert!(matches!(err, GatewayError::Configuration(_)));
        assert!(err.to_string().contains("'sql' and 'sql2'"));
    }

    #[test]
    fn test_merge_empty() {
        let catalog = MergedCatalog::merge(&[snapshot("sqlite", &[])]).unwrap();
        assert!(catalog.is_empty());
        assert!(catalog.get("read_query").is_none());
    }
}
