//! Per-provider catalog snapshot

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ToolDescriptor;

/// Last-known tool catalog of one provider. Replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    pub provider_id: String,
    pub tools: Vec<ToolDescriptor>,
    /// Time of the last successful fetch; `None` until one succeeds
    pub fetched_at: Option<DateTime<Utc>>,
    /// Error of the most recent fetch attempt, cleared on success
    pub fetch_error: Option<String>,
}

impl CatalogSnapshot {
    /// Placeholder for a provider that has not been fetched yet
    pub fn empty(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            tools: Vec::new(),
            fetched_at: None,
            fetch_error: None,
        }
    }

    /// Successful fetch. Descriptors are stamped with `provider_id`.
    pub fn fetched(provider_id: impl Into<String>, tools: Vec<ToolDescriptor>, at: DateTime<Utc>) -> Self {
        let provider_id = provider_id.into();
        let tools = tools
            .into_iter()
            .map(|tool| tool.for_provider(provider_id.clone()))
            .collect();
        Self {
            provider_id,
            tools,
            fetched_at: Some(at),
            fetch_error: None,
        }
    }

    /// Failed fetch: keep whatever tools the previous snapshot had
    pub fn failed_after(previous: &CatalogSnapshot, error: impl Into<String>) -> Self {
        Self {
            provider_id: previous.provider_id.clone(),
            tools: previous.tools.clone(),
            fetched_at: previous.fetched_at,
            fetch_error: Some(error.into()),
        }
    }

    pub fn is_stale(&self) -> bool {
        self.fetch_error.is_some()
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name == name)
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|t| t.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetched_stamps_provider() {
        let snap = CatalogSnapshot::fetched(
            "datetime",
            vec![ToolDescriptor::new("get_current_date", "Today").for_provider("spoofed")],
            Utc::now(),
        );
        assert_eq!(snap.tools[0].provider_id, "datetime");
        assert!(snap.has_tool("get_current_date"));
        assert!(!snap.is_stale());
    }

    #[test]
    fn test_failed_after_keeps_previous_tools() {
        let at = Utc::now();
        let previous = CatalogSnapshot::fetched("sqlite", vec![ToolDescriptor::new("list_tables", "")], at);
        let failed = CatalogSnapshot::failed_after(&previous, "connection refused");

        assert_eq!(failed.tools, previous.tools);
        assert_eq!(failed.fetched_at, Some(at));
        assert_eq!(failed.fetch_error.as_deref(), Some("connection refused"));
        assert!(failed.is_stale());
    }

    #[test]
    fn test_failed_after_empty_stays_empty() {
        let failed = CatalogSnapshot::failed_after(&CatalogSnapshot::empty("sqlite"), "refused");
        assert!(failed.tools.is_empty());
        assert!(failed.fetched_at.is_none());
        assert!(failed.tool("list_tables").is_none());
    }
}
