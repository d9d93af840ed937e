use std::path::Path;

use anyhow::{Context, Result};
use esg_resource::Catalog;
use tokio::fs;

/// Campaign table of the Re:source dashboard.
pub const DEFAULT_CAMPAIGNS: &str = include_str!("../campaigns.json");

/// Loads and validates the campaign table at `path`, or the built-in table.
pub async fn load_catalog(path: Option<&Path>) -> Result<Catalog> {
    match path {
        Some(path) => {
            let table = fs::read_to_string(path)
                .await
                .with_context(|| format!("failed to read campaign table {}", path.display()))?;
            Catalog::from_json_str(&table)
                .with_context(|| format!("invalid campaign table {}", path.display()))
        }
        None => Catalog::from_json_str(DEFAULT_CAMPAIGNS).context("invalid built-in campaign table"),
    }
}

#[cfg(test)]
mod tests {
    use super::load_catalog;

    #[tokio::test]
    async fn builtin_table_is_valid() {
        let catalog = load_catalog(None).await.unwrap();
        assert_eq!(catalog.len(), 13);
        assert_eq!(catalog.position("stair_climbing"), Some(0));
        assert_eq!(
            catalog.get("esg_platform").unwrap().ranking.as_deref(),
            Some("esg_score")
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let path = std::path::Path::new("./does-not-exist/campaigns.json");
        assert!(load_catalog(Some(path)).await.is_err());
    }
}
