//! Component catalog metadata

use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;
use tracing::debug;

use crate::errors::BeaconError;

/// Catalog file name expected in the project root
pub const CATALOG_FILE: &str = "catalog-info.yaml";

/// Annotation key carrying the GitHub repository slug
const GITHUB_SLUG_ANNOTATION: &str = "github.com/project-slug";

/// Component metadata loaded from the catalog file
#[derive(Debug, Clone)]
pub struct ComponentMetadata {
    /// Component slug as registered in Compass
    pub slug: String,

    /// GitHub `owner/repo` slug for commit URLs, when annotated
    pub github_repo: Option<String>,
}

/// Load component metadata from `catalog-info.yaml` in the given directory
pub fn load(dir: &Path) -> Result<ComponentMetadata, BeaconError> {
    let path = dir.join(CATALOG_FILE);
    let content = std::fs::read_to_string(&path)
        .map_err(|_| BeaconError::Catalog(format!("{} not found", CATALOG_FILE)))?;
    parse(&content)
}

/// Parse catalog content, returning the first document with component metadata
pub fn parse(content: &str) -> Result<ComponentMetadata, BeaconError> {
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = match Value::deserialize(document) {
            Ok(value) => value,
            Err(e) => {
                debug!("Skipping unparseable catalog document: {}", e);
                continue;
            }
        };

        let Some(name) = value
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
        else {
            continue;
        };

        let github_repo = value
            .get("metadata")
            .and_then(|m| m.get("annotations"))
            .and_then(|a| a.get(GITHUB_SLUG_ANNOTATION))
            .and_then(Value::as_str)
            .map(String::from);

        return Ok(ComponentMetadata {
            slug: name.to_string(),
            github_repo,
        });
    }

    Err(BeaconError::Catalog(format!(
        "No component metadata found in {}",
        CATALOG_FILE
    )))
}
