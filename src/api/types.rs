//! Request and response DTOs for the JSON API.

use serde::{Deserialize, Serialize};

use crate::{resources::ResourceStats, ExtractMode};

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRequest {
    pub text: String,
    #[serde(default)]
    pub mode: ExtractMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourcesDto {
    pub resources: Vec<ResourceStats>,
}
