use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub query: String,
    pub company: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub score: f64,
    pub id: String,
    pub document_name: String,
    pub chunk_content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
    #[serde(default)]
    pub total_hits: u64,
    #[serde(default)]
    pub filters_used: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFilesResponse {
    pub success: bool,
    #[serde(default)]
    pub deleted_files: Vec<String>,
    #[serde(default)]
    pub failed_files: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckFilesResponse {
    pub success: bool,
    #[serde(default)]
    pub processed_files: Vec<String>,
    #[serde(default)]
    pub unprocessed_files: Vec<String>,
}
