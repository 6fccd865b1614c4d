use crate::config::StoreConfig;
use crate::models::{
    ChunkMetadata, IndexDescriptor, IndexStats, QueryMatch, SimilarityMetric, VectorStoreEntry,
};
use crate::traits::{IndexAdmin, VectorIndex};
use crate::StoreError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use tracing::debug;
use url::Url;

const BACKEND: &str = "pinecone";

/// Managed serverless index. The data-plane host is looked up on first use.
pub struct PineconeStore {
    client: Client,
    control_plane: Url,
    index_name: String,
    cloud: String,
    region: String,
    host: RwLock<Option<Url>>,
}

impl PineconeStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(StoreError::NotConfigured("missing vector store API key".to_string()));
        }
        if config.index_name.trim().is_empty() {
            return Err(StoreError::NotConfigured("missing vector index name".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "Api-Key",
            HeaderValue::from_str(api_key).map_err(|_| {
                StoreError::NotConfigured("invalid vector store API key".to_string())
            })?,
        );
        headers.insert(
            "X-Pinecone-API-Version",
            HeaderValue::from_str(&config.api_version).map_err(|_| {
                StoreError::NotConfigured(format!("invalid API version {}", config.api_version))
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder().default_headers(headers).build()?;
        let control_plane = Url::parse(&format!(
            "{}/",
            config.control_plane_url.trim_end_matches('/')
        ))?;

        Ok(Self {
            client,
            control_plane,
            index_name: config.index_name.clone(),
            cloud: config.cloud.clone(),
            region: config.region.clone(),
            host: RwLock::new(None),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    async fn data_plane(&self) -> Result<Url, StoreError> {
        if let Some(host) = self.host.read().await.as_ref() {
            return Ok(host.clone());
        }

        let described = self.fetch_index(&self.index_name).await?.ok_or_else(|| {
            StoreError::NotReady(format!("index {} does not exist", self.index_name))
        })?;
        let host = data_plane_url(&described.host)?;
        *self.host.write().await = Some(host.clone());
        Ok(host)
    }

    async fn fetch_index(&self, name: &str) -> Result<Option<DescribeIndexResponse>, StoreError> {
        let response = self
            .client
            .get(self.control_plane.join(&format!("indexes/{name}"))?)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = ensure_success(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn post_data<B, R>(&self, path: &str, body: &B) -> Result<R, StoreError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = self.data_plane().await?.join(path)?;
        let response = self.client.post(url).json(body).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }
}

fn data_plane_url(host: &str) -> Result<Url, StoreError> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: "index description has no host".to_string(),
        });
    }
    if host.starts_with("http://") || host.starts_with("https://") {
        Ok(Url::parse(&format!("{host}/"))?)
    } else {
        Ok(Url::parse(&format!("https://{host}/"))?)
    }
}

async fn ensure_success(response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body))
}

fn status_error(status: StatusCode, body: String) -> StoreError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::NotConfigured(format!("vector store rejected credentials ({status})"))
        }
        StatusCode::CONFLICT => StoreError::AlreadyExists(body),
        _ => StoreError::BackendResponse {
            backend: BACKEND.to_string(),
            details: format!("{status}: {body}"),
        },
    }
}

#[async_trait]
impl VectorIndex for PineconeStore {
    async fn upsert_entries(
        &self,
        namespace: &str,
        entries: &[VectorStoreEntry],
    ) -> Result<usize, StoreError> {
        if entries.is_empty() {
            return Ok(0);
        }

        let response: UpsertResponse = self
            .post_data(
                "vectors/upsert",
                &UpsertRequest {
                    vectors: entries,
                    namespace,
                },
            )
            .await?;
        debug!(namespace, upserted = response.upserted_count, "pinecone upsert");
        Ok(response.upserted_count)
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
    ) -> Result<Vec<QueryMatch>, StoreError> {
        let response: QueryResponse = self
            .post_data(
                "query",
                &QueryRequest {
                    namespace,
                    vector,
                    top_k,
                    include_metadata: true,
                    include_values: false,
                },
            )
            .await
            .map_err(|error| match error {
                StoreError::BackendResponse { details, .. } if details.starts_with("404") => {
                    StoreError::NamespaceNotFound(namespace.to_string())
                }
                other => other,
            })?;

        Ok(response.into_matches())
    }
}

#[async_trait]
impl IndexAdmin for PineconeStore {
    async fn describe_index(&self, name: &str) -> Result<Option<IndexDescriptor>, StoreError> {
        Ok(self.fetch_index(name).await?.map(DescribeIndexResponse::into_descriptor))
    }

    async fn create_index(&self, descriptor: &IndexDescriptor) -> Result<(), StoreError> {
        let request = CreateIndexRequest {
            name: &descriptor.name,
            dimension: descriptor.dimension,
            metric: descriptor.metric,
            spec: IndexSpec {
                serverless: ServerlessSpec {
                    cloud: &self.cloud,
                    region: &self.region,
                },
            },
        };

        let response = self
            .client
            .post(self.control_plane.join("indexes")?)
            .json(&request)
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    async fn delete_index(&self, name: &str) -> Result<(), StoreError> {
        let response = self
            .client
            .delete(self.control_plane.join(&format!("indexes/{name}"))?)
            .send()
            .await?;

        if response.status() != StatusCode::NOT_FOUND {
            ensure_success(response).await?;
        }
        if name == self.index_name {
            *self.host.write().await = None;
        }
        Ok(())
    }

    async fn describe_stats(&self) -> Result<IndexStats, StoreError> {
        let response: StatsResponse = self
            .post_data("describe_index_stats", &serde_json::json!({}))
            .await?;
        Ok(response.into_stats())
    }
}

#[derive(Serialize)]
struct UpsertRequest<'a> {
    vectors: &'a [VectorStoreEntry],
    namespace: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpsertResponse {
    #[serde(default)]
    upserted_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    namespace: &'a str,
    vector: &'a [f32],
    top_k: usize,
    include_metadata: bool,
    include_values: bool,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<MatchPayload>,
}

impl QueryResponse {
    fn into_matches(self) -> Vec<QueryMatch> {
        self.matches
            .into_iter()
            .map(|item| QueryMatch {
                id: item.id,
                score: item.score,
                metadata: item.metadata.and_then(MetadataPayload::into_chunk_metadata),
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct MatchPayload {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<MetadataPayload>,
}

#[derive(Debug, Deserialize)]
struct MetadataPayload {
    #[serde(default)]
    text: Option<String>,
    // Metadata numbers come back as JSON floats.
    #[serde(default)]
    chunk_index: Option<f64>,
}

impl MetadataPayload {
    fn into_chunk_metadata(self) -> Option<ChunkMetadata> {
        let text = self.text?;
        Some(ChunkMetadata {
            text,
            chunk_index: self.chunk_index.map(|value| value as usize).unwrap_or_default(),
        })
    }
}

#[derive(Serialize)]
struct CreateIndexRequest<'a> {
    name: &'a str,
    dimension: usize,
    metric: SimilarityMetric,
    spec: IndexSpec<'a>,
}

#[derive(Serialize)]
struct IndexSpec<'a> {
    serverless: ServerlessSpec<'a>,
}

#[derive(Serialize)]
struct ServerlessSpec<'a> {
    cloud: &'a str,
    region: &'a str,
}

#[derive(Debug, Deserialize)]
struct DescribeIndexResponse {
    name: String,
    dimension: usize,
    #[serde(default)]
    metric: SimilarityMetric,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: Option<IndexStatus>,
}

#[derive(Debug, Deserialize)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

impl DescribeIndexResponse {
    fn into_descriptor(self) -> IndexDescriptor {
        IndexDescriptor {
            name: self.name,
            dimension: self.dimension,
            metric: self.metric,
            ready: self.status.is_some_and(|status| status.ready),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatsResponse {
    #[serde(default)]
    namespaces: HashMap<String, NamespaceSummary>,
    #[serde(default)]
    dimension: usize,
    #[serde(default)]
    total_vector_count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NamespaceSummary {
    #[serde(default)]
    vector_count: u64,
}

impl StatsResponse {
    fn into_stats(self) -> IndexStats {
        IndexStats {
            dimension: self.dimension,
            total_vector_count: self.total_vector_count,
            namespaces: self
                .namespaces
                .into_iter()
                .map(|(name, summary)| (name, summary.vector_count))
                .collect::<BTreeMap<_, _>>(),
        }
    }
}
