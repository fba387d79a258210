//! Metadata store backed by a remote build-cache service over HTTP.

use crate::error::{MetadataError, MetadataResult};
use crate::store::{CompareExchange, Expected, MetadataStore, SelectorEntry, SelectorQuery};
use crate::wire::{
    AddContentHashListRequest, AddContentHashListResponse, CODE_DETERMINISM_CONFLICT,
    CompareExchangeRequest, CompareExchangeResponse, ConflictResponse, ErrorBody, HealthResponse,
    SelectorsParams, SelectorsResponse,
};
use async_trait::async_trait;
use memo_core::{
    ContentHashListWithDeterminism, Record, RecordBody, StrongFingerprint, VersionToken,
    WeakFingerprint,
};
use reqwest::{StatusCode, Url};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

/// HTTP client for the build-cache service, scoped to one namespace.
#[derive(Clone, Debug)]
pub struct RemoteMetadataStore {
    http: reqwest::Client,
    base_url: Url,
    namespace: String,
}

impl RemoteMetadataStore {
    pub fn new(base_url: &str, namespace: &str, timeout: Duration) -> MetadataResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| MetadataError::Config(format!("invalid remote base_url: {e}")))?;
        memo_core::validate_name("namespace", namespace)?;
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url,
            namespace: namespace.to_string(),
        })
    }

    fn url(&self, path: &str) -> MetadataResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| MetadataError::Config(format!("failed to build API URL: {e}")))
    }

    fn record_url(&self, key: &StrongFingerprint) -> MetadataResult<Url> {
        self.url(&format!(
            "/v1/{}/content-hash-lists/{}/{}",
            self.namespace,
            key.weak.to_hex(),
            key.selector.to_key()
        ))
    }

    /// Turn a non-success response about `subject` into an error.
    async fn error_from(response: reqwest::Response, subject: &str) -> MetadataError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) if body.code == CODE_DETERMINISM_CONFLICT => {
                MetadataError::DeterminismConflict {
                    fingerprint: subject.to_string(),
                }
            }
            Ok(body) => MetadataError::Remote {
                status: status.as_u16(),
                message: format!("{}: {}", body.code, body.message),
            },
            Err(_) => MetadataError::Remote {
                status: status.as_u16(),
                message: text,
            },
        }
    }

    async fn decode<T: DeserializeOwned>(
        response: reqwest::Response,
        subject: &str,
    ) -> MetadataResult<T> {
        if !response.status().is_success() {
            return Err(Self::error_from(response, subject).await);
        }
        Ok(response.json::<T>().await?)
    }

    /// AddContentHashList: add-or-get, or an unconditional overwrite with `force_update`.
    #[instrument(skip(self, value), fields(backend = "remote", fingerprint = %key))]
    pub async fn add_content_hash_list(
        &self,
        key: &StrongFingerprint,
        value: &ContentHashListWithDeterminism,
        force_update: bool,
    ) -> MetadataResult<AddContentHashListResponse> {
        let request = AddContentHashListRequest {
            content_hash_list: value.content_hash_list.clone(),
            determinism: value.determinism,
            force_update,
        };
        let response = self
            .http
            .post(self.record_url(key)?)
            .json(&request)
            .send()
            .await?;
        Self::decode(response, &key.to_string()).await
    }
}

#[async_trait]
impl MetadataStore for RemoteMetadataStore {
    #[instrument(skip(self), fields(backend = "remote", fingerprint = %key))]
    async fn get(&self, key: &StrongFingerprint) -> MetadataResult<Option<Record>> {
        let response = self.http.get(self.record_url(key)?).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::decode(response, &key.to_string()).await.map(Some)
    }

    #[instrument(skip(self, replacement), fields(backend = "remote", fingerprint = %key))]
    async fn compare_exchange(
        &self,
        key: &StrongFingerprint,
        expected: &Expected,
        replacement: &RecordBody,
    ) -> MetadataResult<CompareExchange> {
        let request = CompareExchangeRequest {
            expected: match expected {
                Expected::Absent => None,
                Expected::Version(version) => Some(version.clone()),
            },
            replacement: replacement.clone(),
        };
        let mut url = self.record_url(key)?;
        url.set_path(&format!("{}/compare-exchange", url.path()));

        let response = self.http.post(url).json(&request).send().await?;
        if response.status() == StatusCode::CONFLICT {
            let text = response.text().await?;
            // Other 409s carry an error body rather than the current record.
            if let Ok(body) = serde_json::from_str::<ErrorBody>(&text) {
                return Err(MetadataError::Remote {
                    status: StatusCode::CONFLICT.as_u16(),
                    message: format!("{}: {}", body.code, body.message),
                });
            }
            let conflict: ConflictResponse = serde_json::from_str(&text)
                .map_err(|e| MetadataError::Serialization(e.to_string()))?;
            return Ok(CompareExchange::Conflict(conflict.current));
        }
        let body: CompareExchangeResponse = Self::decode(response, &key.to_string()).await?;
        Ok(CompareExchange::Succeeded(body.version))
    }

    #[instrument(skip(self, replacement), fields(backend = "remote", fingerprint = %key))]
    async fn force_update(
        &self,
        key: &StrongFingerprint,
        replacement: &RecordBody,
    ) -> MetadataResult<VersionToken> {
        let response = self
            .add_content_hash_list(key, &replacement.value, true)
            .await?;
        Ok(response.record.version)
    }

    #[instrument(skip(self), fields(backend = "remote", weak = %weak))]
    async fn get_selectors(
        &self,
        weak: &WeakFingerprint,
        query: &SelectorQuery,
    ) -> MetadataResult<Vec<SelectorEntry>> {
        let params = match *query {
            SelectorQuery::All => SelectorsParams::default(),
            SelectorQuery::SelectorsOnly { max_selectors } => SelectorsParams {
                max_selectors: Some(max_selectors),
                max_content_bags: None,
            },
            SelectorQuery::WithContentBags {
                max_selectors,
                max_content_bags,
            } => SelectorsParams {
                max_selectors: Some(max_selectors),
                max_content_bags: Some(max_content_bags),
            },
        };
        let url = self.url(&format!(
            "/v1/{}/selectors/{}",
            self.namespace,
            weak.to_hex()
        ))?;
        let response = self.http.get(url).query(&params).send().await?;
        let body: SelectorsResponse = Self::decode(response, &weak.to_string()).await?;
        Ok(body.selectors)
    }

    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn with_namespace(&self, namespace: &str) -> MetadataResult<Arc<dyn MetadataStore>> {
        memo_core::validate_name("namespace", namespace)?;
        Ok(Arc::new(Self {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            namespace: namespace.to_string(),
        }))
    }

    fn backend_name(&self) -> &'static str {
        "remote"
    }

    #[instrument(skip(self), fields(backend = "remote"))]
    async fn health_check(&self) -> MetadataResult<()> {
        let response = self.http.get(self.url("/v1/health")?).send().await?;
        let _: HealthResponse = Self::decode(response, "health").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memo_core::{ContentHash, Selector};

    fn store() -> RemoteMetadataStore {
        RemoteMetadataStore::new("http://cache.test:8080/", "builds", Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_record_url_layout() {
        let key = StrongFingerprint::new(
            WeakFingerprint::compute(b"w"),
            Selector::new(ContentHash::compute(b"s"), Some(vec![0xab])),
        );
        let url = store().record_url(&key).unwrap();
        assert_eq!(
            url.as_str(),
            format!(
                "http://cache.test:8080/v1/builds/content-hash-lists/{}/{}.ab",
                key.weak.to_hex(),
                key.selector.content_hash().to_hex()
            )
        );
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(matches!(
            RemoteMetadataStore::new("not a url", "builds", Duration::from_secs(1)),
            Err(MetadataError::Config(_))
        ));
        assert!(matches!(
            RemoteMetadataStore::new("http://x", "bad/ns", Duration::from_secs(1)),
            Err(MetadataError::Core(_))
        ));
        assert!(store().with_namespace("other").is_ok());
    }
}
