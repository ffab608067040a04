//! Clients for the external keyword-data and rank-tracking service.

use crate::error::KeywordError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use url::Url;

/// A keyword as reported by the provider, before normalization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawKeyword {
    pub keyword: String,
    #[serde(alias = "volume")]
    pub search_volume: u64,
    pub difficulty: f64,
    #[serde(default)]
    pub intent: Option<String>,
    #[serde(default)]
    pub trend: Option<String>,
    #[serde(default)]
    pub cpc: Option<f64>,
}

pub trait KeywordProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Volume, difficulty, intent and trend for the seeds and related terms
    fn query<'a>(
        &'a self,
        seeds: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<RawKeyword>, KeywordError>>;

    /// Current search position of `url` for `keyword`; `None` when it does
    /// not rank
    fn position<'a>(
        &'a self,
        keyword: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Option<u32>, KeywordError>>;
}

/// Stand-in used when no provider is configured
pub struct UnconfiguredProvider;

impl KeywordProvider for UnconfiguredProvider {
    fn name(&self) -> &str {
        "unconfigured"
    }

    fn query<'a>(
        &'a self,
        _seeds: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<RawKeyword>, KeywordError>> {
        Box::pin(async {
            Err(KeywordError::ProviderUnavailable(
                "no keyword provider configured".to_string(),
            ))
        })
    }

    fn position<'a>(
        &'a self,
        _keyword: &'a str,
        _url: &'a str,
    ) -> BoxFuture<'a, Result<Option<u32>, KeywordError>> {
        Box::pin(async {
            Err(KeywordError::ProviderUnavailable(
                "no keyword provider configured".to_string(),
            ))
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    seed_keywords: &'a [String],
}

#[derive(Deserialize)]
#[serde(untagged)]
enum QueryResponse {
    Wrapped { keywords: Vec<RawKeyword> },
    Bare(Vec<RawKeyword>),
}

#[derive(Deserialize)]
struct PositionResponse {
    position: Option<u32>,
}

/// JSON-over-HTTP provider.
///
/// `POST {base}/keywords` with `{"seedKeywords": [...]}` and
/// `GET {base}/rankings?keyword=..&url=..` returning `{"position": n|null}`.
pub struct HttpKeywordProvider {
    client: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpKeywordProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: Option<String>,
    ) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, KeywordError> {
        self.base_url
            .join(path)
            .map_err(|e| KeywordError::ProviderUnavailable(format!("bad provider URL: {}", e)))
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }

    async fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, KeywordError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| KeywordError::ProviderUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(KeywordError::ProviderUnavailable(format!(
                "provider responded with HTTP {}",
                status.as_u16()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| KeywordError::ProviderUnavailable(format!("malformed response: {}", e)))
    }
}

impl KeywordProvider for HttpKeywordProvider {
    fn name(&self) -> &str {
        "http"
    }

    fn query<'a>(
        &'a self,
        seeds: &'a [String],
    ) -> BoxFuture<'a, Result<Vec<RawKeyword>, KeywordError>> {
        Box::pin(async move {
            let url = self.endpoint("keywords")?;
            let request = self
                .client
                .post(url)
                .json(&QueryRequest {
                    seed_keywords: seeds,
                });
            let keywords = match self.send_json::<QueryResponse>(request).await? {
                QueryResponse::Wrapped { keywords } => keywords,
                QueryResponse::Bare(keywords) => keywords,
            };
            tracing::debug!(count = keywords.len(), "Keyword provider returned results");
            Ok(keywords)
        })
    }

    fn position<'a>(
        &'a self,
        keyword: &'a str,
        url: &'a str,
    ) -> BoxFuture<'a, Result<Option<u32>, KeywordError>> {
        Box::pin(async move {
            let endpoint = self.endpoint("rankings")?;
            let request = self
                .client
                .get(endpoint)
                .query(&[("keyword", keyword), ("url", url)]);
            let response: PositionResponse = self.send_json(request).await?;
            Ok(response.position.filter(|p| *p > 0))
        })
    }
}
