use async_trait::async_trait;
use reqwest::{Proxy, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    config::Config,
    dota2::{
        full::{self, MatchDetailsResult},
        partial,
    },
};

// we use separate error types for construction and request

#[derive(Error, Debug)]
pub enum ConstructionError {
    #[error("ProxyError: {0} from scheme: {1}.")]
    ProxyError(reqwest::Error, String),
    #[error("BuildError: {0}.")]
    BuildError(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum RequestError {
    #[error("Failed to retrive result from web API: {0}")]
    ConnectionError(#[from] reqwest::Error),
    #[error("Failed to decode web API response: {0}")]
    DecodeError(serde_json::Error, String),
    #[error("Too Many Requests")]
    TooManyRequests,
    #[error("Other Response: {0}")]
    OtherResponse(StatusCode),
    #[error("Web API rejected the request: {0}")]
    Rejected(String),
    #[error("Web API returned no matches")]
    EmptyResult,
}

impl RequestError {
    /// Failures that say nothing about the request itself and may clear up by waiting.
    pub fn is_transient(&self) -> bool {
        match self {
            RequestError::ConnectionError(_) | RequestError::TooManyRequests => true,
            RequestError::OtherResponse(status) => status.is_server_error(),
            _ => false,
        }
    }
}

/// The two read-only calls the watcher needs from the match API.
#[async_trait]
pub trait MatchApi: Send + Sync {
    async fn fetch_history(&self, account_id: u64) -> Result<partial::MatchHistory, RequestError>;

    async fn fetch_details(&self, match_id: u64) -> Result<full::Match, RequestError>;
}

pub struct Client {
    client: reqwest::Client,
    key: String,
    history_url: String,
    details_url: String,
}

impl Client {
    pub fn new(config: &Config) -> Result<Self, ConstructionError> {
        let builder = reqwest::Client::builder();
        let builder = match config.proxy.as_deref() {
            Some(proxy) => {
                let proxy = Proxy::all(proxy)
                    .map_err(|err| ConstructionError::ProxyError(err, proxy.to_string()))?;
                builder.proxy(proxy)
            }
            None => builder,
        };
        let client = builder.build()?;
        Ok(Self {
            client,
            key: config.steam_api_key.clone(),
            history_url: config.history_url(),
            details_url: config.details_url(),
        })
    }

    fn history_request(&self, account_id: u64) -> reqwest::Result<reqwest::Request> {
        self.client
            .get(&self.history_url)
            .query(&[("key", &self.key)])
            .query(&[("account_id", account_id)])
            .query(&[("format", "json")])
            .build()
    }

    fn details_request(&self, match_id: u64) -> reqwest::Result<reqwest::Request> {
        self.client
            .get(&self.details_url)
            .query(&[("key", &self.key)])
            .query(&[("match_id", match_id)])
            .query(&[("format", "json")])
            .build()
    }

    async fn execute<T: DeserializeOwned>(&self, req: reqwest::Request) -> Result<T, RequestError> {
        log::debug!("GET {}{}", req.url().path(), redact_query(req.url()));
        let resp = self.client.execute(req).await?;
        match resp.status() {
            StatusCode::OK => {
                let content = resp.text().await?;
                serde_json::from_str(&content)
                    .map_err(|err| RequestError::DecodeError(err, content))
            }
            StatusCode::TOO_MANY_REQUESTS => Err(RequestError::TooManyRequests),
            other => Err(RequestError::OtherResponse(other)),
        }
    }
}

// never leak the api key into the logs
fn redact_query(url: &reqwest::Url) -> String {
    let pairs: Vec<String> = url
        .query_pairs()
        .map(|(k, v)| match k.as_ref() {
            "key" => format!("{}=***", k),
            _ => format!("{}={}", k, v),
        })
        .collect();
    format!("?{}", pairs.join("&"))
}

#[async_trait]
impl MatchApi for Client {
    async fn fetch_history(&self, account_id: u64) -> Result<partial::MatchHistory, RequestError> {
        let req = self.history_request(account_id)?;
        let resp: partial::MatchHistoryResponse = self.execute(req).await?;
        check_history(resp.result)
    }

    async fn fetch_details(&self, match_id: u64) -> Result<full::Match, RequestError> {
        let req = self.details_request(match_id)?;
        let resp: full::MatchDetailsResponse = self.execute(req).await?;
        check_details(resp.result, match_id)
    }
}

pub fn check_history(
    history: partial::MatchHistory,
) -> Result<partial::MatchHistory, RequestError> {
    if history.status != partial::MatchHistory::STATUS_OK {
        let detail = history.status_detail.as_deref().unwrap_or("no detail");
        let reason = format!("status {}: {}", history.status, detail);
        return Err(RequestError::Rejected(reason));
    }
    if history.matches.is_empty() {
        return Err(RequestError::EmptyResult);
    }
    Ok(history)
}

pub fn check_details(
    result: MatchDetailsResult,
    match_id: u64,
) -> Result<full::Match, RequestError> {
    match result {
        MatchDetailsResult::Error { error } => Err(RequestError::Rejected(error)),
        MatchDetailsResult::Match(mat) if mat.match_id != match_id => {
            let reason = format!("asked for match {} but got {}", match_id, mat.match_id);
            Err(RequestError::Rejected(reason))
        }
        MatchDetailsResult::Match(mat) => Ok(*mat),
    }
}
