//! A minimal client for the Consul KV HTTP API.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{header::HeaderMap, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

const INDEX_HEADER: &str = "X-Consul-Index";
const TOKEN_HEADER: &str = "X-Consul-Token";

#[derive(Clone, Debug)]
pub(crate) struct KvClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
    datacenter: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct KvPair {
    pub key: String,
    pub flags: u64,
    pub value: Vec<u8>,
    pub modify_index: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("request to consul failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("consul responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("consul returned an invalid value for {key:?}: {source}")]
    Decode {
        key: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("consul address {0} cannot be used as a base URL")]
    BaseUrl(Url),
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawPair {
    key: String,
    #[serde(default)]
    flags: u64,
    #[serde(default)]
    value: Option<String>,
    modify_index: u64,
}

// === impl KvClient ===

impl KvClient {
    pub fn new(base: Url, token: Option<String>, datacenter: Option<String>) -> Result<Self, KvError> {
        if base.cannot_be_a_base() {
            return Err(KvError::BaseUrl(base));
        }
        let http = reqwest::Client::builder()
            .user_agent(concat!("gateway-storage/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base,
            token,
            datacenter,
        })
    }

    fn url(&self, segments: &[&str], key: &str) -> Result<Url, KvError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| KvError::BaseUrl(self.base.clone()))?
            .pop_if_empty()
            .extend(segments)
            .extend(key.split('/'));
        Ok(url)
    }

    fn request(&self, req: RequestBuilder) -> RequestBuilder {
        let req = match self.token.as_deref() {
            Some(token) => req.header(TOKEN_HEADER, token),
            None => req,
        };
        match self.datacenter.as_deref() {
            Some(dc) => req.query(&[("dc", dc)]),
            None => req,
        }
    }

    /// Reads a single key with a consistent read.
    pub async fn get(&self, key: &str) -> Result<Option<KvPair>, KvError> {
        let url = self.url(&["v1", "kv"], key)?;
        let rsp = self
            .request(self.http.get(url).query(&[("consistent", "")]))
            .send()
            .await?;
        if rsp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let mut pairs = decode_pairs(check(rsp).await?.json::<Vec<RawPair>>().await?)?;
        Ok(pairs.pop())
    }

    /// Reads every key under `prefix` with a consistent read.
    ///
    /// When `wait` is set the request blocks until the KV index moves past the given index or the
    /// wait time elapses. Returns the pairs along with the index the response reflects.
    pub async fn list(
        &self,
        prefix: &str,
        wait: Option<(u64, Duration)>,
    ) -> Result<(Vec<KvPair>, u64), KvError> {
        let url = self.url(&["v1", "kv"], prefix)?;
        let mut req = self
            .http
            .get(url)
            .query(&[("recurse", ""), ("consistent", "")]);
        if let Some((index, wait)) = wait {
            req = req.query(&[
                ("index", index.to_string()),
                ("wait", format!("{}ms", wait.as_millis())),
            ]);
        }
        let rsp = self.request(req).send().await?;
        let index = index_of(rsp.headers());
        if rsp.status() == StatusCode::NOT_FOUND {
            return Ok((Vec::new(), index));
        }
        let pairs = decode_pairs(check(rsp).await?.json::<Vec<RawPair>>().await?)?;
        Ok((pairs, index))
    }

    /// Writes `value` under `key`.
    ///
    /// With `cas` set, the write only succeeds if the key's current modify index equals it; an
    /// index of zero only succeeds if the key does not exist. Returns whether the write applied.
    pub async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        flags: u64,
        cas: Option<u64>,
    ) -> Result<bool, KvError> {
        let url = self.url(&["v1", "kv"], key)?;
        let mut req = self.http.put(url).query(&[("flags", flags)]).body(value);
        if let Some(cas) = cas {
            req = req.query(&[("cas", cas)]);
        }
        let rsp = check(self.request(req).send().await?).await?;
        Ok(rsp.json::<bool>().await?)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, KvError> {
        let url = self.url(&["v1", "kv"], key)?;
        let rsp = check(self.request(self.http.delete(url)).send().await?).await?;
        Ok(rsp.json::<bool>().await?)
    }

    /// Returns the address of the cluster's raft leader.
    pub async fn leader(&self) -> Result<String, KvError> {
        let url = self.url(&["v1", "status"], "leader")?;
        let rsp = check(self.request(self.http.get(url)).send().await?).await?;
        Ok(rsp.json::<String>().await?)
    }
}

// === impl KvError ===

impl KvError {
    /// Returns true for failures worth retrying: connection problems and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(error) => !error.is_decode() && !error.is_builder(),
            Self::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            Self::Decode { .. } | Self::BaseUrl(_) => false,
        }
    }
}

async fn check(rsp: Response) -> Result<Response, KvError> {
    let status = rsp.status();
    if status.is_success() {
        return Ok(rsp);
    }
    let body = rsp.text().await.unwrap_or_default();
    Err(KvError::Status { status, body })
}

fn index_of(headers: &HeaderMap) -> u64 {
    headers
        .get(INDEX_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

fn decode_pairs(raw: Vec<RawPair>) -> Result<Vec<KvPair>, KvError> {
    raw.into_iter()
        .map(|RawPair { key, flags, value, modify_index }| -> Result<KvPair, KvError> {
            let value = match value {
                Some(v) => STANDARD
                    .decode(v)
                    .map_err(|source| KvError::Decode { key: key.clone(), source })?,
                None => Vec::new(),
            };
            Ok(KvPair {
                key,
                flags,
                value,
                modify_index,
            })
        })
        .collect()
}
