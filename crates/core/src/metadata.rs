//! Instance metadata client and aggregation
//!
//! The bootstrap reads its deployment parameters from the compute metadata
//! server. [`collect`] issues three requests in a fixed order (recursive
//! attributes, zone, instance name) and merges them into one
//! [`MetadataMap`], adding the synthetic `ZONE` and `NAME` keys.
//!
//! Values are kept as JSON. Steps that need text go through
//! [`MetadataMap::get_text`], which coerces scalars the way a shell would see
//! them (`true`, `42`, strings verbatim).

use crate::errors::{MetadataError, Result};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

/// Header required by the metadata server
pub const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
pub const METADATA_FLAVOR_VALUE: &str = "Google";

/// Redirect limit for metadata requests
pub const MAX_REDIRECTS: usize = 20;

pub const ATTRIBUTES_PATH: &str = "/attributes/?recursive=true&alt=json";
pub const ZONE_PATH: &str = "/zone";
pub const NAME_PATH: &str = "/name";

/// Recognized metadata keys
pub mod keys {
    pub const GIT_URL: &str = "GIT_URL";
    pub const GIT_BRANCH: &str = "GIT_BRANCH";
    pub const APP_ROOT: &str = "APP_ROOT";
    pub const SKIP_START: &str = "SKIP_START";
    pub const STACKDRIVER_AGENT: &str = "STACKDRIVER_AGENT";
    pub const AUTODESTROY: &str = "AUTODESTROY";
    pub const ZONE: &str = "ZONE";
    pub const NAME: &str = "NAME";
}

/// Ordered key/value view of the instance metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetadataMap(IndexMap<String, Value>);

impl MetadataMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value; a replaced key keeps its position
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Value of `key` coerced to text, if present
    pub fn get_text(&self, key: &str) -> Option<String> {
        self.get(key).map(value_to_text)
    }

    /// Value of `key` as text when the key is set to a truthy value
    ///
    /// Absent keys, `null`, `false`, `0` and empty strings count as unset.
    pub fn get_set(&self, key: &str) -> Option<String> {
        self.get(key).filter(|v| is_truthy(v)).map(value_to_text)
    }

    /// Whether `key`, coerced to text, is exactly `"true"`
    ///
    /// JSON `true` qualifies as well as the string `"true"`; `"TRUE"`, `"1"`,
    /// `null`, arrays and objects do not.
    pub fn flag_enabled(&self, key: &str) -> bool {
        matches!(
            self.get(key),
            Some(Value::String(_) | Value::Bool(_) | Value::Number(_))
        ) && self.get_text(key).as_deref() == Some("true")
    }

    /// Whether `key` holds exactly the string `"true"` (no coercion)
    pub fn is_string_true(&self, key: &str) -> bool {
        matches!(self.get(key), Some(Value::String(s)) if s == "true")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a map from a JSON object, keeping its key order
    pub fn from_object(object: serde_json::Map<String, Value>) -> Self {
        Self(object.into_iter().collect())
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for MetadataMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Render a metadata value as text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Last `/`-separated segment of a path-like string, ignoring trailing slashes
///
/// `projects/123/zones/europe-west1-b` becomes `europe-west1-b`.
pub fn last_path_segment(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Parse a response body: JSON when it parses, the raw text otherwise
pub fn parse_body(body: String) -> Value {
    serde_json::from_str(&body).unwrap_or(Value::String(body))
}

/// Metadata server client abstraction
#[async_trait::async_trait]
pub trait MetadataClient: Send + Sync {
    /// Fetch one path relative to the instance metadata root
    async fn fetch(&self, path: &str) -> Result<Value>;
}

#[async_trait::async_trait]
impl<T: MetadataClient + ?Sized> MetadataClient for &T {
    async fn fetch(&self, path: &str) -> Result<Value> {
        (**self).fetch(path).await
    }
}

/// Metadata client backed by reqwest
///
/// No timeout is configured: a metadata server that never answers blocks the
/// bootstrap, which is what a VM startup script wants.
#[derive(Debug, Clone)]
pub struct ReqwestMetadataClient {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestMetadataClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| MetadataError::Transport {
                url: base_url.clone(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait::async_trait]
impl MetadataClient for ReqwestMetadataClient {
    #[instrument(skip(self))]
    async fn fetch(&self, path: &str) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);
        debug!("GET {}", url);

        let transport = |e: reqwest::Error| MetadataError::Transport {
            url: url.clone(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR_VALUE)
            .send()
            .await
            .map_err(transport)?;
        debug!("Metadata server answered {} for {}", response.status(), path);

        let body = response.text().await.map_err(transport)?;
        Ok(parse_body(body))
    }
}

/// Fetch and merge the instance metadata
///
/// The three requests run strictly one after another. Any failure aborts
/// the collection; a partial map is never returned.
#[instrument(skip(client))]
pub async fn collect<C: MetadataClient + ?Sized>(client: &C) -> Result<MetadataMap> {
    info!("Collecting instance metadata");

    let attributes = client.fetch(ATTRIBUTES_PATH).await?;
    let zone = client.fetch(ZONE_PATH).await?;
    let name = client.fetch(NAME_PATH).await?;

    let mut metadata = match attributes {
        Value::Object(object) => MetadataMap::from_object(object),
        other => {
            return Err(MetadataError::Malformed {
                path: ATTRIBUTES_PATH.to_string(),
                message: format!("expected a JSON object, got {}", other),
            }
            .into())
        }
    };

    let zone_text = value_to_text(&zone);
    metadata.insert(keys::ZONE, last_path_segment(&zone_text));
    metadata.insert(keys::NAME, name);

    info!("Collected {} metadata entries", metadata.len());
    Ok(metadata)
}

/// In-memory metadata client for tests and dry runs
#[derive(Debug, Default)]
pub struct StaticMetadataClient {
    responses: IndexMap<String, Value>,
    requests: Mutex<Vec<String>>,
}

impl StaticMetadataClient {
    /// Client answering the three aggregation paths
    pub fn new(attributes: Value, zone: impl Into<Value>, name: impl Into<Value>) -> Self {
        let mut responses = IndexMap::new();
        responses.insert(ATTRIBUTES_PATH.to_string(), attributes);
        responses.insert(ZONE_PATH.to_string(), zone.into());
        responses.insert(NAME_PATH.to_string(), name.into());
        Self {
            responses,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Paths requested so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl MetadataClient for StaticMetadataClient {
    async fn fetch(&self, path: &str) -> Result<Value> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(path.to_string());
        }
        self.responses.get(path).cloned().ok_or_else(|| {
            MetadataError::Transport {
                url: path.to_string(),
                message: "connection refused".to_string(),
            }
            .into()
        })
    }
}
