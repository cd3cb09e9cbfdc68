use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type PersistedId = i64;

/// Scope selecting which record collection is loaded: a class, optionally
/// narrowed to a date (attendance boards are per class per day).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scope {
    pub class_id: i64,
    pub date: Option<NaiveDate>,
}

impl Scope {
    pub fn class(class_id: i64) -> Self {
        Self {
            class_id,
            date: None,
        }
    }

    pub fn class_date(class_id: i64, date: NaiveDate) -> Self {
        Self {
            class_id,
            date: Some(date),
        }
    }

    /// Query token sent as the `scope` parameter: `"17"` or `"17:2026-03-02"`.
    pub fn token(&self) -> String {
        match self.date {
            Some(date) => format!("{}:{}", self.class_id, date),
            None => self.class_id.to_string(),
        }
    }
}

/// Uniform failure for any non-2xx response or transport error.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RemoteError {
    pub status: Option<u16>,
    pub message: String,
}

impl RemoteError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireRecord<K, V> {
    pub key: K,
    pub value: V,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub persisted_id: Option<PersistedId>,
}

/// The consumed persistence API. Session credentials ride implicitly (cookie
/// jar on the HTTP client); callers never see auth.
#[async_trait]
pub trait RemoteApi<K, V>: Send + Sync {
    /// `GET /collection?scope=...`
    async fn fetch(&self, scope: &Scope) -> Result<Vec<WireRecord<K, V>>, RemoteError>;

    /// `POST /collection` for a record that has never been written.
    /// Returns the id the remote store assigned.
    async fn create(&self, scope: &Scope, key: &K, value: &V) -> Result<PersistedId, RemoteError>;

    /// `PUT /collection/{persistedId}` for a record that already has a row.
    async fn update(&self, scope: &Scope, id: PersistedId, value: &V) -> Result<(), RemoteError>;
}

pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
    collection: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, collection: &str) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(20))
            .build()
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            collection: collection.to_string(),
        })
    }

    fn collection_url(&self) -> String {
        format!("{}/{}", self.base_url, self.collection)
    }
}

#[derive(Debug, Deserialize)]
struct FetchBody<K, V> {
    records: Vec<WireRecord<K, V>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateBody<'a, K, V> {
    scope: String,
    key: &'a K,
    value: &'a V,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedBody {
    persisted_id: PersistedId,
}

#[derive(Debug, Serialize)]
struct UpdateBody<'a, V> {
    value: &'a V,
}

async fn non_success(resp: reqwest::Response) -> RemoteError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    if body.is_empty() {
        RemoteError::status(status, format!("remote returned {status}"))
    } else {
        RemoteError::status(status, body)
    }
}

#[async_trait]
impl<K, V> RemoteApi<K, V> for HttpRemote
where
    K: Serialize + DeserializeOwned + Send + Sync,
    V: Serialize + DeserializeOwned + Send + Sync,
{
    async fn fetch(&self, scope: &Scope) -> Result<Vec<WireRecord<K, V>>, RemoteError> {
        let resp = self
            .client
            .get(self.collection_url())
            .query(&[("scope", scope.token())])
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(non_success(resp).await);
        }
        let body: FetchBody<K, V> = resp
            .json()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        Ok(body.records)
    }

    async fn create(&self, scope: &Scope, key: &K, value: &V) -> Result<PersistedId, RemoteError> {
        let resp = self
            .client
            .post(self.collection_url())
            .json(&CreateBody {
                scope: scope.token(),
                key,
                value,
            })
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(non_success(resp).await);
        }
        let body: CreatedBody = resp
            .json()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        Ok(body.persisted_id)
    }

    async fn update(&self, _scope: &Scope, id: PersistedId, value: &V) -> Result<(), RemoteError> {
        let resp = self
            .client
            .put(format!("{}/{}", self.collection_url(), id))
            .json(&UpdateBody { value })
            .send()
            .await
            .map_err(|e| RemoteError::transport(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(non_success(resp).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_token_with_and_without_date() {
        assert_eq!(Scope::class(17).token(), "17");
        let d = NaiveDate::from_ymd_opt(2026, 3, 2).expect("date");
        assert_eq!(Scope::class_date(17, d).token(), "17:2026-03-02");
    }

    #[test]
    fn wire_record_omits_missing_persisted_id() {
        let rec = WireRecord {
            key: 4i64,
            value: "present".to_string(),
            persisted_id: None,
        };
        let v = serde_json::to_value(&rec).expect("serialize");
        assert!(v.get("persistedId").is_none());

        let parsed: WireRecord<i64, String> =
            serde_json::from_value(serde_json::json!({ "key": 4, "value": "present" }))
                .expect("deserialize");
        assert_eq!(parsed.persisted_id, None);
    }
}
