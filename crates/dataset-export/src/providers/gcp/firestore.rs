//! Cloud Firestore record store
//!
//! Talks to the Firestore REST API (v1). Records live in the collection
//! `projects/{project}/forms/{form}/data` of the configured database.

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use super::auth::GcpAuth;
use crate::error::{Error, Result};
use crate::providers::record_store::RecordStoreProvider;
use crate::types::{FieldValue, FormScope, Record, RecordId};

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1/";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, FieldValue>,
}

/// Last segment of a full document resource name
fn document_id(name: &str) -> Option<&str> {
    name.rsplit('/').next().filter(|id| !id.is_empty())
}

/// Firestore-backed record store
pub struct FirestoreRecordStore {
    auth: Arc<GcpAuth>,
    http: reqwest::Client,
    database: String,
    page_size: u32,
}

impl FirestoreRecordStore {
    /// Create a new Firestore record store
    pub fn new(auth: Arc<GcpAuth>, database: String, page_size: u32) -> Self {
        Self {
            auth,
            http: reqwest::Client::new(),
            database,
            page_size: page_size.max(1),
        }
    }

    /// URL of the form's record collection, optionally extended by a record ID
    fn collection_url(&self, scope: &FormScope, id: Option<&RecordId>) -> Result<Url> {
        let mut url = Url::parse(FIRESTORE_API)
            .map_err(|e| Error::Config(format!("Invalid Firestore endpoint: {}", e)))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| Error::Config("Firestore endpoint cannot be a base".to_string()))?;
            segments.pop_if_empty().extend([
                "projects",
                self.auth.project_id(),
                "databases",
                self.database.as_str(),
                "documents",
                "projects",
                scope.project_id.as_str(),
                "forms",
                scope.form_id.as_str(),
                "data",
            ]);
            if let Some(id) = id {
                segments.push(id.as_str());
            }
        }
        Ok(url)
    }

    /// Listing URL for one page of record names.
    ///
    /// The field mask keeps only `__name__`, so pages carry no record bodies.
    fn list_url(&self, scope: &FormScope, page_token: Option<&str>) -> Result<Url> {
        let mut url = self.collection_url(scope, None)?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("pageSize", &self.page_size.to_string());
            query.append_pair("mask.fieldPaths", "__name__");
            if let Some(token) = page_token {
                query.append_pair("pageToken", token);
            }
        }
        Ok(url)
    }

    async fn list_page(
        &self,
        scope: &FormScope,
        page_token: Option<&str>,
    ) -> Result<ListDocumentsResponse> {
        let url = self.list_url(scope, page_token)?;

        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer().await?)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::record_fetch(
                scope.collection_path(),
                format!("Listing failed ({}): {}", status, body),
            ));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl RecordStoreProvider for FirestoreRecordStore {
    async fn list_record_ids(&self, scope: &FormScope) -> Result<Vec<RecordId>> {
        // Firestore has no notion of an empty collection, so an unknown form
        // lists as empty rather than FormNotFound
        let mut ids = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page = self.list_page(scope, page_token.as_deref()).await?;
            ids.extend(
                page.documents
                    .iter()
                    .filter_map(|doc| document_id(&doc.name))
                    .map(RecordId::from),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        tracing::debug!("Listed {} records under {}", ids.len(), scope.collection_path());
        Ok(ids)
    }

    async fn get_record(&self, scope: &FormScope, id: &RecordId) -> Result<Record> {
        let url = self.collection_url(scope, Some(id))?;

        let response = self
            .http
            .get(url)
            .header(reqwest::header::AUTHORIZATION, self.auth.bearer().await?)
            .send()
            .await
            .map_err(|e| Error::record_fetch(id.as_str(), e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => return Err(Error::RecordNotFound(id.to_string())),
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::record_fetch(
                    id.as_str(),
                    format!("Firestore returned {}: {}", status, body),
                ));
            }
            _ => {}
        }

        let document: FirestoreDocument = response
            .json()
            .await
            .map_err(|e| Error::record_fetch(id.as_str(), format!("Invalid document: {}", e)))?;

        Ok(Record {
            id: id.clone(),
            fields: document.fields,
        })
    }

    async fn health_check(&self) -> Result<bool> {
        self.auth.get_token().await.map(|_| true)
    }

    fn name(&self) -> &str {
        "firestore"
    }
}
