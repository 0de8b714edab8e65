//! Dataset generation endpoint

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::state::AppState;

pub const DATASET_PATH_HEADER: HeaderName = HeaderName::from_static("x-dataset-path");
pub const SKIPPED_REFERENCES_HEADER: HeaderName = HeaderName::from_static("x-skipped-references");

/// Query parameters for `GET /generate-dataset`
#[derive(Debug, Deserialize)]
pub struct DatasetQuery {
    pub project_id: Option<String>,
    pub form_id: Option<String>,
}

fn required(value: Option<String>, name: &str) -> Result<String> {
    match value {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::InvalidRequest(format!("missing query parameter '{}'", name))),
    }
}

/// Export one form and publish the archive
pub async fn generate_dataset(
    State(state): State<AppState>,
    query: std::result::Result<Query<DatasetQuery>, QueryRejection>,
) -> Result<impl IntoResponse> {
    let Query(query) = query.map_err(|rejection| Error::InvalidRequest(rejection.body_text()))?;
    let project_id = required(query.project_id, "project_id")?;
    let form_id = required(query.form_id, "form_id")?;

    let report = state.exporter().export(&project_id, &form_id).await?;

    let mut headers = HeaderMap::new();
    if let Ok(path) = HeaderValue::from_str(&report.object_path) {
        headers.insert(DATASET_PATH_HEADER, path);
    }
    if !report.skipped_references.is_empty() {
        headers.insert(
            SKIPPED_REFERENCES_HEADER,
            HeaderValue::from(report.skipped_references.len()),
        );
    }

    Ok((StatusCode::OK, headers, "Dataset generation succeeded"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExportConfig, MissingReferencePolicy};
    use crate::providers::memory::{MemoryObjectStore, MemoryRecordStore};
    use crate::server::routes::api_routes;
    use crate::types::{FormScope, Record};
    use axum::{body::Body, http::Request, Router};
    use bytes::Bytes;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(config: ExportConfig) -> (Router, Arc<MemoryRecordStore>, Arc<MemoryObjectStore>) {
        let records = Arc::new(MemoryRecordStore::new());
        let objects = Arc::new(MemoryObjectStore::new());
        let state = AppState::with_providers(config, records.clone(), objects.clone());
        (api_routes().with_state(state), records, objects)
    }

    async fn get(router: Router, uri: &str) -> (StatusCode, HeaderMap, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, headers, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_generate_dataset_success() {
        let (router, records, objects) = app(ExportConfig::default());
        let scope = FormScope::new("p1", "f1");
        records.insert(&scope, Record::new("r1").with_field("photo", "a.jpg"));
        objects.put("private/images/a.jpg", Bytes::from_static(b"jpeg"));

        let (status, headers, body) = get(router, "/generate-dataset?project_id=p1&form_id=f1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "Dataset generation succeeded");
        assert_eq!(headers[DATASET_PATH_HEADER], "public/downloads/p1_f1.zip");
        assert!(objects.get("public/downloads/p1_f1.zip").is_some());
    }

    #[tokio::test]
    async fn test_missing_parameters() {
        for uri in [
            "/generate-dataset",
            "/generate-dataset?project_id=p1",
            "/generate-dataset?form_id=f1",
            "/generate-dataset?project_id=&form_id=f1",
        ] {
            let (router, _, _) = app(ExportConfig::default());
            let (status, _, body) = get(router, uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
            assert_eq!(body, "Invalid Request");
        }
    }

    #[tokio::test]
    async fn test_malformed_query_is_invalid_request() {
        let (router, _, objects) = app(ExportConfig::default());
        let (status, _, body) = get(
            router,
            "/generate-dataset?project_id=a&project_id=b&form_id=f1",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Invalid Request");
        assert!(objects.paths().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_form_is_404() {
        let (router, _, _) = app(ExportConfig::default());
        let (status, _, body) = get(router, "/generate-dataset?project_id=p1&form_id=missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Form Not Found");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_missing_reference_is_502() {
        let (router, records, objects) = app(ExportConfig::default());
        records.insert(&FormScope::new("p1", "f1"), Record::new("r1").with_field("photo", "gone.jpg"));

        let (status, _, body) = get(router, "/generate-dataset?project_id=p1&form_id=f1").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body, "Reference Fetch Error");
        assert!(objects.paths().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_skipped_references_header() {
        let mut config = ExportConfig::default();
        config.export.missing_references = MissingReferencePolicy::Skip;
        let (router, records, _) = app(config);
        records.insert(&FormScope::new("p1", "f1"), Record::new("r1").with_field("photo", "gone.jpg"));

        let (status, headers, _) = get(router, "/generate-dataset?project_id=p1&form_id=f1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers[SKIPPED_REFERENCES_HEADER], "1");
    }
}
