//! Import API over HTTP.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use super::{Envelope, ImportApi};
use crate::{
    config::ApiCfg,
    error::{Operation, TrackerError},
    jobs::{ImportJob, JobId, JobPage, ListQuery},
    validation::ImportFile,
};

/// `ImportApi` backed by a shared reqwest client.
#[derive(Clone, Debug)]
pub struct HttpImportApi {
    http: Client,
    /// Base URL without a trailing slash, e.g. `http://host/api/admin`.
    base_url: String,
    /// Bearer token; empty means unauthenticated.
    token: String,
}

impl HttpImportApi {
    pub fn new(http: Client, cfg: &ApiCfg) -> Self {
        Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token: cfg.token.clone(),
        }
    }

    fn jobs_url(&self) -> String {
        format!("{}/imports", self.base_url)
    }

    fn job_url(&self, job_id: &JobId) -> String {
        format!(
            "{}/imports/{}",
            self.base_url,
            urlencoding::encode(job_id.as_str())
        )
    }

    /// Attach auth when a token is configured.
    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            req
        } else {
            req.bearer_auth(&self.token)
        }
    }

    /// Send the request and decode the envelope, mapping every failure onto
    /// a `TrackerError` for `operation`.
    async fn send<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        operation: Operation,
    ) -> Result<Envelope<T>, TrackerError> {
        let resp = self
            .authed(req)
            .send()
            .await
            .map_err(|e| TrackerError::from_reqwest(operation, &e))?;
        let status = resp.status();
        tracing::debug!("{operation} -> {}", status.as_u16());
        let body = resp
            .text()
            .await
            .map_err(|e| TrackerError::from_reqwest(operation, &e))?;

        if body.trim().is_empty() {
            if status.is_success() {
                return Ok(Envelope {
                    data: None,
                    error: None,
                });
            }
            tracing::warn!("{operation} rejected with HTTP {status} and no body");
            return Err(TrackerError::api(operation, None));
        }

        match serde_json::from_str::<Envelope<T>>(&body) {
            Ok(env) if !status.is_success() && env.error.is_none() => {
                tracing::warn!("{operation} rejected with HTTP {status}");
                Err(TrackerError::api(operation, None))
            }
            Ok(env) => Ok(env),
            Err(e) if status.is_success() => Err(TrackerError::Decode {
                operation,
                message: e.to_string(),
            }),
            Err(_) => {
                tracing::warn!("{operation} rejected with HTTP {status}: {body}");
                Err(TrackerError::api(operation, None))
            }
        }
    }
}

#[async_trait]
impl ImportApi for HttpImportApi {
    async fn create_import(&self, file: &ImportFile) -> Result<JobId, TrackerError> {
        let op = Operation::CreateImport;
        let part = reqwest::multipart::Part::bytes(file.contents.clone())
            .file_name(file.file_name.clone())
            .mime_str(file.mime_type())
            .map_err(|e| TrackerError::from_reqwest(op, &e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        tracing::info!("uploading {} ({} bytes)", file.file_name, file.contents.len());
        let req = self.http.post(self.jobs_url()).multipart(form);
        self.send::<JobId>(req, op).await?.into_data(op)
    }

    async fn list_jobs(&self, query: &ListQuery) -> Result<JobPage, TrackerError> {
        let op = Operation::ListJobs;
        let mut url = format!(
            "{}?page={}&size={}&sort={}",
            self.jobs_url(),
            query.page,
            query.size,
            urlencoding::encode(&query.sort.as_param())
        );
        if let Some(status) = &query.status {
            url.push_str("&status=");
            url.push_str(&urlencoding::encode(status.as_str()));
        }
        self.send::<JobPage>(self.http.get(url), op)
            .await?
            .into_data(op)
    }

    async fn get_job(&self, job_id: &JobId) -> Result<ImportJob, TrackerError> {
        let op = Operation::GetJob;
        self.send::<ImportJob>(self.http.get(self.job_url(job_id)), op)
            .await?
            .into_data(op)
    }

    async fn cancel_job(&self, job_id: &JobId) -> Result<(), TrackerError> {
        let op = Operation::CancelJob;
        let url = format!("{}/cancel", self.job_url(job_id));
        self.send::<serde_json::Value>(self.http.post(url), op)
            .await?
            .into_unit(op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GENERIC_FAILURE;
    use crate::jobs::{JobStatus, Sort};
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Client pointing at the mock server.
    fn create_test_client(mock_url: &str, token: &str) -> HttpImportApi {
        let cfg = ApiCfg {
            base_url: format!("{mock_url}/"),
            token: token.to_string(),
        };
        HttpImportApi::new(Client::new(), &cfg)
    }

    #[tokio::test]
    async fn test_create_import_uploads_multipart() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), "test_token");

        Mock::given(method("POST"))
            .and(path("/imports"))
            .and(header("Authorization", "Bearer test_token"))
            .and(body_string_contains("filename=\"products.csv\""))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "data": 42 })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let file = ImportFile::new("products.csv", "sku,qty\nA1,3\n");
        let id = client.create_import(&file).await.unwrap();
        assert_eq!(id, JobId::from(42));
    }

    #[tokio::test]
    async fn test_create_import_surfaces_server_message() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), "");

        Mock::given(method("POST"))
            .and(path("/imports"))
            .respond_with(ResponseTemplate::new(400).set_body_json(
                serde_json::json!({ "error": { "message": "header row missing sku" } }),
            ))
            .mount(&mock_server)
            .await;

        let err = client
            .create_import(&ImportFile::new("products.csv", ""))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TrackerError::Api {
                operation: Operation::CreateImport,
                message: "header row missing sku".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_list_jobs_sends_paging_and_filter() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), "");

        let body = serde_json::json!({
            "data": {
                "content": [
                    { "id": 1, "status": "FAILED", "totalRecords": 10, "errorCount": 10 }
                ],
                "number": 1,
                "size": 5,
                "totalElements": 6,
                "totalPages": 2,
                "first": false,
                "last": true
            }
        });
        Mock::given(method("GET"))
            .and(path("/imports"))
            .and(query_param("page", "1"))
            .and(query_param("size", "5"))
            .and(query_param("sort", "createdAt,desc"))
            .and(query_param("status", "FAILED"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&body))
            .expect(1)
            .mount(&mock_server)
            .await;

        let query = ListQuery {
            page: 1,
            size: 5,
            sort: Sort::default(),
            status: Some(JobStatus::Failed),
        };
        let page = client.list_jobs(&query).await.unwrap();
        assert_eq!(page.content.len(), 1);
        assert_eq!(page.content[0].status, JobStatus::Failed);
        assert_eq!(page.consistency_issue(&query), None);
    }

    #[tokio::test]
    async fn test_get_job_decodes_progress() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), "");

        Mock::given(method("GET"))
            .and(path("/imports/42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "id": 42, "status": "PROCESSING", "totalRecords": 100, "successCount": 10 }
            })))
            .mount(&mock_server)
            .await;

        let job = client.get_job(&JobId::from(42)).await.unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.progress_percent(), Some(10));
    }

    #[tokio::test]
    async fn test_get_job_malformed_body_is_decode_error() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), "");

        Mock::given(method("GET"))
            .and(path("/imports/9"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&mock_server)
            .await;

        let err = client.get_job(&JobId::from(9)).await.unwrap_err();
        assert!(matches!(err, TrackerError::Decode { .. }));
    }

    #[tokio::test]
    async fn test_cancel_accepts_empty_body() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), "");

        Mock::given(method("POST"))
            .and(path("/imports/7/cancel"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        client.cancel_job(&JobId::from(7)).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_rejection_without_message_uses_fallback() {
        let mock_server = MockServer::start().await;
        let client = create_test_client(&mock_server.uri(), "");

        Mock::given(method("POST"))
            .and(path("/imports/7/cancel"))
            .respond_with(ResponseTemplate::new(409))
            .mount(&mock_server)
            .await;

        let err = client.cancel_job(&JobId::from(7)).await.unwrap_err();
        assert_eq!(
            err,
            TrackerError::Api {
                operation: Operation::CancelJob,
                message: GENERIC_FAILURE.into(),
            }
        );
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Nothing listens on port 1.
        let client = create_test_client("http://127.0.0.1:1", "");

        let err = client.get_job(&JobId::from(1)).await.unwrap_err();
        assert!(matches!(err, TrackerError::Transport { .. }));
    }
}
