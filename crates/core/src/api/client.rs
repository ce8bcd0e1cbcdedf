//! Dataset service REST client.

use std::path::Path;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::api::DatasetService;
use crate::comparison::{ComparisonPayload, ComparisonResult};
use crate::config::ApiConfig;
use crate::credential::Credential;
use crate::errors::{ComparisonError, MergeError, TransportError};
use crate::models::{FileInfo, UploadKind, User};
use crate::reconcile::MergePatch;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AuthRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct AuthResponse {
    token: String,
    user: User,
}

#[derive(Deserialize)]
struct UploadResponse {
    file: FileInfo,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CompareRequest<'a> {
    original_id: &'a str,
    compare_id: &'a str,
}

#[derive(Deserialize)]
struct CompareResponse {
    comparison: ComparisonPayload,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    original_id: &'a str,
    changes: &'a MergePatch,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResponse {
    update_result: Option<UpdateResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateResult {
    new_file_id: Option<String>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Asynchronous dataset service client.
///
/// The bearer credential is held explicitly: it is set by [`login`],
/// [`register`] or [`set_credential`], and cleared by [`logout`] or by any
/// `401` answer to an authenticated request.
///
/// [`login`]: Self::login
/// [`register`]: Self::register
/// [`set_credential`]: Self::set_credential
/// [`logout`]: Self::logout
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    credential: Option<Credential>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("csvreconcile/0.1"));
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()?;
        info!(base_url = %base_url, "created ApiClient");
        Ok(Self {
            http,
            base_url,
            credential: None,
        })
    }

    /// Build a client from configuration, picking up a token resolved from
    /// `api.token_env`.
    pub fn from_config(config: &ApiConfig) -> Result<Self, TransportError> {
        let mut client = Self::new(&config.base_url, Duration::from_secs(config.timeout_secs))?;
        if let Some(ref token) = config.token {
            client.set_credential(Credential::new(token.clone()));
        }
        Ok(client)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some()
    }

    pub fn set_credential(&mut self, credential: Credential) {
        self.credential = Some(credential);
    }

    /// Forget the credential locally.
    pub fn logout(&mut self) {
        if self.credential.take().is_some() {
            info!("logged out");
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn bearer(&self) -> Result<&str, TransportError> {
        self.credential
            .as_ref()
            .map(Credential::token)
            .ok_or(TransportError::NotAuthenticated)
    }

    /// Map a response to an error unless it is a success. A `401` on an
    /// authenticated request drops the credential.
    async fn check_response(
        &mut self,
        resp: Response,
        authenticated: bool,
    ) -> Result<Response, TransportError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if authenticated && status == StatusCode::UNAUTHORIZED {
            warn!("service rejected credential, clearing it");
            self.credential = None;
            return Err(TransportError::Unauthorized);
        }

        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| {
                if body.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("unknown error")
                        .to_string()
                } else {
                    body
                }
            });
        warn!(status = %status, message = %message, "service returned error");
        Err(TransportError::Api {
            status: status.as_u16(),
            message,
        })
    }

    // -- Auth -----------------------------------------------------------------

    async fn authenticate(
        &mut self,
        path: &str,
        username: &str,
        password: &str,
    ) -> Result<User, TransportError> {
        let resp = self
            .http
            .post(self.url(path))
            .json(&AuthRequest { username, password })
            .send()
            .await?;
        let resp = self.check_response(resp, false).await?;
        let auth: AuthResponse = resp.json().await?;
        self.credential = Some(Credential::new(auth.token));
        info!(username = %auth.user.username, "authenticated");
        Ok(auth.user)
    }

    /// Log in and keep the returned credential.
    #[instrument(skip(self, password))]
    pub async fn login(&mut self, username: &str, password: &str) -> Result<User, TransportError> {
        self.authenticate("/auth/login", username, password).await
    }

    /// Create an account and keep the returned credential.
    #[instrument(skip(self, password))]
    pub async fn register(&mut self, username: &str, password: &str) -> Result<User, TransportError> {
        self.authenticate("/auth/register", username, password).await
    }

    /// The account the current credential belongs to.
    #[instrument(skip(self))]
    pub async fn current_user(&mut self) -> Result<User, TransportError> {
        let resp = self
            .http
            .get(self.url("/auth/me"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        let resp = self.check_response(resp, true).await?;
        let user: User = resp.json().await?;
        debug!(username = %user.username, "fetched current user");
        Ok(user)
    }

    // -- Files ----------------------------------------------------------------

    /// Upload a file from disk. The type check happens before the file is
    /// read.
    #[instrument(skip(self))]
    pub async fn upload_path(&mut self, path: &Path, is_original: bool) -> Result<FileInfo, TransportError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TransportError::UnsupportedFileType(path.display().to_string()))?
            .to_string();
        if UploadKind::from_file_name(&name).is_none() {
            return Err(TransportError::UnsupportedFileType(name));
        }
        let bytes = tokio::fs::read(path).await?;
        self.upload_file(&name, bytes, is_original).await
    }
}

impl DatasetService for ApiClient {
    #[instrument(skip(self))]
    async fn list_files(&mut self) -> Result<Vec<FileInfo>, TransportError> {
        let resp = self
            .http
            .get(self.url("/csv/files"))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        let resp = self.check_response(resp, true).await?;
        let files: Vec<FileInfo> = resp.json().await?;
        debug!(count = files.len(), "fetched files");
        Ok(files)
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn upload_file(
        &mut self,
        name: &str,
        bytes: Vec<u8>,
        is_original: bool,
    ) -> Result<FileInfo, TransportError> {
        let kind = UploadKind::from_file_name(name)
            .ok_or_else(|| TransportError::UnsupportedFileType(name.to_string()))?;
        let part = Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(kind.mime_type())?;
        let form = Form::new()
            .part("file", part)
            .text("isOriginal", is_original.to_string());

        let resp = self
            .http
            .post(self.url("/csv/upload"))
            .bearer_auth(self.bearer()?)
            .multipart(form)
            .send()
            .await?;
        let resp = self.check_response(resp, true).await?;
        let uploaded: UploadResponse = resp.json().await?;
        info!(id = %uploaded.file.id, "uploaded file");
        Ok(uploaded.file)
    }

    #[instrument(skip(self))]
    async fn download_file(&mut self, id: &str) -> Result<Vec<u8>, TransportError> {
        let resp = self
            .http
            .get(self.url(&format!("/csv/download/{}", id)))
            .bearer_auth(self.bearer()?)
            .send()
            .await?;
        let resp = self.check_response(resp, true).await?;
        let bytes = resp.bytes().await?;
        debug!(len = bytes.len(), "downloaded file");
        Ok(bytes.to_vec())
    }

    #[instrument(skip(self))]
    async fn compare(
        &mut self,
        original_id: &str,
        candidate_id: &str,
    ) -> Result<ComparisonResult, ComparisonError> {
        let body = CompareRequest {
            original_id,
            compare_id: candidate_id,
        };
        let resp = self
            .http
            .post(self.url("/csv/compare"))
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(TransportError::from)?;
        let resp = self.check_response(resp, true).await?;
        let compared: CompareResponse = resp.json().await.map_err(TransportError::from)?;
        ComparisonResult::try_from(compared.comparison)
    }

    #[instrument(skip(self, patch), fields(units = patch.unit_count()))]
    async fn apply_merge_patch(
        &mut self,
        original_id: &str,
        patch: &MergePatch,
    ) -> Result<String, MergeError> {
        let body = UpdateRequest {
            original_id,
            changes: patch,
        };
        let resp = self
            .http
            .post(self.url("/csv/update"))
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(TransportError::from)?;
        let resp = self.check_response(resp, true).await?;
        let updated: UpdateResponse = resp.json().await.map_err(TransportError::from)?;
        let new_file_id = updated
            .update_result
            .and_then(|r| r.new_file_id)
            .ok_or(MergeError::MissingFileId)?;
        info!(new_file_id = %new_file_id, "merge patch applied");
        Ok(new_file_id)
    }
}
