//! Conversions from transport errors into the HTTP error and the core port
//! errors.

use cpdbatch_core::catalog::CatalogError;
use cpdbatch_core::jobs::JobApiError;
use reqwest::Error as ReqwestError;

use crate::http::HttpError;

/* -------------------------------------------------------------------------- */
/* reqwest::Error → HttpError */
/* -------------------------------------------------------------------------- */

impl From<ReqwestError> for HttpError {
    fn from(value: ReqwestError) -> Self {
        if value.is_timeout() {
            return HttpError::Transport(format!("HTTP request timed out: {value}"));
        }
        if value.is_connect() {
            return HttpError::Transport(format!("HTTP connection failure: {value}"));
        }
        if value.is_builder() {
            return HttpError::InvalidRequest(value.to_string());
        }
        if value.is_decode() {
            return HttpError::Decode(value.to_string());
        }
        HttpError::Transport(value.to_string())
    }
}

/* -------------------------------------------------------------------------- */
/* HttpError → port errors */
/* -------------------------------------------------------------------------- */

impl From<HttpError> for JobApiError {
    fn from(value: HttpError) -> Self {
        match value {
            HttpError::Transport(msg) => JobApiError::Transport(msg),
            HttpError::Decode(msg) => JobApiError::InvalidResponse(msg),
            other => JobApiError::Client(other.to_string()),
        }
    }
}

impl From<HttpError> for CatalogError {
    fn from(value: HttpError) -> Self {
        match value {
            HttpError::Transport(msg) => CatalogError::Transport(msg),
            HttpError::Decode(msg) => CatalogError::InvalidResponse(msg),
            other => CatalogError::Client(other.to_string()),
        }
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
