use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Method, Request, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ControlState;
use crate::rules::{normalize_service, ReloadError};
use crate::storage::{Storage, StorageError};
use crate::template::{decode_path, FormValues, Template};

/// Reports the redirect listener port so a UI can build links.
pub const X_REDIR_PORT: HeaderName = HeaderName::from_static("x-redir-port");

const FIELD_SERVICE: &str = "service";
const FIELD_TEMPLATE: &str = "template";
const MAX_BODY: usize = 1024 * 1024;

/// One rule as seen by control API clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlEntry {
    #[serde(default)]
    pub template: String,
    #[serde(default, skip_deserializing)]
    pub hits: u64,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    BadRequest(String),

    #[error("404 page not found")]
    NotFound,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Reload(#[from] ReloadError),

    #[error("{0}")]
    Encode(#[from] serde_json::Error),

    #[error("rule update aborted: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IntoResponse for ControlError {
    fn into_response(self) -> Response {
        let status = match &self {
            ControlError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ControlError::NotFound => StatusCode::NOT_FOUND,
            ControlError::Storage(_)
            | ControlError::Reload(_)
            | ControlError::Encode(_)
            | ControlError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "Control request failed");
        }
        (status, self.to_string()).into_response()
    }
}

/// Dispatch on method for everything under `/api/`.
pub async fn api(State(state): State<ControlState>, request: Request<Body>) -> Result<Response, ControlError> {
    let path = decode_path(request.uri().path());
    let service = normalize_service(path.strip_prefix("/api").unwrap_or(&path)).to_string();

    match request.method().clone() {
        Method::GET if service.is_empty() => list(&state),
        Method::GET => get(&state, &service),
        Method::POST | Method::PUT | Method::PATCH => set(&state, service, request).await,
        Method::DELETE => remove(&state, service).await,
        _ => list(&state),
    }
}

/// `/` sends browsers to the UI.
pub async fn root() -> axum::response::Redirect {
    axum::response::Redirect::temporary("ui/")
}

fn list(state: &ControlState) -> Result<Response, ControlError> {
    let entries: BTreeMap<String, ControlEntry> = state
        .storage
        .all()?
        .into_iter()
        .map(|rule| {
            let entry = ControlEntry {
                hits: state.stats.visits(&rule.service),
                template: rule.location_template,
                url: rule.service.clone(),
            };
            (rule.service, entry)
        })
        .collect();
    send_json(state, &entries)
}

fn get(state: &ControlState, service: &str) -> Result<Response, ControlError> {
    let template = state.storage.get(service).ok_or(ControlError::NotFound)?;
    send_json(
        state,
        &ControlEntry {
            template,
            hits: state.stats.visits(service),
            url: service.to_string(),
        },
    )
}

async fn set(state: &ControlState, path_service: String, request: Request<Body>) -> Result<Response, ControlError> {
    let is_json = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("application/json"))
        .unwrap_or(false);
    let query = request.uri().query().unwrap_or("").to_string();
    let body = axum::body::to_bytes(request.into_body(), MAX_BODY)
        .await
        .map_err(|e| ControlError::BadRequest(e.to_string()))?;

    let entry = if is_json {
        serde_json::from_slice::<ControlEntry>(&body).map_err(|e| ControlError::BadRequest(e.to_string()))?
    } else {
        let form = FormValues::parse(&body);
        let query = FormValues::parse(query.as_bytes());
        let field = |name: &str| {
            if form.has(name) {
                form.get(name).to_string()
            } else {
                query.get(name).to_string()
            }
        };
        ControlEntry {
            url: field(FIELD_SERVICE),
            template: field(FIELD_TEMPLATE),
            hits: 0,
        }
    };

    let service = match normalize_service(&entry.url) {
        "" => path_service,
        named => named.to_string(),
    };
    if service.is_empty() {
        return Err(ControlError::BadRequest("service name is required".to_string()));
    }

    Template::compile(&service, &entry.template).map_err(|e| ControlError::BadRequest(e.to_string()))?;

    let template = entry.template;
    let service = mutate(state, move |storage| {
        storage.set(&service, &template)?;
        Ok(service)
    })
    .await?;
    tracing::info!(service = %service, "Rule saved");
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn remove(state: &ControlState, service: String) -> Result<Response, ControlError> {
    let service = mutate(state, move |storage| {
        storage.remove(&service)?;
        Ok(service)
    })
    .await?;
    tracing::info!(service = %service, "Rule removed");
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Apply a storage mutation and reload the engine on the blocking pool.
/// Both do file I/O and a full recompile.
async fn mutate<T, F>(state: &ControlState, apply: F) -> Result<T, ControlError>
where
    T: Send + 'static,
    F: FnOnce(&dyn Storage) -> Result<T, StorageError> + Send + 'static,
{
    let storage = Arc::clone(&state.storage);
    let engine = Arc::clone(&state.engine);
    tokio::task::spawn_blocking(move || -> Result<T, ControlError> {
        let value = apply(&*storage)?;
        engine.reload()?;
        Ok(value)
    })
    .await?
}

fn send_json<T: Serialize>(state: &ControlState, data: &T) -> Result<Response, ControlError> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    data.serialize(&mut serializer)?;

    let mut response = (StatusCode::OK, buf).into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json; charset=utf-8"),
    );
    if let Ok(port) = HeaderValue::from_str(&state.redirect_port) {
        headers.insert(X_REDIR_PORT, port);
    }
    Ok(response)
}
