//! # Request Validation
//!
//! Everything a request supplies is checked here before a handler can act
//! on it:
//!
//! - object paths must be lowercase hex of the exact length git uses,
//! - pack names must be `pack-<40 hex>.idx` or `pack-<40 hex>.pack`,
//! - free-form segments must name a single directory entry,
//! - the smart HTTP service must be one of the two allowed names.
//!
//! Path checks are extractors whose rejection is an empty 404, so a
//! malformed URL behaves exactly like an unknown route and never reaches the
//! handler body. The service check is middleware so it can guard both the
//! `info/refs` query form and the `git-{service}` path form.

use axum::{
    extract::{FromRequestParts, Path, Query, Request},
    http::{request::Parts, StatusCode, Uri},
    middleware::Next,
    response::{IntoResponse, Response},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use sourcepods_git::Service;
use std::collections::HashMap;

use crate::error::ApiError;
use crate::repo::check_segment;

/// Two hex digit fan-out directory of a loose object.
pub static LOOSE_DIR_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{2}$").expect("Invalid regex"));

/// Remaining 38 hex digits of a loose object id.
pub static LOOSE_FILE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{38}$").expect("Invalid regex"));

/// Pack index or pack data file name.
pub static PACK_FILE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^pack-([0-9a-f]{40})\.(idx|pack)$").expect("Invalid regex"));

/// Route parameter holding `git-{service}` on the RPC endpoint.
pub const RPC_PARAM: &str = "rpc";

const SERVICE_PREFIX: &str = "git-";

/// Rejection for requests that do not match any route.
///
/// Logged at debug level and answered with an empty 404.
#[derive(Debug)]
pub struct RouteMismatch {
    path: String,
}

impl RouteMismatch {
    /// Creates a mismatch for `uri`.
    pub fn new(uri: &Uri) -> Self {
        Self {
            path: uri.to_string(),
        }
    }
}

impl IntoResponse for RouteMismatch {
    fn into_response(self) -> Response {
        tracing::debug!(path = %self.path, "not found");
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Fallback handler for unmatched routes.
pub async fn not_found(uri: Uri) -> RouteMismatch {
    RouteMismatch::new(&uri)
}

/// Owner and name of a repository, taken from the route.
#[derive(Debug, Clone, Deserialize)]
pub struct RepoPath {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

async fn path_params<S: Send + Sync>(
    parts: &mut Parts,
    state: &S,
) -> Result<HashMap<String, String>, RouteMismatch> {
    Path::<HashMap<String, String>>::from_request_parts(parts, state)
        .await
        .map(|Path(params)| params)
        .map_err(|_| RouteMismatch::new(&parts.uri))
}

fn repo_from(params: &HashMap<String, String>) -> Option<RepoPath> {
    Some(RepoPath {
        owner: params.get("owner")?.clone(),
        name: params.get("name")?.clone(),
    })
}

/// `objects/{folder}/{file}` of a loose object.
#[derive(Debug, Clone)]
pub struct LooseObjectPath {
    /// Repository the object belongs to.
    pub repo: RepoPath,
    /// First two hex digits.
    pub folder: String,
    /// Remaining 38 hex digits.
    pub file: String,
}

impl LooseObjectPath {
    /// Path relative to the repository directory.
    pub fn relative(&self) -> String {
        format!("objects/{}/{}", self.folder, self.file)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for LooseObjectPath {
    type Rejection = RouteMismatch;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let mut params = path_params(parts, state).await?;
        let repo = repo_from(&params).ok_or_else(|| RouteMismatch::new(&parts.uri))?;
        let folder = params.remove("folder").unwrap_or_default();
        let file = params.remove("file").unwrap_or_default();

        if !LOOSE_DIR_REGEX.is_match(&folder) || !LOOSE_FILE_REGEX.is_match(&file) {
            return Err(RouteMismatch::new(&parts.uri));
        }

        Ok(Self { repo, folder, file })
    }
}

/// Which half of a pack is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackKind {
    /// `.idx` table of contents.
    Index,
    /// `.pack` data.
    Data,
}

impl PackKind {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            PackKind::Index => "idx",
            PackKind::Data => "pack",
        }
    }

    /// Media type the file is served with.
    pub fn content_type(self) -> &'static str {
        match self {
            PackKind::Index => "application/x-git-packed-objects-toc",
            PackKind::Data => "application/x-git-packed-objects",
        }
    }
}

/// `objects/pack/pack-{hash}.{idx,pack}`.
#[derive(Debug, Clone)]
pub struct PackPath {
    /// Repository the pack belongs to.
    pub repo: RepoPath,
    /// 40 hex digit pack hash.
    pub hash: String,
    /// Index or data.
    pub kind: PackKind,
}

impl PackPath {
    /// Path relative to the repository directory.
    pub fn relative(&self) -> String {
        format!("objects/pack/pack-{}.{}", self.hash, self.kind.extension())
    }
}

impl<S: Send + Sync> FromRequestParts<S> for PackPath {
    type Rejection = RouteMismatch;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let params = path_params(parts, state).await?;
        let repo = repo_from(&params).ok_or_else(|| RouteMismatch::new(&parts.uri))?;
        let file = params.get("pack").map(String::as_str).unwrap_or_default();

        let captures = PACK_FILE_REGEX
            .captures(file)
            .ok_or_else(|| RouteMismatch::new(&parts.uri))?;
        let kind = match &captures[2] {
            "idx" => PackKind::Index,
            _ => PackKind::Data,
        };

        Ok(Self {
            repo,
            hash: captures[1].to_string(),
            kind,
        })
    }
}

/// `objects/info/{file}` for an arbitrary info file.
#[derive(Debug, Clone)]
pub struct InfoFilePath {
    /// Repository the file belongs to.
    pub repo: RepoPath,
    /// File name under `objects/info`.
    pub file: String,
}

impl InfoFilePath {
    /// Path relative to the repository directory.
    pub fn relative(&self) -> String {
        format!("objects/info/{}", self.file)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for InfoFilePath {
    type Rejection = RouteMismatch;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let mut params = path_params(parts, state).await?;
        let repo = repo_from(&params).ok_or_else(|| RouteMismatch::new(&parts.uri))?;
        let file = params.remove("file").unwrap_or_default();

        if check_segment(&file).is_err() {
            return Err(RouteMismatch::new(&parts.uri));
        }

        Ok(Self { repo, file })
    }
}

/// Reads the `service` query parameter, stripping one `git-` prefix.
pub fn service_query(uri: &Uri) -> String {
    let value = Query::<HashMap<String, String>>::try_from_uri(uri)
        .ok()
        .and_then(|Query(mut query)| query.remove("service"))
        .unwrap_or_default();

    match value.strip_prefix(SERVICE_PREFIX) {
        Some(name) => name.to_string(),
        None => value,
    }
}

/// Middleware admitting only the allowed smart HTTP services.
///
/// The candidate comes from the `git-{service}` route segment when the route
/// has one, else from the `service` query parameter. An allowed service is
/// stored in the request extensions for the handler; anything else is
/// answered with 400 before the handler runs.
pub async fn service_allowed(
    Path(params): Path<HashMap<String, String>>,
    mut request: Request,
    next: Next,
) -> Response {
    let candidate = match params.get(RPC_PARAM) {
        Some(segment) => match segment.strip_prefix(SERVICE_PREFIX) {
            Some(name) => name.to_string(),
            None => return RouteMismatch::new(request.uri()).into_response(),
        },
        None => service_query(request.uri()),
    };

    match candidate.parse::<Service>() {
        Ok(service) => {
            request.extensions_mut().insert(service);
            next.run(request).await
        }
        Err(_) => {
            tracing::warn!(service = %candidate, "invalid service");
            ApiError::InvalidService(candidate).into_response()
        }
    }
}
