//! Dumb protocol: repository artifacts served as static files.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, Response, StatusCode},
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio_util::io::ReaderStream;

use crate::api::AppState;
use crate::error::ApiError;
use crate::validation::{InfoFilePath, LooseObjectPath, PackPath, RepoPath};

const TEXT_PLAIN: &str = "text/plain";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";
const LOOSE_OBJECT: &str = "application/x-git-loose-object";

/// Formats `time` as an IMF-fixdate.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Streams the regular file at `path`.
///
/// Anything that cannot be stat'ed or opened, or is not a regular file, is
/// an internal error: the route already matched, so the artifact should be
/// there.
pub async fn serve_file(
    path: PathBuf,
    content_type: &'static str,
) -> Result<Response<Body>, ApiError> {
    let metadata = match tokio::fs::metadata(&path).await {
        Ok(metadata) if metadata.is_file() => metadata,
        Ok(_) => {
            return Err(ApiError::Stat {
                source: std::io::Error::other("not a regular file"),
                path,
            })
        }
        Err(source) => return Err(ApiError::Stat { path, source }),
    };

    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(source) => return Err(ApiError::Stat { path, source }),
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, HeaderValue::from_static(content_type))
        .header(header::CONTENT_LENGTH, metadata.len());

    if let Ok(modified) = metadata.modified() {
        builder = builder.header(header::LAST_MODIFIED, http_date(modified.into()));
    }

    Ok(builder.body(Body::from_stream(ReaderStream::new(file)))?)
}

async fn serve_artifact(
    state: &AppState,
    repo: &RepoPath,
    relative: &str,
    content_type: &'static str,
) -> Result<Response<Body>, ApiError> {
    let result = match state.repos.artifact(&repo.owner, &repo.name, relative) {
        Ok(path) => serve_file(path, content_type).await,
        Err(e) => Err(e.into()),
    };

    if let Err(e) = &result {
        e.log(relative);
    }
    result
}

/// GET `/{owner}/{name}/HEAD`
#[tracing::instrument(name = "githttp.head", skip_all, fields(owner = %repo.owner, name = %repo.name))]
pub async fn head(
    State(state): State<AppState>,
    Path(repo): Path<RepoPath>,
) -> Result<Response<Body>, ApiError> {
    serve_artifact(&state, &repo, "HEAD", TEXT_PLAIN).await
}

/// GET `/{owner}/{name}/objects/info/{file}`
#[tracing::instrument(name = "githttp.info_file", skip_all, fields(owner = %info.repo.owner, name = %info.repo.name, file = %info.file))]
pub async fn info_file(
    State(state): State<AppState>,
    info: InfoFilePath,
) -> Result<Response<Body>, ApiError> {
    serve_artifact(&state, &info.repo, &info.relative(), TEXT_PLAIN).await
}

/// GET `/{owner}/{name}/objects/info/alternates`
#[tracing::instrument(name = "githttp.alternates", skip_all, fields(owner = %repo.owner, name = %repo.name))]
pub async fn alternates(
    State(state): State<AppState>,
    Path(repo): Path<RepoPath>,
) -> Result<Response<Body>, ApiError> {
    serve_artifact(&state, &repo, "objects/info/alternates", TEXT_PLAIN).await
}

/// GET `/{owner}/{name}/objects/info/http-alternates`
#[tracing::instrument(name = "githttp.http_alternates", skip_all, fields(owner = %repo.owner, name = %repo.name))]
pub async fn http_alternates(
    State(state): State<AppState>,
    Path(repo): Path<RepoPath>,
) -> Result<Response<Body>, ApiError> {
    serve_artifact(&state, &repo, "objects/info/http-alternates", TEXT_PLAIN).await
}

/// GET `/{owner}/{name}/objects/info/packs`
#[tracing::instrument(name = "githttp.info_packs", skip_all, fields(owner = %repo.owner, name = %repo.name))]
pub async fn info_packs(
    State(state): State<AppState>,
    Path(repo): Path<RepoPath>,
) -> Result<Response<Body>, ApiError> {
    serve_artifact(&state, &repo, "objects/info/packs", TEXT_PLAIN_UTF8).await
}

/// GET `/{owner}/{name}/objects/{folder}/{file}`
#[tracing::instrument(name = "githttp.loose_object", skip_all, fields(owner = %object.repo.owner, name = %object.repo.name, folder = %object.folder, file = %object.file))]
pub async fn loose_object(
    State(state): State<AppState>,
    object: LooseObjectPath,
) -> Result<Response<Body>, ApiError> {
    serve_artifact(&state, &object.repo, &object.relative(), LOOSE_OBJECT).await
}

/// GET `/{owner}/{name}/objects/pack/pack-{hash}.{idx,pack}`
#[tracing::instrument(name = "githttp.pack_file", skip_all, fields(owner = %pack.repo.owner, name = %pack.repo.name, pack = %pack.hash))]
pub async fn pack_file(
    State(state): State<AppState>,
    pack: PackPath,
) -> Result<Response<Body>, ApiError> {
    serve_artifact(&state, &pack.repo, &pack.relative(), pack.kind.content_type()).await
}
