//! Smart protocol, first round trip: the refs advertisement.
//!
//! `GET info/refs?service=git-<service>` runs
//! `git <service> --stateless-rpc --advertise-refs .` and prefixes its output
//! with the framed service announcement and a flush packet. The output is
//! buffered in full under a deadline, so a failure can still be answered
//! with a clean 500 and no partial preamble.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Response, StatusCode},
    Extension,
};
use sourcepods_git::{PktLineWriter, Service};
use std::path::Path as FsPath;
use std::time::Duration;
use tokio::io::AsyncReadExt;

use crate::api::AppState;
use crate::error::ApiError;
use crate::process::{reap, with_deadline, ProcessError, ProcessInvoker};
use crate::validation::RepoPath;

/// Runs the advertisement for `service` in `dir` and returns its output.
///
/// The subprocess is killed and reaped on every failure, including expiry
/// of `deadline`.
pub async fn advertise_refs(
    invoker: &dyn ProcessInvoker,
    service: Service,
    dir: &FsPath,
    deadline: Duration,
) -> Result<Vec<u8>, ProcessError> {
    let mut child = invoker.spawn(&service.advertise_args(), dir)?;

    // Nothing is sent to git in this mode.
    drop(child.take_stdin());

    let Some(mut stdout) = child.take_stdout() else {
        reap(child.as_mut()).await;
        return Err(ProcessError::MissingPipe("stdout"));
    };

    let result = with_deadline(Some(deadline), async {
        let mut refs = Vec::new();
        stdout.read_to_end(&mut refs).await?;
        child.wait().await?;
        Ok::<_, ProcessError>(refs)
    })
    .await
    .and_then(|refs| refs);

    if result.is_err() {
        reap(child.as_mut()).await;
    }
    result
}

/// Builds the advertisement body: announcement, flush, then `refs`.
pub fn advertisement(service: Service, refs: &[u8]) -> sourcepods_git::Result<Vec<u8>> {
    let mut writer = PktLineWriter::new(Vec::with_capacity(refs.len() + 64));
    writer.write_text(&service.announcement())?;
    writer.write_flush()?;

    let mut body = writer.finish()?;
    body.extend_from_slice(refs);
    Ok(body)
}

/// GET `/{owner}/{name}/info/refs`
#[tracing::instrument(name = "githttp.info_refs", skip_all, fields(owner = %repo.owner, name = %repo.name, service = %service))]
pub async fn info_refs(
    State(state): State<AppState>,
    Path(repo): Path<RepoPath>,
    Extension(service): Extension<Service>,
) -> Result<Response<Body>, ApiError> {
    let dir = state.repos.repo_dir(&repo.owner, &repo.name).map_err(|e| {
        let err = ApiError::from(e);
        err.log("info/refs");
        err
    })?;

    let refs = advertise_refs(state.invoker.as_ref(), service, &dir, state.timeouts.advertise)
        .await
        .map_err(|e| {
            tracing::warn!(error = %e, "failed to get refs");
            ApiError::Advertise(e)
        })?;

    let body = advertisement(service, &refs)?;

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, service.advertisement_content_type())
        .body(Body::from(body))?)
}
