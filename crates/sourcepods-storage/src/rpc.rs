//! Smart protocol, second round trip: one stateless-RPC exchange.
//!
//! The (possibly compressed) request body is fed to
//! `git <service> --stateless-rpc .`, stdin is closed, and everything git
//! writes to stdout becomes the response body. The stages run strictly in
//! order and the first failure aborts the rest, kills git and answers 500.
//!
//! The response is held in memory until git exits, so a single exchange costs
//! as much RAM as the pack it returns.

use async_compression::tokio::bufread::{DeflateDecoder, GzipDecoder};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, Response, StatusCode},
    Extension,
};
use futures_util::TryStreamExt;
use sourcepods_git::Service;
use std::fmt;
use std::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio_util::io::StreamReader;

use crate::api::AppState;
use crate::error::ApiError;
use crate::process::{reap, with_deadline, BoxedReader, ProcessError, Subprocess};
use crate::validation::RepoPath;

/// Stage of the exchange that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStage {
    /// Spawning git.
    Start,
    /// Taking git's stdin.
    StdinPipe,
    /// Taking git's stdout.
    StdoutPipe,
    /// Copying the decoded request body into stdin.
    CopyRequest,
    /// Copying stdout into the response buffer.
    CopyResponse,
    /// Waiting for git to exit successfully.
    Wait,
    /// The configured deadline passed.
    Deadline,
}

impl fmt::Display for RelayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RelayStage::Start => "failed to start git",
            RelayStage::StdinPipe => "failed to create pipe to git's stdin",
            RelayStage::StdoutPipe => "failed to create pipe to git's stdout",
            RelayStage::CopyRequest => "failed to copy request to git's stdin",
            RelayStage::CopyResponse => "failed to copy git's stdout to response",
            RelayStage::Wait => "failed to wait for git",
            RelayStage::Deadline => "git did not finish in time",
        })
    }
}

/// `Content-Encoding` of a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    /// gzip member format.
    Gzip,
    /// Raw DEFLATE.
    Deflate,
    /// Uncompressed.
    Identity,
}

impl ContentEncoding {
    /// Picks the decoder for `headers`. Unknown encodings are read as-is.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers.get(header::CONTENT_ENCODING) else {
            return ContentEncoding::Identity;
        };

        match value.to_str().map(str::trim) {
            Ok(v) if v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip") => {
                ContentEncoding::Gzip
            }
            Ok(v) if v.eq_ignore_ascii_case("deflate") => ContentEncoding::Deflate,
            Ok(v) if v.is_empty() || v.eq_ignore_ascii_case("identity") => {
                ContentEncoding::Identity
            }
            _ => {
                tracing::debug!(encoding = ?value, "unknown content encoding, reading as identity");
                ContentEncoding::Identity
            }
        }
    }

    /// Wraps `body` in the matching decoder.
    pub fn decode(self, body: Body) -> BoxedReader {
        let stream = body.into_data_stream().map_err(io::Error::other);
        let reader = StreamReader::new(stream);

        match self {
            ContentEncoding::Gzip => Box::pin(GzipDecoder::new(BufReader::new(reader))),
            ContentEncoding::Deflate => Box::pin(DeflateDecoder::new(BufReader::new(reader))),
            ContentEncoding::Identity => Box::pin(reader),
        }
    }
}

/// Feeds `input` to `child` and collects its output.
///
/// Stdin is closed before stdout is read, and the exit status is checked
/// last. The caller reaps `child` if this fails.
pub async fn relay(
    child: &mut dyn Subprocess,
    mut input: BoxedReader,
) -> Result<Vec<u8>, (RelayStage, ProcessError)> {
    let mut stdin = child
        .take_stdin()
        .ok_or((RelayStage::StdinPipe, ProcessError::MissingPipe("stdin")))?;
    let mut stdout = child
        .take_stdout()
        .ok_or((RelayStage::StdoutPipe, ProcessError::MissingPipe("stdout")))?;

    let copied = tokio::io::copy(&mut input, &mut stdin)
        .await
        .map_err(|e| (RelayStage::CopyRequest, ProcessError::Io(e)))?;
    stdin
        .shutdown()
        .await
        .map_err(|e| (RelayStage::CopyRequest, ProcessError::Io(e)))?;
    drop(stdin);

    let mut output = Vec::new();
    stdout
        .read_to_end(&mut output)
        .await
        .map_err(|e| (RelayStage::CopyResponse, ProcessError::Io(e)))?;

    child.wait().await.map_err(|e| (RelayStage::Wait, e))?;

    tracing::debug!(request_bytes = copied, response_bytes = output.len(), "RPC finished");
    Ok(output)
}

/// POST `/{owner}/{name}/git-{service}`
#[tracing::instrument(name = "githttp.service_rpc", skip_all, fields(owner = %repo.owner, name = %repo.name, service = %service))]
pub async fn service_rpc(
    State(state): State<AppState>,
    Path(repo): Path<RepoPath>,
    Extension(service): Extension<Service>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response<Body>, ApiError> {
    let dir = state.repos.repo_dir(&repo.owner, &repo.name).map_err(|e| {
        let err = ApiError::from(e);
        err.log("rpc");
        err
    })?;

    let input = ContentEncoding::from_headers(&headers).decode(body);

    let mut child = state
        .invoker
        .spawn(&service.rpc_args(), &dir)
        .map_err(|source| fail(RelayStage::Start, source))?;

    let outcome = match with_deadline(state.timeouts.rpc, relay(child.as_mut(), input)).await {
        Ok(outcome) => outcome,
        Err(e) => Err((RelayStage::Deadline, e)),
    };

    let output = match outcome {
        Ok(output) => output,
        Err((stage, source)) => {
            reap(child.as_mut()).await;
            return Err(fail(stage, source));
        }
    };

    Ok(Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, service.result_content_type())
        .body(Body::from(output))?)
}

fn fail(stage: RelayStage, source: ProcessError) -> ApiError {
    tracing::warn!(error = %source, "{stage}");
    ApiError::Relay { stage, source }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use flate2::write::{DeflateEncoder, GzEncoder};
    use flate2::Compression;
    use std::io::Write;

    fn headers(encoding: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(encoding));
        headers
    }

    async fn read_all(mut reader: BoxedReader) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await?;
        Ok(out)
    }

    #[test]
    fn test_encoding_selection() {
        assert_eq!(ContentEncoding::from_headers(&HeaderMap::new()), ContentEncoding::Identity);
        assert_eq!(ContentEncoding::from_headers(&headers("gzip")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_headers(&headers("GZIP")), ContentEncoding::Gzip);
        assert_eq!(ContentEncoding::from_headers(&headers("deflate")), ContentEncoding::Deflate);
        assert_eq!(ContentEncoding::from_headers(&headers("br")), ContentEncoding::Identity);
    }

    #[tokio::test]
    async fn test_decodes_gzip() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"0032want 0123456789abcdef\n00000009done\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = read_all(ContentEncoding::Gzip.decode(Body::from(compressed)))
            .await
            .unwrap();
        assert_eq!(decoded, b"0032want 0123456789abcdef\n00000009done\n");
    }

    #[tokio::test]
    async fn test_decodes_raw_deflate() {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"0009done\n").unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = read_all(ContentEncoding::Deflate.decode(Body::from(compressed)))
            .await
            .unwrap();
        assert_eq!(decoded, b"0009done\n");
    }

    #[tokio::test]
    async fn test_corrupt_gzip_is_an_error() {
        let result = read_all(ContentEncoding::Gzip.decode(Body::from("not gzip"))).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_stage_messages() {
        assert_eq!(RelayStage::Start.to_string(), "failed to start git");
        assert_eq!(
            RelayStage::CopyResponse.to_string(),
            "failed to copy git's stdout to response"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relay_through_cat() {
        use crate::process::{GitInvoker, ProcessInvoker};

        let mut child = GitInvoker::new("cat")
            .spawn(&[], &std::env::temp_dir())
            .unwrap();
        let input: BoxedReader = Box::pin(std::io::Cursor::new(b"0009done\n".to_vec()));

        let output = relay(child.as_mut(), input).await.unwrap();
        assert_eq!(output, b"0009done\n");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_relay_reports_exit_status() {
        use crate::process::{GitInvoker, ProcessInvoker};

        let mut child = GitInvoker::new("false")
            .spawn(&[], &std::env::temp_dir())
            .unwrap();
        let input: BoxedReader = Box::pin(std::io::Cursor::new(Vec::new()));

        let (stage, err) = relay(child.as_mut(), input).await.unwrap_err();
        assert_eq!(stage, RelayStage::Wait);
        assert!(matches!(err, ProcessError::Exit { code: Some(1) }));
    }
}
