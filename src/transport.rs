//! Client side of the Solargraph HTTP protocol.
//!
//! Two routes are used: `POST /suggest` for completion candidates and
//! `POST /resolve` for the full documentation of a path.  Both take a
//! form-encoded body and answer with JSON.  Each call is a single attempt;
//! callers decide whether to try again.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tower_lsp::lsp_types::Url;

use crate::error::{TransportError, TransportResult};
use crate::session::ServerSession;
use crate::types::{ResolveRequest, ResolveResponse, SuggestRequest, SuggestResponse};

/// Anything that can answer suggest and resolve requests.
///
/// The LSP backend only talks to this trait, so tests can script the
/// server's answers without any network.
#[tower_lsp::async_trait]
pub trait SuggestionTransport: Send + Sync {
    /// Fetch completion candidates.  A server-side failure is an `Ok`
    /// carrying [`SuggestResponse::Error`].
    async fn suggest(
        &self,
        request: SuggestRequest,
        cancel: &CancellationToken,
    ) -> TransportResult<SuggestResponse>;

    /// Fetch the documentation bundle for a path.
    async fn resolve(
        &self,
        request: ResolveRequest,
        cancel: &CancellationToken,
    ) -> TransportResult<ResolveResponse>;
}

/// [`SuggestionTransport`] over HTTP, addressed through a [`ServerSession`].
#[derive(Debug)]
pub struct HttpTransport {
    http: Client,
    session: Arc<ServerSession>,
    timeout: Option<Duration>,
}

impl HttpTransport {
    pub fn new(session: Arc<ServerSession>, timeout: Option<Duration>) -> Self {
        Self {
            http: Client::new(),
            session,
            timeout,
        }
    }

    pub fn session(&self) -> &Arc<ServerSession> {
        &self.session
    }

    fn endpoint(&self, route: &str) -> TransportResult<Url> {
        let base = self.session.endpoint().ok_or(TransportError::NotReady)?;
        base.join(route)
            .map_err(|e| TransportError::InvalidEndpoint(format!("{}{}: {}", base, route, e)))
    }

    /// POST `body` as a form to `route` and return the response text.
    async fn post<B: Serialize + ?Sized>(
        &self,
        route: &str,
        body: &B,
        cancel: &CancellationToken,
    ) -> TransportResult<String> {
        let url = self.endpoint(route)?;
        let mut builder = self.http.post(url).form(body);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let started = Instant::now();
        let fut = async {
            let response = builder.send().await.map_err(TransportError::from_reqwest)?;
            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|_| "(no body)".into());
                return Err(TransportError::Status {
                    status: status.as_u16(),
                    body,
                });
            }
            response.text().await.map_err(TransportError::from_reqwest)
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(TransportError::Cancelled),
            res = fut => res,
        };
        tracing::debug!(
            "POST /{} finished in {:?} ({})",
            route,
            started.elapsed(),
            if result.is_ok() { "ok" } else { "failed" }
        );
        result
    }
}

#[tower_lsp::async_trait]
impl SuggestionTransport for HttpTransport {
    async fn suggest(
        &self,
        request: SuggestRequest,
        cancel: &CancellationToken,
    ) -> TransportResult<SuggestResponse> {
        let body = self.post("suggest", &request, cancel).await?;
        decode_suggest(&body)
    }

    async fn resolve(
        &self,
        request: ResolveRequest,
        cancel: &CancellationToken,
    ) -> TransportResult<ResolveResponse> {
        let body = self.post("resolve", &request, cancel).await?;
        decode_resolve(&body)
    }
}

/// Decode a suggest reply.  An empty body means "no suggestions".
pub fn decode_suggest(body: &str) -> TransportResult<SuggestResponse> {
    if body.trim().is_empty() {
        return Ok(SuggestResponse::empty());
    }
    serde_json::from_str(body).map_err(|e| {
        TransportError::InvalidResponse(format!("failed to parse suggest response: {e}"))
    })
}

/// Decode a resolve reply.  An empty body means an empty bundle.
pub fn decode_resolve(body: &str) -> TransportResult<ResolveResponse> {
    if body.trim().is_empty() {
        return Ok(ResolveResponse::default());
    }
    serde_json::from_str(body).map_err(|e| {
        TransportError::InvalidResponse(format!("failed to parse resolve response: {e}"))
    })
}
