//! One HTTP exchange per reading.
//!
//! The [`Dispatcher`] takes an already encoded payload, acquires a transport
//! handle, sends the payload with the protocol's method and headers, copies
//! the reply into the bounded response buffer and decides whether the reading
//! was delivered. Network faults never escape: every outcome is logged and
//! folded into a `bool`.
//!
//! The handle, the header map and the response stream are owned values that
//! go out of scope on every return path, so nothing leaks on early exits.

use std::error::Error as _;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::header::HeaderMap;
use reqwest::Method;
use tracing::{debug, error, info};

use crate::buffer::{BoundedWriter, FixedBuffer, Overflow};
use crate::config::{ForwarderConfig, ServerTarget, Verbosity};
use crate::error::DispatchError;

/// Sentinel status for "no response was received at all".
pub const NO_RESPONSE: u16 = 0;

/// A fully prepared request. The body borrows the outbound buffer.
#[derive(Debug)]
pub struct WireRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: HeaderMap,
    pub body: &'a [u8],
}

/// Raw outcome of an exchange, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeReport {
    /// Response status, or [`NO_RESPONSE`] when none arrived.
    pub status: u16,
    /// Transport-reported description when the exchange did not complete.
    pub transport_error: Option<String>,
}

impl ExchangeReport {
    pub fn completed(status: u16) -> Self {
        Self {
            status,
            transport_error: None,
        }
    }

    pub fn failed(status: u16, detail: impl Into<String>) -> Self {
        Self {
            status,
            transport_error: Some(detail.into()),
        }
    }
}

/// Source of transport handles.
pub trait Transport {
    type Handle: TransportHandle;

    /// Get a handle for a single exchange. `trace_wire` turns on
    /// connection-level tracing for that handle.
    fn acquire(&self, trace_wire: bool) -> Result<Self::Handle, DispatchError>;
}

/// A handle good for one request/response exchange.
#[allow(async_fn_in_trait)]
pub trait TransportHandle {
    /// Send `request` and stream the reply body into `response`.
    async fn exchange(
        &mut self,
        request: WireRequest<'_>,
        response: &mut BoundedWriter<'_>,
    ) -> ExchangeReport;
}

// ---------------------------------------------------------------------------
// reqwest transport
// ---------------------------------------------------------------------------

/// Builds a fresh `reqwest::Client` per exchange.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    timeout: Option<Duration>,
}

impl ReqwestTransport {
    /// `None` means an exchange may block for as long as the server stalls.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl Transport for ReqwestTransport {
    type Handle = ReqwestHandle;

    fn acquire(&self, trace_wire: bool) -> Result<ReqwestHandle, DispatchError> {
        let mut builder = reqwest::Client::builder()
            .connection_verbose(trace_wire)
            .pool_max_idle_per_host(0);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        builder
            .build()
            .map(|client| ReqwestHandle { client })
            .map_err(|e| DispatchError::Acquire(error_chain(&e)))
    }
}

pub struct ReqwestHandle {
    client: reqwest::Client,
}

impl TransportHandle for ReqwestHandle {
    async fn exchange(
        &mut self,
        request: WireRequest<'_>,
        response: &mut BoundedWriter<'_>,
    ) -> ExchangeReport {
        let sent = self
            .client
            .request(request.method, request.url)
            .headers(request.headers)
            .body(request.body.to_vec())
            .send()
            .await;

        let reply = match sent {
            Ok(reply) => reply,
            Err(e) => {
                let status = e.status().map_or(NO_RESPONSE, |s| s.as_u16());
                return ExchangeReport::failed(status, error_chain(&e));
            }
        };

        let status = reply.status().as_u16();
        let mut body = reply.bytes_stream();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => {
                    response.append(&bytes);
                    // Anything further would be dropped anyway.
                    if response.remaining() == 0 {
                        break;
                    }
                }
                Err(e) => return ExchangeReport::failed(status, error_chain(&e)),
            }
        }
        ExchangeReport::completed(status)
    }
}

/// `Display` of an error followed by its sources, e.g.
/// `error sending request: client error (Connect): Connection refused`.
fn error_chain(err: &reqwest::Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !out.contains(&text) {
            out.push_str(": ");
            out.push_str(&text);
        }
        source = cause.source();
    }
    out
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Delivered only when the exchange completed with the protocol's status.
///
/// A missing response is reported as a connect failure, a wrong status as a
/// status mismatch, and a correct status with a broken exchange as a
/// transport error.
pub fn classify(target: &ServerTarget, report: &ExchangeReport) -> Result<(), DispatchError> {
    let expected = target.protocol().expected_status();
    match (report.status, &report.transport_error) {
        (NO_RESPONSE, _) => Err(DispatchError::Connect {
            url: target.url().to_string(),
        }),
        (status, _) if status != expected => Err(DispatchError::Status { status, expected }),
        (_, Some(detail)) => Err(DispatchError::Transport {
            url: target.url().to_string(),
            detail: detail.clone(),
        }),
        (_, None) => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub struct Dispatcher<T> {
    transport: T,
    target: ServerTarget,
    verbosity: Verbosity,
}

impl Dispatcher<ReqwestTransport> {
    pub fn from_config(config: &ForwarderConfig) -> Self {
        Self::new(
            ReqwestTransport::new(config.request_timeout),
            config.target.clone(),
            config.verbosity,
        )
    }
}

impl<T: Transport> Dispatcher<T> {
    pub fn new(transport: T, target: ServerTarget, verbosity: Verbosity) -> Self {
        Self {
            transport,
            target,
            verbosity,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn target(&self) -> &ServerTarget {
        &self.target
    }

    /// Deliver `payload` and report whether the server accepted it.
    ///
    /// Failures are logged to every configured sink; the server's reply is
    /// included when detail echo is on and the reply is not empty.
    pub async fn dispatch(&self, payload: &FixedBuffer, response: &mut FixedBuffer) -> bool {
        match self.try_dispatch(payload, response).await {
            Ok(()) => {
                if self.verbosity.echo_details && !response.is_empty() {
                    debug!(response = %response.to_string_lossy(), "server reply");
                }
                true
            }
            Err(DispatchError::EmptyPayload) => {
                debug!("nothing sent: no payload was generated");
                false
            }
            Err(e) => {
                if self.verbosity.echo_details && !response.is_empty() {
                    error!(url = %self.target.url(), response = %response.to_string_lossy(), "{e}");
                } else {
                    error!(url = %self.target.url(), "{e}");
                }
                false
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch) but returns the classified outcome
    /// instead of logging the final error. The payload echo and any transport
    /// detail hidden behind a connect or status error are still logged here.
    pub async fn try_dispatch(
        &self,
        payload: &FixedBuffer,
        response: &mut FixedBuffer,
    ) -> Result<(), DispatchError> {
        response.clear();
        if payload.is_empty() {
            return Err(DispatchError::EmptyPayload);
        }

        let mut handle = self.transport.acquire(self.verbosity.trace_wire)?;

        let protocol = self.target.protocol();
        let request = WireRequest {
            method: protocol.method(),
            url: self.target.url(),
            headers: protocol.headers(),
            body: payload.as_bytes(),
        };
        if self.verbosity.echo_payload {
            info!(method = %request.method, url = %request.url, "payload:\n{}", payload.to_string_lossy());
        }

        let mut sink = response.writer(Overflow::Truncate);
        let report = handle.exchange(request, &mut sink).await;
        if sink.is_truncated() {
            debug!(kept = sink.len(), "server reply truncated to buffer capacity");
        }
        debug!(status = report.status, "exchange finished");

        let outcome = classify(&self.target, &report);
        if let (Some(detail), Err(e)) = (&report.transport_error, &outcome) {
            if !matches!(e, DispatchError::Transport { .. }) {
                error!(
                    "{}",
                    DispatchError::Transport {
                        url: self.target.url().to_string(),
                        detail: detail.clone(),
                    }
                );
            }
        }
        outcome
    }
}
