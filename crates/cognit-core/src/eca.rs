//! Edge Cluster Frontend Adapter: function execution and latency reporting.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use url::Url;

use crate::cache::RemoteFunctionId;
use crate::call::Call;
use crate::call::ExecResponse;
use crate::call::RetCode;
use crate::error::TransportError;

/// `POST /v1/functions/{id}/execute` response body.
#[derive(Deserialize)]
struct ExecuteResponseBody {
    #[serde(rename = "RET_CODE")]
    ret_code: RetCode,
    #[serde(rename = "RESULT")]
    result: Option<crate::call::Value>,
    #[serde(rename = "ERR")]
    err: Option<String>,
}

impl From<ExecuteResponseBody> for ExecResponse {
    fn from(body: ExecuteResponseBody) -> Self {
        ExecResponse {
            ret_code: body.ret_code,
            result: body.result,
            err: body.err,
        }
    }
}

/// Client over an Edge Cluster Frontend's function-execution surface.
///
/// Clusters are frequently reachable only behind a self-signed certificate
/// (the fabric provisions them dynamically); requests retry once, against
/// a second client that accepts invalid certificates, rather than failing
/// outright on every handshake.
pub struct EdgeClusterAdapter {
    base_url: Url,
    strict_client: reqwest::Client,
    lenient_client: OnceLock<reqwest::Client>,
    connected: AtomicBool,
}

impl EdgeClusterAdapter {
    /// Builds an adapter targeting the given cluster endpoint. Starts
    /// disconnected until the first request completes.
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            strict_client: reqwest::Client::new(),
            lenient_client: OnceLock::new(),
            connected: AtomicBool::new(false),
        }
    }

    /// The cluster endpoint this adapter targets.
    pub fn endpoint(&self) -> &Url {
        &self.base_url
    }

    /// Whether the most recent request against this cluster succeeded.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Lazily builds the self-signed-tolerant client.
    fn lenient_client(&self) -> &reqwest::Client {
        self.lenient_client.get_or_init(|| {
            reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .expect("reqwest client with relaxed TLS verification is always constructible")
        })
    }

    fn url(&self, path: &str) -> Url {
        self.base_url
            .join(&format!("v1/{path}"))
            .expect("path segments are static and well-formed")
    }

    /// Records the outcome of a completed request: `401`/`400`/transport
    /// failure clear the connected flag, `200` sets it.
    fn observe(&self, status: Option<u16>) {
        let connected = matches!(status, Some(200));
        self.connected.store(connected, Ordering::Release);
    }

    /// Issues a request with the strict client, retrying once against the
    /// self-signed-tolerant client if the first attempt fails at the
    /// transport layer (a refused or untrusted TLS handshake looks
    /// identical to any other connect failure from here).
    async fn send(
        &self,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, reqwest::Error> {
        match build(&self.strict_client).send().await {
            Ok(response) => Ok(response),
            Err(_) => build(self.lenient_client()).send().await,
        }
    }

    /// Executes `call` against this cluster, addressing the function by
    /// its fabric-assigned id (obtained from the upload cache, not its
    /// local handle).
    ///
    /// On success, returns the response for a synchronous call, or invokes
    /// the call's callback for an asynchronous one (in which case the
    /// returned value is the response as well, for logging purposes).
    pub async fn execute_function(
        &self,
        remote_id: RemoteFunctionId,
        application_id: u64,
        call: Call,
    ) -> Result<ExecResponse, TransportError> {
        let Call {
            callback,
            params,
            timeout,
            ..
        } = call;

        let endpoint = self.url(&format!("functions/{}/execute", remote_id.0));
        // Whether the fabric contract accepts `mode=async` as a query
        // parameter is unclear, so every request negotiates synchronous
        // transport and async submissions are faked client-side by
        // invoking the callback below.
        let query = [
            ("app_req_id", application_id.to_string()),
            ("mode", "sync".to_string()),
        ];

        let send = self.send(|client| {
            let mut request = client.post(endpoint.clone()).query(&query).json(&params);
            if let Some(timeout) = timeout {
                request = request.timeout(timeout);
            }
            request
        });

        let response = match tokio::time::timeout(timeout.unwrap_or(Duration::from_secs(300)), send).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                self.observe(None);
                let result = ExecResponse::error(format!("transport failure: {source}"));
                if let Some(callback) = callback {
                    callback(result.clone());
                }
                return Err(TransportError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                });
            }
            Err(_) => {
                let result = ExecResponse::error("call timed out");
                if let Some(callback) = callback {
                    callback(result.clone());
                }
                return Ok(result);
            }
        };

        let status = response.status();
        self.observe(Some(status.as_u16()));
        if status.as_u16() != 200 {
            let body = response.text().await.unwrap_or_default();
            let result = ExecResponse::error(format!("cluster returned status {status}"));
            if let Some(callback) = callback {
                callback(result.clone());
            }
            return Err(TransportError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let body: ExecuteResponseBody =
            response.json().await.map_err(|source| TransportError::Decode {
                endpoint: endpoint.to_string(),
                source,
            })?;
        let result: ExecResponse = body.into();

        if let Some(callback) = callback {
            callback(result.clone());
        }
        Ok(result)
    }

    /// Reports a latency measurement for this cluster.
    ///
    /// Used only for diagnostics on the remote side; the device's own
    /// cluster selection never depends on the remote accepting the report.
    pub async fn report_latency(&self, latency_ms: f64) -> Result<(), TransportError> {
        let endpoint = self.url("device_metrics");
        let response = self
            .send(|client| client.post(endpoint.clone()).json(&serde_json::json!({ "latency": latency_ms })))
            .await
            .map_err(|source| {
                self.observe(None);
                TransportError::Request {
                    endpoint: endpoint.to_string(),
                    source,
                }
            })?;
        let status = response.status();
        self.observe(Some(status.as_u16()));
        if !status.is_success() {
            warn!(endpoint = %endpoint, %status, "cluster rejected latency report");
        }
        Ok(())
    }
}
