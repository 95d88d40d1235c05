//! Round-trip latency measurement and the periodic probe task.

use std::time::Duration;
use std::time::Instant;

use tokio::net::TcpStream;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::warn;
use url::Url;

use crate::eca::EdgeClusterAdapter;

/// How long a single connect attempt is allowed to take before the
/// candidate is considered unreachable.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Measures round-trip latency to `url` by timing a bare TCP connect to its
/// host and port, rather than sending an ICMP echo (which requires raw
/// socket privileges this library should never need).
///
/// Returns `None` if the host/port can't be resolved, the connect fails, or
/// it doesn't complete within [`CONNECT_TIMEOUT`].
pub async fn measure(url: &Url) -> Option<f64> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    let started = Instant::now();
    let outcome = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect((host, port))).await;
    match outcome {
        Ok(Ok(_stream)) => Some(started.elapsed().as_secs_f64() * 1000.0),
        Ok(Err(error)) => {
            debug!(%url, %error, "latency probe connect failed");
            None
        }
        Err(_) => {
            debug!(%url, "latency probe connect timed out");
            None
        }
    }
}

/// Runs a periodic latency probe against `adapter` until `cancel` fires.
///
/// Each tick measures the round-trip time to the cluster and reports it
/// back via [`EdgeClusterAdapter::report_latency`]. A missed tick (e.g. the
/// previous measurement ran long) is simply delayed rather than fired in a
/// burst.
pub async fn run(adapter: &EdgeClusterAdapter, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {
                let Some(latency_ms) = measure(adapter.endpoint()).await else {
                    continue;
                };
                if let Err(error) = adapter.report_latency(latency_ms).await {
                    warn!(endpoint = %adapter.endpoint(), %error, "failed to report latency");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn measure_returns_none_for_an_unroutable_host() {
        let url = Url::parse("http://203.0.113.1:1").unwrap();
        assert!(measure(&url).await.is_none());
    }

    #[tokio::test]
    async fn measure_succeeds_against_a_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = listener.accept().await;
        });

        let url = Url::parse(&format!("http://{addr}")).unwrap();
        let latency = measure(&url).await;
        assert!(latency.is_some());
        assert!(latency.unwrap() >= 0.0);
    }

    #[tokio::test]
    async fn run_stops_promptly_when_cancelled() {
        let adapter = EdgeClusterAdapter::new(Url::parse("http://203.0.113.1:1").unwrap());
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let handle = tokio::spawn(async move {
            run(&adapter, Duration::from_millis(5), task_cancel).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run() should return promptly after cancellation")
            .unwrap();
    }
}
