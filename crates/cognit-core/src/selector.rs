//! Picks which Edge Cluster Frontend a device should serve calls through.

use crate::cfa::ClusterCandidate;
use crate::latency;

/// Chooses a cluster from `candidates`.
///
/// - An empty list yields `None`.
/// - If `max_latency_ms` is `None`, the first candidate is returned without
///   measuring anything (no latency budget means no reason to probe).
/// - Otherwise every candidate's round-trip latency is measured
///   concurrently and the lowest-latency reachable candidate wins; ties
///   are broken in favor of whichever appeared earliest in the list.
/// - If every candidate is unreachable, `None` is returned.
pub async fn select(
    candidates: &[ClusterCandidate],
    max_latency_ms: Option<u64>,
) -> Option<&ClusterCandidate> {
    if candidates.is_empty() {
        return None;
    }
    if max_latency_ms.is_none() {
        return candidates.first();
    }

    let measurements = futures_latencies(candidates).await;
    pick_lowest_latency(measurements).map(|index| &candidates[index])
}

/// Picks the index of the lowest-latency `Some` measurement, breaking ties
/// in favor of the earliest index. `None` measurements (unreachable
/// candidates) are skipped. Returns `None` if every measurement is `None`.
///
/// Split out from [`select`] so the tie-breaking logic can be exercised
/// directly, without needing a real reachable/unreachable TCP endpoint per
/// candidate.
fn pick_lowest_latency(measurements: impl IntoIterator<Item = Option<f64>>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (index, latency_ms) in measurements.into_iter().enumerate() {
        let Some(latency_ms) = latency_ms else {
            continue;
        };
        match best {
            Some((_, best_latency)) if latency_ms >= best_latency => {}
            _ => best = Some((index, latency_ms)),
        }
    }
    best.map(|(index, _)| index)
}

/// Measures every candidate's latency concurrently, preserving input order.
async fn futures_latencies(candidates: &[ClusterCandidate]) -> Vec<Option<f64>> {
    let tasks = candidates
        .iter()
        .map(|candidate| latency::measure(&candidate.endpoint));
    futures::future::join_all(tasks).await
}
