//! Storage and resource-pool placement
//!
//! Both selectors are scoped to a site and work off live listings; nothing
//! is cached, so repeated calls track the service's current view.

use crate::error::{ComputeError, Result};
use serde::Deserialize;
use stratus_cloud::Transport;

#[derive(Debug, Clone, Deserialize)]
pub struct StorageCandidate {
    #[serde(rename = "StorageID")]
    pub storage_id: String,
    #[serde(rename = "FreeSpaceKB", default)]
    pub free_space_kb: u64,
    #[serde(rename = "CapacityKB", default)]
    pub capacity_kb: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PoolCandidate {
    #[serde(rename = "ResourcePoolID")]
    pub pool_id: String,
    #[serde(rename = "VirtualMachineIDs", default)]
    pub vm_ids: Option<Vec<String>>,
}

impl PoolCandidate {
    fn in_use(&self) -> bool {
        self.vm_ids.as_ref().is_some_and(|ids| !ids.is_empty())
    }
}

/// Pick a storage bin with room for `required_kb`, preferring the
/// proportionally fullest qualifier.
///
/// The fullness score is `round(CapacityKB / FreeSpaceKB * 100)`; the
/// highest score wins and the first listed wins ties. Packing onto the
/// fullest bin keeps emptier bins free for large future disks.
pub async fn select_storage<T>(transport: &T, required_kb: u64, site: &str) -> Result<String>
where
    T: Transport + ?Sized,
{
    let path =
        format!("/Storage?$filter=IsRemoved eq false and Hypervisor/Site/SiteID eq '{site}'");
    let body = transport
        .get(&path)
        .await?
        .ok_or_else(|| ComputeError::PlacementExhausted(format!("no storage listing for {site}")))?;
    let candidates: Vec<StorageCandidate> = serde_json::from_str(&body)?;

    let qualifying: Vec<&StorageCandidate> = candidates
        .iter()
        .filter(|c| c.free_space_kb >= required_kb)
        .collect();
    if qualifying.is_empty() {
        return Err(ComputeError::PlacementExhausted(format!(
            "no storage in {site} with {required_kb} KB free"
        )));
    }

    let mut best = qualifying[0];
    let mut best_ratio = fullness(best);
    for candidate in &qualifying[1..] {
        let ratio = fullness(candidate);
        if ratio > best_ratio {
            best = candidate;
            best_ratio = ratio;
        }
    }
    tracing::debug!(
        storage = %best.storage_id,
        ratio = best_ratio,
        required_kb,
        "selected storage bin"
    );
    Ok(best.storage_id.clone())
}

fn fullness(candidate: &StorageCandidate) -> f64 {
    if candidate.free_space_kb == 0 {
        return 0.0;
    }
    (candidate.capacity_kb as f64 / candidate.free_space_kb as f64 * 100.0).round()
}

/// Pick a resource pool in the site: the first one already hosting VMs,
/// or the first listed when every pool is idle.
pub async fn select_pool<T>(transport: &T, site: &str) -> Result<String>
where
    T: Transport + ?Sized,
{
    let path =
        format!("/ResourcePool?$filter=IsRemoved eq false and Hypervisor/Site/SiteID eq '{site}'");
    let body = transport
        .get(&path)
        .await?
        .ok_or_else(|| ComputeError::PlacementExhausted(format!("no pool listing for {site}")))?;
    let candidates: Vec<PoolCandidate> = serde_json::from_str(&body)?;

    if let Some(pool) = candidates.iter().find(|p| p.in_use()) {
        tracing::debug!(pool = %pool.pool_id, "selected in-use resource pool");
        return Ok(pool.pool_id.clone());
    }
    candidates
        .first()
        .map(|p| p.pool_id.clone())
        .ok_or_else(|| ComputeError::PlacementExhausted(format!("no resource pools in {site}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use stratus_cloud::mock::{MockResponse, MockTransport};

    const STORAGE_PATH: &str =
        "/Storage?$filter=IsRemoved eq false and Hypervisor/Site/SiteID eq 'site-A'";
    const POOL_PATH: &str =
        "/ResourcePool?$filter=IsRemoved eq false and Hypervisor/Site/SiteID eq 'site-A'";

    #[tokio::test]
    async fn fullest_qualifying_bin_wins() {
        let transport = MockTransport::new();
        transport.on_get(
            STORAGE_PATH,
            MockResponse::body(
                r#"[
                    {"StorageID":"A","FreeSpaceKB":6000000,"CapacityKB":10000000},
                    {"StorageID":"B","FreeSpaceKB":8000000,"CapacityKB":9000000}
                ]"#,
            ),
        );
        // A scores round(10/6*100)=167, B scores round(9/8*100)=113
        let picked = select_storage(&transport, 5_000_000, "site-A").await.unwrap();
        assert_eq!(picked, "A");
    }

    #[tokio::test]
    async fn bins_without_room_are_skipped() {
        let transport = MockTransport::new();
        transport.on_get(
            STORAGE_PATH,
            MockResponse::body(
                r#"[
                    {"StorageID":"A","FreeSpaceKB":1000,"CapacityKB":10000000},
                    {"StorageID":"B","FreeSpaceKB":8000000,"CapacityKB":9000000}
                ]"#,
            ),
        );
        let picked = select_storage(&transport, 5_000_000, "site-A").await.unwrap();
        assert_eq!(picked, "B");
    }

    #[tokio::test]
    async fn no_room_anywhere_is_placement_exhausted() {
        let transport = MockTransport::new();
        transport.on_get(
            STORAGE_PATH,
            MockResponse::body(r#"[{"StorageID":"A","FreeSpaceKB":10,"CapacityKB":100}]"#),
        );
        let err = select_storage(&transport, 5_000_000, "site-A")
            .await
            .unwrap_err();
        assert!(matches!(err, ComputeError::PlacementExhausted(_)));
    }

    #[tokio::test]
    async fn first_tie_wins() {
        let transport = MockTransport::new();
        transport.on_get(
            STORAGE_PATH,
            MockResponse::body(
                r#"[
                    {"StorageID":"A","FreeSpaceKB":5000000,"CapacityKB":10000000},
                    {"StorageID":"B","FreeSpaceKB":5000000,"CapacityKB":10000000}
                ]"#,
            ),
        );
        let picked = select_storage(&transport, 1_000_000, "site-A").await.unwrap();
        assert_eq!(picked, "A");
    }

    #[tokio::test]
    async fn in_use_pool_beats_earlier_idle_pool() {
        let transport = MockTransport::new();
        transport.on_get(
            POOL_PATH,
            MockResponse::body(
                r#"[
                    {"ResourcePoolID":"P1","VirtualMachineIDs":[]},
                    {"ResourcePoolID":"P2","VirtualMachineIDs":["vm-1"]}
                ]"#,
            ),
        );
        assert_eq!(select_pool(&transport, "site-A").await.unwrap(), "P2");
    }

    #[tokio::test]
    async fn all_idle_falls_back_to_first_listed() {
        let transport = MockTransport::new();
        transport.on_get(
            POOL_PATH,
            MockResponse::body(
                r#"[
                    {"ResourcePoolID":"P1"},
                    {"ResourcePoolID":"P2","VirtualMachineIDs":[]}
                ]"#,
            ),
        );
        assert_eq!(select_pool(&transport, "site-A").await.unwrap(), "P1");
    }

    #[tokio::test]
    async fn empty_pool_listing_is_placement_exhausted() {
        let transport = MockTransport::new();
        transport.on_get(POOL_PATH, MockResponse::body("[]"));
        let err = select_pool(&transport, "site-A").await.unwrap_err();
        assert!(matches!(err, ComputeError::PlacementExhausted(_)));
    }
}
