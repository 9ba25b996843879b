//! Per-campaign knowledge graph cache.
//!
//! One graph instance per campaign, guarded by a per-campaign async mutex.
//! A task holds the lock for its whole unit-of-work (load-if-missing, build
//! context, call the generator, apply mutations, save), so tasks for the
//! same campaign serialize while different campaigns progress in parallel.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use lorekeeper_domain::{CampaignId, KnowledgeGraph};

use crate::error::EngineError;

pub struct GraphRegistry {
    graphs: DashMap<CampaignId, Arc<Mutex<KnowledgeGraph>>>,
    lock_timeout: Duration,
}

impl GraphRegistry {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            graphs: DashMap::new(),
            lock_timeout,
        }
    }

    /// Acquire the campaign's graph lock, creating an empty slot on first
    /// use. Waiting longer than the deadline is a `Conflict`.
    ///
    /// The caller is responsible for hydrating the graph when
    /// `graph.campaign_id()` does not match (load on miss happens under the
    /// lock, so no task ever observes a partial load).
    pub async fn lock(
        &self,
        campaign_id: CampaignId,
    ) -> Result<OwnedMutexGuard<KnowledgeGraph>, EngineError> {
        // Clone the Arc out before awaiting so the shard lock is released.
        let slot = self
            .graphs
            .entry(campaign_id)
            .or_insert_with(|| Arc::new(Mutex::new(KnowledgeGraph::new())))
            .clone();

        tokio::time::timeout(self.lock_timeout, slot.lock_owned())
            .await
            .map_err(|_| {
                EngineError::Conflict(format!(
                    "timed out waiting for campaign graph lock: {campaign_id}"
                ))
            })
    }

    /// Drop the cached graph (campaign deleted).
    pub fn evict(&self, campaign_id: CampaignId) {
        self.graphs.remove(&campaign_id);
    }

    pub fn cached_campaigns(&self) -> usize {
        self.graphs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorekeeper_domain::NodeType;

    #[tokio::test]
    async fn lock_creates_empty_graph_on_miss() {
        let registry = GraphRegistry::new(Duration::from_secs(1));
        let campaign_id = CampaignId::new();
        let graph = registry.lock(campaign_id).await.expect("lock");
        assert_eq!(graph.node_count(), 0);
        assert!(graph.campaign_id().is_none());
    }

    #[tokio::test]
    async fn mutations_survive_between_locks() {
        let registry = GraphRegistry::new(Duration::from_secs(1));
        let campaign_id = CampaignId::new();
        {
            let mut graph = registry.lock(campaign_id).await.expect("lock");
            graph.set_campaign_id(campaign_id);
            graph.add_entity("n1", NodeType::Character, "Alice", None, None, 5);
        }
        let graph = registry.lock(campaign_id).await.expect("relock");
        assert_eq!(graph.node_count(), 1);
    }

    #[tokio::test]
    async fn contended_lock_times_out_with_conflict() {
        let registry = GraphRegistry::new(Duration::from_millis(50));
        let campaign_id = CampaignId::new();
        let _held = registry.lock(campaign_id).await.expect("first lock");
        let err = registry.lock(campaign_id).await.expect_err("second lock");
        assert!(matches!(err, EngineError::Conflict(_)));
    }

    #[tokio::test]
    async fn different_campaigns_do_not_contend() {
        let registry = GraphRegistry::new(Duration::from_millis(50));
        let _held = registry.lock(CampaignId::new()).await.expect("first");
        registry
            .lock(CampaignId::new())
            .await
            .expect("other campaign should not block");
    }

    #[tokio::test]
    async fn evict_drops_cached_state() {
        let registry = GraphRegistry::new(Duration::from_secs(1));
        let campaign_id = CampaignId::new();
        {
            let mut graph = registry.lock(campaign_id).await.expect("lock");
            graph.add_entity("n1", NodeType::Character, "Alice", None, None, 5);
        }
        registry.evict(campaign_id);
        let graph = registry.lock(campaign_id).await.expect("relock");
        assert_eq!(graph.node_count(), 0);
    }
}
