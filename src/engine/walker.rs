//! Cycle- and depth-bounded upward traversal of the referral graph.

use crate::domain::UserId;
use crate::error::CoreError;
use crate::store::GraphStore;
use std::collections::HashSet;
use std::ops::ControlFlow;
use tracing::error;

/// How a completed walk ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkSummary {
    /// Deepest level handed to the visitor.
    pub levels_visited: u32,
    /// True if the visitor stopped the walk before the root.
    pub stopped_early: bool,
}

/// Follows `parent_id` from a start node toward the root.
///
/// Level 1 is the start node's parent. A revisited node means the chain is corrupt
/// and fails with `CircularReference`; more than `depth_limit` steps fails with
/// `ChainTooDeep`. A parent id pointing at a missing node fails with `NotFound`.
#[derive(Debug, Clone, Copy)]
pub struct AncestorWalker {
    depth_limit: usize,
}

impl AncestorWalker {
    pub fn new(depth_limit: usize) -> Self {
        Self { depth_limit }
    }

    pub fn depth_limit(&self) -> usize {
        self.depth_limit
    }

    /// Walk upward from `start`, calling `visit(ancestor, level)` for every ancestor
    /// until the root is reached or the visitor breaks.
    pub async fn walk<S, F>(
        &self,
        store: &mut S,
        start: UserId,
        mut visit: F,
    ) -> Result<WalkSummary, CoreError>
    where
        S: GraphStore + ?Sized,
        F: FnMut(UserId, u32) -> ControlFlow<()> + Send,
    {
        let start_node = store
            .get(start)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", start)))?;

        let mut visited = HashSet::from([start]);
        let mut next = start_node.parent_id;
        let mut level: u32 = 0;

        while let Some(ancestor) = next {
            if level as usize >= self.depth_limit {
                error!(
                    start = %start,
                    limit = self.depth_limit,
                    "Ancestor chain exceeds depth limit; graph integrity failure"
                );
                return Err(CoreError::ChainTooDeep {
                    start,
                    limit: self.depth_limit,
                });
            }
            level += 1;

            if !visited.insert(ancestor) {
                return Err(CoreError::CircularReference {
                    start,
                    node: ancestor,
                });
            }

            let node = store.get(ancestor).await?.ok_or_else(|| {
                error!(start = %start, ancestor = %ancestor, level, "Ancestor chain points at a missing user");
                CoreError::NotFound(format!("ancestor {} of user {}", ancestor, start))
            })?;

            if visit(ancestor, level).is_break() {
                return Ok(WalkSummary {
                    levels_visited: level,
                    stopped_early: true,
                });
            }
            next = node.parent_id;
        }

        Ok(WalkSummary {
            levels_visited: level,
            stopped_early: false,
        })
    }

    /// Collect the full ancestor chain of `start`, nearest first.
    pub async fn ancestors<S>(&self, store: &mut S, start: UserId) -> Result<Vec<UserId>, CoreError>
    where
        S: GraphStore + ?Sized,
    {
        let mut chain = Vec::new();
        self.walk(store, start, |ancestor, _| {
            chain.push(ancestor);
            ControlFlow::Continue(())
        })
        .await?;
        Ok(chain)
    }

    /// Fail with `CircularReference` if `candidate` appears anywhere above `start`.
    pub async fn ensure_not_above<S>(
        &self,
        store: &mut S,
        start: UserId,
        candidate: UserId,
    ) -> Result<(), CoreError>
    where
        S: GraphStore + ?Sized,
    {
        let summary = self
            .walk(store, start, |ancestor, _| {
                if ancestor == candidate {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await?;

        if summary.stopped_early {
            return Err(CoreError::CircularReference {
                start,
                node: candidate,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn test_walk_visits_levels_in_order() {
        let mut store = MemoryStore::new().with_chain(5);
        let walker = AncestorWalker::new(100);

        let mut seen = Vec::new();
        let summary = walker
            .walk(&mut store, UserId::new(5), |id, level| {
                seen.push((id.as_i64(), level));
                ControlFlow::Continue(())
            })
            .await
            .unwrap();

        assert_eq!(seen, vec![(4, 1), (3, 2), (2, 3), (1, 4)]);
        assert_eq!(summary.levels_visited, 4);
        assert!(!summary.stopped_early);
    }

    #[tokio::test]
    async fn test_walk_from_root_visits_nothing() {
        let mut store = MemoryStore::new().with_root(1);
        let walker = AncestorWalker::new(10);
        let chain = walker.ancestors(&mut store, UserId::new(1)).await.unwrap();
        assert!(chain.is_empty());
    }

    #[tokio::test]
    async fn test_walk_stops_when_visitor_breaks() {
        let mut store = MemoryStore::new().with_chain(10);
        let walker = AncestorWalker::new(100);
        let summary = walker
            .walk(&mut store, UserId::new(10), |_, level| {
                if level == 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await
            .unwrap();
        assert_eq!(summary.levels_visited, 2);
        assert!(summary.stopped_early);
    }

    #[tokio::test]
    async fn test_cycle_is_detected() {
        // 1 -> 2 -> 3 -> 1
        let mut store = MemoryStore::new()
            .with_chain(3)
            .with_parent_override(1, 3);
        let walker = AncestorWalker::new(100);

        let err = walker
            .ancestors(&mut store, UserId::new(3))
            .await
            .unwrap_err();
        match err {
            CoreError::CircularReference { start, node } => {
                assert_eq!(start, UserId::new(3));
                assert_eq!(node, UserId::new(3));
            }
            other => panic!("Expected CircularReference, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_depth_limit_is_enforced() {
        let mut store = MemoryStore::new().with_chain(20);
        let walker = AncestorWalker::new(5);

        let err = walker
            .ancestors(&mut store, UserId::new(20))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ChainTooDeep { limit: 5, .. }));
        assert!(err.is_integrity_failure());
    }

    #[tokio::test]
    async fn test_chain_exactly_at_limit_is_allowed() {
        let mut store = MemoryStore::new().with_chain(6);
        let walker = AncestorWalker::new(5);
        let chain = walker.ancestors(&mut store, UserId::new(6)).await.unwrap();
        assert_eq!(chain.len(), 5);
    }

    #[tokio::test]
    async fn test_missing_ancestor_is_not_found() {
        let mut store = MemoryStore::new()
            .with_root(1)
            .with_child(2, 99, Position::Left);
        let walker = AncestorWalker::new(10);
        let err = walker
            .ancestors(&mut store, UserId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ensure_not_above() {
        let mut store = MemoryStore::new().with_chain(4);
        let walker = AncestorWalker::new(10);

        walker
            .ensure_not_above(&mut store, UserId::new(2), UserId::new(4))
            .await
            .unwrap();

        let err = walker
            .ensure_not_above(&mut store, UserId::new(4), UserId::new(2))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CircularReference { .. }));
    }
}
