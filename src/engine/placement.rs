//! Binary placement: where a new member attaches under a sponsor.

use super::walker::AncestorWalker;
use crate::domain::{Assignment, ChildLink, Placement, Position, ReferralCode, UserId};
use crate::error::CoreError;
use crate::store::GraphStore;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, error};

/// Breadth-first search for the first free slot under a sponsor.
///
/// Traversal is top-to-bottom, left-to-right; `left` is always tried before `right`.
/// Visiting more than `visit_limit` nodes fails with `Overflow`, which only a
/// corrupt graph can cause.
#[derive(Debug, Clone, Copy)]
pub struct BinaryPlacementResolver {
    visit_limit: usize,
}

impl BinaryPlacementResolver {
    pub fn new(visit_limit: usize) -> Self {
        Self { visit_limit }
    }

    pub async fn find_placement<S>(
        &self,
        store: &mut S,
        sponsor: UserId,
    ) -> Result<Placement, CoreError>
    where
        S: GraphStore + ?Sized,
    {
        let mut queue = VecDeque::from([sponsor]);
        let mut visited = HashSet::new();

        while let Some(current) = queue.pop_front() {
            // A node reached twice means two parents claim it; skip the repeat.
            if !visited.insert(current) {
                continue;
            }
            if visited.len() > self.visit_limit {
                return Err(self.overflow(sponsor));
            }

            let children = store.find_children(current).await?;
            let left = slot(&children, Position::Left);
            let right = slot(&children, Position::Right);

            match (left, right) {
                (None, _) => {
                    return Ok(Placement {
                        parent_id: current,
                        position: Position::Left,
                    })
                }
                (Some(_), None) => {
                    return Ok(Placement {
                        parent_id: current,
                        position: Position::Right,
                    })
                }
                (Some(l), Some(r)) => {
                    queue.push_back(l);
                    queue.push_back(r);
                }
            }
        }

        // Every reachable node was full and already seen: the subtree loops back on itself.
        Err(self.overflow(sponsor))
    }

    fn overflow(&self, sponsor: UserId) -> CoreError {
        error!(
            sponsor = %sponsor,
            limit = self.visit_limit,
            "Placement search exhausted its visit limit; graph integrity failure"
        );
        CoreError::Overflow {
            sponsor,
            limit: self.visit_limit,
        }
    }
}

fn slot(children: &[ChildLink], position: Position) -> Option<UserId> {
    children
        .iter()
        .find(|c| c.position == Some(position))
        .map(|c| c.id)
}

/// Attach `child` somewhere under the member owning `parent_code`.
///
/// Rejects self-reference, already placed members and any attachment that would put
/// `child` above itself. The caller supplies the transactional boundary; on error
/// nothing has been written.
pub async fn assign_parent<S>(
    store: &mut S,
    walker: &AncestorWalker,
    resolver: &BinaryPlacementResolver,
    child: UserId,
    parent_code: &ReferralCode,
) -> Result<Assignment, CoreError>
where
    S: GraphStore + ?Sized,
{
    let child_node = store
        .get(child)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("user {}", child)))?;

    let sponsor = store
        .find_by_referral_code(parent_code)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("referral code {}", parent_code)))?;

    if sponsor.id == child {
        return Err(CoreError::Validation(
            "a user cannot be their own parent".to_string(),
        ));
    }
    if let Some(existing) = child_node.parent_id {
        return Err(CoreError::Validation(format!(
            "user {} is already placed under user {}",
            child, existing
        )));
    }

    walker.ensure_not_above(store, sponsor.id, child).await?;

    let placement = resolver.find_placement(store, sponsor.id).await?;
    store
        .set_parent(child, placement.parent_id, placement.position)
        .await?;

    debug!(
        child = %child,
        sponsor = %sponsor.id,
        parent = %placement.parent_id,
        position = %placement.position,
        "Placed member"
    );

    Ok(Assignment {
        child_user_id: child,
        parent_user_id: placement.parent_id,
        position: placement.position,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewNode;
    use crate::store::MemoryStore;
    use std::collections::HashMap;

    fn code(id: i64) -> ReferralCode {
        ReferralCode::new(format!("REF{}", id))
    }

    async fn join(store: &mut MemoryStore, sponsor_code: &ReferralCode, n: usize) -> Assignment {
        let id = store
            .create(&NewNode {
                name: format!("new{}", n),
                email: format!("new{}@example.com", n),
                referral_code: ReferralCode::new(format!("NEW{}", n)),
            })
            .await
            .unwrap();
        assign_parent(
            store,
            &AncestorWalker::new(1_000),
            &BinaryPlacementResolver::new(1_000),
            id,
            sponsor_code,
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_empty_sponsor_gets_left_first() {
        let mut store = MemoryStore::new().with_root(1);
        let placement = BinaryPlacementResolver::new(10)
            .find_placement(&mut store, UserId::new(1))
            .await
            .unwrap();
        assert_eq!(placement.parent_id, UserId::new(1));
        assert_eq!(placement.position, Position::Left);
    }

    #[tokio::test]
    async fn test_bfs_order_fills_left_subtree_first() {
        let mut store = MemoryStore::new().with_root(1);

        let first = join(&mut store, &code(1), 0).await;
        let second = join(&mut store, &code(1), 1).await;
        let third = join(&mut store, &code(1), 2).await;
        let fourth = join(&mut store, &code(1), 3).await;

        assert_eq!((first.parent_user_id, first.position), (UserId::new(1), Position::Left));
        assert_eq!((second.parent_user_id, second.position), (UserId::new(1), Position::Right));
        // Third goes under S's left child before S's right child is explored.
        assert_eq!((third.parent_user_id, third.position), (first.child_user_id, Position::Left));
        assert_eq!((fourth.parent_user_id, fourth.position), (first.child_user_id, Position::Right));
    }

    #[tokio::test]
    async fn test_many_joins_form_valid_binary_tree() {
        let mut store = MemoryStore::new().with_root(1);
        let walker = AncestorWalker::new(1_000);
        let mut placed = Vec::new();
        for n in 0..40 {
            placed.push(join(&mut store, &code(1), n).await);
        }

        let mut slots: HashMap<(UserId, Position), UserId> = HashMap::new();
        for a in &placed {
            assert!(
                slots
                    .insert((a.parent_user_id, a.position), a.child_user_id)
                    .is_none(),
                "slot {:?} used twice",
                (a.parent_user_id, a.position)
            );
            let chain = walker.ancestors(&mut store, a.child_user_id).await.unwrap();
            assert_eq!(chain.last(), Some(&UserId::new(1)), "must reach the sponsor");
        }

        // 40 joins under a complete tree: levels 1..=4 hold 2+4+8+16 = 30, the rest on level 5.
        let max_depth = {
            let mut depth = 0;
            for a in &placed {
                let d = walker.ancestors(&mut store, a.child_user_id).await.unwrap().len();
                depth = depth.max(d);
            }
            depth
        };
        assert_eq!(max_depth, 5);
    }

    #[tokio::test]
    async fn test_visit_limit_overflow() {
        // Full tree of 7 nodes: 1 -> (2,3), 2 -> (4,5), 3 -> (6,7)
        let mut store = MemoryStore::new()
            .with_root(1)
            .with_child(2, 1, Position::Left)
            .with_child(3, 1, Position::Right)
            .with_child(4, 2, Position::Left)
            .with_child(5, 2, Position::Right)
            .with_child(6, 3, Position::Left)
            .with_child(7, 3, Position::Right);

        let err = BinaryPlacementResolver::new(3)
            .find_placement(&mut store, UserId::new(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Overflow { limit: 3, .. }));

        let placement = BinaryPlacementResolver::new(4)
            .find_placement(&mut store, UserId::new(1))
            .await
            .unwrap();
        assert_eq!(placement.parent_id, UserId::new(4));
        assert_eq!(placement.position, Position::Left);
    }

    #[tokio::test]
    async fn test_back_edge_to_sponsor_is_not_traversed() {
        // The sponsor (corruptly) hangs unslotted under its own grandchild 8.
        let mut store = MemoryStore::new()
            .with_root(1)
            .with_child(2, 1, Position::Left)
            .with_child(3, 1, Position::Right)
            .with_child(4, 2, Position::Left)
            .with_child(5, 2, Position::Right)
            .with_child(6, 3, Position::Left)
            .with_child(7, 3, Position::Right)
            .with_child(8, 4, Position::Left)
            .with_parent_override(1, 8);

        let placement = BinaryPlacementResolver::new(100)
            .find_placement(&mut store, UserId::new(1))
            .await
            .unwrap();
        assert_eq!(placement.parent_id, UserId::new(4));
        assert_eq!(placement.position, Position::Right);
    }

    #[tokio::test]
    async fn test_assign_rejects_self_reference() {
        let mut store = MemoryStore::new().with_root(1);
        let err = assign_parent(
            &mut store,
            &AncestorWalker::new(10),
            &BinaryPlacementResolver::new(10),
            UserId::new(1),
            &code(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_assign_rejects_unknown_code_and_user() {
        let mut store = MemoryStore::new().with_root(1).with_root(2);
        let walker = AncestorWalker::new(10);
        let resolver = BinaryPlacementResolver::new(10);

        let err = assign_parent(&mut store, &walker, &resolver, UserId::new(2), &code(42))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let err = assign_parent(&mut store, &walker, &resolver, UserId::new(42), &code(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_assign_rejects_descendant_as_parent() {
        // Root 1 has subtree 1 -> 2 -> 3. Placing 1 under 3 would close a loop.
        let mut store = MemoryStore::new()
            .with_root(1)
            .with_child(2, 1, Position::Left)
            .with_child(3, 2, Position::Left);
        let before = store.clone();

        let err = assign_parent(
            &mut store,
            &AncestorWalker::new(10),
            &BinaryPlacementResolver::new(10),
            UserId::new(1),
            &code(3),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CoreError::CircularReference { .. }));
        assert_eq!(store.node(1), before.node(1));
        assert!(store.node(1).unwrap().is_root());
    }

    #[tokio::test]
    async fn test_assign_rejects_already_placed_member() {
        let mut store = MemoryStore::new()
            .with_root(1)
            .with_root(5)
            .with_child(2, 1, Position::Left);
        let err = assign_parent(
            &mut store,
            &AncestorWalker::new(10),
            &BinaryPlacementResolver::new(10),
            UserId::new(2),
            &code(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert_eq!(store.node(2).unwrap().parent_id, Some(UserId::new(1)));
    }

    #[tokio::test]
    async fn test_assign_spills_below_full_sponsor() {
        let mut store = MemoryStore::new()
            .with_root(1)
            .with_child(2, 1, Position::Left)
            .with_child(3, 1, Position::Right)
            .with_root(9);
        let assignment = assign_parent(
            &mut store,
            &AncestorWalker::new(10),
            &BinaryPlacementResolver::new(10),
            UserId::new(9),
            &code(1),
        )
        .await
        .unwrap();
        assert_eq!(assignment.parent_user_id, UserId::new(2));
        assert_eq!(assignment.position, Position::Left);
        assert_eq!(store.node(9).unwrap().parent_id, Some(UserId::new(2)));
    }
}
