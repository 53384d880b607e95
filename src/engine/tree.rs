//! Level-bounded downward rendering of a member's subtree.

use crate::domain::{Node, TreeNode, UserId};
use crate::error::CoreError;
use crate::store::GraphStore;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::error;

/// Breadth-first subtree renderer. Children keep the order the store returns
/// (left, right, then unslotted by id), so equal state renders identically.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    max_depth: u32,
    node_limit: usize,
}

impl TreeBuilder {
    pub fn new(max_depth: u32, node_limit: usize) -> Self {
        Self {
            max_depth,
            node_limit,
        }
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// Render `root` and its descendants down to `depth` levels below it.
    pub async fn build<S>(&self, store: &mut S, root: UserId, depth: u32) -> Result<TreeNode, CoreError>
    where
        S: GraphStore + ?Sized,
    {
        if depth > self.max_depth {
            return Err(CoreError::Validation(format!(
                "depth must be at most {}, got {}",
                self.max_depth, depth
            )));
        }

        let root_node = store
            .get(root)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", root)))?;

        let mut shells: HashMap<UserId, TreeNode> = HashMap::new();
        let mut children_of: HashMap<UserId, Vec<UserId>> = HashMap::new();
        let mut order = vec![root];
        let mut visited = HashSet::from([root]);
        let mut queue = VecDeque::from([(root, 0u32)]);
        shells.insert(root, shell(root_node));

        while let Some((current, level)) = queue.pop_front() {
            if level >= depth {
                continue;
            }
            let links = store.find_children(current).await?;
            let mut ids = Vec::with_capacity(links.len());
            for link in links {
                if !visited.insert(link.id) {
                    error!(root = %root, node = %link.id, "Subtree reaches a node twice; graph integrity failure");
                    return Err(CoreError::CircularReference {
                        start: root,
                        node: link.id,
                    });
                }
                if visited.len() > self.node_limit {
                    error!(root = %root, limit = self.node_limit, "Subtree exceeds node limit");
                    return Err(CoreError::Overflow {
                        sponsor: root,
                        limit: self.node_limit,
                    });
                }
                let node = store
                    .get(link.id)
                    .await?
                    .ok_or_else(|| CoreError::NotFound(format!("user {}", link.id)))?;
                shells.insert(link.id, shell(node));
                order.push(link.id);
                ids.push(link.id);
                queue.push_back((link.id, level + 1));
            }
            children_of.insert(current, ids);
        }

        // Reverse BFS order attaches every child before its parent is attached.
        for id in order.iter().rev() {
            let Some(kids) = children_of.get(id) else {
                continue;
            };
            let built: Vec<TreeNode> = kids.iter().filter_map(|k| shells.remove(k)).collect();
            if let Some(parent) = shells.get_mut(id) {
                parent.children = built;
            }
        }

        shells
            .remove(&root)
            .ok_or_else(|| CoreError::NotFound(format!("user {}", root)))
    }
}

fn shell(node: Node) -> TreeNode {
    TreeNode {
        id: node.id,
        name: node.name,
        email: node.email,
        referral_code: node.referral_code,
        position: node.position,
        children: Vec::new(),
    }
}
