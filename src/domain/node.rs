//! Graph node and tree view types.

use super::{Position, ReferralCode, UserId};
use serde::Serialize;

/// A member as seen by the referral graph.
///
/// `parent_id` is `None` only for roots. `position` is the slot held under the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: UserId,
    pub parent_id: Option<UserId>,
    pub position: Option<Position>,
    pub referral_code: ReferralCode,
    pub name: String,
    pub email: String,
}

impl Node {
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}

/// Fields needed to create a new member node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNode {
    pub name: String,
    pub email: String,
    pub referral_code: ReferralCode,
}

/// A direct child of some node, keyed by its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLink {
    pub id: UserId,
    pub position: Option<Position>,
}

/// Where a new member attaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub parent_id: UserId,
    pub position: Position,
}

/// Result of a successful parent assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub child_user_id: UserId,
    pub parent_user_id: UserId,
    pub position: Position,
}

/// Nested rendering of a subtree, children ordered left, right, then unslotted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub referral_code: ReferralCode,
    pub position: Option<Position>,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    /// Total number of nodes in this subtree, including self.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(TreeNode::size).sum::<usize>()
    }
}
