//! Graph algorithms of the referral network: placement, ancestor walks,
//! BV distribution and subtree rendering.
//!
//! Everything here is generic over the `store` traits and never opens a
//! transaction itself; callers decide the unit of work.

use crate::config::SafetyLimits;

pub mod distribution;
pub mod placement;
pub mod tree;
pub mod walker;

pub use distribution::IncomeDistributionEngine;
pub use placement::{assign_parent, BinaryPlacementResolver};
pub use tree::TreeBuilder;
pub use walker::{AncestorWalker, WalkSummary};

/// The engine components wired with one set of safety limits.
#[derive(Debug, Clone, Copy)]
pub struct Engines {
    pub walker: AncestorWalker,
    pub resolver: BinaryPlacementResolver,
    pub distribution: IncomeDistributionEngine,
    pub tree: TreeBuilder,
}

impl Engines {
    pub fn new(limits: &SafetyLimits) -> Self {
        let walker = AncestorWalker::new(limits.ancestor_depth_limit);
        Self {
            walker,
            resolver: BinaryPlacementResolver::new(limits.placement_visit_limit),
            distribution: IncomeDistributionEngine::new(walker),
            tree: TreeBuilder::new(limits.tree_max_depth, limits.placement_visit_limit),
        }
    }
}
