//! In-memory store for exercising the core without SQLite.

use super::{GraphStore, LedgerStore, RuleStore, ServiceCatalog};
use crate::domain::{
    ChildLink, Decimal, DistributionRule, LedgerEntry, NewNode, Node, Position, Purchase,
    PurchaseId, ReferralCode, ServiceBv, ServiceId, TimeMs, UserId,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};

/// Map-backed store. Does not enforce slot uniqueness, so tests can build corrupt graphs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    nodes: BTreeMap<UserId, Node>,
    services: HashMap<ServiceId, ServiceBv>,
    rule: Option<DistributionRule>,
    purchases: BTreeMap<PurchaseId, Purchase>,
    ledger: Vec<LedgerEntry>,
    fail_ledger_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a root node with a derived referral code.
    pub fn with_root(mut self, id: i64) -> Self {
        self.insert_node(UserId::new(id), None, None);
        self
    }

    /// Add a node attached under `parent` at `position`.
    pub fn with_child(mut self, id: i64, parent: i64, position: Position) -> Self {
        self.insert_node(UserId::new(id), Some(UserId::new(parent)), Some(position));
        self
    }

    /// Point an existing node at any parent, even one that creates a cycle.
    pub fn with_parent_override(mut self, id: i64, parent: i64) -> Self {
        if let Some(node) = self.nodes.get_mut(&UserId::new(id)) {
            node.parent_id = Some(UserId::new(parent));
        }
        self
    }

    /// Build a straight line `1 <- 2 <- ... <- n` where each node is the left child of the previous.
    pub fn with_chain(mut self, len: i64) -> Self {
        self.insert_node(UserId::new(1), None, None);
        for id in 2..=len {
            self.insert_node(UserId::new(id), Some(UserId::new(id - 1)), Some(Position::Left));
        }
        self
    }

    pub fn with_service(mut self, id: i64, service: ServiceBv) -> Self {
        self.services.insert(ServiceId::new(id), service);
        self
    }

    pub fn with_rule(mut self, rule: DistributionRule) -> Self {
        self.rule = Some(rule);
        self
    }

    /// Make every `append_batch` fail, simulating a storage fault mid-distribution.
    pub fn failing_ledger(mut self) -> Self {
        self.fail_ledger_writes = true;
        self
    }

    pub fn node(&self, id: i64) -> Option<&Node> {
        self.nodes.get(&UserId::new(id))
    }

    pub fn ledger(&self) -> &[LedgerEntry] {
        &self.ledger
    }

    pub fn purchase(&self, id: PurchaseId) -> Option<&Purchase> {
        self.purchases.get(&id)
    }

    fn insert_node(&mut self, id: UserId, parent_id: Option<UserId>, position: Option<Position>) {
        self.nodes.insert(
            id,
            Node {
                id,
                parent_id,
                position,
                referral_code: ReferralCode::new(format!("REF{}", id)),
                name: format!("user{}", id),
                email: format!("user{}@example.com", id),
            },
        );
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn get(&mut self, id: UserId) -> Result<Option<Node>, sqlx::Error> {
        Ok(self.nodes.get(&id).cloned())
    }

    async fn find_children(&mut self, parent: UserId) -> Result<Vec<ChildLink>, sqlx::Error> {
        let mut children: Vec<ChildLink> = self
            .nodes
            .values()
            .filter(|n| n.parent_id == Some(parent))
            .map(|n| ChildLink {
                id: n.id,
                position: n.position,
            })
            .collect();
        // Slotted children first (left < right), then unslotted, ties by id.
        children.sort_by_key(|c| (c.position.is_none(), c.position, c.id));
        Ok(children)
    }

    async fn find_by_referral_code(
        &mut self,
        code: &ReferralCode,
    ) -> Result<Option<Node>, sqlx::Error> {
        Ok(self
            .nodes
            .values()
            .find(|n| &n.referral_code == code)
            .cloned())
    }

    async fn find_by_email(&mut self, email: &str) -> Result<Option<Node>, sqlx::Error> {
        Ok(self.nodes.values().find(|n| n.email == email).cloned())
    }

    async fn set_parent(
        &mut self,
        id: UserId,
        parent: UserId,
        position: Position,
    ) -> Result<(), sqlx::Error> {
        let node = self.nodes.get_mut(&id).ok_or(sqlx::Error::RowNotFound)?;
        node.parent_id = Some(parent);
        node.position = Some(position);
        Ok(())
    }

    async fn create(&mut self, new: &NewNode) -> Result<UserId, sqlx::Error> {
        let id = UserId::new(self.nodes.keys().last().map(|id| id.as_i64()).unwrap_or(0) + 1);
        self.nodes.insert(
            id,
            Node {
                id,
                parent_id: None,
                position: None,
                referral_code: new.referral_code.clone(),
                name: new.name.clone(),
                email: new.email.clone(),
            },
        );
        Ok(id)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn append_batch(&mut self, entries: &[LedgerEntry]) -> Result<(), sqlx::Error> {
        if self.fail_ledger_writes {
            return Err(sqlx::Error::Protocol("simulated ledger fault".to_string()));
        }
        self.ledger.extend_from_slice(entries);
        Ok(())
    }

    async fn create_purchase(
        &mut self,
        user: UserId,
        service: ServiceId,
    ) -> Result<PurchaseId, sqlx::Error> {
        let id = PurchaseId::new(self.purchases.len() as i64 + 1);
        self.purchases.insert(
            id,
            Purchase {
                id,
                user_id: user,
                service_id: service,
                bv: Decimal::zero(),
                created_at: TimeMs::now(),
            },
        );
        Ok(id)
    }

    async fn set_purchase_bv(&mut self, purchase: PurchaseId, bv: Decimal) -> Result<(), sqlx::Error> {
        let row = self
            .purchases
            .get_mut(&purchase)
            .ok_or(sqlx::Error::RowNotFound)?;
        row.bv = bv;
        Ok(())
    }
}

#[async_trait]
impl ServiceCatalog for MemoryStore {
    async fn get_bv(&mut self, service: ServiceId) -> Result<Option<ServiceBv>, sqlx::Error> {
        Ok(self.services.get(&service).cloned())
    }
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn active_rule(&mut self) -> Result<Option<DistributionRule>, sqlx::Error> {
        Ok(self.rule.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_children_ordered_left_right_then_unslotted() {
        let mut store = MemoryStore::new()
            .with_root(1)
            .with_child(4, 1, Position::Right)
            .with_child(3, 1, Position::Left)
            .with_root(2)
            .with_parent_override(2, 1);

        let children = store.find_children(UserId::new(1)).await.unwrap();
        let ids: Vec<i64> = children.iter().map(|c| c.id.as_i64()).collect();
        assert_eq!(ids, vec![3, 4, 2]);
    }

    #[tokio::test]
    async fn test_chain_builder() {
        let mut store = MemoryStore::new().with_chain(3);
        let tail = store.get(UserId::new(3)).await.unwrap().unwrap();
        assert_eq!(tail.parent_id, Some(UserId::new(2)));
        assert!(store.node(1).unwrap().is_root());
    }
}
