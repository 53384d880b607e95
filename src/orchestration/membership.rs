//! Joining the network and moving members into the tree.

use crate::db::Repository;
use crate::domain::{Assignment, NewNode, Node, ReferralCode, TreeNode, UserId};
use crate::engine::{assign_parent, AncestorWalker, BinaryPlacementResolver, Engines};
use crate::error::CoreError;
use crate::store::{GraphStore, ReferralCodeIssuer};
use backoff::future::retry;
use backoff::ExponentialBackoff;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// A request to join, optionally under a sponsor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub sponsor_code: Option<ReferralCode>,
}

impl Registration {
    /// Trim the fields and reject blank names and malformed emails.
    pub fn normalized(self) -> Result<Self, CoreError> {
        let name = self.name.trim().to_string();
        let email = self.email.trim().to_lowercase();
        if name.is_empty() {
            return Err(CoreError::Validation("name must not be empty".to_string()));
        }
        let well_formed = email
            .split_once('@')
            .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
            .unwrap_or(false);
        if !well_formed {
            return Err(CoreError::Validation(format!("invalid email: {}", email)));
        }
        let sponsor_code = self
            .sponsor_code
            .map(|c| ReferralCode::new(c.as_str().trim().to_string()))
            .filter(|c| !c.as_str().is_empty());
        Ok(Self {
            name,
            email,
            sponsor_code,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Joined {
    pub user_id: UserId,
    pub referral_code: ReferralCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<Assignment>,
}

/// Create a member and, with a sponsor code, place it. Nothing is written when
/// the email is taken or the sponsor code is unknown.
pub async fn register<S>(
    store: &mut S,
    walker: &AncestorWalker,
    resolver: &BinaryPlacementResolver,
    code: ReferralCode,
    registration: &Registration,
) -> Result<Joined, CoreError>
where
    S: GraphStore + ?Sized,
{
    if store.find_by_email(&registration.email).await?.is_some() {
        return Err(CoreError::Validation(format!(
            "email {} is already registered",
            registration.email
        )));
    }
    if let Some(sponsor) = &registration.sponsor_code {
        if store.find_by_referral_code(sponsor).await?.is_none() {
            return Err(CoreError::NotFound(format!("referral code {}", sponsor)));
        }
    }

    let user_id = store
        .create(&NewNode {
            name: registration.name.clone(),
            email: registration.email.clone(),
            referral_code: code.clone(),
        })
        .await?;

    let assignment = match &registration.sponsor_code {
        Some(sponsor) => Some(assign_parent(store, walker, resolver, user_id, sponsor).await?),
        None => None,
    };

    Ok(Joined {
        user_id,
        referral_code: code,
        assignment,
    })
}

/// Membership operations over the SQLite store.
///
/// Without transactions a join commits its user row before placing it, so a
/// lost slot race cannot be retried cleanly. In that mode placements from this
/// process run one at a time behind `placement_lock`.
#[derive(Clone)]
pub struct Membership {
    repo: Arc<Repository>,
    engines: Engines,
    issuer: Arc<dyn ReferralCodeIssuer>,
    retry_max: Duration,
    placement_lock: Arc<Mutex<()>>,
}

impl Membership {
    pub fn new(
        repo: Arc<Repository>,
        engines: Engines,
        issuer: Arc<dyn ReferralCodeIssuer>,
        retry_max: Duration,
    ) -> Self {
        Self {
            repo,
            engines,
            issuer,
            retry_max,
            placement_lock: Arc::new(Mutex::new(())),
        }
    }

    async fn serialize_placement(&self) -> Option<MutexGuard<'_, ()>> {
        if self.repo.is_transactional() {
            None
        } else {
            Some(self.placement_lock.lock().await)
        }
    }

    pub async fn join(&self, registration: Registration) -> Result<Joined, CoreError> {
        let registration = registration.normalized()?;
        let Engines {
            walker, resolver, ..
        } = self.engines;

        let _serial = self.serialize_placement().await;
        let joined = self
            .with_retry("join", || {
                let code = self.issuer.generate();
                let registration = registration.clone();
                self.repo.unit_of_work(move |conn| {
                    Box::pin(async move {
                        register(conn, &walker, &resolver, code, &registration).await
                    })
                })
            })
            .await?;

        info!(
            user = %joined.user_id,
            placed = joined.assignment.is_some(),
            "Member joined"
        );
        Ok(joined)
    }

    /// Place an existing root member under the owner of `parent_code`.
    pub async fn assign_parent(
        &self,
        child: UserId,
        parent_code: ReferralCode,
    ) -> Result<Assignment, CoreError> {
        let Engines {
            walker, resolver, ..
        } = self.engines;

        let _serial = self.serialize_placement().await;
        self.with_retry("assign_parent", || {
            let parent_code = parent_code.clone();
            self.repo.unit_of_work(move |conn| {
                Box::pin(async move {
                    assign_parent(conn, &walker, &resolver, child, &parent_code).await
                })
            })
        })
        .await
    }

    pub async fn profile(&self, id: UserId) -> Result<Node, CoreError> {
        self.repo
            .get_user(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("user {}", id)))
    }

    pub async fn tree(&self, root: UserId, depth: u32) -> Result<TreeNode, CoreError> {
        let mut conn = self.repo.pool().acquire().await?;
        self.engines.tree.build(&mut *conn, root, depth).await
    }

    /// Re-run `op` while it fails on a lost slot or code race, up to `retry_max`.
    async fn with_retry<T, Op, Fut>(&self, what: &'static str, mut op: Op) -> Result<T, CoreError>
    where
        Op: FnMut() -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        let policy = ExponentialBackoff {
            initial_interval: Duration::from_millis(5),
            max_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.retry_max),
            ..Default::default()
        };

        retry(policy, || {
            let attempt = op();
            async move {
                attempt.await.map_err(|e| {
                    if e.is_contention() {
                        debug!(operation = what, error = %e, "Lost a placement race; retrying");
                        backoff::Error::transient(e)
                    } else {
                        backoff::Error::permanent(e)
                    }
                })
            }
        })
        .await
        .map_err(|e| {
            if e.is_contention() {
                warn!(operation = what, error = %e, "Placement retries exhausted");
            }
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Position;
    use crate::store::MemoryStore;

    fn registration(n: u32, sponsor: Option<&str>) -> Registration {
        Registration {
            name: format!("member {}", n),
            email: format!("member{}@example.com", n),
            sponsor_code: sponsor.map(|s| ReferralCode::new(s.to_string())),
        }
    }

    async fn run(store: &mut MemoryStore, code: &str, reg: Registration) -> Result<Joined, CoreError> {
        register(
            store,
            &AncestorWalker::new(100),
            &BinaryPlacementResolver::new(100),
            ReferralCode::new(code.to_string()),
            &reg,
        )
        .await
    }

    #[test]
    fn test_normalized_trims_and_validates() {
        let reg = Registration {
            name: "  Ada ".to_string(),
            email: " Ada@Example.com ".to_string(),
            sponsor_code: Some(ReferralCode::new("  ".to_string())),
        }
        .normalized()
        .unwrap();
        assert_eq!(reg.name, "Ada");
        assert_eq!(reg.email, "ada@example.com");
        assert_eq!(reg.sponsor_code, None);

        for (name, email) in [("", "a@b.co"), ("a", "nope"), ("a", "@b.co"), ("a", "a@local")] {
            let err = Registration {
                name: name.to_string(),
                email: email.to_string(),
                sponsor_code: None,
            }
            .normalized()
            .unwrap_err();
            assert!(matches!(err, CoreError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_register_without_sponsor_creates_root() {
        let mut store = MemoryStore::new();
        let joined = run(&mut store, "ROOT", registration(1, None)).await.unwrap();

        assert!(joined.assignment.is_none());
        let node = store.node(joined.user_id.as_i64()).unwrap();
        assert!(node.is_root());
        assert_eq!(node.referral_code.as_str(), "ROOT");
    }

    #[tokio::test]
    async fn test_register_places_under_sponsor() {
        let mut store = MemoryStore::new().with_root(1);
        let joined = run(&mut store, "NEW", registration(2, Some("REF1")))
            .await
            .unwrap();

        let assignment = joined.assignment.unwrap();
        assert_eq!(assignment.parent_user_id, UserId::new(1));
        assert_eq!(assignment.position, Position::Left);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email_and_unknown_sponsor() {
        let mut store = MemoryStore::new().with_root(1);

        let err = run(&mut store, "X", registration(9, Some("NOPE")))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let mut dup = registration(9, None);
        dup.email = "user1@example.com".to_string();
        let err = run(&mut store, "Y", dup).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));

        // Neither attempt left a node behind.
        assert!(store.node(2).is_none());
    }
}
