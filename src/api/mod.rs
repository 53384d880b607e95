pub mod health;
pub mod purchases;
pub mod rules;
pub mod users;

use crate::config::Config;
use crate::db::Repository;
use crate::engine::Engines;
use crate::orchestration::{Membership, PurchaseOrchestrator};
use crate::store::{HashCodeIssuer, ReferralCodeIssuer};
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub config: Config,
    pub membership: Arc<Membership>,
    pub purchases: Arc<PurchaseOrchestrator>,
}

impl AppState {
    pub fn new(repo: Arc<Repository>, config: Config) -> Self {
        let issuer: Arc<dyn ReferralCodeIssuer> = Arc::new(HashCodeIssuer::default());
        Self::with_issuer(repo, config, issuer)
    }

    pub fn with_issuer(
        repo: Arc<Repository>,
        config: Config,
        issuer: Arc<dyn ReferralCodeIssuer>,
    ) -> Self {
        let engines = Engines::new(&config.limits);
        let membership = Arc::new(Membership::new(
            repo.clone(),
            engines,
            issuer,
            config.placement_retry_max,
        ));
        let purchases = Arc::new(PurchaseOrchestrator::new(
            repo.clone(),
            engines.distribution,
        ));
        Self {
            repo,
            config,
            membership,
            purchases,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route("/ready", get(health::ready))
        .route("/v1/users", post(users::join))
        .route("/v1/users/:id", get(users::get_user))
        .route("/v1/users/:id/parent", post(users::assign_parent))
        .route("/v1/users/:id/tree", get(users::get_tree))
        .route("/v1/users/:id/income", get(users::get_income))
        .route("/v1/purchases", post(purchases::create_purchase))
        .route("/v1/purchases/:id", get(purchases::get_purchase))
        .route("/v1/distributions", post(purchases::distribute))
        .route("/v1/rules", post(rules::create_rule))
        .route("/v1/rules/active", get(rules::get_active_rule))
        .route("/v1/rules/:id/activate", post(rules::activate_rule))
        .layer(cors)
        .with_state(state)
}
