use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth_middleware::{AuthSecret, AuthUser};
use crate::config::Config;
use crate::gateway::clients::{CartApi, FavouritesApi, OrderApi, ProductApi, SsoApi};
use crate::rpc::CallContext;
use crate::services::PaymentService;

/// Shared application state for the gateway handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub products: Arc<dyn ProductApi>,
    pub cart: Arc<dyn CartApi>,
    pub orders: Arc<dyn OrderApi>,
    pub favourites: Arc<dyn FavouritesApi>,
    pub sso: Arc<dyn SsoApi>,
    pub payments: Arc<PaymentService>,
}

impl AppState {
    /// Context for public routes: request budget, no identity.
    pub fn call_context(&self) -> CallContext {
        CallContext::new(self.config.request_timeout)
    }

    /// Context for protected routes with the caller identity attached.
    pub fn user_call_context(&self, user: &AuthUser) -> CallContext {
        CallContext::with_user(user.user_sso_id, self.config.request_timeout)
    }
}

impl FromRef<AppState> for AuthSecret {
    fn from_ref(state: &AppState) -> Self {
        AuthSecret(state.config.app_secret.clone())
    }
}
