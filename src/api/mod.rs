pub mod auth;
pub mod rest;
pub mod websocket;

use std::sync::Arc;
use crate::api::auth::JwtAuth;
use crate::relay::RelayHandle;

pub use rest::create_router;

pub struct ApiState {
    pub relay: Arc<RelayHandle>,
    /// `None` leaves the admin routes unauthenticated.
    pub admin_auth: Option<JwtAuth>,
}

impl ApiState {
    pub fn new(relay: Arc<RelayHandle>, admin_jwt_secret: Option<&str>) -> Self {
        ApiState {
            relay,
            admin_auth: admin_jwt_secret.map(JwtAuth::new),
        }
    }
}
