//! Caller identity.
//!
//! Authentication happens upstream of this server. The authenticating proxy forwards the caller's user id in a
//! configurable header (`SPG_AUTH_USER_HEADER`, `x-spg-user` by default), and handlers that act on behalf of a user
//! take an [`AuthenticatedUser`] argument to read it. Requests without the header are rejected with
//! `401 Unauthorized` before the handler runs.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use log::*;

use crate::{
    config::{ServerOptions, DEFAULT_AUTH_USER_HEADER},
    errors::ServerError,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

impl FromRequest for AuthenticatedUser {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let header = req
            .app_data::<web::Data<ServerOptions>>()
            .map(|o| o.auth_user_header.as_str())
            .unwrap_or(DEFAULT_AUTH_USER_HEADER);
        let user_id = req
            .headers()
            .get(header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());
        let result = match user_id {
            Some(user_id) => {
                trace!("💻️ Request made by user {user_id}");
                Ok(Self { user_id })
            },
            None => {
                debug!("💻️ No user id found in {header}. Rejecting request.");
                Err(ServerError::Unauthenticated)
            },
        };
        ready(result)
    }
}
