//! Per-route request gate.
//!
//! Every route carries a [`Requirement`]. The gate opens the session cookie,
//! loads the identity and its roles fresh from the store, and either lets
//! the request through or answers 401/403 before any handler runs.
//! Ownership is checked later, inside handlers, via [`CurrentUser::ensure_owner`].

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, FromRequestParts, OptionalFromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use chrono::Utc;
use tracing::{debug, warn};

use super::{ApiError, AppState};
use crate::auth::{Decision, Requirement, Role, RoleSet, SessionTicket, check_ownership};
use crate::db::Identity;
use crate::services::RequestContext;

/// Authenticated caller with the roles it held when the request arrived.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub identity: Identity,
    pub roles: RoleSet,
}

impl CurrentUser {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.identity.id
    }

    #[must_use]
    pub fn has_any(&self, roles: &[Role]) -> bool {
        self.roles.contains_any(roles)
    }

    /// 403 unless the caller owns the resource or holds an override role.
    pub fn ensure_owner(&self, owner_id: Option<&str>, overrides: &[Role]) -> Result<(), ApiError> {
        match check_ownership(self.id(), &self.roles, owner_id, overrides) {
            Decision::Allow => Ok(()),
            Decision::Deny => {
                metrics::counter!("gate_decisions_total", "outcome" => "forbidden_owner")
                    .increment(1);
                debug!(user_id = %self.id(), "Ownership check denied");
                Err(ApiError::forbidden())
            }
        }
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or_else(ApiError::unauthenticated)
    }
}

impl<S> OptionalFromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<Self>().cloned())
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(Self::unknown))
    }
}

#[derive(Clone)]
pub struct Gate {
    state: Arc<AppState>,
    requirement: Arc<Requirement>,
}

/// Wraps a method router so every request to it passes the gate first.
pub fn gated(
    state: &Arc<AppState>,
    requirement: Requirement,
    route: MethodRouter<Arc<AppState>>,
) -> MethodRouter<Arc<AppState>> {
    let gate = Gate {
        state: state.clone(),
        requirement: Arc::new(requirement),
    };

    route.route_layer(middleware::from_fn_with_state(gate, enforce))
}

/// Source address of the request. `X-Forwarded-For` is honoured only when
/// the direct peer is a configured trusted proxy.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>, trusted_proxies: &[String]) -> String {
    let Some(peer) = peer else {
        return RequestContext::UNKNOWN_IP.to_string();
    };

    let peer_ip = peer.ip().to_string();

    if trusted_proxies.iter().any(|p| p == &peer_ip)
        && let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').map(str::trim).find(|s| !s.is_empty())
    {
        return first.to_string();
    }

    peer_ip
}

async fn enforce(State(gate): State<Gate>, mut req: Request, next: Next) -> Response {
    let state = &gate.state;
    let now = Utc::now();

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ctx = RequestContext::new(client_ip(
        req.headers(),
        peer,
        &state.config().security.auth_throttle.trusted_proxy_ips,
    ));

    let ticket = state.cookies().open(req.headers(), now);

    let caller = match &ticket {
        Some(ticket) => match resolve_caller(state, ticket).await {
            Ok(caller) => caller,
            Err(e) => return e.into_response(),
        },
        None => None,
    };

    match &caller {
        None if gate.requirement.requires_identity() => {
            metrics::counter!("gate_decisions_total", "outcome" => "unauthenticated").increment(1);
            return ApiError::unauthenticated().into_response();
        }
        Some(user) if !gate.requirement.evaluate(&user.roles).is_allowed() => {
            metrics::counter!("gate_decisions_total", "outcome" => "forbidden").increment(1);
            debug!(user_id = %user.id(), requirement = %gate.requirement, "Role check denied");
            return ApiError::forbidden().into_response();
        }
        _ => {}
    }

    metrics::counter!("gate_decisions_total", "outcome" => "allowed").increment(1);

    if let Some(user) = &caller {
        tracing::Span::current().record("user_id", user.id());
        req.extensions_mut().insert(user.clone());
    }
    req.extensions_mut().insert(ctx);

    let mut response = next.run(req).await;

    // Handlers that set their own cookie (login, logout) win over renewal.
    if caller.is_some()
        && let Some(ticket) = ticket
        && !response.headers().contains_key(header::SET_COOKIE)
    {
        match state.cookies().renew(&ticket, now) {
            Ok(Some(cookie)) => {
                response.headers_mut().append(header::SET_COOKIE, cookie);
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to renew session cookie: {e}"),
        }
    }

    response
}

/// A ticket whose identity is gone or inactive counts as no session.
async fn resolve_caller(
    state: &AppState,
    ticket: &SessionTicket,
) -> Result<Option<CurrentUser>, ApiError> {
    let Some(identity) = state.store().get_user(&ticket.sub).await? else {
        return Ok(None);
    };

    if !identity.is_active {
        return Ok(None);
    }

    let roles = state.store().roles_for_user(&identity.id).await?;
    Ok(Some(CurrentUser { identity, roles }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn forwarded(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_client_ip_without_peer_is_unknown() {
        assert_eq!(client_ip(&HeaderMap::new(), None, &[]), "Unknown");
    }

    #[test]
    fn test_forwarded_header_ignored_from_untrusted_peer() {
        let peer: SocketAddr = "203.0.113.9:4000".parse().unwrap();
        let ip = client_ip(&forwarded("198.51.100.1"), Some(peer), &[]);
        assert_eq!(ip, "203.0.113.9");
    }

    #[test]
    fn test_forwarded_header_used_from_trusted_proxy() {
        let peer: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let ip = client_ip(
            &forwarded("198.51.100.1, 10.0.0.2"),
            Some(peer),
            &["127.0.0.1".to_string()],
        );
        assert_eq!(ip, "198.51.100.1");
    }
}
