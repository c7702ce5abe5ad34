//! Axum integration utilities.
//!
//! Authentication is out of scope: an upstream layer must insert an
//! [`AuthContext`] into the request extensions. [`RequirePermissionLayer`]
//! then enforces a permission requirement with the engine and maps the
//! outcome to a status code: 401 without a context, 403 on a confirmed
//! denial and 500 when the grant store could not answer.

use std::future::poll_fn;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use crate::cache::Cache;
use crate::engine::Engine;
use crate::permission::PermissionCode;
use crate::store::Store;
use crate::types::UserId;

use ::axum::body::Body;
use ::axum::http::{Request, StatusCode};
use ::axum::response::{IntoResponse, Response};
use ::tower::{Layer, Service};
use tracing::warn;

/// Authenticated caller, inserted into request extensions upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthContext {
    /// Caller identity.
    pub user: UserId,
}

impl AuthContext {
    /// Creates a context for `user`.
    pub fn new(user: UserId) -> Self {
        Self { user }
    }
}

#[derive(Debug, Clone)]
enum Requirement {
    Any(Vec<PermissionCode>),
    All(Vec<PermissionCode>),
}

impl Requirement {
    async fn evaluate<S, C>(&self, engine: &Engine<S, C>, user: UserId) -> crate::Result<bool>
    where
        S: Store,
        C: Cache,
    {
        match self {
            Self::Any(codes) => engine.check_any_permission(user, codes).await,
            Self::All(codes) => engine.check_all_permissions(user, codes).await,
        }
    }
}

/// Middleware layer that rejects requests lacking a permission.
#[derive(Debug)]
pub struct RequirePermissionLayer<S, C> {
    engine: Arc<Engine<S, C>>,
    requirement: Arc<Requirement>,
}

impl<S, C> Clone for RequirePermissionLayer<S, C> {
    fn clone(&self) -> Self {
        Self {
            engine: Arc::clone(&self.engine),
            requirement: Arc::clone(&self.requirement),
        }
    }
}

impl<S, C> RequirePermissionLayer<S, C> {
    /// Requires a single permission.
    pub fn new(engine: Arc<Engine<S, C>>, code: PermissionCode) -> Self {
        Self::all(engine, vec![code])
    }

    /// Requires at least one of `codes`.
    pub fn any(engine: Arc<Engine<S, C>>, codes: Vec<PermissionCode>) -> Self {
        Self {
            engine,
            requirement: Arc::new(Requirement::Any(codes)),
        }
    }

    /// Requires every one of `codes`.
    pub fn all(engine: Arc<Engine<S, C>>, codes: Vec<PermissionCode>) -> Self {
        Self {
            engine,
            requirement: Arc::new(Requirement::All(codes)),
        }
    }
}

impl<S, C, Inner> Layer<Inner> for RequirePermissionLayer<S, C> {
    type Service = RequirePermissionService<Inner, S, C>;

    fn layer(&self, inner: Inner) -> Self::Service {
        RequirePermissionService {
            inner,
            engine: Arc::clone(&self.engine),
            requirement: Arc::clone(&self.requirement),
        }
    }
}

/// Service produced by [`RequirePermissionLayer`].
#[derive(Debug)]
pub struct RequirePermissionService<Inner, S, C> {
    inner: Inner,
    engine: Arc<Engine<S, C>>,
    requirement: Arc<Requirement>,
}

impl<Inner: Clone, S, C> Clone for RequirePermissionService<Inner, S, C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            engine: Arc::clone(&self.engine),
            requirement: Arc::clone(&self.requirement),
        }
    }
}

impl<Inner, S, C> Service<Request<Body>> for RequirePermissionService<Inner, S, C>
where
    Inner: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    Inner::Future: Send + 'static,
    S: Store + 'static,
    C: Cache + 'static,
{
    type Response = Response;
    type Error = Inner::Error;
    type Future = Pin<Box<dyn std::future::Future<Output = Result<Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let mut inner = self.inner.clone();
        let engine = Arc::clone(&self.engine);
        let requirement = Arc::clone(&self.requirement);

        Box::pin(async move {
            let Some(context) = req.extensions().get::<AuthContext>().copied() else {
                return Ok((StatusCode::UNAUTHORIZED, "missing auth context").into_response());
            };

            match requirement.evaluate(&engine, context.user).await {
                Ok(true) => {
                    poll_fn(|cx| inner.poll_ready(cx)).await?;
                    inner.call(req).await
                }
                Ok(false) => {
                    warn!(user_id = %context.user, requirement = ?requirement, "request denied");
                    Ok((StatusCode::FORBIDDEN, "forbidden").into_response())
                }
                Err(_) => {
                    let body = (StatusCode::INTERNAL_SERVER_ERROR, "authorization unavailable");
                    Ok(body.into_response())
                }
            }
        })
    }
}
