//! HTTP + SSE surface for the PulZ engine, mounted under `/api/pulz`
//! (`SPEC_FULL.md` §6). Grounded on `tandem-server`'s `AppState`/`app_router`
//! split: one `Clone`-able state struct the binary builds once, one router
//! function that lays CORS and an auth gate over it.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::http::StatusCode;
use pulz_orchestrator::MissionEngineHandle;

pub use http::app_router;

/// Shared server state. Unlike `tandem-server`'s `AppState` (which defers
/// most of its fields behind a `OnceLock<RuntimeState>` because the runtime
/// boots asynchronously after the HTTP listener binds) this engine always
/// constructs its `MissionEngineHandle` before the listener starts, so there
/// is nothing to defer.
#[derive(Clone)]
pub struct AppState {
    pub engine: MissionEngineHandle,
    pub verifier: Arc<dyn UserVerifier>,
}

impl AppState {
    pub fn new(engine: MissionEngineHandle, verifier: Arc<dyn UserVerifier>) -> Self {
        Self { engine, verifier }
    }
}

impl FromRef<AppState> for MissionEngineHandle {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

/// Hook point for `spec.md` §6's "optionally behind verified-user
/// authentication". This core has no identity backend of its own — the
/// codebase this was translated from treats that as an external
/// collaborator's problem (`spec.md` §9 Open Questions) — so the binary
/// crate supplies one of two trivial implementations based on `AUTH`:
/// [`NoAuth`] when unset/false, [`AlwaysDenyAuth`] when true. A real
/// deployment would supply its own.
#[async_trait]
pub trait UserVerifier: Send + Sync {
    async fn verify(&self, parts: &Parts) -> Result<(), StatusCode>;
}

/// Installed when `AUTH` is unset or false: every request passes.
pub struct NoAuth;

#[async_trait]
impl UserVerifier for NoAuth {
    async fn verify(&self, _parts: &Parts) -> Result<(), StatusCode> {
        Ok(())
    }
}

/// Installed when `AUTH=true`: since no identity backend ships here, every
/// request is rejected rather than silently accepted (`spec.md` §6).
pub struct AlwaysDenyAuth;

#[async_trait]
impl UserVerifier for AlwaysDenyAuth {
    async fn verify(&self, _parts: &Parts) -> Result<(), StatusCode> {
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Extractor marker proving a request passed [`UserVerifier::verify`].
/// Handlers that must be gated take `VerifiedUser` as an argument; axum
/// rejects the request with the verifier's status before the handler body
/// ever runs.
pub struct VerifiedUser;

#[async_trait]
impl FromRequestParts<AppState> for VerifiedUser {
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, StatusCode> {
        state.verifier.verify(parts).await?;
        Ok(VerifiedUser)
    }
}
