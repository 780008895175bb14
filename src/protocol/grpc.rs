//! gRPC adapter (design §4.I): typed messages, errors mapped to canonical
//! status codes via `ErrorKind::grpc_code`, request id carried in metadata.
//! Grounded in `acton-service`'s multi-protocol `lib.rs` (HTTP + gRPC on one
//! process, `tonic::Status` for error propagation).

pub mod pb {
    tonic::include_proto!("phoenix.bcp.v1");
}

use crate::auth::{AuthGate, Credentials, TransportMetadata};
use crate::error::ErrorKind;
use crate::pages::PageManager;
use crate::session::{NewSession, SessionId, SessionPatch, SessionStore};
use pb::session_service_server::{SessionService, SessionServiceServer};
use pb::{
    CreateSessionRequest, DeleteSessionRequest, DeleteSessionResponse, GetSessionRequest,
    ListSessionsRequest, ListSessionsResponse, RefreshSessionRequest, Session as PbSession,
    UpdateSessionRequest, ValidateSessionRequest, ValidateSessionResponse,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};

fn to_status(err: ErrorKind) -> Status {
    Status::new(tonic::Code::from_i32(err.grpc_code()), err.to_string())
}

fn to_pb(session: crate::session::Session) -> PbSession {
    PbSession {
        id: session.id.to_string(),
        user_id: session.user_id,
        username: session.username,
        roles: session.roles,
        created_at_unix_ms: session.created_at.timestamp_millis(),
        expires_at_unix_ms: session.expires_at.timestamp_millis(),
    }
}

fn parse_id(raw: &str) -> Result<SessionId, Status> {
    SessionId::from_str(raw).map_err(|_| Status::invalid_argument("malformed session id"))
}

async fn authenticate(auth: &dyn AuthGate, request: &Request<impl Sized>) -> Result<(), Status> {
    let token = request
        .metadata()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| Status::unauthenticated("missing bearer token"))?;
    auth.authenticate(
        Credentials::Bearer(token.to_string()),
        TransportMetadata { remote_addr: None, user_agent: None, protocol: "grpc" },
    )
    .await
    .map(|_| ())
    .map_err(to_status)
}

pub struct SessionGrpcService {
    pub sessions: Arc<dyn SessionStore>,
    pub auth: Arc<dyn AuthGate>,
}

#[tonic::async_trait]
impl SessionService for SessionGrpcService {
    async fn create(&self, request: Request<CreateSessionRequest>) -> Result<Response<PbSession>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let body = request.into_inner();
        let id = self
            .sessions
            .create(NewSession {
                user_id: body.user_id,
                username: body.username,
                roles: body.roles,
                metadata: serde_json::Value::Null,
                ttl: Duration::from_secs(3600),
            })
            .await
            .map_err(to_status)?;
        let session = self.sessions.get(id).await.map_err(to_status)?.ok_or_else(|| {
            Status::internal("session vanished immediately after create")
        })?;
        Ok(Response::new(to_pb(session)))
    }

    async fn get(&self, request: Request<GetSessionRequest>) -> Result<Response<PbSession>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let id = parse_id(&request.into_inner().id)?;
        let session = self
            .sessions
            .get(id)
            .await
            .map_err(to_status)?
            .ok_or_else(|| to_status(ErrorKind::NotFound(format!("session {id}"))))?;
        Ok(Response::new(to_pb(session)))
    }

    async fn update(&self, request: Request<UpdateSessionRequest>) -> Result<Response<PbSession>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let body = request.into_inner();
        let id = parse_id(&body.id)?;
        let roles = if body.update_mask.iter().any(|f| f == "roles") {
            Some(body.roles)
        } else {
            None
        };
        let session = self
            .sessions
            .update(id, SessionPatch { roles, metadata: None, extend_ttl: None })
            .await
            .map_err(to_status)?;
        Ok(Response::new(to_pb(session)))
    }

    async fn delete(&self, request: Request<DeleteSessionRequest>) -> Result<Response<DeleteSessionResponse>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let id = parse_id(&request.into_inner().id)?;
        let deleted = self.sessions.delete(id).await.map_err(to_status)?;
        Ok(Response::new(DeleteSessionResponse { deleted }))
    }

    async fn list(&self, request: Request<ListSessionsRequest>) -> Result<Response<ListSessionsResponse>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let user_id = request.into_inner().user_id;
        let sessions = self
            .sessions
            .list(user_id.as_deref())
            .await
            .map_err(to_status)?
            .into_iter()
            .map(to_pb)
            .collect();
        Ok(Response::new(ListSessionsResponse { sessions }))
    }

    async fn refresh(&self, request: Request<RefreshSessionRequest>) -> Result<Response<PbSession>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let id = parse_id(&request.into_inner().id)?;
        self.sessions.touch(id).await.map_err(to_status)?;
        let session = self
            .sessions
            .get(id)
            .await
            .map_err(to_status)?
            .ok_or_else(|| to_status(ErrorKind::NotFound(format!("session {id}"))))?;
        Ok(Response::new(to_pb(session)))
    }

    async fn validate(&self, request: Request<ValidateSessionRequest>) -> Result<Response<ValidateSessionResponse>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let id = parse_id(&request.into_inner().id)?;
        let valid = matches!(self.sessions.get(id).await.map_err(to_status)?, Some(s) if !s.is_expired());
        Ok(Response::new(ValidateSessionResponse { valid }))
    }
}

pub fn session_server(sessions: Arc<dyn SessionStore>, auth: Arc<dyn AuthGate>) -> SessionServiceServer<SessionGrpcService> {
    SessionServiceServer::new(SessionGrpcService { sessions, auth })
}

pub use pb::context_service_server::{ContextService, ContextServiceServer};
use pb::{Context as PbContext, CreateContextRequest};

pub struct ContextGrpcService {
    pub pages: Arc<PageManager>,
    pub auth: Arc<dyn AuthGate>,
}

#[tonic::async_trait]
impl ContextService for ContextGrpcService {
    async fn create(&self, request: Request<CreateContextRequest>) -> Result<Response<PbContext>, Status> {
        authenticate(self.auth.as_ref(), &request).await?;
        let session_id = parse_id(&request.into_inner().session_id)?;
        let context_id = self.pages.create_context(session_id).await;
        Ok(Response::new(PbContext { id: context_id.to_string(), session_id: session_id.to_string() }))
    }
}

pub fn context_server(pages: Arc<PageManager>, auth: Arc<dyn AuthGate>) -> ContextServiceServer<ContextGrpcService> {
    ContextServiceServer::new(ContextGrpcService { pages, auth })
}

pub use pb::health_service_server::{HealthService, HealthServiceServer};
use pb::{HealthCheckRequest, HealthCheckResponse};

pub struct HealthGrpcService;

#[tonic::async_trait]
impl HealthService for HealthGrpcService {
    async fn check(&self, _request: Request<HealthCheckRequest>) -> Result<Response<HealthCheckResponse>, Status> {
        Ok(Response::new(HealthCheckResponse {
            status: pb::health_check_response::ServingStatus::Serving as i32,
        }))
    }
}
