//! HTTP/1.1 implementation of the member agent protocol
//!
//! The operator connects straight to each pod through its headless Service
//! DNS name, so it must run inside the cluster network. Agents are plain HTTP
//! without authentication.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper::{Method, Request};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, trace};

use super::{AgentClient, AgentError, BootstrapRequest, GaleraMember, JoinRequest, RecoveryState};

/// Default timeout for one agent request (connect + request + response)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Agent client speaking HTTP/1.1 over a fresh connection per request
#[derive(Clone, Debug)]
pub struct HttpAgentClient {
    request_timeout: Duration,
}

impl Default for HttpAgentClient {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl HttpAgentClient {
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }

    async fn request(
        &self,
        member: &GaleraMember,
        method: Method,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<Bytes, AgentError> {
        timeout(self.request_timeout, send(member, method, path, body))
            .await
            .map_err(|_| AgentError::Timeout(member.name.clone()))?
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        member: &GaleraMember,
        method: Method,
        path: &str,
    ) -> Result<T, AgentError> {
        let body = self.request(member, method, path, None).await?;
        serde_json::from_slice(&body).map_err(|source| {
            debug!(
                member = %member.name,
                response = %String::from_utf8_lossy(&body),
                error = %source,
                "Failed to parse agent response"
            );
            AgentError::Json {
                member: member.name.clone(),
                source,
            }
        })
    }

    async fn put_json<T: Serialize>(
        &self,
        member: &GaleraMember,
        path: &str,
        payload: &T,
    ) -> Result<(), AgentError> {
        let body = serde_json::to_vec(payload).map_err(|source| AgentError::Json {
            member: member.name.clone(),
            source,
        })?;
        self.request(member, Method::PUT, path, Some(body)).await?;
        Ok(())
    }
}

#[async_trait]
impl AgentClient for HttpAgentClient {
    async fn galera_state(&self, member: &GaleraMember) -> Result<RecoveryState, AgentError> {
        self.get_json(member, Method::GET, "/api/galera/state").await
    }

    async fn recover(&self, member: &GaleraMember) -> Result<RecoveryState, AgentError> {
        self.get_json(member, Method::POST, "/api/recovery").await
    }

    async fn start_bootstrap(
        &self,
        member: &GaleraMember,
        request: &BootstrapRequest,
    ) -> Result<(), AgentError> {
        self.put_json(member, "/api/bootstrap", request).await
    }

    async fn join(&self, member: &GaleraMember, request: &JoinRequest) -> Result<(), AgentError> {
        self.put_json(member, "/api/join", request).await
    }

    async fn disable_bootstrap(&self, member: &GaleraMember) -> Result<(), AgentError> {
        self.request(member, Method::DELETE, "/api/bootstrap", None)
            .await?;
        Ok(())
    }
}

async fn send(
    member: &GaleraMember,
    method: Method,
    path: &str,
    body: Option<Vec<u8>>,
) -> Result<Bytes, AgentError> {
    let connection_error = |message: String| AgentError::Connection {
        member: member.name.clone(),
        message,
    };
    let http_error = |message: String| AgentError::Http {
        member: member.name.clone(),
        message,
    };

    let stream = TcpStream::connect((member.host.as_str(), member.port))
        .await
        .map_err(|e| connection_error(e.to_string()))?;

    let io = TokioIo::new(stream);

    let (mut sender, conn) = http1::handshake(io)
        .await
        .map_err(|e| http_error(e.to_string()))?;

    let mut builder = Request::builder()
        .method(method.clone())
        .uri(path)
        .header("Host", format!("{}:{}", member.host, member.port));
    if body.is_some() {
        builder = builder.header("Content-Type", "application/json");
    }
    let req = builder
        .body(Full::new(Bytes::from(body.unwrap_or_default())))
        .map_err(|e| http_error(e.to_string()))?;

    // The connection task must outlive send_request so the body can be read
    let conn_member = member.name.clone();
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(member = %conn_member, "Connection closed: {}", e);
        }
    });

    let response = sender
        .send_request(req)
        .await
        .map_err(|e| http_error(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(AgentError::Status {
            member: member.name.clone(),
            status: status.as_u16(),
        });
    }

    let body = response
        .into_body()
        .collect()
        .await
        .map_err(|e| http_error(e.to_string()))?
        .to_bytes();

    trace!(
        member = %member.name,
        %method,
        path,
        response = %String::from_utf8_lossy(&body),
        "Agent response"
    );

    Ok(body)
}
