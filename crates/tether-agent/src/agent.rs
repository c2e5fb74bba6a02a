//! Enrollment orchestration
//!
//! Bootstrap is a strictly sequential pipeline: resolve identity, ensure
//! keys, probe the service, authorize the device, open the tunnel. Each
//! transition consumes the previous stage's payload and produces the next,
//! so no stage can be skipped and no state is filled in piecemeal. Any
//! failure is tagged with the stage it occurred in and aborts the run;
//! retries happen only inside individual transport calls.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use tether_core::config::AgentConfig;
use tether_core::error::{ApiError, IdentityError, TunnelError};
use tether_core::types::{DeviceIdentity, DeviceInfo, ServiceDescriptor};

use crate::api::{ApiClient, DeviceAuthRequest, DeviceAuthResponse, ServiceInfo};
use crate::keys::{self, KeyError};
use crate::tunnel::{ReverseListener, TunnelTransport};
use crate::{identity, AGENT_VERSION};

/// Bootstrap stages, in order. Tagged onto every bootstrap failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ResolveIdentity,
    EnsureKeys,
    ProbeService,
    Authorize,
    OpenTunnel,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ResolveIdentity => "resolve device identity",
            Stage::EnsureKeys => "ensure device keypair",
            Stage::ProbeService => "probe service info",
            Stage::Authorize => "authorize device",
            Stage::OpenTunnel => "open reverse tunnel",
        };
        f.write_str(name)
    }
}

/// The error kinds a bootstrap stage can produce
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),
}

/// A bootstrap failure, annotated with the stage it occurred in.
///
/// The underlying kind is preserved unmodified so callers can still match
/// on it.
#[derive(Debug, Error)]
#[error("failed to {stage}: {source}")]
pub struct BootstrapError {
    pub stage: Stage,
    #[source]
    pub source: AgentError,
}

impl BootstrapError {
    fn at(stage: Stage) -> impl FnOnce(AgentError) -> Self {
        move |source| Self { stage, source }
    }
}

/// Stage payload: identity resolved, device metadata captured
#[derive(Debug)]
pub struct IdentityResolved {
    pub identity: DeviceIdentity,
    pub info: DeviceInfo,
}

/// Stage payload: keypair present on disk, public half loaded
#[derive(Debug)]
pub struct KeysReady {
    pub identity: DeviceIdentity,
    pub info: DeviceInfo,
    pub public_key_pem: String,
}

/// Stage payload: service probed and compatible
#[derive(Debug)]
pub struct ServiceProbed {
    pub keys: KeysReady,
    pub service: ServiceInfo,
}

/// Stage payload: bearer token obtained
#[derive(Debug)]
pub struct Authorized {
    pub service: ServiceInfo,
    pub auth: DeviceAuthResponse,
}

/// Final stage: the reverse listener is live
pub struct TunnelEstablished {
    pub auth: DeviceAuthResponse,
    pub listener: Box<dyn ReverseListener>,
}

impl std::fmt::Debug for TunnelEstablished {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TunnelEstablished")
            .field("auth", &self.auth)
            .finish_non_exhaustive()
    }
}

/// Drives enrollment and holds everything the stages need
pub struct Agent {
    config: AgentConfig,
    service: ServiceDescriptor,
    client: ApiClient,
    transport: Arc<dyn TunnelTransport>,
}

impl Agent {
    pub fn new(
        config: AgentConfig,
        service: ServiceDescriptor,
        client: ApiClient,
        transport: Arc<dyn TunnelTransport>,
    ) -> Self {
        Self {
            config,
            service,
            client,
            transport,
        }
    }

    /// Run the full bootstrap sequence.
    ///
    /// There is no partial operating mode: the agent either completes every
    /// transition or this run is fatal and the supervisor decides whether
    /// to start over.
    pub async fn bootstrap(&self) -> Result<TunnelEstablished, BootstrapError> {
        let identified = self
            .resolve_identity()
            .map_err(BootstrapError::at(Stage::ResolveIdentity))?;

        let keyed = self
            .ensure_keys(identified)
            .map_err(BootstrapError::at(Stage::EnsureKeys))?;

        let probed = self
            .probe_service(keyed)
            .await
            .map_err(BootstrapError::at(Stage::ProbeService))?;

        let authorized = self
            .authorize(probed)
            .await
            .map_err(BootstrapError::at(Stage::Authorize))?;

        self.open_tunnel(authorized)
            .await
            .map_err(BootstrapError::at(Stage::OpenTunnel))
    }

    fn resolve_identity(&self) -> Result<IdentityResolved, AgentError> {
        let identity = identity::resolve(self.config.preferred_identity.as_deref())?;
        let info = identity::device_info();

        tracing::info!(identity = %identity, os = %info.pretty_name, "device identity resolved");

        Ok(IdentityResolved { identity, info })
    }

    fn ensure_keys(&self, stage: IdentityResolved) -> Result<KeysReady, AgentError> {
        keys::ensure_keypair(&self.config.private_key_path)?;
        let public_key_pem = keys::load_public_key_pem(&self.config.private_key_path)?;

        tracing::info!(path = %self.config.private_key_path.display(), "device keypair ready");

        Ok(KeysReady {
            identity: stage.identity,
            info: stage.info,
            public_key_pem,
        })
    }

    async fn probe_service(&self, stage: KeysReady) -> Result<ServiceProbed, AgentError> {
        let service = self.client.get_info(AGENT_VERSION).await?;

        tracing::info!(version = %service.version, "service probed");

        Ok(ServiceProbed {
            keys: stage,
            service,
        })
    }

    async fn authorize(&self, stage: ServiceProbed) -> Result<Authorized, AgentError> {
        let request = DeviceAuthRequest {
            info: stage.keys.info,
            hostname: self.config.hostname(),
            identity: stage.keys.identity,
            tenant_id: self.config.tenant_id.clone(),
            public_key: stage.keys.public_key_pem,
        };

        let auth = self.client.auth_device(&request).await?;

        tracing::info!(device = %auth.name, namespace = %auth.namespace, "device authorized");

        Ok(Authorized {
            service: stage.service,
            auth,
        })
    }

    async fn open_tunnel(&self, stage: Authorized) -> Result<TunnelEstablished, AgentError> {
        let listener = self.transport.open(&self.service, &stage.auth.token).await?;

        tracing::info!("reverse tunnel established");

        Ok(TunnelEstablished {
            auth: stage.auth,
            listener,
        })
    }
}
