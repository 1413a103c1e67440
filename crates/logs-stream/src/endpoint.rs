use logs_protocol::{ExecutionProcess, StreamKind};
use url::Url;
use uuid::Uuid;

use crate::error::StreamError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEndpoint {
    pub process_id: Uuid,
    pub kind: StreamKind,
    pub url: Url,
}

/// Maps a process to the endpoint its log stream is served from.
pub trait EndpointResolver: Send + Sync {
    fn resolve(&self, process: &ExecutionProcess) -> Result<StreamEndpoint, StreamError>;
}

/// Resolves against the backend's `/api/execution-processes` routes.
#[derive(Debug, Clone)]
pub struct BackendEndpoints {
    base: Url,
}

impl BackendEndpoints {
    pub fn new(base_url: &str) -> Result<Self, StreamError> {
        let mut base = Url::parse(base_url)?;
        // `Url::join` replaces the last segment unless the path ends with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    pub fn logs_url(&self, process_id: Uuid, kind: StreamKind) -> Result<Url, StreamError> {
        let suffix = match kind {
            StreamKind::Normalized => "normalized-logs",
            StreamKind::Raw => "raw-logs",
        };
        Ok(self
            .base
            .join(&format!("api/execution-processes/{process_id}/{suffix}"))?)
    }
}

impl EndpointResolver for BackendEndpoints {
    fn resolve(&self, process: &ExecutionProcess) -> Result<StreamEndpoint, StreamError> {
        let kind = process.stream_kind();
        Ok(StreamEndpoint {
            process_id: process.id,
            kind,
            url: self.logs_url(process.id, kind)?,
        })
    }
}
