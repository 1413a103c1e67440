use async_trait::async_trait;
use futures::stream::BoxStream;
use logs_protocol::RawFrame;

use crate::{endpoint::StreamEndpoint, error::TransportError};

pub type FrameStream = BoxStream<'static, Result<RawFrame, TransportError>>;

/// Opens a server-push connection and yields its frames in arrival order.
/// The stream ending means the server closed the connection.
#[async_trait]
pub trait LogTransport: Send + Sync + 'static {
    async fn connect(&self, endpoint: &StreamEndpoint) -> Result<FrameStream, TransportError>;
}
