pub mod endpoint;
pub mod error;
pub mod manager;
pub mod memory;
pub mod sse;
pub mod transport;

pub use endpoint::{BackendEndpoints, EndpointResolver, StreamEndpoint};
pub use error::{StreamError, TransportError};
pub use manager::{ProcessStreamState, StreamChange, StreamConnectionManager, StreamUpdate};
pub use memory::MemoryTransport;
pub use sse::SseTransport;
pub use transport::{FrameStream, LogTransport};
