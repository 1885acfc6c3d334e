use std::io;

/// Errors from the channel-socket transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("socket closed")]
    Closed,

    #[error("no channel endpoint available")]
    NoEndpoint,

    #[error("connect failed: {0}")]
    ConnectFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Errors from materializing a network on top of an established channel
/// socket.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("virtual interface creation failed: {0}")]
    Interface(String),

    #[error("packet forwarder creation failed: {0}")]
    Forwarder(String),
}
