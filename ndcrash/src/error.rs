use std::io;

use thiserror::Error;

/// Why `init` refused to install the reporter.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("crash reporter is already initialized")]
    AlreadyInitialized,

    #[error("failed to install handler for signal {signal}: {source}")]
    SignalRegistrationFailed {
        signal: i32,
        #[source]
        source: io::Error,
    },
}

/// Outcome of a single delivery attempt that did not reach the acknowledgment.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("couldn't create socket: {0}")]
    EndpointCreateFailed(#[source] io::Error),

    #[error("couldn't connect socket: {0}")]
    ConnectFailed(#[source] io::Error),

    #[error("send error: {0}")]
    SendFailed(#[source] io::Error),

    #[error("couldn't send whole message, sent bytes: {sent}, message size: {expected}")]
    PartialSend { sent: usize, expected: usize },

    #[error("recv error: {0}")]
    RecvFailed(#[source] io::Error),
}

pub type DeliveryResult = Result<(), DeliveryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("socket name must not be empty")]
    EmptySocketName,

    #[error("socket name is {len} bytes, abstract addresses hold at most {max}")]
    SocketNameTooLong { len: usize, max: usize },
}
