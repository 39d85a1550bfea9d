// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

use crate::client::TransportError;
use crate::policy::PolicyError;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the library's public entry points.
///
/// The data path (`process_*`) never returns these; they come from
/// construction, `start`, and the recommendation cycle.
#[derive(Debug)]
pub enum Error {
    /// Invalid or missing configuration. Fatal at construction.
    Config(String),
    /// The advisory endpoint was unreachable or replied non-2xx.
    Transport(TransportError),
    /// A wait was interrupted by cancellation.
    Cancelled,
    /// The advisory reply carried no usable content.
    EmptyReply,
    /// The operator policy document could not be loaded or validated.
    Policy(PolicyError),
    /// The background worker could not be started or joined.
    Worker(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(err) => write!(f, "transport error: {err}"),
            Self::Cancelled => write!(f, "operation cancelled"),
            Self::EmptyReply => write!(f, "advisory reply was empty"),
            Self::Policy(err) => write!(f, "policy error: {err}"),
            Self::Worker(msg) => write!(f, "worker error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            Self::Policy(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

impl From<PolicyError> for Error {
    fn from(err: PolicyError) -> Self {
        Self::Policy(err)
    }
}
