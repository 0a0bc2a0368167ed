// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Error types for collector construction and shutdown

use std::fmt;
use thiserror::Error;

/// Shutdown phase that was in progress when a deadline elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopPhase {
    /// Waiting for the sampling loop to acknowledge the stop signal
    Sampling,
    /// Waiting for another caller to finish releasing the listener
    Listener,
}

impl fmt::Display for StopPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopPhase::Sampling => f.write_str("sampling loop"),
            StopPhase::Listener => f.write_str("listener"),
        }
    }
}

/// Errors produced by the runtime metrics collector
#[derive(Error, Debug)]
pub enum Error {
    /// No logger handle was supplied in the collector options
    #[error("could not create collector: a logger is required")]
    MissingLogger,

    /// A gauge could not be registered, usually because the name is taken
    #[error("could not create collector: {0}")]
    Registration(#[from] prometheus::Error),

    /// The caller's deadline elapsed before shutdown completed
    #[error("failed to stop collector: deadline elapsed waiting for {phase}")]
    ShutdownTimeout {
        /// Phase that did not finish in time
        phase: StopPhase,
    },

    /// The serving loop did not release its listener cleanly
    #[error("failed to stop collector: listener shutdown failed: {0}")]
    ListenerShutdown(String),

    /// Listener I/O error
    #[error("metrics server I/O error: {0}")]
    Server(#[from] std::io::Error),
}

impl Error {
    /// Whether this is a configuration error raised at construction
    pub fn is_config(&self) -> bool {
        matches!(self, Error::MissingLogger | Error::Registration(_))
    }

    /// Whether `stop` may be retried after this error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ShutdownTimeout { .. } | Error::ListenerShutdown(_))
    }
}

/// Result alias for collector operations
pub type Result<T> = std::result::Result<T, Error>;
