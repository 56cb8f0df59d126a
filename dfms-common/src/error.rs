// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::status::DOStatus;
use thiserror::Error;

/// The error kinds named by the engine's error-handling design: one variant per
/// conceptual kind, each carrying enough context to reconstruct the failing
/// operation.
#[derive(Debug, Error)]
pub enum DfmsError {
    /// Operation attempted outside the allowed state for the DO.
    #[error("invalid state transition on {oid}/{uid}: {attempted} is not valid from {from:?}")]
    InvalidStateTransition {
        oid: String,
        uid: String,
        from: DOStatus,
        attempted: &'static str,
    },

    /// Duplicate `uid`, cross-kind consumer membership, or an unknown read token.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Underlying I/O failed; bubbled with backend context.
    #[error("backend I/O error on {backend} for {uid}: {source}")]
    BackendIo {
        backend: &'static str,
        uid: String,
        #[source]
        source: std::io::Error,
    },

    /// A child manager is unreachable or timed out.
    #[error("manager {name} unreachable: {reason}")]
    RemoteUnavailable { name: String, reason: String },

    /// An application consumer's `run` raised.
    #[error("stage execution failed for {uid}: {reason}")]
    ExecutionFailed { uid: String, reason: String },
}

pub type Result<T> = std::result::Result<T, DfmsError>;
