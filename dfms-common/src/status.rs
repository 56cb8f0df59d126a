// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// The DO lifecycle states. Numeric values are part of the external wire contract:
/// `INITIALIZED=0, WRITING=1, COMPLETED=2, EXPIRED=3, CANCELLED=4`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DOStatus {
    Initialized = 0,
    Writing = 1,
    Completed = 2,
    Expired = 3,
    Cancelled = 4,
}

impl DOStatus {
    /// `true` once the DO has reached a state from which no further writes or
    /// re-completion are possible.
    pub fn is_terminal_for_writes(self) -> bool {
        matches!(self, DOStatus::Completed | DOStatus::Expired | DOStatus::Cancelled)
    }

    pub fn is_readable(self) -> bool {
        matches!(self, DOStatus::Completed)
    }
}

impl std::fmt::Display for DOStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DOStatus::Initialized => "INITIALIZED",
            DOStatus::Writing => "WRITING",
            DOStatus::Completed => "COMPLETED",
            DOStatus::Expired => "EXPIRED",
            DOStatus::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

/// Who advances downstream deferred consumers once a producer completes. Default is `Do`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    #[default]
    Do,
    External,
}

/// Which rolling checksum a DO accumulates over bytes written through it: CRC32C is preferred
/// for its hardware acceleration, with plain CRC32 as a fallback. The caller picks explicitly
/// at construction time rather than probing for accelerated-instruction support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChecksumKind {
    #[default]
    Crc32C,
    Crc32,
}
