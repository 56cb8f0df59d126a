// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use dfms_common::ChecksumKind;

/// Running CRC accumulated over every byte written through a DO. Finalized and
/// frozen once the DO reaches COMPLETED; `None` the whole time for a DO that received its
/// bytes out-of-band.
pub(crate) enum ChecksumAccumulator {
    Crc32C(u32),
    Crc32(crc32fast::Hasher),
}

impl ChecksumAccumulator {
    pub(crate) fn new(kind: ChecksumKind) -> Self {
        match kind {
            ChecksumKind::Crc32C => ChecksumAccumulator::Crc32C(0),
            ChecksumKind::Crc32 => ChecksumAccumulator::Crc32(crc32fast::Hasher::new()),
        }
    }

    pub(crate) fn update(&mut self, bytes: &[u8]) {
        match self {
            ChecksumAccumulator::Crc32C(acc) => *acc = crc32c::crc32c_append(*acc, bytes),
            ChecksumAccumulator::Crc32(hasher) => hasher.update(bytes),
        }
    }

    pub(crate) fn value(&self) -> u32 {
        match self {
            ChecksumAccumulator::Crc32C(acc) => *acc,
            ChecksumAccumulator::Crc32(hasher) => hasher.clone().finalize(),
        }
    }
}
