// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use dfms_common::Result;
use dfms_io::ReadToken;

use crate::object::DataObject;

/// A producer DO opened for the duration of one `consume` call: `C.consume(P)` opens `P`,
/// invokes `C`'s `run(P)`, and closes `P`. `Stage::run` implementations read through this
/// handle rather than calling `open`/`close` on the producer themselves.
pub struct ProducerHandle<'a> {
    producer: &'a Arc<DataObject>,
    token: ReadToken,
}

impl<'a> ProducerHandle<'a> {
    pub(crate) fn new(producer: &'a Arc<DataObject>, token: ReadToken) -> Self {
        ProducerHandle { producer, token }
    }

    pub fn read(&self, max_len: Option<usize>) -> Result<Vec<u8>> {
        self.producer.read(self.token, max_len)
    }

    pub fn read_all(&self) -> Result<Vec<u8>> {
        self.read(None)
    }

    pub fn checksum(&self) -> Option<u32> {
        self.producer.checksum()
    }

    pub fn size(&self) -> Option<u64> {
        self.producer.size()
    }

    pub fn uid(&self) -> &str {
        self.producer.uid()
    }

    pub fn oid(&self) -> &str {
        self.producer.oid()
    }

    pub fn do_ref(&self) -> &Arc<DataObject> {
        self.producer
    }
}
