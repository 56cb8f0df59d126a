// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Reusable [`Stage`] implementations that exercise every consumer role a graph can wire
//! (deferred consumer, immediate consumer, container application). These are small example
//! applications used to validate `DataObject` end to end, and are registered under the names
//! in [`crate::stage_registry::StageRegistry::with_builtins`].

use std::sync::{Arc, Mutex};

use dfms_common::{MutexExt, Result};
use dfms_core::{DataObject, ProducerHandle, Stage};

/// Deferred consumer that writes its producer's textual line content filtered to lines
/// containing `substring`, preserving line endings exactly as they appeared in the producer.
pub struct GrepStage {
    pub substring: String,
}

impl Stage for GrepStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let content = String::from_utf8_lossy(&producer.read_all()?).into_owned();
        for line in content.split_inclusive('\n') {
            if line.contains(&self.substring) {
                this.write(line.as_bytes())?;
            }
        }
        this.set_completed()
    }
}

/// Deferred consumer that writes its producer's lines back out in sorted order.
pub struct SortStage;

impl Stage for SortStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let content = String::from_utf8_lossy(&producer.read_all()?).into_owned();
        let mut lines: Vec<&str> = content.split_inclusive('\n').collect();
        lines.sort_unstable();
        for line in lines {
            this.write(line.as_bytes())?;
        }
        this.set_completed()
    }
}

/// Deferred consumer that reverses every whitespace-delimited word in its producer's content,
/// writing each reversed word immediately followed by the separator that ended it.
pub struct ReverseWordsStage;

impl Stage for ReverseWordsStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let content = String::from_utf8_lossy(&producer.read_all()?).into_owned();
        let mut word = String::new();
        for ch in content.chars() {
            if ch == ' ' || ch == '\n' {
                let reversed: String = word.chars().rev().collect();
                this.write(reversed.as_bytes())?;
                this.write(ch.to_string().as_bytes())?;
                word.clear();
            } else {
                word.push(ch);
            }
        }
        this.set_completed()
    }
}

/// Deferred consumer that writes its producer's checksum, rendered as decimal text.
pub struct CrcResultStage;

impl Stage for CrcResultStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let crc = producer.checksum().unwrap_or(0);
        this.write(crc.to_string().as_bytes())?;
        this.set_completed()
    }
}

/// Deferred consumer that parses its producer's content as a decimal count `n` and writes the
/// numbers `0..n` back out, space separated.
pub struct NumberWriterStage;

impl Stage for NumberWriterStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let content = String::from_utf8_lossy(&producer.read_all()?).into_owned();
        let count: u64 = content.trim().parse().map_err(|_| {
            dfms_common::DfmsError::InvalidArgument(format!("expected a decimal count, got {content:?}"))
        })?;
        for i in 0..count {
            this.write(format!("{i} ").as_bytes())?;
        }
        this.set_completed()
    }
}

/// Container application: splits its producer's whitespace-separated
/// numbers between its two children by parity, writing even numbers into `children()[0]` and
/// odd numbers into `children()[1]`. Completes each child explicitly; the container's own
/// completion is left to the engine once both children are COMPLETED.
pub struct OddAndEvenContainerStage;

impl Stage for OddAndEvenContainerStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let children = this.children();
        if children.len() != 2 {
            return Err(dfms_common::DfmsError::InvalidArgument(format!(
                "odd/even container {} needs exactly 2 children, has {}",
                this.uid(),
                children.len()
            )));
        }
        let content = String::from_utf8_lossy(&producer.read_all()?).into_owned();
        for token in content.split_whitespace() {
            let n: i64 = token.parse().map_err(|_| {
                dfms_common::DfmsError::InvalidArgument(format!("expected a decimal number, got {token:?}"))
            })?;
            let target = &children[(n.rem_euclid(2)) as usize];
            target.write(format!("{token} ").as_bytes())?;
        }
        for child in &children {
            child.set_completed()?;
        }
        Ok(())
    }
}

/// Deferred consumer of a container: sums the checksums of every non-container descendant,
/// recursing into nested containers rather than re-summing the outer container, so a
/// container-of-containers still yields the sum over every leaf.
pub struct SumupContainerCrcStage;

fn sum_descendant_checksums(container: &Arc<DataObject>) -> u64 {
    let mut total = 0u64;
    for child in container.children() {
        if child.is_container() {
            total += sum_descendant_checksums(&child);
        } else if let Some(crc) = child.checksum() {
            total += u64::from(crc);
        }
    }
    total
}

impl Stage for SumupContainerCrcStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let total = sum_descendant_checksums(producer.do_ref());
        this.write(total.to_string().as_bytes())?;
        this.set_completed()
    }
}

/// Immediate consumer that records the last byte of every chunk it has seen and, once its
/// producer completes, writes that byte as its own content.
pub struct LastCharStage {
    last: Mutex<Option<u8>>,
}

impl Default for LastCharStage {
    fn default() -> Self {
        LastCharStage { last: Mutex::new(None) }
    }
}

impl LastCharStage {
    pub fn last_char(&self) -> Option<u8> {
        *self.last.lock_or_panic()
    }
}

impl Stage for LastCharStage {
    fn consume(&self, _this: &Arc<DataObject>, bytes: &[u8]) -> Result<()> {
        if let Some(&byte) = bytes.last() {
            *self.last.lock_or_panic() = Some(byte);
        }
        Ok(())
    }

    fn consumption_completed(&self, this: &Arc<DataObject>) -> Result<()> {
        if let Some(byte) = self.last_char() {
            this.write(&[byte])?;
        }
        this.set_completed()
    }
}
