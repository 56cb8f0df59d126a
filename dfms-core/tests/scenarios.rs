// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::Arc;

use dfms_common::{ChecksumKind, ExecutionMode, Result};
use dfms_core::{DataObject, DataObjectSpec, ProducerHandle, Stage};
use dfms_events::{EventBus, LocalEventBroadcaster};
use dfms_io::MemoryBackend;
use rand::RngCore;

fn bus() -> Arc<dyn EventBus> {
    Arc::new(LocalEventBroadcaster::new())
}

fn leaf(uid: &str, bus: &Arc<dyn EventBus>, mode: ExecutionMode, stage: Option<Arc<dyn Stage>>) -> Arc<DataObject> {
    DataObject::new(DataObjectSpec {
        oid: uid.to_string(),
        uid: uid.to_string(),
        backend: Box::new(MemoryBackend::default()),
        broadcaster: Arc::clone(bus),
        checksum_kind: ChecksumKind::Crc32C,
        expected_size: None,
        execution_mode: mode,
        stage,
    })
}

fn read_all(owner: &DataObject) -> Vec<u8> {
    let token = owner.open().unwrap();
    let bytes = owner.read(token, None).unwrap();
    owner.close(token).unwrap();
    bytes
}

/// Records the upstream producer's already-accumulated checksum as a decimal string.
struct CrcResultStage;

impl Stage for CrcResultStage {
    fn run(&self, producer: &ProducerHandle<'_>, this: &Arc<DataObject>) -> Result<()> {
        let crc = producer.checksum().expect("producer must carry a checksum");
        this.write(crc.to_string().as_bytes())?;
        this.set_completed()
    }
}

/// Records the most recent byte it was handed, each time it is handed one, both internally
/// (writing it into its own backend) and into an externally observable cell so the test can
/// assert on it before `this` is readable.
struct LastCharStage {
    observed: Arc<std::sync::Mutex<Option<u8>>>,
}

impl Stage for LastCharStage {
    fn consume(&self, this: &Arc<DataObject>, bytes: &[u8]) -> Result<()> {
        if let Some(&last) = bytes.last() {
            *self.observed.lock().unwrap() = Some(last);
            this.write(&[last])?;
        }
        Ok(())
    }

    fn consumption_completed(&self, this: &Arc<DataObject>) -> Result<()> {
        this.set_completed()
    }
}

// S1 (chained CRC): producer A (in-memory, 16 MB random in 8x2 MB writes) -> consumer B (CRC
// result). A.checksum must equal CRC32C of the concatenated writes, and B's decimal contents
// must equal that same value.
#[test]
fn s1_chained_crc() {
    let bus = bus();
    let b = leaf("b", &bus, ExecutionMode::Do, Some(Arc::new(CrcResultStage)));
    let a = leaf("a", &bus, ExecutionMode::Do, None);
    a.add_consumer(Arc::clone(&b)).unwrap();

    let mut rng = rand::thread_rng();
    let mut all = Vec::with_capacity(16 * 1024 * 1024);
    for _ in 0..8 {
        let mut chunk = vec![0u8; 2 * 1024 * 1024];
        rng.fill_bytes(&mut chunk);
        a.write(&chunk).unwrap();
        all.extend_from_slice(&chunk);
    }
    a.set_completed().unwrap();

    let expected = crc32c::crc32c(&all);
    assert_eq!(a.checksum(), Some(expected));
    assert_eq!(b.status(), dfms_common::DOStatus::Completed);

    let contents = read_all(&b);
    let reported: u32 = String::from_utf8(contents).unwrap().parse().unwrap();
    assert_eq!(reported, expected);
}

// S6 (execution modes): A (expected_size = 1) with consumer B; write "1". Mode=Do completes B
// right away; Mode=External leaves B uninvoked until the driver calls `consume` explicitly.
#[test]
fn s6_do_mode_completes_consumer_immediately() {
    let bus = bus();
    let b = leaf("b", &bus, ExecutionMode::Do, Some(Arc::new(CrcResultStage)));
    let a = DataObject::new(DataObjectSpec {
        oid: "a".into(),
        uid: "a".into(),
        backend: Box::new(MemoryBackend::default()),
        broadcaster: Arc::clone(&bus),
        checksum_kind: ChecksumKind::Crc32C,
        expected_size: Some(1),
        execution_mode: ExecutionMode::Do,
        stage: None,
    });
    a.add_consumer(Arc::clone(&b)).unwrap();

    a.write(b"1").unwrap();

    assert_eq!(a.status(), dfms_common::DOStatus::Completed);
    assert_eq!(b.status(), dfms_common::DOStatus::Completed);
}

#[test]
fn s6_external_mode_requires_explicit_consume() {
    let bus = bus();
    let b = leaf("b", &bus, ExecutionMode::Do, Some(Arc::new(CrcResultStage)));
    let a = DataObject::new(DataObjectSpec {
        oid: "a".into(),
        uid: "a".into(),
        backend: Box::new(MemoryBackend::default()),
        broadcaster: Arc::clone(&bus),
        checksum_kind: ChecksumKind::Crc32C,
        expected_size: Some(1),
        execution_mode: ExecutionMode::External,
        stage: None,
    });
    a.add_consumer(Arc::clone(&b)).unwrap();

    a.write(b"1").unwrap();

    assert_eq!(a.status(), dfms_common::DOStatus::Completed);
    assert_eq!(b.status(), dfms_common::DOStatus::Initialized);

    b.consume(&a).unwrap();
    assert_eq!(b.status(), dfms_common::DOStatus::Completed);
}

// S7 (immediate consumer): A with immediate consumer B (last-char) and deferred consumer C
// (CRC). After each write, B's last-observed byte tracks the producer's last byte; C stays
// INITIALIZED until A.set_completed. Registering a consumer in both roles fails.
#[test]
fn s7_immediate_consumer_tracks_every_write_deferred_waits_for_completion() {
    let bus = bus();
    let observed = Arc::new(std::sync::Mutex::new(None));
    let b = leaf("b", &bus, ExecutionMode::Do, Some(Arc::new(LastCharStage { observed: Arc::clone(&observed) })));
    let c = leaf("c", &bus, ExecutionMode::Do, Some(Arc::new(CrcResultStage)));
    let a = leaf("a", &bus, ExecutionMode::Do, None);
    a.add_immediate_consumer(Arc::clone(&b)).unwrap();
    a.add_consumer(Arc::clone(&c)).unwrap();

    a.write(b"abcde").unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(b'e'));
    assert_eq!(c.status(), dfms_common::DOStatus::Initialized);

    a.write(b"fghij").unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(b'j'));
    assert_eq!(c.status(), dfms_common::DOStatus::Initialized);

    a.write(b"k").unwrap();
    assert_eq!(*observed.lock().unwrap(), Some(b'k'));
    assert_eq!(c.status(), dfms_common::DOStatus::Initialized);

    a.set_completed().unwrap();
    assert_eq!(b.status(), dfms_common::DOStatus::Completed);
    assert_eq!(c.status(), dfms_common::DOStatus::Completed);
    assert_eq!(read_all(&b), b"ejk");

    // Adding B (already immediate) as deferred, or C (already deferred) as immediate, fails.
    assert!(a.add_consumer(Arc::clone(&b)).is_err());
    assert!(a.add_immediate_consumer(Arc::clone(&c)).is_err());
}

// Negative tests: overwriting checksum/size after COMPLETED fails; reading or closing with an
// unknown token fails; `setCompleted` after EXPIRED fails.
#[test]
fn negative_set_completed_after_expired_fails() {
    let bus = bus();
    let a = leaf("a", &bus, ExecutionMode::Do, None);
    a.write(b"x").unwrap();
    a.set_completed().unwrap();
    a.expire().unwrap();
    assert!(a.set_completed().is_err());
}

#[test]
fn negative_out_of_band_size_cannot_be_reassigned() {
    let bus = bus();
    let a = leaf("a", &bus, ExecutionMode::Do, None);
    a.set_size_out_of_band(100).unwrap();
    assert!(a.set_size_out_of_band(200).is_err());
}

#[test]
fn negative_size_cannot_be_set_out_of_band_once_a_write_occurred() {
    let bus = bus();
    let a = leaf("a", &bus, ExecutionMode::Do, None);
    a.write(b"x").unwrap();
    assert!(a.set_size_out_of_band(100).is_err());
}

#[test]
fn negative_unknown_read_token_fails() {
    let bus = bus();
    let a = leaf("a", &bus, ExecutionMode::Do, None);
    a.write(b"x").unwrap();
    a.set_completed().unwrap();
    let valid = a.open().unwrap();
    a.close(valid).unwrap();
    assert!(a.read(valid, None).is_err());
    assert!(a.close(valid).is_err());
}
