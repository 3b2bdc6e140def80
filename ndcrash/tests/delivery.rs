mod common;

use std::io;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use common::{Behavior, Received, TestCollector, unique_socket_name};
use ndcrash::capture::{FaultInfo, record_from_parts};
use ndcrash::{CONTEXT_SIZE, CrashRecord, DeliveryError, ReporterConfig, deliver};

fn sample_record() -> CrashRecord {
    let mut context = [0u8; CONTEXT_SIZE];
    for (i, byte) in context.iter_mut().enumerate() {
        *byte = (i * 7 % 256) as u8;
    }
    let fault = FaultInfo {
        signo: libc::SIGSEGV,
        code: 1,
        address: 0x7fff_0000_1234,
    };
    record_from_parts(1234, 1240, &fault, &context)
}

fn config_for(name: &str) -> ReporterConfig {
    ReporterConfig::default().with_socket_name(name).unwrap()
}

#[test]
fn collector_receives_identical_bytes() {
    let collector = TestCollector::spawn("identical", Behavior::Acknowledge, 1);
    let record = sample_record();

    deliver(&record, &config_for(&collector.name)).unwrap();

    let received = collector.recv_record();
    assert_eq!(received.len(), CrashRecord::SIZE);
    assert_eq!(received, record.as_bytes());

    let parsed = CrashRecord::from_bytes(&received).unwrap();
    assert_eq!(parsed.pid, 1234);
    assert_eq!(parsed.tid, 1240);
    assert_eq!(parsed.fault_addr, 0x7fff_0000_1234);
    collector.join();
}

#[test]
fn one_connection_per_delivery() {
    let collector = TestCollector::spawn("sequential", Behavior::Acknowledge, 2);
    let config = config_for(&collector.name);

    let mut first = sample_record();
    first.signo = libc::SIGBUS;
    let mut second = sample_record();
    second.signo = libc::SIGILL;

    deliver(&first, &config).unwrap();
    deliver(&second, &config).unwrap();

    assert_eq!(collector.recv_record(), first.as_bytes());
    assert_eq!(collector.recv_record(), second.as_bytes());
    collector.join();
}

#[test]
fn no_collector_fails_to_connect_promptly() {
    let config = config_for(&unique_socket_name("absent"));

    let started = Instant::now();
    let err = deliver(&sample_record(), &config).unwrap_err();

    assert!(matches!(
        err,
        DeliveryError::ConnectFailed(ref e) if e.raw_os_error() == Some(libc::ECONNREFUSED)
    ));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn blocks_until_collector_answers() {
    let collector = TestCollector::spawn("withheld", Behavior::Withhold, 1);
    let config = config_for(&collector.name);

    let (done_tx, done_rx) = mpsc::channel();
    let client = thread::spawn(move || {
        let _ = done_tx.send(deliver(&sample_record(), &config));
    });

    let stream = match collector.recv() {
        Received::Withheld(bytes, stream) => {
            assert_eq!(bytes, sample_record().as_bytes());
            stream
        }
        Received::Record(_) => unreachable!("collector was told to withhold"),
    };

    // No internal timeout: the client is still parked on the acknowledgment.
    assert!(matches!(
        done_rx.recv_timeout(Duration::from_millis(500)),
        Err(mpsc::RecvTimeoutError::Timeout)
    ));

    // Closing without the byte releases the client with a receive failure.
    drop(stream);
    let result = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(
        result,
        Err(DeliveryError::RecvFailed(ref e)) if e.kind() == io::ErrorKind::UnexpectedEof
    ));

    client.join().unwrap();
    collector.join();
}

#[test]
fn configured_timeout_bounds_the_wait() {
    let collector = TestCollector::spawn("timeout", Behavior::Withhold, 1);
    let config = config_for(&collector.name).with_timeout(Duration::from_millis(200));

    let started = Instant::now();
    let err = deliver(&sample_record(), &config).unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(
        err,
        DeliveryError::RecvFailed(ref e) if e.kind() == io::ErrorKind::WouldBlock
    ));
    assert!(elapsed >= Duration::from_millis(150));
    assert!(elapsed < Duration::from_secs(5));

    // Release the withheld stream.
    drop(collector.recv());
    collector.join();
}
