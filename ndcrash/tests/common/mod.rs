#![allow(dead_code)]

use std::io::{Read, Write};
use std::os::linux::net::SocketAddrExt;
use std::os::unix::net::{SocketAddr, UnixListener, UnixStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use ndcrash::CrashRecord;

/// Abstract socket name no other test or process is using.
pub fn unique_socket_name(tag: &str) -> String {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    format!(
        "ndcrash-test-{}-{}-{}",
        tag,
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

pub fn bind(name: &str) -> UnixListener {
    let addr = SocketAddr::from_abstract_name(name.as_bytes()).expect("abstract address");
    UnixListener::bind_addr(&addr).expect("bind test collector")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Read the record, write one byte, close.
    Acknowledge,
    /// Read the record, hand the open stream back, never write.
    Withhold,
}

pub enum Received {
    Record(Vec<u8>),
    Withheld(Vec<u8>, UnixStream),
}

/// A minimal collector that serves `connections` connections.
pub struct TestCollector {
    pub name: String,
    records: mpsc::Receiver<Received>,
    thread: JoinHandle<()>,
}

impl TestCollector {
    pub fn spawn(tag: &str, behavior: Behavior, connections: usize) -> Self {
        let name = unique_socket_name(tag);
        let listener = bind(&name);
        let (tx, records) = mpsc::channel();

        let thread = thread::spawn(move || {
            for _ in 0..connections {
                let (mut stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(_) => return,
                };
                let mut buf = vec![0u8; CrashRecord::SIZE];
                if stream.read_exact(&mut buf).is_err() {
                    continue;
                }
                let received = match behavior {
                    Behavior::Acknowledge => {
                        let _ = stream.write_all(&[1]);
                        Received::Record(buf)
                    }
                    Behavior::Withhold => Received::Withheld(buf, stream),
                };
                if tx.send(received).is_err() {
                    return;
                }
            }
        });

        Self {
            name,
            records,
            thread,
        }
    }

    pub fn recv(&self) -> Received {
        self.records.recv().expect("collector thread ended early")
    }

    pub fn recv_record(&self) -> Vec<u8> {
        match self.recv() {
            Received::Record(bytes) | Received::Withheld(bytes, _) => bytes,
        }
    }

    pub fn join(self) {
        self.thread.join().expect("collector thread panicked");
    }
}
