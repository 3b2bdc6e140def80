//! Hands a crash record to the collector over an abstract `AF_UNIX` stream.
//!
//! One connection per record: connect, send the whole record in a single
//! call, then block until the collector writes back one byte. The byte's
//! value is ignored, its arrival means the collector has the record.

use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::time::Duration;

use log::{error, info};
use ndcrash_common::CrashRecord;

use crate::config::{AbstractAddress, ReporterConfig};
use crate::error::{DeliveryError, DeliveryResult};

/// The two blocking operations of the exchange, split out so the protocol
/// can be driven over something other than a socket.
pub trait Endpoint {
    /// One send call; returns how many bytes the channel took.
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize>;

    /// Blocks until one byte arrives. End of stream is an error.
    fn recv_ack(&mut self) -> io::Result<u8>;
}

/// Connection-oriented local socket, closed on drop.
#[derive(Debug)]
pub struct LocalEndpoint {
    fd: OwnedFd,
}

impl LocalEndpoint {
    pub fn create() -> io::Result<Self> {
        // SAFETY: plain socket(2) call.
        let fd = unsafe { libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: fd was just returned by socket(2) and is owned by nobody else.
        Ok(Self {
            fd: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    /// Applies the same bound to connect, send and receive.
    ///
    /// A zero `timeval` means no bound to the kernel, so a non-zero
    /// `timeout` below one microsecond is rounded up to it.
    pub fn set_timeout(&self, timeout: Duration) -> io::Result<()> {
        let tv = timeval_for(timeout);
        for option in [libc::SO_SNDTIMEO, libc::SO_RCVTIMEO] {
            // SAFETY: tv outlives the call and the length matches its type.
            let rc = unsafe {
                libc::setsockopt(
                    self.fd.as_raw_fd(),
                    libc::SOL_SOCKET,
                    option,
                    (&tv as *const libc::timeval).cast(),
                    mem::size_of::<libc::timeval>() as libc::socklen_t,
                )
            };
            if rc != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    pub fn connect(&self, address: &AbstractAddress) -> io::Result<()> {
        let (addr, len) = address.as_raw();
        // SAFETY: addr points to a sockaddr_un of at least len bytes.
        if unsafe { libc::connect(self.fd.as_raw_fd(), addr, len) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

fn timeval_for(timeout: Duration) -> libc::timeval {
    let mut tv = libc::timeval {
        tv_sec: timeout.as_secs().min(libc::time_t::MAX as u64) as libc::time_t,
        tv_usec: timeout.subsec_micros() as libc::suseconds_t,
    };
    if tv.tv_sec == 0 && tv.tv_usec == 0 && !timeout.is_zero() {
        tv.tv_usec = 1;
    }
    tv
}

impl Endpoint for LocalEndpoint {
    fn send(&mut self, bytes: &[u8]) -> io::Result<usize> {
        loop {
            // MSG_NOSIGNAL: a vanished collector is an EPIPE, not a SIGPIPE.
            // SAFETY: bytes is valid for bytes.len() reads.
            let sent = unsafe {
                libc::send(
                    self.fd.as_raw_fd(),
                    bytes.as_ptr().cast(),
                    bytes.len(),
                    libc::MSG_NOSIGNAL,
                )
            };
            if sent >= 0 {
                return Ok(sent as usize);
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err);
            }
        }
    }

    fn recv_ack(&mut self) -> io::Result<u8> {
        let mut byte = 0u8;
        loop {
            // SAFETY: byte is a valid one-byte buffer.
            let received = unsafe {
                libc::recv(
                    self.fd.as_raw_fd(),
                    (&mut byte as *mut u8).cast(),
                    1,
                    0,
                )
            };
            match received {
                1 => return Ok(byte),
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "collector closed the connection before acknowledging",
                    ));
                }
                _ => {
                    let err = io::Error::last_os_error();
                    if err.kind() != io::ErrorKind::Interrupted {
                        return Err(err);
                    }
                }
            }
        }
    }
}

/// Sends `record` over an already connected endpoint and waits for the
/// acknowledgment. A short send is final: nothing is resent and no
/// acknowledgment is awaited.
pub fn exchange<E: Endpoint>(endpoint: &mut E, record: &CrashRecord) -> DeliveryResult {
    let bytes = record.as_bytes();
    let sent = endpoint.send(bytes).map_err(DeliveryError::SendFailed)?;
    if sent != bytes.len() {
        return Err(DeliveryError::PartialSend {
            sent,
            expected: bytes.len(),
        });
    }
    endpoint.recv_ack().map_err(DeliveryError::RecvFailed)?;
    Ok(())
}

/// Delivers `record` to the collector named in `config`.
///
/// Blocks until the collector acknowledges, forever unless the config sets
/// a timeout. Every outcome is logged; the endpoint is closed on return.
pub fn deliver(record: &CrashRecord, config: &ReporterConfig) -> DeliveryResult {
    let result = connect(config).and_then(|mut endpoint| exchange(&mut endpoint, record));
    match &result {
        Ok(()) => info!("Successfully sent data to crash service."),
        Err(e) => error!("Delivery to {:?} failed: {e}", config.address()),
    }
    result
}

fn connect(config: &ReporterConfig) -> Result<LocalEndpoint, DeliveryError> {
    let endpoint = LocalEndpoint::create().map_err(DeliveryError::EndpointCreateFailed)?;
    if let Some(timeout) = config.timeout() {
        endpoint
            .set_timeout(timeout)
            .map_err(DeliveryError::EndpointCreateFailed)?;
    }
    endpoint
        .connect(config.address())
        .map_err(DeliveryError::ConnectFailed)?;
    Ok(endpoint)
}
