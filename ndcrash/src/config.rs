use std::fmt;
use std::mem;
use std::time::Duration;

use ndcrash_common::DEFAULT_SOCKET_NAME;

use crate::error::ConfigError;

/// Longest name an abstract address can carry: the 108-byte `sun_path` minus
/// the leading NUL.
pub const MAX_SOCKET_NAME_LEN: usize = 107;

/// Abstract-namespace `AF_UNIX` address, resolved ahead of time so the signal
/// handler can connect without building anything.
#[derive(Clone, Copy)]
pub struct AbstractAddress {
    addr: libc::sockaddr_un,
    len: libc::socklen_t,
}

impl AbstractAddress {
    pub fn new(name: &[u8]) -> Result<Self, ConfigError> {
        if name.is_empty() {
            return Err(ConfigError::EmptySocketName);
        }

        // SAFETY: sockaddr_un is plain old data.
        let mut addr: libc::sockaddr_un = unsafe { mem::zeroed() };
        if name.len() > addr.sun_path.len() - 1 {
            return Err(ConfigError::SocketNameTooLong {
                len: name.len(),
                max: addr.sun_path.len() - 1,
            });
        }

        addr.sun_family = libc::AF_UNIX as libc::sa_family_t;
        // sun_path[0] stays NUL, which selects the abstract namespace.
        for (dst, &src) in addr.sun_path[1..].iter_mut().zip(name) {
            *dst = src as libc::c_char;
        }

        // The trailing NUL is not part of an abstract name.
        let len = mem::size_of::<libc::sa_family_t>() + 1 + name.len();
        Ok(Self {
            addr,
            len: len as libc::socklen_t,
        })
    }

    /// The name without the leading NUL.
    pub fn name(&self) -> &[u8] {
        let name_len = self.len as usize - mem::size_of::<libc::sa_family_t>() - 1;
        // SAFETY: c_char and u8 have the same size and every value is valid.
        unsafe {
            std::slice::from_raw_parts(self.addr.sun_path[1..].as_ptr().cast::<u8>(), name_len)
        }
    }

    pub(crate) fn as_raw(&self) -> (*const libc::sockaddr, libc::socklen_t) {
        (
            (&self.addr as *const libc::sockaddr_un).cast::<libc::sockaddr>(),
            self.len,
        )
    }
}

impl fmt::Debug for AbstractAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", String::from_utf8_lossy(self.name()))
    }
}

/// Settings for the reporter installed by [`crate::init_with`].
#[derive(Debug, Clone, Copy)]
pub struct ReporterConfig {
    address: AbstractAddress,
    timeout: Option<Duration>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            // The default name is a short ASCII constant.
            address: match AbstractAddress::new(DEFAULT_SOCKET_NAME.as_bytes()) {
                Ok(address) => address,
                Err(_) => unreachable!("default socket name is valid"),
            },
            timeout: None,
        }
    }
}

impl ReporterConfig {
    pub fn with_socket_name(mut self, name: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        self.address = AbstractAddress::new(name.as_ref())?;
        Ok(self)
    }

    /// Bounds connect, send and the acknowledgment wait. Without it a
    /// collector that never answers blocks the crashing thread forever.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn address(&self) -> &AbstractAddress {
        &self.address
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}
