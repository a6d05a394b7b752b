//! Socket lifecycle probe
//!
//! getaddrinfo -> for each candidate: socket -> bind, first success wins ->
//! close. No listen, no accept, no bytes on the wire.

use std::ffi::{CStr, CString};
use std::io;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr;

use nix::sys::socket::{self, AddressFamily as SockFamily, SockFlag, SockType, SockaddrStorage};
use tracing::{debug, trace};

use crate::error::HarnessError;
use crate::scenario::{AddressFamily, BindExpectation, NetworkScenario};

/// One resolved address, in resolver order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub addr: SocketAddr,
    socktype: SockType,
}

/// Owns a getaddrinfo result list and frees it on drop
struct AddrInfoList(*mut libc::addrinfo);

impl Drop for AddrInfoList {
    fn drop(&mut self) {
        if !self.0.is_null() {
            // SAFETY: the pointer came from a successful getaddrinfo call and
            // is freed exactly once.
            unsafe { libc::freeaddrinfo(self.0) };
        }
    }
}

fn family_hint(family: AddressFamily) -> libc::c_int {
    match family {
        AddressFamily::Ipv4 => libc::AF_INET,
        AddressFamily::Ipv6 => libc::AF_INET6,
        AddressFamily::Any => libc::AF_UNSPEC,
    }
}

fn gai_message(status: libc::c_int) -> String {
    if status == libc::EAI_SYSTEM {
        return io::Error::last_os_error().to_string();
    }
    // SAFETY: gai_strerror returns a pointer to a static NUL-terminated string.
    unsafe { CStr::from_ptr(libc::gai_strerror(status)) }
        .to_string_lossy()
        .into_owned()
}

/// Resolve stream-socket candidates for `port`
pub fn resolve(
    host: Option<&str>,
    port: u16,
    family: AddressFamily,
    passive: bool,
) -> Result<Vec<Candidate>, HarnessError> {
    let node = host
        .map(CString::new)
        .transpose()
        .map_err(|_| HarnessError::Resolution("host contains a NUL byte".to_string()))?;
    let service = CString::new(port.to_string())
        .map_err(|_| HarnessError::Resolution("invalid service".to_string()))?;

    // SAFETY: addrinfo is a plain C struct; all-zero is the documented
    // "no hints" value that we then fill in.
    let mut hints: libc::addrinfo = unsafe { mem::zeroed() };
    hints.ai_family = family_hint(family);
    hints.ai_socktype = libc::SOCK_STREAM;
    if passive {
        hints.ai_flags = libc::AI_PASSIVE;
    }

    let mut head: *mut libc::addrinfo = ptr::null_mut();
    // SAFETY: node/service are valid C strings or null, hints is initialised,
    // and head receives a list we free through AddrInfoList.
    let status = unsafe {
        libc::getaddrinfo(
            node.as_ref().map_or(ptr::null(), |n| n.as_ptr()),
            service.as_ptr(),
            &hints,
            &mut head,
        )
    };
    if status != 0 {
        return Err(HarnessError::Resolution(format!(
            "getaddrinfo({}, {}): {}",
            host.unwrap_or("<default>"),
            port,
            gai_message(status)
        )));
    }
    let list = AddrInfoList(head);

    let mut candidates = Vec::new();
    let mut cursor = list.0;
    while !cursor.is_null() {
        // SAFETY: cursor walks the list owned by `list`, which outlives the loop.
        let info = unsafe { &*cursor };
        // SAFETY: getaddrinfo pairs ai_addr with a matching ai_addrlen.
        let addr = unsafe { socket_addr(info) };
        if let (Some(addr), Ok(socktype)) = (addr, SockType::try_from(info.ai_socktype)) {
            candidates.push(Candidate { addr, socktype });
        }
        cursor = info.ai_next;
    }

    if candidates.is_empty() {
        return Err(HarnessError::Resolution(format!(
            "no candidate addresses for port {}",
            port
        )));
    }
    trace!(?candidates, "resolved candidates");
    Ok(candidates)
}

/// # Safety
///
/// `info.ai_addr` must point to a sockaddr of `info.ai_addrlen` bytes.
unsafe fn socket_addr(info: &libc::addrinfo) -> Option<SocketAddr> {
    if info.ai_addr.is_null() {
        return None;
    }
    match info.ai_family {
        libc::AF_INET => {
            // SAFETY: the family tag guarantees a sockaddr_in.
            let sin = unsafe { &*(info.ai_addr as *const libc::sockaddr_in) };
            Some(SocketAddr::V4(SocketAddrV4::new(
                Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
                u16::from_be(sin.sin_port),
            )))
        }
        libc::AF_INET6 => {
            // SAFETY: the family tag guarantees a sockaddr_in6.
            let sin6 = unsafe { &*(info.ai_addr as *const libc::sockaddr_in6) };
            Some(SocketAddr::V6(SocketAddrV6::new(
                Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                u16::from_be(sin6.sin6_port),
                sin6.sin6_flowinfo,
                sin6.sin6_scope_id,
            )))
        }
        _ => None,
    }
}

/// socket + bind; the socket closes on every error path via OwnedFd
pub fn bind_candidate(candidate: &Candidate) -> io::Result<OwnedFd> {
    let domain = match candidate.addr {
        SocketAddr::V4(_) => SockFamily::Inet,
        SocketAddr::V6(_) => SockFamily::Inet6,
    };

    let fd = socket::socket(domain, candidate.socktype, SockFlag::SOCK_CLOEXEC, None)?;
    socket::bind(fd.as_raw_fd(), &SockaddrStorage::from(candidate.addr))?;
    Ok(fd)
}

/// Try every candidate in order; return the first bound socket
///
/// On exhaustion the error lists each candidate's failure.
pub fn bind_first(
    candidates: &[Candidate],
) -> Result<(OwnedFd, Candidate), Vec<(SocketAddr, io::Error)>> {
    let mut failures = Vec::new();
    for candidate in candidates {
        match bind_candidate(candidate) {
            Ok(fd) => {
                debug!(addr = %candidate.addr, "bind succeeded");
                return Ok((fd, *candidate));
            }
            Err(e) => {
                debug!(addr = %candidate.addr, error = %e, "bind failed, trying next candidate");
                failures.push((candidate.addr, e));
            }
        }
    }
    Err(failures)
}

fn describe_failures(failures: &[(SocketAddr, io::Error)]) -> String {
    failures
        .iter()
        .map(|(addr, e)| format!("{}: {}", addr, e))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Run a network scenario
pub fn run(scenario: &NetworkScenario) -> Result<Option<String>, HarnessError> {
    let candidates = resolve(
        scenario.host.as_deref(),
        scenario.port,
        scenario.family,
        scenario.passive,
    )?;

    match (bind_first(&candidates), scenario.expect) {
        (Ok((fd, bound)), BindExpectation::Bound) => {
            drop(fd);
            if scenario.verify_rebind {
                let again = bind_candidate(&bound).map_err(|e| {
                    HarnessError::AssertionMismatch(format!(
                        "{} not released after close: {}",
                        bound.addr, e
                    ))
                })?;
                drop(again);
            }
            Ok(Some(format!("bound {}", bound.addr)))
        }
        (Ok((fd, bound)), BindExpectation::Unavailable) => {
            drop(fd);
            Err(HarnessError::AssertionMismatch(format!(
                "expected every candidate to refuse, but {} bound",
                bound.addr
            )))
        }
        (Err(failures), BindExpectation::Bound) => {
            // Report the last candidate's error as the source; all are listed
            let summary = describe_failures(&failures);
            let source = failures
                .into_iter()
                .last()
                .map(|(_, e)| e)
                .unwrap_or_else(|| io::Error::from(io::ErrorKind::AddrNotAvailable));
            Err(HarnessError::resource(
                format!("no candidate could be bound ({})", summary),
                source,
            ))
        }
        (Err(failures), BindExpectation::Unavailable) => Ok(Some(format!(
            "all {} candidates refused as expected",
            failures.len()
        ))),
    }
}
