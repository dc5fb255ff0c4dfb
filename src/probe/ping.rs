//! Ping probe implementation with native ICMP echo.
//!
//! Uses blocking sockets in spawn_blocking for sub-millisecond timing precision.
//! Replies are matched on ICMP header fields, never on `ping` command output.

use std::io::Read;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use socket2::{Domain, Protocol, Socket, Type};

use super::{IcmpProber, ProbeError};

const ICMP_ECHO_REPLY: u8 = 0;
const ICMP_ECHO_REQUEST: u8 = 8;
const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;

/// ICMP capability state
#[derive(Debug, Clone, Copy, PartialEq)]
enum IcmpCapability {
    /// Raw sockets (CAP_NET_RAW or root)
    Raw,
    /// Unprivileged datagram sockets (ping_group_range, macOS)
    Datagram,
    /// Neither socket type can be opened
    Unavailable,
}

static ICMP_CAPABILITY: OnceLock<IcmpCapability> = OnceLock::new();

/// Ping sequence counter for unique identification
static PING_SEQUENCE: AtomicU16 = AtomicU16::new(0);

/// Generate an identifier and base sequence for one batch of echo requests.
/// Concurrent batches to the same destination stay distinguishable.
fn generate_ping_id(count: u16) -> (u16, u16) {
    let identifier: u16 = rand::random();
    let sequence = PING_SEQUENCE.fetch_add(count, Ordering::Relaxed);
    (identifier, sequence)
}

/// Detect ICMP capability by attempting to create a socket.
fn detect_icmp_capability() -> IcmpCapability {
    if Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (RAW socket, privileged)");
        return IcmpCapability::Raw;
    }

    if Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4)).is_ok() {
        tracing::info!("Ping probe: using native ICMP (DGRAM socket, unprivileged)");
        return IcmpCapability::Datagram;
    }

    tracing::warn!(
        "Ping probe: no ICMP socket available, network targets will report OFFLINE \
         (grant CAP_NET_RAW or widen net.ipv4.ping_group_range)"
    );
    IcmpCapability::Unavailable
}

/// Echo batch parameters.
#[derive(Debug, Clone)]
pub struct PingConfig {
    /// Echo requests per probe
    pub count: u16,
    /// Per-request reply timeout
    pub timeout: Duration,
    /// Pause between requests
    pub interval: Duration,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            count: 3,
            timeout: Duration::from_secs(2),
            interval: Duration::from_secs(1),
        }
    }
}

/// Summary of one echo batch.
#[derive(Debug, Clone, PartialEq)]
pub struct EchoStats {
    pub transmitted: u16,
    pub received: u16,
    /// Mean round trip of the replies that arrived, in milliseconds
    pub avg_rtt_ms: f64,
}

impl EchoStats {
    /// Summarize a batch; a batch with no replies is an error.
    fn from_rtts(transmitted: u16, rtts: &[Duration], timeout: Duration) -> Result<Self, ProbeError> {
        if rtts.is_empty() {
            return Err(ProbeError::Timeout(timeout));
        }

        let total_ms: f64 = rtts.iter().map(|d| d.as_secs_f64() * 1000.0).sum();
        let avg = total_ms / rtts.len() as f64;

        Ok(Self {
            transmitted,
            received: rtts.len() as u16,
            avg_rtt_ms: (avg * 1000.0).round() / 1000.0,
        })
    }
}

/// ICMP prober using native echo sockets.
#[derive(Debug, Clone, Default)]
pub struct NativePinger {
    config: PingConfig,
}

impl NativePinger {
    pub fn new(config: PingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl IcmpProber for NativePinger {
    async fn ping(&self, address: &str) -> Result<EchoStats, ProbeError> {
        let capability = *ICMP_CAPABILITY.get_or_init(detect_icmp_capability);
        if capability == IcmpCapability::Unavailable {
            return Err(ProbeError::Config("ICMP sockets unavailable".to_string()));
        }

        // Resolve address before spawn_blocking (DNS is async)
        let ip = resolve_address(address).await?;
        let config = self.config.clone();
        let raw = capability == IcmpCapability::Raw;

        tokio::task::spawn_blocking(move || run_blocking_batch(ip, raw, &config))
            .await
            .map_err(|e| ProbeError::Task(format!("spawn_blocking failed: {}", e)))?
    }
}

/// Resolve hostname to IP address.
async fn resolve_address(address: &str) -> Result<IpAddr, ProbeError> {
    if let Ok(ip) = address.parse::<IpAddr>() {
        return Ok(ip);
    }

    let addrs: Vec<_> = tokio::net::lookup_host(format!("{}:0", address))
        .await
        .map_err(|e| ProbeError::Network(format!("DNS resolution failed: {}", e)))?
        .collect();

    addrs
        .into_iter()
        .next()
        .map(|sa| sa.ip())
        .ok_or_else(|| ProbeError::Network(format!("No addresses found for {}", address)))
}

/// Send `config.count` echo requests and collect the round trips that came back.
/// Runs in a dedicated thread via spawn_blocking.
fn run_blocking_batch(ip: IpAddr, raw: bool, config: &PingConfig) -> Result<EchoStats, ProbeError> {
    let mut socket = EchoSocket::open(ip, raw, config.timeout)?;
    let (identifier, base_sequence) = generate_ping_id(config.count);

    let mut rtts = Vec::with_capacity(config.count as usize);
    let mut last_error = None;

    for i in 0..config.count {
        if i > 0 {
            std::thread::sleep(config.interval);
        }

        let sequence = base_sequence.wrapping_add(i);
        match socket.echo(identifier, sequence, config.timeout) {
            Ok(rtt) => rtts.push(rtt),
            Err(e) => {
                tracing::debug!("Echo {} to {} lost: {}", sequence, ip, e);
                last_error = Some(e);
            }
        }
    }

    // With nothing back, report the hard failure rather than a bare timeout
    if rtts.is_empty() {
        if let Some(e) = last_error.filter(|e| !matches!(e, ProbeError::Timeout(_))) {
            return Err(e);
        }
    }

    EchoStats::from_rtts(config.count, &rtts, config.timeout)
}

/// A connected ICMP or ICMPv6 socket.
struct EchoSocket {
    socket: Socket,
    v6: bool,
    raw: bool,
}

impl EchoSocket {
    fn open(ip: IpAddr, raw: bool, timeout: Duration) -> Result<Self, ProbeError> {
        let (domain, protocol) = match ip {
            IpAddr::V4(_) => (Domain::IPV4, Protocol::ICMPV4),
            IpAddr::V6(_) => (Domain::IPV6, Protocol::ICMPV6),
        };
        let ty = if raw { Type::RAW } else { Type::DGRAM };

        let socket = Socket::new(domain, ty, Some(protocol))
            .map_err(|e| ProbeError::Network(format!("Failed to create ICMP socket: {}", e)))?;

        socket
            .set_read_timeout(Some(timeout))
            .map_err(|e| ProbeError::Network(format!("Failed to set timeout: {}", e)))?;
        socket
            .set_write_timeout(Some(timeout))
            .map_err(|e| ProbeError::Network(format!("Failed to set timeout: {}", e)))?;

        let dest = SocketAddr::new(ip, 0);
        socket
            .connect(&dest.into())
            .map_err(|e| ProbeError::Network(format!("Failed to connect: {}", e)))?;

        Ok(Self {
            socket,
            v6: ip.is_ipv6(),
            raw,
        })
    }

    /// Send one echo request and wait for its reply.
    fn echo(&mut self, identifier: u16, sequence: u16, timeout: Duration) -> Result<Duration, ProbeError> {
        let packet = if self.v6 {
            build_icmpv6_echo_request(identifier, sequence)
        } else {
            build_icmp_echo_request(identifier, sequence)
        };

        // Start timing just before send
        let start = Instant::now();

        self.socket.send(&packet).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied {
                ProbeError::Network(format!("Permission denied: {}", e))
            } else {
                ProbeError::Network(format!("Failed to send: {}", e))
            }
        })?;

        // Receive replies until we see OURS or the timeout runs out
        let mut buf = [0u8; 1500];
        loop {
            let remaining = timeout
                .checked_sub(start.elapsed())
                .filter(|d| !d.is_zero())
                .ok_or(ProbeError::Timeout(timeout))?;
            self.socket
                .set_read_timeout(Some(remaining))
                .map_err(|e| ProbeError::Network(format!("Failed to set timeout: {}", e)))?;

            let len = self.socket.read(&mut buf).map_err(|e| {
                if e.kind() == std::io::ErrorKind::WouldBlock || e.kind() == std::io::ErrorKind::TimedOut {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Network(format!("Failed to receive: {}", e))
                }
            })?;

            // Stop timing immediately after receive
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                return Err(ProbeError::Timeout(timeout));
            }

            // Datagram sockets get their identifier rewritten by the kernel,
            // which also demuxes replies per socket, so only raw sockets check it.
            let expect_id = self.raw.then_some(identifier);
            if is_echo_reply(&buf[..len], self.v6, expect_id, sequence) {
                return Ok(elapsed);
            }
        }
    }
}

/// Check whether `buf` carries the echo reply for `sequence`.
///
/// IPv4 raw sockets deliver the IP header in front of the ICMP message; its
/// length comes from the IHL field. ICMPv6 sockets never include the IPv6 header.
fn is_echo_reply(buf: &[u8], v6: bool, identifier: Option<u16>, sequence: u16) -> bool {
    let offset = if !v6 && buf.first().map(|b| b >> 4) == Some(4) {
        usize::from(buf[0] & 0x0F) * 4
    } else {
        0
    };

    let Some(icmp) = buf.get(offset..offset + 8) else {
        return false;
    };

    let expected_type = if v6 { ICMPV6_ECHO_REPLY } else { ICMP_ECHO_REPLY };
    let reply_id = u16::from_be_bytes([icmp[4], icmp[5]]);
    let reply_seq = u16::from_be_bytes([icmp[6], icmp[7]]);

    icmp[0] == expected_type && reply_seq == sequence && identifier.map_or(true, |id| id == reply_id)
}

/// Build an ICMP Echo Request packet (type 8, code 0).
fn build_icmp_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = build_echo(ICMP_ECHO_REQUEST, identifier, sequence);

    let checksum = icmp_checksum(&packet);
    packet[2..4].copy_from_slice(&checksum.to_be_bytes());

    packet
}

/// Build an ICMPv6 Echo Request packet (type 128, code 0).
///
/// The kernel fills in the ICMPv6 checksum, which covers a pseudo-header
/// we do not see from userspace.
fn build_icmpv6_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    build_echo(ICMPV6_ECHO_REQUEST, identifier, sequence)
}

fn build_echo(kind: u8, identifier: u16, sequence: u16) -> Vec<u8> {
    let mut packet = vec![0u8; 64]; // 8 byte header + 56 byte payload

    packet[0] = kind;
    packet[1] = 0; // Code: 0
    packet[4..6].copy_from_slice(&identifier.to_be_bytes());
    packet[6..8].copy_from_slice(&sequence.to_be_bytes());

    // Fill payload with timestamp
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;
    packet[8..16].copy_from_slice(&timestamp.to_be_bytes());

    packet
}

/// Compute ICMP checksum (RFC 1071).
fn icmp_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = data
        .chunks(2)
        .map(|pair| match pair {
            [hi, lo] => u32::from(u16::from_be_bytes([*hi, *lo])),
            [hi] => u32::from(*hi) << 8,
            _ => 0,
        })
        .sum();

    // Fold 32-bit sum to 16 bits
    while sum >> 16 != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }

    !sum as u16
}
