//! System-wide TCP/UDP socket table with owning processes.

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use netstat2::{
    AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, SocketInfo, TcpState,
    get_sockets_info,
};
use serde::Serialize;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::process::UNAVAILABLE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Tcp,
    Udp,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transport::Tcp => "TCP",
            Transport::Udp => "UDP",
        })
    }
}

/// One socket as shown in the connections table. Addresses render as
/// `ip:port`, or `N/A` when the socket has no such end.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConnectionRecord {
    /// 0 when the owner could not be determined.
    pub pid: u32,
    pub process: String,
    pub protocol: Transport,
    pub local: String,
    pub remote: String,
    pub status: String,
}

/// Socket fields lifted out of the OS table before owners are named.
#[derive(Clone, Debug, PartialEq)]
struct RawSocket {
    protocol: Transport,
    local: SocketAddr,
    remote: Option<SocketAddr>,
    status: &'static str,
    pids: Vec<u32>,
}

impl RawSocket {
    fn from_info(info: SocketInfo) -> Self {
        let pids = info.associated_pids;
        match info.protocol_socket_info {
            ProtocolSocketInfo::Tcp(tcp) => RawSocket {
                protocol: Transport::Tcp,
                local: SocketAddr::new(tcp.local_addr, tcp.local_port),
                remote: Some(SocketAddr::new(tcp.remote_addr, tcp.remote_port)),
                status: tcp_status(&tcp.state),
                pids,
            },
            ProtocolSocketInfo::Udp(udp) => RawSocket {
                protocol: Transport::Udp,
                local: SocketAddr::new(udp.local_addr, udp.local_port),
                remote: None,
                status: "NONE",
                pids,
            },
        }
    }

    /// Shared sockets list several owners; the lowest pid is reported.
    fn owner(&self) -> Option<u32> {
        self.pids.iter().copied().filter(|&pid| pid != 0).min()
    }
}

fn tcp_status(state: &TcpState) -> &'static str {
    match state {
        TcpState::Established => "ESTABLISHED",
        TcpState::Listen => "LISTEN",
        TcpState::SynSent => "SYN_SENT",
        TcpState::SynReceived => "SYN_RECV",
        TcpState::FinWait1 => "FIN_WAIT1",
        TcpState::FinWait2 => "FIN_WAIT2",
        TcpState::TimeWait => "TIME_WAIT",
        TcpState::Closed => "CLOSE",
        TcpState::CloseWait => "CLOSE_WAIT",
        TcpState::LastAck => "LAST_ACK",
        TcpState::Closing => "CLOSING",
        _ => "UNKNOWN",
    }
}

/// A listening or unconnected socket reports the unspecified address with
/// port 0 as its peer.
fn endpoint(addr: Option<SocketAddr>) -> String {
    match addr {
        Some(addr) if !(addr.ip().is_unspecified() && addr.port() == 0) => {
            format!("{}:{}", addr.ip(), addr.port())
        }
        _ => UNAVAILABLE.to_string(),
    }
}

/// Name the owners and order the table by pid, protocol, then addresses.
fn assemble(
    sockets: Vec<RawSocket>,
    name_of: impl Fn(u32) -> Option<String>,
) -> Vec<ConnectionRecord> {
    let mut records: Vec<ConnectionRecord> = sockets
        .into_iter()
        .map(|socket| {
            let owner = socket.owner();
            ConnectionRecord {
                pid: owner.unwrap_or(0),
                process: owner
                    .and_then(&name_of)
                    .unwrap_or_else(|| UNAVAILABLE.to_string()),
                protocol: socket.protocol,
                local: endpoint(Some(socket.local)),
                remote: endpoint(socket.remote),
                status: socket.status.to_string(),
            }
        })
        .collect();
    records.sort_by(|a, b| {
        (a.pid, a.protocol, &a.local, &a.remote).cmp(&(b.pid, b.protocol, &b.local, &b.remote))
    });
    records
}

/// Reads the socket table and names owners through its own process handle.
pub struct ConnectionTable {
    sys: System,
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTable {
    pub fn new() -> Self {
        ConnectionTable { sys: System::new() }
    }

    /// Every inet socket. An unreadable table yields an empty list.
    pub fn sample(&mut self) -> Vec<ConnectionRecord> {
        let families = AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6;
        let protocols = ProtocolFlags::TCP | ProtocolFlags::UDP;
        let sockets: Vec<RawSocket> = match get_sockets_info(families, protocols) {
            Ok(infos) => infos.into_iter().map(RawSocket::from_info).collect(),
            Err(err) => {
                tracing::debug!(error = %err, "socket table unavailable");
                return Vec::new();
            }
        };

        let owners: Vec<Pid> = sockets
            .iter()
            .filter_map(RawSocket::owner)
            .collect::<HashSet<_>>()
            .into_iter()
            .map(Pid::from_u32)
            .collect();
        self.sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&owners),
            true,
            ProcessRefreshKind::nothing(),
        );

        let sys = &self.sys;
        assemble(sockets, |pid| {
            sys.process(Pid::from_u32(pid))
                .map(|process| process.name().to_string_lossy().to_string())
        })
    }
}
