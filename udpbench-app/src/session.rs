//! Receiving side of the benchmark: counts datagrams from one peer until a
//! quit packet arrives, then answers it with the totals.

use std::fmt;
use std::future::{self, Future};
use std::io;
use std::net::SocketAddr;

use log::{debug, info, warn};
use tokio::net::UdpSocket;
use udpbench_common::wire::{self, PacketKind, MAX_DATAGRAM};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Receiving,
    Terminated,
}

/// Running totals for a session. Only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub packets_total: u64,
    pub bytes_total: u64,
    pub bad_packets_total: u64,
}

impl SessionSummary {
    /// Reply datagram sent back on quit, clipped to `MAX_DATAGRAM`.
    pub fn reply(&self) -> Vec<u8> {
        wire::clip_reply(self.to_string().as_bytes()).to_vec()
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Packets {}\nBytes {}\nBad packets {}",
            self.packets_total, self.bytes_total, self.bad_packets_total
        )
    }
}

/// Two-state session machine, independent of any socket.
#[derive(Debug)]
pub struct Session {
    state: SessionState,
    summary: SessionSummary,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Receiving,
            summary: SessionSummary::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    pub fn summary(&self) -> SessionSummary {
        self.summary
    }

    /// Counts and classifies one received datagram.
    ///
    /// Every non-empty datagram adds to the packet and byte totals, quit
    /// included. Returns `None` for empty datagrams and for anything arriving
    /// after the session terminated; neither is counted.
    pub fn on_datagram(&mut self, datagram: &[u8]) -> Option<PacketKind> {
        if self.is_terminated() || datagram.is_empty() {
            return None;
        }

        self.summary.packets_total += 1;
        self.summary.bytes_total += datagram.len() as u64;

        let kind = wire::classify(datagram);
        match kind {
            PacketKind::Quit => self.state = SessionState::Terminated,
            PacketKind::Bad => self.summary.bad_packets_total += 1,
            PacketKind::Good => {}
        }
        Some(kind)
    }

    /// A failed receive counts as a bad packet; the session keeps receiving.
    pub fn on_receive_error(&mut self) {
        if !self.is_terminated() {
            self.summary.bad_packets_total += 1;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

enum Event {
    Received(io::Result<(usize, SocketAddr)>),
    Shutdown,
}

/// Drives a `Session` from a UDP socket with one receive outstanding at a time.
pub struct SessionServer {
    socket: UdpSocket,
    session: Session,
    buf: [u8; MAX_DATAGRAM],
}

impl SessionServer {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            session: Session::new(),
            buf: [0u8; MAX_DATAGRAM],
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Receives until a quit packet has been answered.
    pub async fn run(&mut self) -> SessionSummary {
        self.run_until(future::pending()).await
    }

    /// Like `run`, but also returns once `shutdown` completes. The session is
    /// left in `Receiving` in that case.
    pub async fn run_until<F>(&mut self, shutdown: F) -> SessionSummary
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        while !self.session.is_terminated() {
            let event = tokio::select! {
                received = self.socket.recv_from(&mut self.buf) => Event::Received(received),
                _ = &mut shutdown => Event::Shutdown,
            };

            match event {
                Event::Received(Ok((len, peer))) => {
                    match self.session.on_datagram(&self.buf[..len]) {
                        Some(PacketKind::Quit) => {
                            info!("Detected quit request from {}", peer);
                            self.reply(peer).await;
                        }
                        Some(PacketKind::Bad) => debug!("Bad packet of {} bytes from {}", len, peer),
                        Some(PacketKind::Good) => {}
                        None => debug!("Ignored empty datagram from {}", peer),
                    }
                }
                Event::Received(Err(e)) => {
                    warn!("Receive failed: {}", e);
                    self.session.on_receive_error();
                }
                Event::Shutdown => {
                    info!("Shutdown requested before quit");
                    break;
                }
            }
        }

        self.session.summary()
    }

    async fn reply(&self, peer: SocketAddr) {
        let summary = self.session.summary();
        match self.socket.send_to(&summary.reply(), peer).await {
            Ok(_) => {
                info!("Quit message sent");
                info!(
                    "Packets {} Bytes {} Bad packets {}",
                    summary.packets_total, summary.bytes_total, summary.bad_packets_total
                );
            }
            Err(e) => warn!("Failed to send summary to {}: {}", peer, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udpbench_common::wire::{PacketHeader, HEADER_LEN};

    fn good(len: usize) -> Vec<u8> {
        let mut packet = vec![0u8; len];
        packet[..HEADER_LEN].copy_from_slice(&PacketHeader::new(len as u32).encode());
        packet
    }

    fn bad(len: usize) -> Vec<u8> {
        let mut packet = good(len);
        packet[4..HEADER_LEN].copy_from_slice(&(len as u32 + 1).to_le_bytes());
        packet
    }

    #[test]
    fn counts_good_and_bad_packets() {
        let mut session = Session::new();
        let mut expected_bytes = 0;

        for len in [1200, 1300, 1467] {
            assert_eq!(session.on_datagram(&good(len)), Some(PacketKind::Good));
            expected_bytes += len as u64;
        }
        for len in [8, 1250] {
            assert_eq!(session.on_datagram(&bad(len)), Some(PacketKind::Bad));
            expected_bytes += len as u64;
        }
        assert_eq!(session.on_datagram(b"abc"), Some(PacketKind::Bad));
        expected_bytes += 3;

        let summary = session.summary();
        assert_eq!(summary.packets_total, 6);
        assert_eq!(summary.bad_packets_total, 3);
        assert_eq!(summary.bytes_total, expected_bytes);
        assert_eq!(session.state(), SessionState::Receiving);
    }

    #[test]
    fn repeated_packet_counts_each_time() {
        let mut session = Session::new();
        let packet = good(1333);

        session.on_datagram(&packet);
        let first = session.summary();
        session.on_datagram(&packet);
        let second = session.summary();

        assert_eq!(second.packets_total - first.packets_total, 1);
        assert_eq!(second.bytes_total - first.bytes_total, 1333);
        assert_eq!(second.bytes_total, 2 * 1333);
    }

    #[test]
    fn quit_terminates_and_is_counted_but_not_bad() {
        let mut session = Session::new();
        session.on_datagram(&good(1200));

        assert_eq!(session.on_datagram(b"quit"), Some(PacketKind::Quit));
        assert!(session.is_terminated());
        assert_eq!(
            session.summary(),
            SessionSummary {
                packets_total: 2,
                bytes_total: 1204,
                bad_packets_total: 0,
            }
        );
    }

    #[test]
    fn terminated_session_ignores_further_events() {
        let mut session = Session::new();
        session.on_datagram(b"quit");
        let frozen = session.summary();

        assert_eq!(session.on_datagram(&good(1200)), None);
        assert_eq!(session.on_datagram(b"quit"), None);
        session.on_receive_error();

        assert_eq!(session.summary(), frozen);
        assert_eq!(session.state(), SessionState::Terminated);
    }

    #[test]
    fn empty_datagram_is_not_counted() {
        let mut session = Session::new();
        assert_eq!(session.on_datagram(&[]), None);
        assert_eq!(session.summary(), SessionSummary::default());
    }

    #[test]
    fn receive_error_counts_as_bad_packet_only() {
        let mut session = Session::new();
        session.on_receive_error();
        session.on_receive_error();

        let summary = session.summary();
        assert_eq!(summary.bad_packets_total, 2);
        assert_eq!(summary.packets_total, 0);
        assert_eq!(summary.bytes_total, 0);
        assert_eq!(session.state(), SessionState::Receiving);
    }

    #[test]
    fn reply_text_layout() {
        let summary = SessionSummary {
            packets_total: 100,
            bytes_total: 133_700,
            bad_packets_total: 0,
        };
        assert_eq!(summary.reply(), b"Packets 100\nBytes 133700\nBad packets 0".to_vec());
    }

    #[test]
    fn oversized_reply_is_clipped() {
        let long = "7".repeat(2 * MAX_DATAGRAM);
        let text = format!("Packets {long}\nBytes 1\nBad packets 0");
        let clipped = wire::clip_reply(text.as_bytes());
        assert_eq!(clipped.len(), MAX_DATAGRAM);
        assert_eq!(clipped, &text.as_bytes()[..MAX_DATAGRAM]);
    }
}
