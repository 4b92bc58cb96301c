//! Paced packet generator.
//!
//! The generator sends data packets in batches and sleeps between batches so
//! the average send rate lands near the requested packets per second. Timer
//! resolution makes the achieved rate an approximation; `IterationResult`
//! reports what was actually reached.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use udpbench_common::wire::{self, DataPacket, MAX_DATAGRAM, PAYLOAD_LEN_RANGE};

use crate::error::{ConfigError, TransportError};

/// Packets per pacing pause before any rescaling.
pub const NOMINAL_BATCH: u32 = 10;

/// Below this rate a batch of `NOMINAL_BATCH` would need a pause over a second.
pub const MIN_RATE_PPS: i64 = NOMINAL_BATCH as i64;

/// Batch factor applied when the nominal pause rounds down to nothing.
const BATCH_ESCALATION: u32 = 10;

/// Immutable pacing plan computed once per client run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateSchedule {
    packets_per_iteration: u64,
    batch_size: u32,
    pause: Duration,
}

impl RateSchedule {
    /// Derives the batch size and pause from a target rate.
    ///
    /// The pause is `round(1000 * batch / rate)` milliseconds. When that is
    /// zero the batch grows tenfold and the pause is pinned to 1ms, the
    /// shortest sleep worth scheduling.
    pub fn configure(
        target_rate_pps: i64,
        packets_per_iteration: i64,
    ) -> Result<Self, ConfigError> {
        if packets_per_iteration <= 0 {
            return Err(ConfigError::NonPositivePacketCount(packets_per_iteration));
        }
        if target_rate_pps < MIN_RATE_PPS {
            return Err(ConfigError::RateBelowMinimum {
                rate: target_rate_pps,
                min: MIN_RATE_PPS,
            });
        }

        let mut batch_size = NOMINAL_BATCH;
        let mut pause_ms = (0.5 + 1000.0 * f64::from(batch_size) / target_rate_pps as f64) as u64;

        if pause_ms == 0 {
            batch_size *= BATCH_ESCALATION;
            pause_ms = 1;
        }

        Ok(Self {
            packets_per_iteration: packets_per_iteration as u64,
            batch_size,
            pause: Duration::from_millis(pause_ms),
        })
    }

    pub fn packets_per_iteration(&self) -> u64 {
        self.packets_per_iteration
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    pub fn pause(&self) -> Duration {
        self.pause
    }

    pub fn pause_ms(&self) -> u64 {
        self.pause.as_millis() as u64
    }

    /// True once `sent` packets complete a batch.
    fn pause_due(&self, sent: u64) -> bool {
        sent % u64::from(self.batch_size) == 0
    }
}

/// Outcome of one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IterationResult {
    pub packets: u64,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl IterationResult {
    /// Achieved packets per second. Infinite if no time was measured.
    pub fn rate_pps(&self) -> f64 {
        self.packets as f64 / self.elapsed.as_secs_f64()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GeneratorConfig {
    pub destination: SocketAddr,
    pub schedule: RateSchedule,
    /// Seed for packet lengths; identical seeds give identical length sequences.
    pub seed: u64,
}

impl GeneratorConfig {
    pub fn new(destination: SocketAddr, schedule: RateSchedule) -> Self {
        Self {
            destination,
            schedule,
            seed: 0,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Seeded stream of data packet lengths drawn uniformly from `PAYLOAD_LEN_RANGE`.
pub struct PacketLengths {
    rng: StdRng,
}

impl PacketLengths {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Iterator for PacketLengths {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        Some(self.rng.random_range(PAYLOAD_LEN_RANGE))
    }
}

pub struct Generator {
    socket: UdpSocket,
    destination: SocketAddr,
    schedule: RateSchedule,
    lengths: PacketLengths,
}

impl Generator {
    /// Binds an ephemeral local socket and connects it to `config.destination`.
    pub fn connect(config: GeneratorConfig) -> Result<Self, TransportError> {
        let bind_addr: SocketAddr = if config.destination.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;

        // Connecting pins the route once instead of per send_to.
        socket.connect(config.destination)?;

        Ok(Self {
            socket,
            destination: config.destination,
            schedule: config.schedule,
            lengths: PacketLengths::new(config.seed),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    /// Sends one iteration worth of data packets, pausing after every batch.
    ///
    /// `message` becomes the filler of every packet in the iteration.
    pub fn run_iteration(&mut self, message: &[u8]) -> Result<IterationResult, TransportError> {
        let mut packet = DataPacket::with_filler(message);
        let mut bytes = 0u64;
        let start = Instant::now();

        for sent in 1..=self.schedule.packets_per_iteration {
            let len = self.lengths.next().unwrap_or(PAYLOAD_LEN_RANGE.start);
            let frame = packet.frame(len);
            self.socket.send(frame)?;
            bytes += frame.len() as u64;

            if self.schedule.pause_due(sent) {
                thread::sleep(self.schedule.pause);
            }
        }

        let result = IterationResult {
            packets: self.schedule.packets_per_iteration,
            bytes,
            elapsed: start.elapsed(),
        };
        debug!(
            "Iteration sent {} packets ({} bytes) in {:?}",
            result.packets, result.bytes, result.elapsed
        );
        Ok(result)
    }

    /// Sends the quit packet and blocks until the session summary arrives.
    ///
    /// There is no timeout: if the server never answers this never returns.
    pub fn send_quit(&self) -> Result<Vec<u8>, TransportError> {
        self.socket.send(&wire::QUIT_MARKER)?;
        info!("Quit sent to {}, waiting for summary", self.destination);

        let mut reply = vec![0u8; MAX_DATAGRAM];
        let len = self.socket.recv(&mut reply)?;
        reply.truncate(len);

        debug!("Received {} byte reply", len);
        Ok(reply)
    }
}

/// Resolves `host:port` to its first IPv4 address.
pub fn resolve(host: &str, port: u16) -> Result<SocketAddr, TransportError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            port,
            source,
        })?;

    addrs
        .find(SocketAddr::is_ipv4)
        .ok_or_else(|| TransportError::NoIpv4Address {
            host: host.to_string(),
            port,
        })
}
