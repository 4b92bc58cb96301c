//! Wire format shared by the udpbench generator and session server.

pub mod wire;

pub use wire::{classify, PacketHeader, PacketKind};
