//! Wire packet format.
//!
//! Each message is one TCP segment: the sender opens a connection, writes
//! `cmd ++ src ++ data`, and closes it. The receiver reads the connection to
//! EOF and treats the whole byte string as one packet — there is no re-framing
//! across segments and no length prefix, matching the original node
//! descriptor's one-connection-per-message convention.

use crate::error::NetError;

/// Protocol command codes. `Ack` is reserved (earlier protocol variants used
/// it to confirm `NewFragment` delivery) and decoded like any other command,
/// but this implementation never sends it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Connect = 0,
    NewFragment = 1,
    Report = 2,
    Test = 3,
    Accept = 4,
    Reject = 5,
    Merge = 6,
    Ack = 7,
}

impl Command {
    /// All commands a node's inbound side can route a packet to.
    pub const ALL: [Command; 8] = [
        Command::Connect,
        Command::NewFragment,
        Command::Report,
        Command::Test,
        Command::Accept,
        Command::Reject,
        Command::Merge,
        Command::Ack,
    ];

    fn from_byte(b: u8) -> Option<Command> {
        match b {
            0 => Some(Command::Connect),
            1 => Some(Command::NewFragment),
            2 => Some(Command::Report),
            3 => Some(Command::Test),
            4 => Some(Command::Accept),
            5 => Some(Command::Reject),
            6 => Some(Command::Merge),
            7 => Some(Command::Ack),
            _ => None,
        }
    }
}

/// A decoded inbound packet, or an outbound packet about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub cmd: Command,
    pub src: u8,
    pub data: Vec<u8>,
}

impl Packet {
    pub fn new(cmd: Command, src: u8, data: Vec<u8>) -> Self {
        Self { cmd, src, data }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.data.len());
        out.push(self.cmd as u8);
        out.push(self.src);
        out.extend_from_slice(&self.data);
        out
    }

    /// Decodes one packet from a raw byte string. Returns `None` for a
    /// short-or-unknown-command packet, per the decoding-fault policy: such
    /// packets are dropped rather than erroring the endpoint.
    pub fn decode(bytes: &[u8]) -> Option<Packet> {
        if bytes.len() < 2 {
            return None;
        }
        let cmd = Command::from_byte(bytes[0])?;
        let src = bytes[1];
        let data = bytes[2..].to_vec();
        Some(Packet { cmd, src, data })
    }
}

pub(crate) fn short_packet_error(addr: std::net::SocketAddr) -> NetError {
    NetError::ShortPacket(addr)
}
