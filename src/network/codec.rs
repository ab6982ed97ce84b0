//! Binary Board-Sync Codec
//!
//! Hand-rolled little-endian layout shared with browser clients.
//!
//! ```text
//! Server → client
//! ┌─────┬───────────────────────────────────────────────────────────┐
//! │ tag │ payload                                                   │
//! ├─────┼───────────────────────────────────────────────────────────┤
//! │  0  │ PlayerJoined  u32 len, name                               │
//! │  1  │ PlayerLeft    u32 len, name                               │
//! │  2  │ GameStart     -                                           │
//! │  3  │ BoardUpdate   u32 len, player, board                      │
//! │  4  │ GameEnd       -                                           │
//! └─────┴───────────────────────────────────────────────────────────┘
//! Client → server
//! │  0  │ Drop          board                                       │
//! │  1  │ Ready         -                                           │
//!
//! board = u32 len, snapshot bytes, u32 count, count × (f64 handle, u8 tier)
//! ```
//!
//! Handles travel as `f64`, so only values up to 2^53 - 1 are accepted in
//! either direction. Every declared length is checked against the bytes
//! that remain before it is used. Bytes after a complete message are
//! ignored.

use std::collections::BTreeMap;

use crate::game::board::BoardState;
use crate::game::catalog::Fruit;
use crate::physics::ColliderHandle;

/// Largest integer an `f64` represents exactly.
pub const MAX_WIRE_HANDLE: u64 = (1 << 53) - 1;

/// Size of one piece-table entry.
pub const PIECE_ENTRY_LEN: usize = 9;

/// Codec errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    /// Leading tag byte not in the message set.
    #[error("Unknown message tag {0}")]
    UnknownMessageTag(u8),

    /// Buffer ends before a declared field does.
    #[error("Truncated message: needed {needed} bytes, {remaining} remaining")]
    TruncatedMessage {
        /// Bytes the next field needs.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// Name bytes are not UTF-8.
    #[error("Invalid UTF-8 in string field")]
    InvalidUtf8,

    /// Tier byte past the catalog.
    #[error("Invalid tier {0}")]
    InvalidTier(u8),

    /// Handle is not a non-negative integer.
    #[error("Invalid handle {0}")]
    InvalidHandle(f64),

    /// Handle not exactly representable as `f64`.
    #[error("Handle {0} outside the exact f64 range")]
    HandleOutOfRange(u64),

    /// Same handle twice in one piece table.
    #[error("Duplicate piece entry for handle {0}")]
    DuplicatePieceEntry(u64),

    /// Field longer than a u32 length prefix can describe.
    #[error("Field of {0} bytes exceeds u32 length prefix")]
    LengthOverflow(usize),
}

/// Client → server messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientMessage {
    /// The sender's board after a drop.
    Drop {
        /// Full board.
        board: BoardState,
    },
    /// Ready to start.
    Ready,
}

/// Server → client messages.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ServerMessage {
    /// A player is in the lobby.
    PlayerJoined {
        /// Player name.
        name: String,
    },
    /// A player left the lobby.
    PlayerLeft {
        /// Player name.
        name: String,
    },
    /// Everyone is ready.
    GameStart,
    /// A player's board after their drop.
    BoardUpdate {
        /// Who dropped.
        player: String,
        /// Their board.
        board: BoardState,
    },
    /// The game is over.
    GameEnd,
}

impl ClientMessage {
    /// Encode to the wire layout.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = Writer::default();
        match self {
            ClientMessage::Drop { board } => {
                w.put_u8(0);
                w.put_board(board)?;
            }
            ClientMessage::Ready => w.put_u8(1),
        }
        Ok(w.finish())
    }

    /// Decode from the wire layout.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(buf);
        match r.u8()? {
            0 => Ok(ClientMessage::Drop { board: r.board()? }),
            1 => Ok(ClientMessage::Ready),
            tag => Err(CodecError::UnknownMessageTag(tag)),
        }
    }
}

impl ServerMessage {
    /// Encode to the wire layout.
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let mut w = Writer::default();
        match self {
            ServerMessage::PlayerJoined { name } => {
                w.put_u8(0);
                w.put_str(name)?;
            }
            ServerMessage::PlayerLeft { name } => {
                w.put_u8(1);
                w.put_str(name)?;
            }
            ServerMessage::GameStart => w.put_u8(2),
            ServerMessage::BoardUpdate { player, board } => {
                w.put_u8(3);
                w.put_str(player)?;
                w.put_board(board)?;
            }
            ServerMessage::GameEnd => w.put_u8(4),
        }
        Ok(w.finish())
    }

    /// Decode from the wire layout.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(buf);
        match r.u8()? {
            0 => Ok(ServerMessage::PlayerJoined { name: r.string()? }),
            1 => Ok(ServerMessage::PlayerLeft { name: r.string()? }),
            2 => Ok(ServerMessage::GameStart),
            3 => {
                let player = r.string()?;
                let board = r.board()?;
                Ok(ServerMessage::BoardUpdate { player, board })
            }
            4 => Ok(ServerMessage::GameEnd),
            tag => Err(CodecError::UnknownMessageTag(tag)),
        }
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::PlayerJoined { .. } => "PlayerJoined",
            ServerMessage::PlayerLeft { .. } => "PlayerLeft",
            ServerMessage::GameStart => "GameStart",
            ServerMessage::BoardUpdate { .. } => "BoardUpdate",
            ServerMessage::GameEnd => "GameEnd",
        }
    }
}

// =============================================================================
// WRITER / READER
// =============================================================================

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    fn put_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = u32::try_from(len).map_err(|_| CodecError::LengthOverflow(len))?;
        self.buf.extend_from_slice(&len.to_le_bytes());
        Ok(())
    }

    fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        self.put_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    fn put_str(&mut self, s: &str) -> Result<(), CodecError> {
        self.put_bytes(s.as_bytes())
    }

    fn put_board(&mut self, board: &BoardState) -> Result<(), CodecError> {
        self.put_bytes(&board.physics_snapshot)?;
        self.put_len(board.piece_table.len())?;
        for (handle, fruit) in &board.piece_table {
            let raw = handle.to_raw();
            if raw > MAX_WIRE_HANDLE {
                return Err(CodecError::HandleOutOfRange(raw));
            }
            self.buf.extend_from_slice(&(raw as f64).to_le_bytes());
            self.put_u8(fruit.index());
        }
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, needed: usize) -> Result<&'a [u8], CodecError> {
        if needed > self.remaining() {
            return Err(CodecError::TruncatedMessage {
                needed,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.buf[self.pos..self.pos + needed];
        self.pos += needed;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn f64(&mut self) -> Result<f64, CodecError> {
        Ok(f64::from_le_bytes(self.array()?))
    }

    fn bytes(&mut self) -> Result<&'a [u8], CodecError> {
        let len = self.u32()? as usize;
        self.take(len)
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let bytes = self.bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn handle(&mut self) -> Result<ColliderHandle, CodecError> {
        let value = self.f64()?;
        if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
            return Err(CodecError::InvalidHandle(value));
        }
        if value > MAX_WIRE_HANDLE as f64 {
            return Err(CodecError::HandleOutOfRange(value as u64));
        }
        Ok(ColliderHandle::from_raw(value as u64))
    }

    fn board(&mut self) -> Result<BoardState, CodecError> {
        let physics_snapshot = self.bytes()?.to_vec();

        let count = self.u32()? as usize;
        let needed = count.saturating_mul(PIECE_ENTRY_LEN);
        if needed > self.remaining() {
            return Err(CodecError::TruncatedMessage {
                needed,
                remaining: self.remaining(),
            });
        }

        let mut piece_table = BTreeMap::new();
        for _ in 0..count {
            let handle = self.handle()?;
            let tier = self.u8()?;
            let fruit = Fruit::from_index(tier).ok_or(CodecError::InvalidTier(tier))?;
            if piece_table.insert(handle, fruit).is_some() {
                return Err(CodecError::DuplicatePieceEntry(handle.to_raw()));
            }
        }

        Ok(BoardState { physics_snapshot, piece_table })
    }
}
