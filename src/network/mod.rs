//! Network Layer
//!
//! Binary board-sync protocol, lobby server and client side.
//! This layer is **non-deterministic** - all board logic runs through `game/`.

pub mod codec;
pub mod lobby;
pub mod server;
pub mod transport;
pub mod sync;
pub mod bot;

pub use codec::{ClientMessage, ServerMessage, CodecError};
pub use lobby::{LobbyManager, LobbyError, LobbyPhase, JoinInfo, HandshakeReply, SweptLobby};
pub use server::{GameServer, GameServerError, LobbyRoute};
pub use transport::{ClientTransport, TransportError};
pub use sync::{SessionSynchronizer, SyncState, SyncError};
pub use bot::{run_bot, BotConfig, BotReport, BotError};
