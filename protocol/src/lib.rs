//! Spring 大厅共享协议库
//!
//! 包含:
//! - 命令行编解码 (CommandLine, Params)
//! - 消息类型定义 (ClientCommand, ServerMessage)
//! - 用户/对战状态位域与队伍颜色
//! - 传输层抽象 (Connector, Connection, Listener traits)
//! - 行编解码 (LineReader, LineWriter)
//! - 登录密码哈希

mod command;
mod constants;
mod error;
mod message;
mod password;
mod status;
mod transport;

pub use command::{validate_nickname, CommandLine, Params};
pub use constants::*;
pub use error::{ProtocolError, Result};
pub use message::{
    BattleId, BattleInfo, BattleOptions, BattleType, ClientCommand, NatType, ServerMessage,
    StartRect,
};
pub use password::{ensure_password_hash, is_password_hash, password_hash};
pub use status::{BattleStatus, Colour, SyncStatus, UserStatus};
pub use transport::{
    Connection, Connector, Listener,
    TcpConnection, TcpConnector, TcpListener,
    NetworkConfig,
    LineReader, LineWriter,
};
