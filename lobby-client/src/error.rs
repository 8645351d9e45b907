//! 客户端错误类型

use thiserror::Error;

use protocol::{BattleId, ProtocolError};

/// 大厅客户端错误
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Not connected to a lobby server")]
    NotConnected,

    #[error("Not logged in")]
    NotOnline,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Already logged in")]
    AlreadyOnline,

    #[error("Already in battle {0}")]
    AlreadyInBattle(BattleId),

    #[error("Not in a battle")]
    NotInBattle,

    #[error("Not the host of the current battle")]
    NotHost,

    #[error("No such user: {0}")]
    NoSuchUser(String),

    #[error("Not joined to channel: {0}")]
    NoSuchChannel(String),

    #[error("No such battle: {0}")]
    NoSuchBattle(BattleId),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),

    #[error("Registration denied: {0}")]
    RegistrationDenied(String),

    #[error("No relay host manager available")]
    NoRelayManager,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, ClientError>;
