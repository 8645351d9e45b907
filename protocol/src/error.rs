//! 错误类型定义

use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 行超长
    #[error("Line too long: {size} bytes (max: {max})")]
    LineTooLong { size: usize, max: usize },

    /// 空命令
    #[error("Empty command line")]
    EmptyLine,

    /// 参数格式错误
    #[error("Malformed {command}: {reason}")]
    Malformed { command: String, reason: String },

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 昵称为空
    #[error("Nickname is empty")]
    NicknameEmpty,

    /// 昵称过长
    #[error("Nickname too long: {len} chars (max: {max})")]
    NicknameTooLong { len: usize, max: usize },

    /// 昵称包含非法字符
    #[error("Nickname contains invalid character {0:?}")]
    NicknameInvalidChar(char),
}

impl ProtocolError {
    pub(crate) fn malformed(command: &str, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
