//! 错误类型定义

use std::path::PathBuf;

use thiserror::Error;

/// unitsync 错误类型
#[derive(Error, Debug)]
pub enum UnitSyncError {
    /// 库文件不存在
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// 库文件存在但无法读取
    #[error("Library at {0} is present, but not readable")]
    NotReadable(PathBuf),

    /// 动态库加载失败
    #[error("Couldn't load the unitsync library: {0}")]
    LoadFailed(String),

    /// 尚未加载
    #[error("Unitsync not loaded")]
    NotLoaded,

    /// 库中缺少该函数
    #[error("Function {0} was not in unitsync library")]
    FunctionMissing(&'static str),

    /// unitsync 调用返回失败
    #[error("Unitsync call failed: {0}")]
    Call(String),

    /// 索引越界
    #[error("Index {index} out of bounds (count: {count})")]
    IndexOutOfBounds { index: i32, count: i32 },

    /// 参数无效
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<std::ffi::NulError> for UnitSyncError {
    fn from(e: std::ffi::NulError) -> Self {
        Self::InvalidArgument(format!("string contains NUL at {}", e.nul_position()))
    }
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, UnitSyncError>;
