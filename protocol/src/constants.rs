//! 协议常量定义

use std::time::Duration;

/// 客户端实现的协议版本
pub const PROTOCOL_VERSION: &str = "0.37";

/// 默认大厅服务器端口
pub const DEFAULT_PORT: u16 = 8200;

/// 单行消息最大长度（字节）
pub const MAX_LINE_LEN: usize = 65536;

/// 昵称最大长度
pub const MAX_NICKNAME_LEN: usize = 20;

/// 默认保活间隔（秒）
pub const KEEPALIVE_INTERVAL_SECS: u64 = 15;

/// 默认 PING 超时（秒）- 超过此时间未收到 PONG 则断开
pub const PING_TIMEOUT_SECS: u64 = 40;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// LOGIN 中上报的大厅名称
pub const LOBBY_NAME: &str = concat!("springlobby-rs ", env!("CARGO_PKG_VERSION"));

/// LOGIN 中上报的兼容性标志
pub const COMPAT_FLAGS: &str = "a b sp";

/// 提供中继主机管理器列表的机器人
pub const RELAY_MANAGER_LIST_BOT: &str = "RelayHostManagerList";

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

/// 保活间隔 Duration
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(KEEPALIVE_INTERVAL_SECS);

/// PING 超时 Duration
pub const PING_TIMEOUT: Duration = Duration::from_secs(PING_TIMEOUT_SECS);
