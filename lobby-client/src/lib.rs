//! Spring 大厅客户端
//!
//! 包含:
//! - 大厅服务器接口 (LobbyServer)
//! - TASServer 协议会话及其 TCP 驱动 (Session, LobbyClient)
//! - 用户、频道、对战的本地镜像
//! - 中继主持与聊天框斜杠命令
//! - 客户端配置

mod battles;
mod channels;
mod client;
mod config;
mod error;
mod event;
mod ping;
mod relay;
mod say_command;
mod server;
mod session;
mod users;

pub use battles::{Battle, BattleList, BattleUser, Bot, StartPos};
pub use channels::{Channel, ChannelList, Topic};
pub use client::LobbyClient;
pub use config::LobbyConfig;
pub use error::{ClientError, Result};
pub use event::{ChatKind, LobbyEvent};
pub use ping::PingTracker;
pub use relay::generate_script_password;
pub use server::LobbyServer;
pub use session::{HostInfo, Session, SessionState};
pub use users::{User, UserList};
