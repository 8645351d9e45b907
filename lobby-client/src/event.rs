//! 会话事件
//!
//! 会话处理服务端消息后产生的事件，由客户端经 mpsc 通道交给上层。

use std::time::Duration;

use protocol::{BattleId, BattleInfo, BattleStatus, Colour, CommandLine, UserStatus};

/// 聊天消息的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Normal,
    /// `/me` 动作消息
    Action,
}

/// 大厅事件
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    // === 连接 ===
    Connected {
        server_version: String,
        spring_version: String,
        udp_port: u16,
        lan_mode: bool,
    },
    Disconnected { reason: String },
    LoggedIn { nick: String },
    LoginFailed { reason: String },
    /// 服务端推送的用户协议全文，需调用 accept_agreement
    Agreement { text: String },
    RegistrationAccepted,
    RegistrationDenied { reason: String },
    Motd { line: String },
    LoginInfoEnd,

    // === 心跳 ===
    PingReply { id: u32, latency: Duration },
    PingTimeout { id: u32 },

    // === 用户 ===
    UserJoined { nick: String },
    UserLeft { nick: String },
    UserStatusChanged { nick: String, status: UserStatus },

    // === 频道 ===
    ChannelJoined { channel: String },
    ChannelJoinFailed { channel: String, reason: String },
    ChannelLeft { channel: String, reason: Option<String> },
    ChannelUserJoined { channel: String, nick: String },
    ChannelUserLeft { channel: String, nick: String, reason: String },
    ChannelTopic { channel: String, author: String, topic: String },
    ChannelListEntry { channel: String, users: u32, topic: String },
    ChannelListEnd,
    ChannelSaid { channel: String, nick: String, message: String, kind: ChatKind },
    ChannelMessage { channel: String, message: String },

    // === 私聊 ===
    PrivateSaid { nick: String, message: String, kind: ChatKind },
    PrivateSent { nick: String, message: String },
    Ring { nick: String },

    // === 对战 ===
    BattleOpened(BattleInfo),
    BattleClosed { id: BattleId },
    BattleInfoUpdated { id: BattleId },
    BattleUserJoined { id: BattleId, nick: String },
    BattleUserLeft { id: BattleId, nick: String },
    /// 自己已进入对战
    BattleJoined { id: BattleId, hosted: bool },
    BattleJoinFailed { reason: String },
    BattleHostFailed { reason: String },
    BattleLeft { id: BattleId },
    BattleStatusChanged { nick: String, status: BattleStatus, colour: Colour },
    BattleSaid { nick: String, message: String, kind: ChatKind },
    BotAdded { id: BattleId, name: String },
    BotRemoved { id: BattleId, name: String },
    BotUpdated { id: BattleId, name: String },
    StartRectsChanged { id: BattleId },
    ScriptTagsChanged { id: BattleId },
    DisabledUnitsChanged { id: BattleId },
    /// 房主启动游戏
    BattleStarted { id: BattleId },
    ForcedOutOfBattle,

    // === 中继主机 ===
    RelayHostList { managers: Vec<String> },
    RelayHostAcquired { nick: String },

    // === 其它 ===
    ServerMessage { message: String },
    ServerMessageBox { message: String, url: Option<String> },
    /// 未识别的命令
    Unknown(CommandLine),
}
