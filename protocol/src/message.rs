//! 消息类型定义

use serde::{Deserialize, Serialize};

use crate::command::CommandLine;
use crate::error::{ProtocolError, Result};
use crate::status::{BattleStatus, Colour, UserStatus};

/// 对战 ID
pub type BattleId = u32;

/// 对战类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BattleType {
    /// 普通对战
    #[default]
    Normal,
    /// 回放
    Replay,
}

impl BattleType {
    fn from_code(code: u32) -> Self {
        if code == 1 {
            BattleType::Replay
        } else {
            BattleType::Normal
        }
    }

    fn code(self) -> u32 {
        match self {
            BattleType::Normal => 0,
            BattleType::Replay => 1,
        }
    }
}

/// NAT 穿透方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NatType {
    #[default]
    None,
    HolePunching,
    FixedSourcePorts,
}

impl NatType {
    fn from_code(code: u32) -> Self {
        match code {
            1 => NatType::HolePunching,
            2 => NatType::FixedSourcePorts,
            _ => NatType::None,
        }
    }

    fn code(self) -> u32 {
        match self {
            NatType::None => 0,
            NatType::HolePunching => 1,
            NatType::FixedSourcePorts => 2,
        }
    }
}

/// 建立对战时的主机参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleOptions {
    pub battle_type: BattleType,
    pub nat_type: NatType,
    pub password: Option<String>,
    pub port: u16,
    pub max_players: u32,
    pub game_hash: i64,
    pub rank: u8,
    pub map_hash: i64,
    pub map_name: String,
    pub title: String,
    pub game_name: String,
    /// 通过中继主机建立
    pub use_relay_host: bool,
    /// 指定中继主机管理器（为空则随机选择）
    pub relay_host: Option<String>,
}

/// 公开的对战信息（BATTLEOPENED）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleInfo {
    pub id: BattleId,
    pub battle_type: BattleType,
    pub nat_type: NatType,
    pub founder: String,
    pub ip: String,
    pub port: u16,
    pub max_players: u32,
    pub passworded: bool,
    pub rank: u8,
    pub map_hash: i64,
    pub map_name: String,
    pub title: String,
    pub game_name: String,
}

/// 同盟出生区域，坐标按 0-200 缩放
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartRect {
    pub ally: u8,
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

/// 客户端发送给服务端的命令
#[derive(Debug, Clone, PartialEq)]
pub enum ClientCommand {
    // === 身份认证 ===
    Login {
        nick: String,
        password_hash: String,
        cpu: u32,
        local_ip: String,
        lobby: String,
        user_id: u32,
        compat: String,
    },
    Register { nick: String, password_hash: String },
    ConfirmAgreement,
    Exit,

    // === 心跳 ===
    Ping,

    // === 频道与聊天 ===
    Join { channel: String, key: Option<String> },
    Leave { channel: String },
    Say { channel: String, message: String },
    SayEx { channel: String, message: String },
    SayPrivate { nick: String, message: String },
    SayPrivateEx { nick: String, message: String },
    SayBattle { message: String },
    SayBattleEx { message: String },
    Ring { nick: String },
    Channels,

    // === 管理 ===
    ChannelTopic { channel: String, topic: String },
    SetChannelKey { channel: String, key: String },
    Mute { channel: String, nick: String, minutes: i32, by_ip: bool },
    Unmute { channel: String, nick: String },
    KickUser { nick: String, reason: String },
    Ban { nick: String, by_ip: bool },
    Unban { nick: String },
    GetIp { nick: String },
    GetLastLoginTime { nick: String },
    GetLastIp { nick: String },
    FindIp { ip: String },
    GetAccountAccess { nick: String },
    ChangeAccountAccess { nick: String, access: String },
    SetBotMode { nick: String, bot: bool },
    GetInGameTime { nick: Option<String> },

    // === 对战 ===
    OpenBattle(BattleOptions),
    JoinBattle {
        id: BattleId,
        password: Option<String>,
        script_password: Option<String>,
    },
    LeaveBattle,
    MyStatus(UserStatus),
    MyBattleStatus { status: BattleStatus, colour: Colour },
    ForceTeamNo { nick: String, team: u8 },
    ForceAllyNo { nick: String, ally: u8 },
    ForceTeamColour { nick: String, colour: Colour },
    ForceSpectatorMode { nick: String },
    KickFromBattle { nick: String },
    Handicap { nick: String, value: u8 },
    AddBot { name: String, status: BattleStatus, colour: Colour, ai: String },
    RemoveBot { name: String },
    UpdateBot { name: String, status: BattleStatus, colour: Colour },
    UpdateBattleInfo { spectators: u32, locked: bool, map_hash: i64, map_name: String },
    SetScriptTags(Vec<(String, String)>),
    RemoveScriptTags(Vec<String>),
    AddStartRect(StartRect),
    RemoveStartRect { ally: u8 },
    DisableUnits(Vec<String>),
    EnableAllUnits,
    ScriptStart,
    Script(String),
    ScriptEnd,

    /// 原样发送
    Raw(String),
}

fn or_star(value: &Option<String>) -> &str {
    match value.as_deref() {
        Some(v) if !v.is_empty() => v,
        _ => "*",
    }
}

impl ClientCommand {
    /// 生成线上格式
    pub fn to_line(&self) -> CommandLine {
        use ClientCommand::*;
        let (command, params): (&str, String) = match self {
            Login { nick, password_hash, cpu, local_ip, lobby, user_id, compat } => (
                "LOGIN",
                format!("{} {} {} {} {}\t{}\t{}", nick, password_hash, cpu, local_ip, lobby, user_id, compat),
            ),
            Register { nick, password_hash } => ("REGISTER", format!("{} {}", nick, password_hash)),
            ConfirmAgreement => ("CONFIRMAGREEMENT", String::new()),
            Exit => ("EXIT", String::new()),
            Ping => ("PING", String::new()),
            Join { channel, key } => match key.as_deref() {
                Some(k) if !k.is_empty() => ("JOIN", format!("{} {}", channel, k)),
                _ => ("JOIN", channel.clone()),
            },
            Leave { channel } => ("LEAVE", channel.clone()),
            Say { channel, message } => ("SAY", format!("{} {}", channel, message)),
            SayEx { channel, message } => ("SAYEX", format!("{} {}", channel, message)),
            SayPrivate { nick, message } => ("SAYPRIVATE", format!("{} {}", nick, message)),
            SayPrivateEx { nick, message } => ("SAYPRIVATEEX", format!("{} {}", nick, message)),
            SayBattle { message } => ("SAYBATTLE", message.clone()),
            SayBattleEx { message } => ("SAYBATTLEEX", message.clone()),
            Ring { nick } => ("RING", nick.clone()),
            Channels => ("CHANNELS", String::new()),
            ChannelTopic { channel, topic } => ("CHANNELTOPIC", format!("{} {}", channel, topic)),
            SetChannelKey { channel, key } => ("SETCHANNELKEY", format!("{} {}", channel, key)),
            Mute { channel, nick, minutes, by_ip } => (
                "MUTE",
                if *by_ip {
                    format!("{} {} {} ip", channel, nick, minutes)
                } else {
                    format!("{} {} {}", channel, nick, minutes)
                },
            ),
            Unmute { channel, nick } => ("UNMUTE", format!("{} {}", channel, nick)),
            KickUser { nick, reason } => ("KICKUSER", format!("{} {}", nick, reason).trim_end().to_string()),
            Ban { nick, by_ip } => ("BAN", if *by_ip { format!("{} ip", nick) } else { nick.clone() }),
            Unban { nick } => ("UNBAN", nick.clone()),
            GetIp { nick } => ("GETIP", nick.clone()),
            GetLastLoginTime { nick } => ("GETLASTLOGINTIME", nick.clone()),
            GetLastIp { nick } => ("GETLASTIP", nick.clone()),
            FindIp { ip } => ("FINDIP", ip.clone()),
            GetAccountAccess { nick } => ("GETACCOUNTACCESS", nick.clone()),
            ChangeAccountAccess { nick, access } => ("CHANGEACCOUNTACCESS", format!("{} {}", nick, access)),
            SetBotMode { nick, bot } => ("SETBOTMODE", format!("{} {}", nick, *bot as u8)),
            GetInGameTime { nick } => ("GETINGAMETIME", nick.clone().unwrap_or_default()),
            OpenBattle(bo) => (
                "OPENBATTLE",
                format!(
                    "{} {} {} {} {} {} {} {} {}\t{}\t{}",
                    bo.battle_type.code(),
                    bo.nat_type.code(),
                    or_star(&bo.password),
                    bo.port,
                    bo.max_players,
                    bo.game_hash,
                    bo.rank,
                    bo.map_hash,
                    bo.map_name,
                    bo.title,
                    bo.game_name
                ),
            ),
            JoinBattle { id, password, script_password } => (
                "JOINBATTLE",
                match script_password {
                    Some(sp) => format!("{} {} {}", id, or_star(password), sp),
                    None if password.is_some() => format!("{} {}", id, or_star(password)),
                    None => id.to_string(),
                },
            ),
            LeaveBattle => ("LEAVEBATTLE", String::new()),
            MyStatus(status) => ("MYSTATUS", status.to_bits().to_string()),
            MyBattleStatus { status, colour } => (
                "MYBATTLESTATUS",
                format!("{} {}", status.to_bits(), colour.to_bits()),
            ),
            ForceTeamNo { nick, team } => ("FORCETEAMNO", format!("{} {}", nick, team)),
            ForceAllyNo { nick, ally } => ("FORCEALLYNO", format!("{} {}", nick, ally)),
            ForceTeamColour { nick, colour } => ("FORCETEAMCOLOR", format!("{} {}", nick, colour.to_bits())),
            ForceSpectatorMode { nick } => ("FORCESPECTATORMODE", nick.clone()),
            KickFromBattle { nick } => ("KICKFROMBATTLE", nick.clone()),
            Handicap { nick, value } => ("HANDICAP", format!("{} {}", nick, value)),
            AddBot { name, status, colour, ai } => (
                "ADDBOT",
                format!("{} {} {} {}", name, status.to_bits(), colour.to_bits(), ai),
            ),
            RemoveBot { name } => ("REMOVEBOT", name.clone()),
            UpdateBot { name, status, colour } => (
                "UPDATEBOT",
                format!("{} {} {}", name, status.to_bits(), colour.to_bits()),
            ),
            UpdateBattleInfo { spectators, locked, map_hash, map_name } => (
                "UPDATEBATTLEINFO",
                format!("{} {} {} {}", spectators, *locked as u8, map_hash, map_name),
            ),
            SetScriptTags(tags) => (
                "SETSCRIPTTAGS",
                tags.iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("\t"),
            ),
            RemoveScriptTags(keys) => ("REMOVESCRIPTTAGS", keys.join(" ")),
            AddStartRect(r) => (
                "ADDSTARTRECT",
                format!("{} {} {} {} {}", r.ally, r.left, r.top, r.right, r.bottom),
            ),
            RemoveStartRect { ally } => ("REMOVESTARTRECT", ally.to_string()),
            DisableUnits(units) => ("DISABLEUNITS", units.join(" ")),
            EnableAllUnits => ("ENABLEALLUNITS", String::new()),
            ScriptStart => ("SCRIPTSTART", String::new()),
            Script(line) => ("SCRIPT", line.clone()),
            ScriptEnd => ("SCRIPTEND", String::new()),
            Raw(raw) => {
                return CommandLine::parse(raw).unwrap_or_else(|_| CommandLine::new(raw.clone(), ""));
            }
        };
        CommandLine::new(command, params)
    }
}

/// 服务端发送给客户端的消息
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    // === 连接与身份认证 ===
    /// 服务器问候
    Greeting {
        protocol_version: String,
        spring_version: String,
        udp_port: u16,
        lan_mode: bool,
    },
    Accepted { nick: String },
    Denied { reason: String },
    Agreement { line: String },
    AgreementEnd,
    RegistrationAccepted,
    RegistrationDenied { reason: String },
    Motd { line: String },
    LoginInfoEnd,
    Pong,

    // === 用户 ===
    AddUser { nick: String, country: String, cpu: u32, account_id: Option<u32> },
    RemoveUser { nick: String },
    ClientStatus { nick: String, status: UserStatus },

    // === 频道 ===
    JoinSucceeded { channel: String },
    JoinFailed { channel: String, reason: String },
    Joined { channel: String, nick: String },
    Left { channel: String, nick: String, reason: String },
    Clients { channel: String, nicks: Vec<String> },
    ChannelTopic { channel: String, author: String, changed_ms: i64, topic: String },
    Said { channel: String, nick: String, message: String },
    SaidEx { channel: String, nick: String, message: String },
    SaidPrivate { nick: String, message: String },
    SaidPrivateEx { nick: String, message: String },
    /// 自己发出的私聊回显
    SayPrivateEcho { nick: String, message: String },
    ChannelListEntry { channel: String, users: u32, topic: String },
    EndOfChannels,
    ChannelMessage { channel: String, message: String },
    ForceLeaveChannel { channel: String, by: String, reason: String },

    // === 对战 ===
    BattleOpened(BattleInfo),
    BattleClosed { id: BattleId },
    OpenBattleAccepted { id: BattleId },
    OpenBattleFailed { reason: String },
    JoinBattleAccepted { id: BattleId, hash: i64 },
    JoinBattleFailed { reason: String },
    JoinedBattle { id: BattleId, nick: String, script_password: Option<String> },
    LeftBattle { id: BattleId, nick: String },
    UpdateBattleInfo { id: BattleId, spectators: u32, locked: bool, map_hash: i64, map_name: String },
    ClientBattleStatus { nick: String, status: BattleStatus, colour: Colour },
    RequestBattleStatus,
    SaidBattle { nick: String, message: String },
    SaidBattleEx { nick: String, message: String },
    AddBot {
        id: BattleId,
        name: String,
        owner: String,
        status: BattleStatus,
        colour: Colour,
        ai: String,
    },
    RemoveBot { id: BattleId, name: String },
    UpdateBot { id: BattleId, name: String, status: BattleStatus, colour: Colour },
    AddStartRect(StartRect),
    RemoveStartRect { ally: u8 },
    SetScriptTags(Vec<(String, String)>),
    RemoveScriptTags(Vec<String>),
    DisableUnits(Vec<String>),
    EnableAllUnits,
    ForceQuitBattle,

    // === 其它 ===
    Ring { nick: String },
    ServerMsg { message: String },
    ServerMsgBox { message: String, url: Option<String> },

    /// 未识别的命令
    Unknown(CommandLine),
}

impl ServerMessage {
    /// 从已拆分的命令行解析
    pub fn parse(line: &CommandLine) -> Result<Self> {
        use ServerMessage::*;
        let mut p = line.params();
        let msg = match line.command.as_str() {
            "TASServer" => Greeting {
                protocol_version: p.word()?.to_string(),
                spring_version: p.word()?.to_string(),
                udp_port: p.int()?,
                lan_mode: p.next_word().map(|w| w == "1").unwrap_or(false),
            },
            "ACCEPTED" => Accepted { nick: p.word()?.to_string() },
            "DENIED" => Denied { reason: p.rest().to_string() },
            "AGREEMENT" => Agreement { line: p.rest().to_string() },
            "AGREEMENTEND" => AgreementEnd,
            "REGISTRATIONACCEPTED" => RegistrationAccepted,
            "REGISTRATIONDENIED" => RegistrationDenied { reason: p.rest().to_string() },
            "MOTD" => Motd { line: p.rest().to_string() },
            "LOGININFOEND" => LoginInfoEnd,
            "PONG" => Pong,
            "ADDUSER" => AddUser {
                nick: p.word()?.to_string(),
                country: p.word()?.to_string(),
                cpu: p.int()?,
                account_id: p.next_word().and_then(|w| w.parse().ok()),
            },
            "REMOVEUSER" => RemoveUser { nick: p.word()?.to_string() },
            "CLIENTSTATUS" => ClientStatus {
                nick: p.word()?.to_string(),
                status: UserStatus::from_bits(p.int()?),
            },
            "JOIN" => JoinSucceeded { channel: p.word()?.to_string() },
            "JOINFAILED" => JoinFailed {
                channel: p.word()?.to_string(),
                reason: p.rest().to_string(),
            },
            "JOINED" => Joined {
                channel: p.word()?.to_string(),
                nick: p.word()?.to_string(),
            },
            "LEFT" => Left {
                channel: p.word()?.to_string(),
                nick: p.word()?.to_string(),
                reason: p.rest().to_string(),
            },
            "CLIENTS" => Clients {
                channel: p.word()?.to_string(),
                nicks: p.rest().split_whitespace().map(str::to_string).collect(),
            },
            "CHANNELTOPIC" => ChannelTopic {
                channel: p.word()?.to_string(),
                author: p.word()?.to_string(),
                changed_ms: p.int()?,
                topic: p.rest().to_string(),
            },
            "SAID" => Said {
                channel: p.word()?.to_string(),
                nick: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "SAIDEX" => SaidEx {
                channel: p.word()?.to_string(),
                nick: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "SAIDPRIVATE" => SaidPrivate {
                nick: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "SAIDPRIVATEEX" => SaidPrivateEx {
                nick: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "SAYPRIVATE" => SayPrivateEcho {
                nick: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "CHANNEL" => ChannelListEntry {
                channel: p.word()?.to_string(),
                users: p.int()?,
                topic: p.rest().to_string(),
            },
            "ENDOFCHANNELS" => EndOfChannels,
            "CHANNELMESSAGE" => ChannelMessage {
                channel: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "FORCELEAVECHANNEL" => ForceLeaveChannel {
                channel: p.word()?.to_string(),
                by: p.word()?.to_string(),
                reason: p.rest().to_string(),
            },
            "BATTLEOPENED" => BattleOpened(BattleInfo {
                id: p.int()?,
                battle_type: BattleType::from_code(p.int()?),
                nat_type: NatType::from_code(p.int()?),
                founder: p.word()?.to_string(),
                ip: p.word()?.to_string(),
                port: p.int()?,
                max_players: p.int()?,
                passworded: p.flag()?,
                rank: p.int()?,
                map_hash: p.int()?,
                map_name: p.sentence().to_string(),
                title: p.sentence().to_string(),
                game_name: p.sentence().to_string(),
            }),
            "BATTLECLOSED" => BattleClosed { id: p.int()? },
            "OPENBATTLE" => OpenBattleAccepted { id: p.int()? },
            "OPENBATTLEFAILED" => OpenBattleFailed { reason: p.rest().to_string() },
            "JOINBATTLE" => JoinBattleAccepted {
                id: p.int()?,
                hash: p.next_word().and_then(|w| w.parse().ok()).unwrap_or(0),
            },
            "JOINBATTLEFAILED" => JoinBattleFailed { reason: p.rest().to_string() },
            "JOINEDBATTLE" => JoinedBattle {
                id: p.int()?,
                nick: p.word()?.to_string(),
                script_password: p.next_word().map(str::to_string),
            },
            "LEFTBATTLE" => LeftBattle {
                id: p.int()?,
                nick: p.word()?.to_string(),
            },
            "UPDATEBATTLEINFO" => UpdateBattleInfo {
                id: p.int()?,
                spectators: p.int()?,
                locked: p.flag()?,
                map_hash: p.int()?,
                map_name: p.rest().to_string(),
            },
            "CLIENTBATTLESTATUS" => ClientBattleStatus {
                nick: p.word()?.to_string(),
                status: BattleStatus::from_bits(p.int()?),
                colour: Colour::from_bits(p.int()?),
            },
            "REQUESTBATTLESTATUS" => RequestBattleStatus,
            "SAIDBATTLE" => SaidBattle {
                nick: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "SAIDBATTLEEX" => SaidBattleEx {
                nick: p.word()?.to_string(),
                message: p.rest().to_string(),
            },
            "ADDBOT" => AddBot {
                id: p.int()?,
                name: p.word()?.to_string(),
                owner: p.word()?.to_string(),
                status: BattleStatus::from_bits(p.int()?),
                colour: Colour::from_bits(p.int()?),
                ai: p.rest().to_string(),
            },
            "REMOVEBOT" => RemoveBot {
                id: p.int()?,
                name: p.word()?.to_string(),
            },
            "UPDATEBOT" => UpdateBot {
                id: p.int()?,
                name: p.word()?.to_string(),
                status: BattleStatus::from_bits(p.int()?),
                colour: Colour::from_bits(p.int()?),
            },
            "ADDSTARTRECT" => AddStartRect(StartRect {
                ally: p.int()?,
                left: p.int()?,
                top: p.int()?,
                right: p.int()?,
                bottom: p.int()?,
            }),
            "REMOVESTARTRECT" => RemoveStartRect { ally: p.int()? },
            "SETSCRIPTTAGS" => SetScriptTags(parse_script_tags(&line.command, p.rest())?),
            "REMOVESCRIPTTAGS" => RemoveScriptTags(
                p.rest().split_whitespace().map(|k| k.to_lowercase()).collect(),
            ),
            "DISABLEUNITS" => DisableUnits(p.rest().split_whitespace().map(str::to_string).collect()),
            "ENABLEALLUNITS" => EnableAllUnits,
            "FORCEQUITBATTLE" => ForceQuitBattle,
            "RING" => Ring { nick: p.word()?.to_string() },
            "SERVERMSG" => ServerMsg { message: p.rest().to_string() },
            "SERVERMSGBOX" => {
                let message = p.sentence().to_string();
                let url = Some(p.sentence().trim().to_string()).filter(|u| !u.is_empty());
                ServerMsgBox { message, url }
            }
            _ => Unknown(line.clone()),
        };
        Ok(msg)
    }
}

/// 解析 `key=value\tkey=value`，键名统一小写
fn parse_script_tags(command: &str, params: &str) -> Result<Vec<(String, String)>> {
    params
        .split('\t')
        .filter(|pair| !pair.trim().is_empty())
        .map(|pair| {
            pair.split_once('=')
                .map(|(k, v)| (k.trim().to_lowercase(), v.to_string()))
                .ok_or_else(|| ProtocolError::Malformed {
                    command: command.to_string(),
                    reason: format!("script tag without '=': {:?}", pair),
                })
        })
        .collect()
}
