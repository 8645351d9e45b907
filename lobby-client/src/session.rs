//! 大厅会话状态机
//!
//! 会话本身不做 I/O：驱动任务把收到的行交给 [`Session::handle_line`]，
//! 会话产生的待发送命令进入 outbox，事件进入事件队列，由驱动任务取走。
//!
//! 状态流转: Disconnected → Connecting → Connected（收到问候）→ LoggingIn → Online

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use protocol::{
    ensure_password_hash, validate_nickname, BattleId, BattleOptions, BattleStatus, ClientCommand,
    Colour, CommandLine, NatType, ServerMessage, UserStatus, COMPAT_FLAGS, KEEPALIVE_INTERVAL,
    LOBBY_NAME, PING_TIMEOUT,
};

use crate::battles::{Battle, BattleList, Bot, StartPos};
use crate::channels::{ChannelList, Topic};
use crate::error::{ClientError, Result};
use crate::event::{ChatKind, LobbyEvent};
use crate::ping::PingTracker;
use crate::relay::{generate_script_password, RelayState};
use crate::users::{User, UserList};

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// 已建立连接，等待服务器问候
    Connecting,
    Connected,
    LoggingIn,
    Online,
}

/// 需要同步给服务器的房主信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostInfo {
    /// 观战人数、锁定状态与地图
    pub battle_info: bool,
    pub script_tags: bool,
    pub start_rects: bool,
    /// 禁用单位列表
    pub restrictions: bool,
}

impl HostInfo {
    pub const ALL: HostInfo = HostInfo {
        battle_info: true,
        script_tags: true,
        start_rects: true,
        restrictions: true,
    };
}

/// 对战命令的目标
enum Target {
    Me,
    Bot,
    Player,
}

struct Credentials {
    nick: String,
    password_hash: String,
}

/// 大厅会话
pub struct Session {
    pub(crate) state: SessionState,
    credentials: Option<Credentials>,
    /// 收到问候后立即登录
    login_on_greeting: bool,
    me: Option<String>,
    server_name: String,
    server_version: String,
    required_spring: String,
    udp_port: u16,
    pub(crate) private_udp_port: u16,
    keepalive: Duration,
    ping_timeout: Duration,
    ping: PingTracker,
    pub(crate) users: UserList,
    pub(crate) channels: ChannelList,
    pub(crate) battles: BattleList,
    pub(crate) current_battle: Option<BattleId>,
    pub(crate) my_status: UserStatus,
    agreement: Vec<String>,
    last_denied_reason: Option<String>,
    /// 频道 -> 加入时使用的密码，等待服务器确认
    pending_joins: HashMap<String, Option<String>>,
    /// 上次同步给服务器的出生区域
    announced_start_rects: BTreeSet<u8>,
    pub(crate) relay: RelayState,
    outbox: Vec<CommandLine>,
    pub(crate) events: Vec<LobbyEvent>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Disconnected,
            credentials: None,
            login_on_greeting: false,
            me: None,
            server_name: String::new(),
            server_version: String::new(),
            required_spring: String::new(),
            udp_port: 0,
            private_udp_port: 0,
            keepalive: KEEPALIVE_INTERVAL,
            ping_timeout: PING_TIMEOUT,
            ping: PingTracker::new(),
            users: UserList::new(),
            channels: ChannelList::new(),
            battles: BattleList::new(),
            current_battle: None,
            my_status: UserStatus::default(),
            agreement: Vec::new(),
            last_denied_reason: None,
            pending_joins: HashMap::new(),
            announced_start_rects: BTreeSet::new(),
            relay: RelayState::default(),
            outbox: Vec::new(),
            events: Vec::new(),
        }
    }

    // ========================================================================
    // 驱动接口
    // ========================================================================

    /// 连接已建立
    pub fn on_connecting(&mut self, server_name: &str) {
        self.reset();
        self.server_name = server_name.to_string();
        self.state = SessionState::Connecting;
    }

    /// 连接已断开，清空所有列表
    pub fn on_disconnected(&mut self, reason: &str) {
        if self.state == SessionState::Disconnected {
            return;
        }
        tracing::info!("Disconnected from {}: {}", self.server_name, reason);
        self.reset();
        self.events.push(LobbyEvent::Disconnected { reason: reason.to_string() });
    }

    fn reset(&mut self) {
        self.state = SessionState::Disconnected;
        self.login_on_greeting = false;
        self.me = None;
        self.ping.clear();
        self.users.clear();
        self.channels.clear();
        self.battles.clear();
        self.current_battle = None;
        self.my_status = UserStatus::default();
        self.agreement.clear();
        self.pending_joins.clear();
        self.announced_start_rects.clear();
        self.relay = RelayState::default();
        self.outbox.clear();
    }

    /// 取走待发送的命令
    pub fn drain_outbox(&mut self) -> Vec<CommandLine> {
        std::mem::take(&mut self.outbox)
    }

    /// 取走待分发的事件
    pub fn drain_events(&mut self) -> Vec<LobbyEvent> {
        std::mem::take(&mut self.events)
    }

    /// 定时调用，发送心跳并检测超时
    ///
    /// 返回 true 表示心跳超时，连接应当断开。
    pub fn timer_update(&mut self, now: Instant) -> bool {
        if self.state != SessionState::Online {
            return false;
        }
        if let Some(id) = self.ping.overdue(now, self.ping_timeout) {
            tracing::warn!("Ping {} timed out after {:?}", id, self.ping_timeout);
            self.events.push(LobbyEvent::PingTimeout { id });
            return true;
        }
        if !self.keepalive.is_zero() && self.ping.should_ping(now, self.keepalive) {
            let id = self.ping.next(now);
            self.outbox.push(ClientCommand::Ping.to_line().with_id(id));
        }
        false
    }

    /// 处理服务器发来的一行
    pub fn handle_line(&mut self, line: &CommandLine, now: Instant) -> Result<()> {
        let msg = ServerMessage::parse(line)?;
        self.handle_message(msg, line.id, now);
        Ok(())
    }

    pub(crate) fn send(&mut self, cmd: ClientCommand) {
        self.outbox.push(cmd.to_line());
    }

    // ========================================================================
    // 状态查询
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state != SessionState::Disconnected
    }

    pub fn is_online(&self) -> bool {
        self.state == SessionState::Online
    }

    pub fn me(&self) -> Option<&str> {
        self.me.as_deref()
    }

    pub fn my_user(&self) -> Option<&User> {
        self.me.as_deref().and_then(|nick| self.users.get(nick))
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    pub fn udp_port(&self) -> u16 {
        self.udp_port
    }

    pub fn required_spring(&self) -> &str {
        &self.required_spring
    }

    pub fn set_required_spring(&mut self, version: &str) {
        self.required_spring = version.to_string();
    }

    pub fn keepalive_interval(&self) -> Duration {
        self.keepalive
    }

    /// 设置心跳间隔，为零时不发送心跳
    pub fn set_keepalive_interval(&mut self, interval: Duration) {
        self.keepalive = interval;
    }

    pub fn set_ping_timeout(&mut self, timeout: Duration) {
        self.ping_timeout = timeout;
    }

    pub fn set_private_udp_port(&mut self, port: u16) {
        self.private_udp_port = port;
    }

    pub fn last_denied_reason(&self) -> Option<&str> {
        self.last_denied_reason.as_deref()
    }

    pub fn users(&self) -> &UserList {
        &self.users
    }

    pub fn channels(&self) -> &ChannelList {
        &self.channels
    }

    pub fn battles(&self) -> &BattleList {
        &self.battles
    }

    pub fn current_battle(&self) -> Option<BattleId> {
        self.current_battle
    }

    pub fn my_status(&self) -> UserStatus {
        self.my_status
    }

    /// 加入频道时使用的密码
    pub fn channel_key(&self, channel: &str) -> Option<&str> {
        self.channels.get(channel).and_then(|c| c.key.as_deref())
    }

    /// 当前对战由自己（或自己的中继机器人）主持
    pub fn is_host(&self) -> bool {
        let Some(battle) = self.current_battle.and_then(|id| self.battles.get(id)) else {
            return false;
        };
        self.me.as_deref() == Some(battle.founder())
            || self.relay.host_bot.as_deref() == Some(battle.founder())
    }

    // ========================================================================
    // 前置条件
    // ========================================================================

    fn require_connected(&self) -> Result<()> {
        if self.state == SessionState::Disconnected {
            return Err(ClientError::NotConnected);
        }
        Ok(())
    }

    pub(crate) fn require_online(&self) -> Result<()> {
        if self.state != SessionState::Online {
            return Err(ClientError::NotOnline);
        }
        Ok(())
    }

    fn require_channel(&self, channel: &str) -> Result<()> {
        self.require_online()?;
        if !self.channels.is_joined(channel) {
            return Err(ClientError::NoSuchChannel(channel.to_string()));
        }
        Ok(())
    }

    fn require_user(&self, nick: &str) -> Result<()> {
        self.require_online()?;
        if !self.users.exists(nick) {
            return Err(ClientError::NoSuchUser(nick.to_string()));
        }
        Ok(())
    }

    fn require_battle(&self, id: BattleId) -> Result<&Battle> {
        self.require_online()?;
        if self.current_battle != Some(id) {
            return Err(ClientError::NotInBattle);
        }
        self.battles.get(id).ok_or(ClientError::NoSuchBattle(id))
    }

    pub(crate) fn require_host(&self) -> Result<BattleId> {
        self.require_online()?;
        let id = self.current_battle.ok_or(ClientError::NotInBattle)?;
        if !self.is_host() {
            return Err(ClientError::NotHost);
        }
        Ok(id)
    }

    fn battle_target(&self, id: BattleId, nick: &str) -> Result<Target> {
        let battle = self.require_battle(id)?;
        if self.me.as_deref() == Some(nick) {
            Ok(Target::Me)
        } else if battle.bots.contains_key(nick) {
            Ok(Target::Bot)
        } else if battle.users.contains_key(nick) {
            Ok(Target::Player)
        } else {
            Err(ClientError::NoSuchUser(nick.to_string()))
        }
    }

    /// 房主命令，需要房主身份，有中继机器人时经其转发
    fn host_cmd(&mut self, cmd: ClientCommand) -> Result<()> {
        self.require_host()?;
        self.relay_cmd(cmd);
        Ok(())
    }

    // ========================================================================
    // 登录
    // ========================================================================

    /// 登录，密码可以是明文或已哈希的形式
    ///
    /// 尚未收到服务器问候时，登录推迟到问候到达后。
    pub fn login(&mut self, nick: &str, password: &str) -> Result<()> {
        match self.state {
            SessionState::Disconnected => return Err(ClientError::NotConnected),
            SessionState::Online => return Err(ClientError::AlreadyOnline),
            _ => {}
        }
        validate_nickname(nick)?;
        self.credentials = Some(Credentials {
            nick: nick.to_string(),
            password_hash: ensure_password_hash(password),
        });
        if self.state == SessionState::Connecting {
            self.login_on_greeting = true;
        } else {
            self.send_login();
        }
        Ok(())
    }

    fn send_login(&mut self) {
        let Some(creds) = &self.credentials else {
            return;
        };
        tracing::info!("Logging in as {}", creds.nick);
        let cmd = ClientCommand::Login {
            nick: creds.nick.clone(),
            password_hash: creds.password_hash.clone(),
            cpu: 0,
            local_ip: "*".to_string(),
            lobby: LOBBY_NAME.to_string(),
            user_id: 0,
            compat: COMPAT_FLAGS.to_string(),
        };
        self.send(cmd);
        self.state = SessionState::LoggingIn;
    }

    /// 接受用户协议并重新登录
    pub fn accept_agreement(&mut self) -> Result<()> {
        self.require_connected()?;
        if self.credentials.is_none() {
            return Err(ClientError::InvalidArgument("no login credentials".to_string()));
        }
        self.send(ClientCommand::ConfirmAgreement);
        self.send_login();
        Ok(())
    }

    /// 通知服务器退出，随后由驱动关闭连接
    pub fn logout(&mut self) -> Result<()> {
        self.require_connected()?;
        self.send(ClientCommand::Exit);
        Ok(())
    }

    // ========================================================================
    // 频道与聊天
    // ========================================================================

    pub fn join_channel(&mut self, channel: &str, key: Option<&str>) -> Result<()> {
        self.require_online()?;
        let key = key.filter(|k| !k.is_empty()).map(str::to_string);
        self.pending_joins.insert(channel.to_string(), key.clone());
        self.send(ClientCommand::Join { channel: channel.to_string(), key });
        Ok(())
    }

    pub fn part_channel(&mut self, channel: &str) -> Result<()> {
        self.require_channel(channel)?;
        self.send(ClientCommand::Leave { channel: channel.to_string() });
        self.channels.remove(channel);
        self.events.push(LobbyEvent::ChannelLeft { channel: channel.to_string(), reason: None });
        Ok(())
    }

    pub fn say_channel(&mut self, channel: &str, message: &str) -> Result<()> {
        self.require_channel(channel)?;
        for line in message_lines(message) {
            self.send(ClientCommand::Say { channel: channel.to_string(), message: line.to_string() });
        }
        Ok(())
    }

    pub fn do_action_channel(&mut self, channel: &str, message: &str) -> Result<()> {
        self.require_channel(channel)?;
        for line in message_lines(message) {
            self.send(ClientCommand::SayEx { channel: channel.to_string(), message: line.to_string() });
        }
        Ok(())
    }

    pub fn say_private(&mut self, nick: &str, message: &str) -> Result<()> {
        self.require_user(nick)?;
        for line in message_lines(message) {
            self.send(ClientCommand::SayPrivate { nick: nick.to_string(), message: line.to_string() });
        }
        Ok(())
    }

    pub fn do_action_private(&mut self, nick: &str, message: &str) -> Result<()> {
        self.require_user(nick)?;
        for line in message_lines(message) {
            self.send(ClientCommand::SayPrivateEx { nick: nick.to_string(), message: line.to_string() });
        }
        Ok(())
    }

    pub fn say_battle(&mut self, id: BattleId, message: &str) -> Result<()> {
        self.require_battle(id)?;
        for line in message_lines(message) {
            self.relay_cmd(ClientCommand::SayBattle { message: line.to_string() });
        }
        Ok(())
    }

    pub fn do_action_battle(&mut self, id: BattleId, message: &str) -> Result<()> {
        self.require_battle(id)?;
        for line in message_lines(message) {
            self.relay_cmd(ClientCommand::SayBattleEx { message: line.to_string() });
        }
        Ok(())
    }

    pub fn ring(&mut self, nick: &str) -> Result<()> {
        self.require_user(nick)?;
        self.send(ClientCommand::Ring { nick: nick.to_string() });
        Ok(())
    }

    pub fn request_channels(&mut self) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::Channels);
        Ok(())
    }

    // ========================================================================
    // 管理命令
    // ========================================================================

    pub fn moderator_set_channel_topic(&mut self, channel: &str, topic: &str) -> Result<()> {
        self.require_online()?;
        let topic = topic.replace("\r\n", "\n").replace('\n', "\\n");
        self.send(ClientCommand::ChannelTopic { channel: channel.to_string(), topic });
        Ok(())
    }

    /// 设置频道密码，`*` 表示移除
    pub fn moderator_set_channel_key(&mut self, channel: &str, key: &str) -> Result<()> {
        self.require_online()?;
        let key = if key.is_empty() { "*" } else { key };
        self.send(ClientCommand::SetChannelKey { channel: channel.to_string(), key: key.to_string() });
        Ok(())
    }

    pub fn moderator_mute(&mut self, channel: &str, nick: &str, minutes: i32, by_ip: bool) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::Mute {
            channel: channel.to_string(),
            nick: nick.to_string(),
            minutes,
            by_ip,
        });
        Ok(())
    }

    pub fn moderator_unmute(&mut self, channel: &str, nick: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::Unmute { channel: channel.to_string(), nick: nick.to_string() });
        Ok(())
    }

    pub fn moderator_kick(&mut self, nick: &str, reason: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::KickUser { nick: nick.to_string(), reason: reason.to_string() });
        Ok(())
    }

    pub fn moderator_ban(&mut self, nick: &str, by_ip: bool) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::Ban { nick: nick.to_string(), by_ip });
        Ok(())
    }

    pub fn moderator_unban(&mut self, nick: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::Unban { nick: nick.to_string() });
        Ok(())
    }

    pub fn moderator_get_ip(&mut self, nick: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::GetIp { nick: nick.to_string() });
        Ok(())
    }

    pub fn moderator_get_last_login(&mut self, nick: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::GetLastLoginTime { nick: nick.to_string() });
        Ok(())
    }

    pub fn moderator_get_last_ip(&mut self, nick: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::GetLastIp { nick: nick.to_string() });
        Ok(())
    }

    pub fn moderator_find_by_ip(&mut self, ip: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::FindIp { ip: ip.to_string() });
        Ok(())
    }

    pub fn admin_get_account_access(&mut self, nick: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::GetAccountAccess { nick: nick.to_string() });
        Ok(())
    }

    pub fn admin_change_account_access(&mut self, nick: &str, access: &str) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::ChangeAccountAccess {
            nick: nick.to_string(),
            access: access.to_string(),
        });
        Ok(())
    }

    pub fn admin_set_bot_mode(&mut self, nick: &str, bot: bool) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::SetBotMode { nick: nick.to_string(), bot });
        Ok(())
    }

    /// 查询游戏时长，不指定用户时查询自己
    pub fn request_in_game_time(&mut self, nick: Option<&str>) -> Result<()> {
        self.require_online()?;
        self.send(ClientCommand::GetInGameTime { nick: nick.map(str::to_string) });
        Ok(())
    }

    /// 原样发送一行
    pub fn send_raw(&mut self, raw: &str) -> Result<()> {
        self.require_connected()?;
        self.send(ClientCommand::Raw(raw.to_string()));
        Ok(())
    }

    pub fn send_my_user_status(&mut self, status: UserStatus) -> Result<()> {
        self.require_online()?;
        self.my_status = status;
        self.send(ClientCommand::MyStatus(status));
        Ok(())
    }

    // ========================================================================
    // 对战
    // ========================================================================

    pub fn host_battle(&mut self, options: BattleOptions) -> Result<()> {
        self.require_online()?;
        if let Some(id) = self.current_battle {
            return Err(ClientError::AlreadyInBattle(id));
        }

        let mut options = options;
        if options.nat_type == NatType::HolePunching && options.port == 0 {
            options.port = self.private_udp_port;
        }

        if options.use_relay_host {
            let manager = options.relay_host.clone().filter(|h| !h.is_empty());
            self.relay.pending_open = Some(options);
            match manager {
                Some(manager) => self.spawn_relay_host(manager),
                None => {
                    if let Err(e) = self.acquire_relay_host() {
                        self.relay.pending_open = None;
                        return Err(e);
                    }
                }
            }
            return Ok(());
        }

        tracing::info!("Opening battle {:?} on {}", options.title, options.map_name);
        self.send(ClientCommand::OpenBattle(options));
        Ok(())
    }

    pub fn join_battle(&mut self, id: BattleId, password: Option<&str>) -> Result<()> {
        self.require_online()?;
        if let Some(current) = self.current_battle {
            return Err(ClientError::AlreadyInBattle(current));
        }
        if !self.battles.exists(id) {
            return Err(ClientError::NoSuchBattle(id));
        }
        self.send_join_battle(id, password.map(str::to_string));
        Ok(())
    }

    pub(crate) fn send_join_battle(&mut self, id: BattleId, password: Option<String>) {
        let script_password = generate_script_password();
        self.send(ClientCommand::JoinBattle {
            id,
            password: password.filter(|p| !p.is_empty()),
            script_password: Some(script_password),
        });
    }

    pub fn leave_battle(&mut self, id: BattleId) -> Result<()> {
        self.require_battle(id)?;
        self.send(ClientCommand::LeaveBattle);
        self.left_current_battle(id);
        Ok(())
    }

    fn left_current_battle(&mut self, id: BattleId) {
        if let Some(me) = self.me.clone() {
            if let Some(battle) = self.battles.get_mut(id) {
                battle.remove_user(&me);
            }
            if let Some(user) = self.users.get_mut(&me) {
                user.battle = None;
            }
        }
        self.current_battle = None;
        self.announced_start_rects.clear();
        self.relay.host_bot = None;
        self.relay.manager = None;
        self.events.push(LobbyEvent::BattleLeft { id });
    }

    /// 房主启动游戏
    pub fn start_hosted_battle(&mut self) -> Result<()> {
        let id = self.require_host()?;
        if self.relay.host_bot.is_some() {
            self.relay_cmd(ClientCommand::Raw("STARTGAME".to_string()));
        } else {
            let mut status = self.my_status;
            status.in_game = true;
            self.send_my_user_status(status)?;
        }
        tracing::info!("Starting hosted battle {}", id);
        Ok(())
    }

    pub fn send_my_battle_status(&mut self, status: BattleStatus, colour: Colour) -> Result<()> {
        self.require_online()?;
        let id = self.current_battle.ok_or(ClientError::NotInBattle)?;
        self.set_my_battle_status(id, status, colour);
        Ok(())
    }

    fn set_my_battle_status(&mut self, id: BattleId, status: BattleStatus, colour: Colour) {
        if let (Some(me), Some(battle)) = (self.me.clone(), self.battles.get_mut(id)) {
            let user = battle.users.entry(me).or_default();
            user.status = status;
            user.colour = colour;
        }
        self.send(ClientCommand::MyBattleStatus { status, colour });
    }

    fn update_my_battle_status(&mut self, id: BattleId, f: impl FnOnce(&mut BattleStatus, &mut Colour)) {
        let me = self.me.clone().unwrap_or_default();
        let current = self
            .battles
            .get(id)
            .and_then(|b| b.user(&me))
            .cloned()
            .unwrap_or_default();
        let (mut status, mut colour) = (current.status, current.colour);
        f(&mut status, &mut colour);
        self.set_my_battle_status(id, status, colour);
    }

    fn update_bot_status(
        &mut self,
        id: BattleId,
        name: &str,
        f: impl FnOnce(&mut BattleStatus, &mut Colour),
    ) -> Result<()> {
        let bot = self
            .battles
            .get(id)
            .and_then(|b| b.bot(name))
            .ok_or_else(|| ClientError::NoSuchUser(name.to_string()))?;
        let (mut status, mut colour) = (bot.status, bot.colour);
        f(&mut status, &mut colour);
        self.relay_cmd(ClientCommand::UpdateBot { name: name.to_string(), status, colour });
        Ok(())
    }

    pub fn force_side(&mut self, id: BattleId, nick: &str, side: i32) -> Result<()> {
        match self.battle_target(id, nick)? {
            Target::Me => {
                self.update_my_battle_status(id, |s, _| s.set_side(side));
                Ok(())
            }
            Target::Bot => self.update_bot_status(id, nick, |s, _| s.set_side(side)),
            Target::Player => Err(ClientError::Unsupported("forcing the side of another player")),
        }
    }

    pub fn force_team(&mut self, id: BattleId, nick: &str, team: i32) -> Result<()> {
        match self.battle_target(id, nick)? {
            Target::Me => {
                self.update_my_battle_status(id, |s, _| s.set_team(team));
                Ok(())
            }
            Target::Bot => self.update_bot_status(id, nick, |s, _| s.set_team(team)),
            Target::Player => {
                let mut status = BattleStatus::default();
                status.set_team(team);
                self.host_cmd(ClientCommand::ForceTeamNo { nick: nick.to_string(), team: status.team })
            }
        }
    }

    pub fn force_ally(&mut self, id: BattleId, nick: &str, ally: i32) -> Result<()> {
        match self.battle_target(id, nick)? {
            Target::Me => {
                self.update_my_battle_status(id, |s, _| s.set_ally(ally));
                Ok(())
            }
            Target::Bot => self.update_bot_status(id, nick, |s, _| s.set_ally(ally)),
            Target::Player => {
                let mut status = BattleStatus::default();
                status.set_ally(ally);
                self.host_cmd(ClientCommand::ForceAllyNo { nick: nick.to_string(), ally: status.ally })
            }
        }
    }

    pub fn force_colour(&mut self, id: BattleId, nick: &str, colour: Colour) -> Result<()> {
        match self.battle_target(id, nick)? {
            Target::Me => {
                self.update_my_battle_status(id, |_, c| *c = colour);
                Ok(())
            }
            Target::Bot => self.update_bot_status(id, nick, |_, c| *c = colour),
            Target::Player => {
                self.host_cmd(ClientCommand::ForceTeamColour { nick: nick.to_string(), colour })
            }
        }
    }

    pub fn force_spectator(&mut self, id: BattleId, nick: &str, spectator: bool) -> Result<()> {
        match self.battle_target(id, nick)? {
            Target::Me => {
                self.update_my_battle_status(id, |s, _| s.spectator = spectator);
                Ok(())
            }
            Target::Bot => Err(ClientError::Unsupported("bots cannot spectate")),
            Target::Player if spectator => {
                self.host_cmd(ClientCommand::ForceSpectatorMode { nick: nick.to_string() })
            }
            Target::Player => Err(ClientError::Unsupported("forcing a spectator to play")),
        }
    }

    pub fn battle_kick_player(&mut self, id: BattleId, nick: &str) -> Result<()> {
        match self.battle_target(id, nick)? {
            Target::Me => self.leave_battle(id),
            Target::Bot => self.remove_bot(id, nick),
            Target::Player => self.host_cmd(ClientCommand::KickFromBattle { nick: nick.to_string() }),
        }
    }

    pub fn set_handicap(&mut self, id: BattleId, nick: &str, handicap: i32) -> Result<()> {
        match self.battle_target(id, nick)? {
            Target::Bot => self.update_bot_status(id, nick, |s, _| s.set_handicap(handicap)),
            Target::Me | Target::Player => {
                let mut status = BattleStatus::default();
                status.set_handicap(handicap);
                self.host_cmd(ClientCommand::Handicap { nick: nick.to_string(), value: status.handicap })
            }
        }
    }

    pub fn add_bot(
        &mut self,
        id: BattleId,
        name: &str,
        status: BattleStatus,
        colour: Colour,
        ai: &str,
    ) -> Result<()> {
        self.require_battle(id)?;
        validate_nickname(name)?;
        self.relay_cmd(ClientCommand::AddBot {
            name: name.to_string(),
            status,
            colour,
            ai: ai.to_string(),
        });
        Ok(())
    }

    pub fn remove_bot(&mut self, id: BattleId, name: &str) -> Result<()> {
        let battle = self.require_battle(id)?;
        if battle.bot(name).is_none() {
            return Err(ClientError::NoSuchUser(name.to_string()));
        }
        self.relay_cmd(ClientCommand::RemoveBot { name: name.to_string() });
        Ok(())
    }

    pub fn update_bot(&mut self, id: BattleId, name: &str, status: BattleStatus, colour: Colour) -> Result<()> {
        self.require_battle(id)?;
        self.update_bot_status(id, name, |s, c| {
            *s = status;
            *c = colour;
        })
    }

    /// 主持的对战，供房主在本地修改后调用 send_host_info 同步
    pub fn hosted_battle_mut(&mut self) -> Result<&mut Battle> {
        let id = self.require_host()?;
        self.battles.get_mut(id).ok_or(ClientError::NoSuchBattle(id))
    }

    /// 将本地的对战设置同步给服务器
    pub fn send_host_info(&mut self, info: HostInfo) -> Result<()> {
        let id = self.require_host()?;
        let battle = self.battles.get(id).cloned().ok_or(ClientError::NoSuchBattle(id))?;

        if info.battle_info {
            self.relay_cmd(ClientCommand::UpdateBattleInfo {
                spectators: battle.spectators,
                locked: battle.locked,
                map_hash: battle.info.map_hash,
                map_name: battle.info.map_name.clone(),
            });
        }

        if info.script_tags && !battle.script_tags.is_empty() {
            let tags = battle
                .script_tags
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            self.relay_cmd(ClientCommand::SetScriptTags(tags));
        }

        if info.start_rects {
            let stale: Vec<u8> = self
                .announced_start_rects
                .iter()
                .filter(|ally| !battle.start_rects.contains_key(ally))
                .copied()
                .collect();
            for ally in stale {
                self.relay_cmd(ClientCommand::RemoveStartRect { ally });
            }
            for rect in battle.start_rects.values() {
                self.relay_cmd(ClientCommand::AddStartRect(*rect));
            }
            self.announced_start_rects = battle.start_rects.keys().copied().collect();
        }

        if info.restrictions {
            self.relay_cmd(ClientCommand::EnableAllUnits);
            if !battle.disabled_units.is_empty() {
                self.relay_cmd(ClientCommand::DisableUnits(
                    battle.disabled_units.iter().cloned().collect(),
                ));
            }
        }
        Ok(())
    }

    /// 同步单个脚本标签，本地不存在时通知服务器移除
    pub fn send_host_info_tag(&mut self, key: &str) -> Result<()> {
        let id = self.require_host()?;
        let key = key.to_lowercase();
        let value = self
            .battles
            .get(id)
            .and_then(|b| b.script_tag(&key))
            .map(str::to_string);
        match value {
            Some(value) => self.relay_cmd(ClientCommand::SetScriptTags(vec![(key, value)])),
            None => self.relay_cmd(ClientCommand::RemoveScriptTags(vec![key])),
        }
        Ok(())
    }

    /// 设置玩家或 AI 的出生点，None 表示由游戏决定
    pub fn set_start_pos(&mut self, nick: &str, pos: Option<StartPos>) -> Result<()> {
        let id = self.require_host()?;
        let battle = self.battles.get_mut(id).ok_or(ClientError::NoSuchBattle(id))?;
        if let Some(user) = battle.user_mut(nick) {
            user.start_pos = pos;
        } else if let Some(bot) = battle.bot_mut(nick) {
            bot.start_pos = pos;
        } else {
            return Err(ClientError::NoSuchUser(nick.to_string()));
        }
        Ok(())
    }

    /// 以脚本标签同步玩家或 AI 的出生点
    pub fn send_user_position(&mut self, nick: &str) -> Result<()> {
        let id = self.require_host()?;
        let battle = self.battles.get(id).ok_or(ClientError::NoSuchBattle(id))?;
        let (team, pos) = match (battle.user(nick), battle.bot(nick)) {
            (Some(user), _) => (user.status.team, user.start_pos),
            (None, Some(bot)) => (bot.status.team, bot.start_pos),
            (None, None) => return Err(ClientError::NoSuchUser(nick.to_string())),
        };
        let pos = pos.ok_or_else(|| {
            ClientError::InvalidArgument(format!("{} has no start position", nick))
        })?;
        self.relay_cmd(ClientCommand::SetScriptTags(vec![
            (format!("game/Team{}/StartPosX", team), pos.x.to_string()),
            (format!("game/Team{}/StartPosZ", team), pos.y.to_string()),
        ]));
        Ok(())
    }

    /// 将启动脚本直接发给对战中的客户端
    pub fn send_script_to_clients(&mut self, script: &str) -> Result<()> {
        self.require_host()?;
        self.send(ClientCommand::ScriptStart);
        for line in script.lines() {
            self.send(ClientCommand::Script(line.to_string()));
        }
        self.send(ClientCommand::ScriptEnd);
        Ok(())
    }

    /// 回应 REQUESTBATTLESTATUS，选择未被占用的最小队伍与同盟
    fn reply_battle_status(&mut self) {
        let (Some(id), Some(me)) = (self.current_battle, self.me.clone()) else {
            return;
        };
        let Some(battle) = self.battles.get(id) else {
            return;
        };

        let others: Vec<BattleStatus> = battle
            .users
            .iter()
            .filter(|(nick, user)| **nick != me && !user.status.spectator)
            .map(|(_, user)| user.status)
            .chain(battle.bots.values().map(|bot| bot.status))
            .collect();
        let lowest_free = |used: BTreeSet<u8>| (0..16u8).find(|n| !used.contains(n)).unwrap_or(0);
        let team = lowest_free(others.iter().map(|s| s.team).collect());
        let ally = lowest_free(others.iter().map(|s| s.ally).collect());

        let current = battle.user(&me).cloned().unwrap_or_default();
        let mut status = current.status;
        status.team = team;
        status.ally = ally;
        status.spectator = false;
        self.set_my_battle_status(id, status, current.colour);
    }

    // ========================================================================
    // 服务端消息
    // ========================================================================

    fn handle_message(&mut self, msg: ServerMessage, id: Option<u32>, now: Instant) {
        use ServerMessage as M;
        match msg {
            // === 连接与身份认证 ===
            M::Greeting { protocol_version, spring_version, udp_port, lan_mode } => {
                tracing::info!(
                    "Connected to {} (protocol {}, spring {})",
                    self.server_name,
                    protocol_version,
                    spring_version
                );
                self.state = SessionState::Connected;
                self.server_version = protocol_version.clone();
                self.required_spring = spring_version.clone();
                self.udp_port = udp_port;
                self.events.push(LobbyEvent::Connected {
                    server_version: protocol_version,
                    spring_version,
                    udp_port,
                    lan_mode,
                });
                if std::mem::take(&mut self.login_on_greeting) {
                    self.send_login();
                }
            }
            M::Accepted { nick } => {
                tracing::info!("Logged in as {}", nick);
                self.state = SessionState::Online;
                self.me = Some(nick.clone());
                self.ping.clear();
                self.events.push(LobbyEvent::LoggedIn { nick });
            }
            M::Denied { reason } => {
                tracing::warn!("Login denied: {}", reason);
                self.state = SessionState::Connected;
                self.last_denied_reason = Some(reason.clone());
                self.events.push(LobbyEvent::LoginFailed { reason });
            }
            M::Agreement { line } => self.agreement.push(line),
            M::AgreementEnd => {
                let text = std::mem::take(&mut self.agreement).join("\n");
                self.events.push(LobbyEvent::Agreement { text });
            }
            M::RegistrationAccepted => self.events.push(LobbyEvent::RegistrationAccepted),
            M::RegistrationDenied { reason } => {
                self.events.push(LobbyEvent::RegistrationDenied { reason })
            }
            M::Motd { line } => self.events.push(LobbyEvent::Motd { line }),
            M::LoginInfoEnd => self.events.push(LobbyEvent::LoginInfoEnd),
            M::Pong => match self.ping.pong(id, now) {
                Some((id, latency)) => self.events.push(LobbyEvent::PingReply { id, latency }),
                None => tracing::debug!("Unmatched PONG {:?}", id),
            },

            // === 用户 ===
            M::AddUser { nick, country, cpu, account_id } => {
                self.users.add(User::new(nick.clone(), country, cpu, account_id));
                self.events.push(LobbyEvent::UserJoined { nick });
            }
            M::RemoveUser { nick } => {
                self.users.remove(&nick);
                for channel in self.channels.remove_user_everywhere(&nick) {
                    self.events.push(LobbyEvent::ChannelUserLeft {
                        channel,
                        nick: nick.clone(),
                        reason: String::new(),
                    });
                }
                for id in self.battles.remove_user_everywhere(&nick) {
                    self.events.push(LobbyEvent::BattleUserLeft { id, nick: nick.clone() });
                }
                self.events.push(LobbyEvent::UserLeft { nick });
            }
            M::ClientStatus { nick, status } => {
                let old = self.users.set_status(&nick, status);
                if self.me.as_deref() == Some(nick.as_str()) {
                    self.my_status = status;
                }
                if matches!(old, Some(old) if status.in_game && !old.in_game) {
                    if let Some(id) = self.battles.hosted_by(&nick) {
                        self.events.push(LobbyEvent::BattleStarted { id });
                    }
                }
                self.events.push(LobbyEvent::UserStatusChanged { nick, status });
            }

            // === 频道 ===
            M::JoinSucceeded { channel } => {
                let key = self.pending_joins.remove(&channel).flatten();
                self.channels.add(&channel, key);
                self.events.push(LobbyEvent::ChannelJoined { channel });
            }
            M::JoinFailed { channel, reason } => {
                self.pending_joins.remove(&channel);
                self.events.push(LobbyEvent::ChannelJoinFailed { channel, reason });
            }
            M::Joined { channel, nick } => {
                if let Some(ch) = self.channels.get_mut(&channel) {
                    ch.users.insert(nick.clone());
                    self.events.push(LobbyEvent::ChannelUserJoined { channel, nick });
                }
            }
            M::Left { channel, nick, reason } => {
                if self.me.as_deref() == Some(nick.as_str()) {
                    self.channels.remove(&channel);
                    self.events.push(LobbyEvent::ChannelLeft { channel, reason: None });
                } else if let Some(ch) = self.channels.get_mut(&channel) {
                    ch.users.remove(&nick);
                    self.events.push(LobbyEvent::ChannelUserLeft { channel, nick, reason });
                }
            }
            M::Clients { channel, nicks } => {
                if let Some(ch) = self.channels.get_mut(&channel) {
                    ch.users.extend(nicks);
                }
            }
            M::ChannelTopic { channel, author, changed_ms, topic } => {
                let topic = Topic::from_wire(&topic, &author, changed_ms);
                self.events.push(LobbyEvent::ChannelTopic {
                    channel: channel.clone(),
                    author,
                    topic: topic.text.clone(),
                });
                if let Some(ch) = self.channels.get_mut(&channel) {
                    ch.topic = Some(topic);
                }
            }
            M::Said { channel, nick, message } => {
                self.events.push(LobbyEvent::ChannelSaid { channel, nick, message, kind: ChatKind::Normal })
            }
            M::SaidEx { channel, nick, message } => {
                self.events.push(LobbyEvent::ChannelSaid { channel, nick, message, kind: ChatKind::Action })
            }
            M::SaidPrivate { nick, message } => {
                if !self.handle_relay_private(&nick, &message) {
                    self.events.push(LobbyEvent::PrivateSaid { nick, message, kind: ChatKind::Normal });
                }
            }
            M::SaidPrivateEx { nick, message } => {
                self.events.push(LobbyEvent::PrivateSaid { nick, message, kind: ChatKind::Action })
            }
            M::SayPrivateEcho { nick, message } => {
                self.events.push(LobbyEvent::PrivateSent { nick, message })
            }
            M::ChannelListEntry { channel, users, topic } => {
                self.events.push(LobbyEvent::ChannelListEntry { channel, users, topic })
            }
            M::EndOfChannels => self.events.push(LobbyEvent::ChannelListEnd),
            M::ChannelMessage { channel, message } => {
                self.events.push(LobbyEvent::ChannelMessage { channel, message })
            }
            M::ForceLeaveChannel { channel, by, reason } => {
                self.channels.remove(&channel);
                let reason = if reason.is_empty() {
                    format!("kicked by {}", by)
                } else {
                    format!("kicked by {}: {}", by, reason)
                };
                self.events.push(LobbyEvent::ChannelLeft { channel, reason: Some(reason) });
            }

            // === 对战 ===
            M::BattleOpened(info) => {
                let id = info.id;
                if let Some(founder) = self.users.get_mut(&info.founder) {
                    founder.battle = Some(id);
                }
                let relay_hosted = self.relay.host_bot.as_deref() == Some(info.founder.as_str());
                self.battles.add(Battle::new(info.clone()));
                self.events.push(LobbyEvent::BattleOpened(info));
                if relay_hosted && self.current_battle.is_none() {
                    if let Some(password) = self.relay.awaiting_battle.take() {
                        self.send_join_battle(id, password);
                    }
                }
            }
            M::BattleClosed { id } => {
                self.battles.remove(id);
                self.users.leave_battle(id);
                if self.current_battle == Some(id) {
                    self.left_current_battle(id);
                }
                self.events.push(LobbyEvent::BattleClosed { id });
            }
            M::OpenBattleAccepted { id } => self.entered_battle(id, true),
            M::OpenBattleFailed { reason } => {
                self.events.push(LobbyEvent::BattleHostFailed { reason })
            }
            M::JoinBattleAccepted { id, .. } => {
                let hosted = self
                    .battles
                    .get(id)
                    .is_some_and(|b| self.relay.host_bot.as_deref() == Some(b.founder()));
                self.entered_battle(id, hosted);
            }
            M::JoinBattleFailed { reason } => {
                self.relay.host_bot = None;
                self.events.push(LobbyEvent::BattleJoinFailed { reason });
            }
            M::JoinedBattle { id, nick, script_password } => {
                if let Some(battle) = self.battles.get_mut(id) {
                    battle.add_user(&nick, script_password);
                }
                if let Some(user) = self.users.get_mut(&nick) {
                    user.battle = Some(id);
                }
                self.events.push(LobbyEvent::BattleUserJoined { id, nick });
            }
            M::LeftBattle { id, nick } => {
                if let Some(battle) = self.battles.get_mut(id) {
                    battle.remove_user(&nick);
                }
                if let Some(user) = self.users.get_mut(&nick) {
                    user.battle = None;
                }
                if self.me.as_deref() == Some(nick.as_str()) && self.current_battle == Some(id) {
                    self.left_current_battle(id);
                } else {
                    self.events.push(LobbyEvent::BattleUserLeft { id, nick });
                }
            }
            M::UpdateBattleInfo { id, spectators, locked, map_hash, map_name } => {
                if let Some(battle) = self.battles.get_mut(id) {
                    battle.spectators = spectators;
                    battle.locked = locked;
                    battle.info.map_hash = map_hash;
                    battle.info.map_name = map_name;
                    self.events.push(LobbyEvent::BattleInfoUpdated { id });
                }
            }
            M::ClientBattleStatus { nick, status, colour } => {
                if let Some(battle) = self.current_battle.and_then(|id| self.battles.get_mut(id)) {
                    let user = battle.users.entry(nick.clone()).or_default();
                    user.status = status;
                    user.colour = colour;
                }
                self.events.push(LobbyEvent::BattleStatusChanged { nick, status, colour });
            }
            M::RequestBattleStatus => self.reply_battle_status(),
            M::SaidBattle { nick, message } => {
                self.events.push(LobbyEvent::BattleSaid { nick, message, kind: ChatKind::Normal })
            }
            M::SaidBattleEx { nick, message } => {
                self.events.push(LobbyEvent::BattleSaid { nick, message, kind: ChatKind::Action })
            }
            M::AddBot { id, name, owner, status, colour, ai } => {
                if let Some(battle) = self.battles.get_mut(id) {
                    battle.bots.insert(
                        name.clone(),
                        Bot { owner, ai, status, colour, start_pos: None },
                    );
                    self.events.push(LobbyEvent::BotAdded { id, name });
                }
            }
            M::RemoveBot { id, name } => {
                if let Some(battle) = self.battles.get_mut(id) {
                    battle.bots.remove(&name);
                    self.events.push(LobbyEvent::BotRemoved { id, name });
                }
            }
            M::UpdateBot { id, name, status, colour } => {
                if let Some(bot) = self.battles.get_mut(id).and_then(|b| b.bot_mut(&name)) {
                    bot.status = status;
                    bot.colour = colour;
                    self.events.push(LobbyEvent::BotUpdated { id, name });
                }
            }
            M::AddStartRect(rect) => self.with_current_battle(|battle| {
                battle.start_rects.insert(rect.ally, rect);
                LobbyEvent::StartRectsChanged { id: battle.id() }
            }),
            M::RemoveStartRect { ally } => self.with_current_battle(|battle| {
                battle.start_rects.remove(&ally);
                LobbyEvent::StartRectsChanged { id: battle.id() }
            }),
            M::SetScriptTags(tags) => self.with_current_battle(|battle| {
                for (key, value) in &tags {
                    battle.set_script_tag(key, value);
                }
                LobbyEvent::ScriptTagsChanged { id: battle.id() }
            }),
            M::RemoveScriptTags(keys) => self.with_current_battle(|battle| {
                for key in &keys {
                    battle.script_tags.remove(key);
                }
                LobbyEvent::ScriptTagsChanged { id: battle.id() }
            }),
            M::DisableUnits(units) => self.with_current_battle(|battle| {
                battle.disabled_units.extend(units);
                LobbyEvent::DisabledUnitsChanged { id: battle.id() }
            }),
            M::EnableAllUnits => self.with_current_battle(|battle| {
                battle.disabled_units.clear();
                LobbyEvent::DisabledUnitsChanged { id: battle.id() }
            }),
            M::ForceQuitBattle => {
                if let Some(id) = self.current_battle {
                    self.left_current_battle(id);
                }
                self.events.push(LobbyEvent::ForcedOutOfBattle);
            }

            // === 其它 ===
            M::Ring { nick } => self.events.push(LobbyEvent::Ring { nick }),
            M::ServerMsg { message } => self.events.push(LobbyEvent::ServerMessage { message }),
            M::ServerMsgBox { message, url } => {
                self.events.push(LobbyEvent::ServerMessageBox { message, url })
            }
            M::Unknown(line) => {
                tracing::debug!("Unhandled command {}", line.command);
                self.events.push(LobbyEvent::Unknown(line));
            }
        }
    }

    fn entered_battle(&mut self, id: BattleId, hosted: bool) {
        self.current_battle = Some(id);
        if let Some(me) = self.me.clone() {
            if let Some(battle) = self.battles.get_mut(id) {
                battle.add_user(&me, None);
            }
            if let Some(user) = self.users.get_mut(&me) {
                user.battle = Some(id);
            }
        }
        self.events.push(LobbyEvent::BattleJoined { id, hosted });
    }

    /// 作用于当前对战的消息，不在对战中时忽略
    fn with_current_battle(&mut self, f: impl FnOnce(&mut Battle) -> LobbyEvent) {
        match self.current_battle.and_then(|id| self.battles.get_mut(id)) {
            Some(battle) => {
                let event = f(battle);
                self.events.push(event);
            }
            None => tracing::debug!("Battle update received outside of a battle"),
        }
    }
}

/// 按行拆分多行消息，忽略空行
fn message_lines(message: &str) -> impl Iterator<Item = &str> {
    message
        .split('\n')
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use protocol::{password_hash, StartRect};

    pub(crate) fn feed(session: &mut Session, line: &str) {
        session
            .handle_line(&CommandLine::parse(line).unwrap(), Instant::now())
            .unwrap();
    }

    pub(crate) fn sent(session: &mut Session) -> Vec<String> {
        session.drain_outbox().iter().map(|l| l.to_string()).collect()
    }

    /// 已登录为 alice 的会话
    pub(crate) fn online_session() -> Session {
        let mut session = Session::new();
        session.on_connecting("test");
        feed(&mut session, "TASServer 0.37 104.0 8201 0");
        session.login("alice", "secret").unwrap();
        feed(&mut session, "ACCEPTED alice");
        feed(&mut session, "ADDUSER alice DE 0 1");
        feed(&mut session, "ADDUSER bob US 0 2");
        session.drain_outbox();
        session.drain_events();
        session
    }

    /// 在 online_session 的基础上，bob 主持对战 5，alice 已加入
    fn in_bobs_battle() -> Session {
        let mut session = online_session();
        feed(&mut session, "BATTLEOPENED 5 0 0 bob 10.0.0.1 8452 8 0 0 77 Comet Catcher\ttitle\tBA 9.0");
        feed(&mut session, "JOINBATTLE 5 123");
        feed(&mut session, "JOINEDBATTLE 5 alice");
        session.drain_outbox();
        session.drain_events();
        session
    }

    /// alice 自己主持对战 9
    fn hosting() -> Session {
        let mut session = online_session();
        session.host_battle(BattleOptions { port: 8452, max_players: 8, ..Default::default() }).unwrap();
        feed(&mut session, "BATTLEOPENED 9 0 0 alice 10.0.0.2 8452 8 0 0 77 Comet Catcher\ttitle\tBA 9.0");
        feed(&mut session, "OPENBATTLE 9");
        feed(&mut session, "JOINEDBATTLE 9 bob");
        session.drain_outbox();
        session.drain_events();
        session
    }

    #[test]
    fn test_commands_require_online() {
        let mut session = Session::new();
        assert!(matches!(session.join_channel("main", None), Err(ClientError::NotOnline)));
        assert!(matches!(session.login("alice", "pw"), Err(ClientError::NotConnected)));

        session.on_connecting("test");
        feed(&mut session, "TASServer 0.37 104.0 8201 0");
        assert!(matches!(session.say_channel("main", "hi"), Err(ClientError::NotOnline)));
        assert!(sent(&mut session).is_empty());
    }

    #[test]
    fn test_login_flow() {
        let mut session = Session::new();
        session.on_connecting("test");
        feed(&mut session, "TASServer 0.37 104.0.1 8201 0");
        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.required_spring(), "104.0.1");

        session.login("alice", "password").unwrap();
        assert_eq!(session.state(), SessionState::LoggingIn);
        assert_eq!(
            sent(&mut session),
            vec![format!(
                "LOGIN alice {} 0 * {}\t0\t{}",
                password_hash("password"),
                LOBBY_NAME,
                COMPAT_FLAGS
            )]
        );

        feed(&mut session, "ACCEPTED alice");
        assert!(session.is_online());
        assert_eq!(session.me(), Some("alice"));

        let events = session.drain_events();
        assert!(matches!(events[0], LobbyEvent::Connected { .. }));
        assert_eq!(events[1], LobbyEvent::LoggedIn { nick: "alice".to_string() });
    }

    #[test]
    fn test_login_before_greeting_is_deferred() {
        let mut session = Session::new();
        session.on_connecting("test");
        session.login("alice", "password").unwrap();
        assert!(sent(&mut session).is_empty());

        feed(&mut session, "TASServer 0.37 104.0 8201 0");
        let lines = sent(&mut session);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("LOGIN alice "));
    }

    #[test]
    fn test_login_denied() {
        let mut session = Session::new();
        session.on_connecting("test");
        feed(&mut session, "TASServer 0.37 104.0 8201 0");
        session.login("alice", "wrong").unwrap();
        feed(&mut session, "DENIED Bad username/password");

        assert_eq!(session.state(), SessionState::Connected);
        assert_eq!(session.last_denied_reason(), Some("Bad username/password"));
        assert!(session.drain_events().contains(&LobbyEvent::LoginFailed {
            reason: "Bad username/password".to_string()
        }));
    }

    #[test]
    fn test_agreement_then_accept() {
        let mut session = Session::new();
        session.on_connecting("test");
        feed(&mut session, "TASServer 0.37 104.0 8201 0");
        session.login("alice", "pw").unwrap();
        session.drain_outbox();

        feed(&mut session, "AGREEMENT Rule one");
        feed(&mut session, "AGREEMENT Rule two");
        feed(&mut session, "AGREEMENTEND");
        assert!(session.drain_events().contains(&LobbyEvent::Agreement {
            text: "Rule one\nRule two".to_string()
        }));

        session.accept_agreement().unwrap();
        let lines = sent(&mut session);
        assert_eq!(lines[0], "CONFIRMAGREEMENT");
        assert!(lines[1].starts_with("LOGIN alice "));
    }

    #[test]
    fn test_multiline_say_skips_empty_lines() {
        let mut session = online_session();
        feed(&mut session, "JOIN main");
        session.say_channel("main", "first\n\nsecond\r\n").unwrap();
        assert_eq!(sent(&mut session), vec!["SAY main first", "SAY main second"]);

        assert!(matches!(
            session.say_channel("elsewhere", "hi"),
            Err(ClientError::NoSuchChannel(_))
        ));
        assert!(matches!(session.say_private("nobody", "hi"), Err(ClientError::NoSuchUser(_))));
    }

    #[test]
    fn test_channel_key_and_topic() {
        let mut session = online_session();
        session.join_channel("secret", Some("pw")).unwrap();
        assert_eq!(sent(&mut session), vec!["JOIN secret pw"]);
        feed(&mut session, "JOIN secret");
        assert_eq!(session.channel_key("secret"), Some("pw"));

        feed(&mut session, "CHANNELTOPIC secret ChanServ 1300000000000 hello\\nworld");
        let topic = session.channels().get("secret").unwrap().topic.clone().unwrap();
        assert_eq!(topic.text, "hello\nworld");
        assert_eq!(topic.author, "ChanServ");
    }

    #[test]
    fn test_remove_user_cleans_rosters() {
        let mut session = in_bobs_battle();
        feed(&mut session, "JOIN main");
        feed(&mut session, "CLIENTS main alice bob");
        feed(&mut session, "ADDUSER carol FI 0 3");
        feed(&mut session, "JOINEDBATTLE 5 carol");
        feed(&mut session, "REMOVEUSER carol");

        assert!(!session.users().exists("carol"));
        assert!(session.battles().get(5).unwrap().user("carol").is_none());

        feed(&mut session, "REMOVEUSER bob");
        assert!(!session.channels().get("main").unwrap().users.contains("bob"));
    }

    #[test]
    fn test_battle_closed_clears_current() {
        let mut session = in_bobs_battle();
        assert_eq!(session.current_battle(), Some(5));
        assert_eq!(session.users().get("alice").unwrap().battle, Some(5));

        feed(&mut session, "BATTLECLOSED 5");
        assert_eq!(session.current_battle(), None);
        assert_eq!(session.users().get("alice").unwrap().battle, None);
        assert_eq!(session.users().get("bob").unwrap().battle, None);
        let events = session.drain_events();
        assert!(events.contains(&LobbyEvent::BattleLeft { id: 5 }));
        assert!(events.contains(&LobbyEvent::BattleClosed { id: 5 }));
    }

    #[test]
    fn test_leave_battle() {
        let mut session = in_bobs_battle();
        assert!(matches!(session.leave_battle(6), Err(ClientError::NotInBattle)));
        session.leave_battle(5).unwrap();
        assert_eq!(sent(&mut session), vec!["LEAVEBATTLE"]);
        assert_eq!(session.current_battle(), None);
    }

    #[test]
    fn test_join_battle_sends_script_password() {
        let mut session = online_session();
        feed(&mut session, "BATTLEOPENED 5 0 0 bob 10.0.0.1 8452 8 1 0 77 Comet Catcher\ttitle\tBA 9.0");
        session.join_battle(5, Some("letmein")).unwrap();
        let lines = sent(&mut session);
        let parts: Vec<&str> = lines[0].split(' ').collect();
        assert_eq!(&parts[..3], &["JOINBATTLE", "5", "letmein"]);
        assert_eq!(parts[3].len(), 8);

        assert!(matches!(session.join_battle(42, None), Err(ClientError::NoSuchBattle(42))));
    }

    #[test]
    fn test_request_battle_status_picks_free_team() {
        let mut session = in_bobs_battle();
        let taken = BattleStatus { team: 0, ally: 0, ..Default::default() };
        feed(&mut session, &format!("CLIENTBATTLESTATUS bob {} 255", taken.to_bits()));
        feed(&mut session, "REQUESTBATTLESTATUS");

        let lines = session.drain_outbox();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].command, "MYBATTLESTATUS");
        let bits: u32 = lines[0].params().int().unwrap();
        let status = BattleStatus::from_bits(bits);
        assert_eq!(status.team, 1);
        assert_eq!(status.ally, 1);
        assert!(!status.spectator);
    }

    #[test]
    fn test_force_routing() {
        let mut session = in_bobs_battle();
        session.force_team(5, "alice", 3).unwrap();
        let lines = session.drain_outbox();
        assert_eq!(lines[0].command, "MYBATTLESTATUS");
        assert_eq!(session.battles().get(5).unwrap().user("alice").unwrap().status.team, 3);

        assert!(matches!(session.force_team(5, "bob", 2), Err(ClientError::NotHost)));

        let mut session = hosting();
        session.force_team(9, "bob", 2).unwrap();
        session.force_spectator(9, "bob", true).unwrap();
        session.battle_kick_player(9, "bob").unwrap();
        assert_eq!(
            sent(&mut session),
            vec!["FORCETEAMNO bob 2", "FORCESPECTATORMODE bob", "KICKFROMBATTLE bob"]
        );
        assert!(matches!(session.force_side(9, "bob", 1), Err(ClientError::Unsupported(_))));
    }

    #[test]
    fn test_bot_commands() {
        let mut session = hosting();
        let status = BattleStatus { team: 1, ..Default::default() };
        session.add_bot(9, "Bot1", status, Colour::new(255, 0, 0), "KAIK").unwrap();
        assert_eq!(
            sent(&mut session),
            vec![format!("ADDBOT Bot1 {} 255 KAIK", status.to_bits())]
        );

        feed(&mut session, &format!("ADDBOT 9 Bot1 alice {} 255 KAIK", status.to_bits()));
        session.force_ally(9, "Bot1", 2).unwrap();
        let lines = session.drain_outbox();
        assert_eq!(lines[0].command, "UPDATEBOT");
        assert!(matches!(session.remove_bot(9, "Ghost"), Err(ClientError::NoSuchUser(_))));
        session.remove_bot(9, "Bot1").unwrap();
        assert_eq!(sent(&mut session), vec!["REMOVEBOT Bot1"]);
    }

    #[test]
    fn test_send_host_info() {
        let mut session = hosting();
        {
            let battle = session.hosted_battle_mut().unwrap();
            battle.locked = true;
            battle.set_script_tag("game/startmetal", "1000");
            battle.start_rects.insert(0, StartRect { ally: 0, left: 0, top: 0, right: 50, bottom: 200 });
            battle.start_rects.insert(1, StartRect { ally: 1, left: 150, top: 0, right: 200, bottom: 200 });
            battle.disabled_units.insert("armcom".to_string());
        }
        session.send_host_info(HostInfo::ALL).unwrap();
        assert_eq!(
            sent(&mut session),
            vec![
                "UPDATEBATTLEINFO 0 1 77 Comet Catcher",
                "SETSCRIPTTAGS game/startmetal=1000",
                "ADDSTARTRECT 0 0 0 50 200",
                "ADDSTARTRECT 1 150 0 200 200",
                "ENABLEALLUNITS",
                "DISABLEUNITS armcom",
            ]
        );

        session.hosted_battle_mut().unwrap().start_rects.remove(&1);
        session.send_host_info(HostInfo { start_rects: true, ..Default::default() }).unwrap();
        assert_eq!(sent(&mut session), vec!["REMOVESTARTRECT 1", "ADDSTARTRECT 0 0 0 50 200"]);
    }

    #[test]
    fn test_send_script_to_clients() {
        let mut session = hosting();
        session.send_script_to_clients("[GAME]\n{\n}").unwrap();
        assert_eq!(
            sent(&mut session),
            vec!["SCRIPTSTART", "SCRIPT [GAME]", "SCRIPT {", "SCRIPT }", "SCRIPTEND"]
        );

        let mut guest = in_bobs_battle();
        assert!(matches!(guest.send_script_to_clients("x"), Err(ClientError::NotHost)));
    }

    #[test]
    fn test_send_user_position() {
        let mut session = hosting();
        assert!(matches!(session.send_user_position("bob"), Err(ClientError::InvalidArgument(_))));
        assert!(matches!(
            session.set_start_pos("ghost", Some(StartPos { x: 1, y: 1 })),
            Err(ClientError::NoSuchUser(_))
        ));

        session.force_team(9, "bob", 2).unwrap();
        feed(&mut session, &format!(
            "CLIENTBATTLESTATUS bob {} 255",
            BattleStatus { team: 2, ..Default::default() }.to_bits()
        ));
        session.set_start_pos("bob", Some(StartPos { x: 100, y: 200 })).unwrap();
        session.drain_outbox();
        session.send_user_position("bob").unwrap();
        assert_eq!(
            sent(&mut session),
            vec!["SETSCRIPTTAGS game/Team2/StartPosX=100\tgame/Team2/StartPosZ=200"]
        );

        let mut guest = in_bobs_battle();
        assert!(matches!(guest.set_start_pos("bob", None), Err(ClientError::NotHost)));
    }

    #[test]
    fn test_send_host_info_tag() {
        let mut session = hosting();
        session
            .hosted_battle_mut()
            .unwrap()
            .set_script_tag("game/StartMetal", "1000");
        session.send_host_info_tag("GAME/startmetal").unwrap();
        session.send_host_info_tag("game/startenergy").unwrap();
        assert_eq!(
            sent(&mut session),
            vec!["SETSCRIPTTAGS game/startmetal=1000", "REMOVESCRIPTTAGS game/startenergy"]
        );
    }

    #[test]
    fn test_force_colour_and_handicap_for_player() {
        let mut session = hosting();
        session.force_colour(9, "bob", Colour::new(255, 0, 0)).unwrap();
        session.set_handicap(9, "bob", 150).unwrap();
        assert_eq!(sent(&mut session), vec!["FORCETEAMCOLOR bob 255", "HANDICAP bob 100"]);
    }

    #[test]
    fn test_force_quit_battle() {
        let mut session = in_bobs_battle();
        feed(&mut session, "FORCEQUITBATTLE");
        assert_eq!(session.current_battle(), None);
        assert_eq!(
            session.drain_events(),
            vec![LobbyEvent::BattleLeft { id: 5 }, LobbyEvent::ForcedOutOfBattle]
        );
        assert!(session.battles().get(5).unwrap().user("alice").is_none());
    }

    #[test]
    fn test_own_left_battle() {
        let mut session = in_bobs_battle();
        feed(&mut session, "LEFTBATTLE 5 alice");
        assert_eq!(session.current_battle(), None);
        assert_eq!(session.users().get("alice").unwrap().battle, None);
        assert_eq!(session.drain_events(), vec![LobbyEvent::BattleLeft { id: 5 }]);
    }

    #[test]
    fn test_force_leave_channel() {
        let mut session = online_session();
        feed(&mut session, "JOIN main");
        session.drain_events();
        feed(&mut session, "FORCELEAVECHANNEL main ChanServ spamming");
        assert!(session.channels().get("main").is_none());
        assert_eq!(
            session.drain_events(),
            vec![LobbyEvent::ChannelLeft {
                channel: "main".to_string(),
                reason: Some("kicked by ChanServ: spamming".to_string()),
            }]
        );
    }

    #[test]
    fn test_keepalive_and_pong() {
        let mut session = online_session();
        session.set_keepalive_interval(Duration::from_secs(15));
        let start = Instant::now();

        assert!(!session.timer_update(start));
        assert_eq!(sent(&mut session), vec!["#1 PING"]);
        assert!(!session.timer_update(start + Duration::from_secs(1)));
        assert!(sent(&mut session).is_empty());

        session
            .handle_line(&CommandLine::parse("#1 PONG").unwrap(), start + Duration::from_millis(80))
            .unwrap();
        assert_eq!(
            session.drain_events(),
            vec![LobbyEvent::PingReply { id: 1, latency: Duration::from_millis(80) }]
        );
    }

    #[test]
    fn test_ping_timeout_requests_disconnect() {
        let mut session = online_session();
        let start = Instant::now();
        session.timer_update(start);
        assert!(session.timer_update(start + PING_TIMEOUT + Duration::from_secs(1)));
        assert!(session.drain_events().contains(&LobbyEvent::PingTimeout { id: 1 }));
    }

    #[test]
    fn test_disconnect_clears_everything() {
        let mut session = in_bobs_battle();
        session.on_disconnected("test");
        assert!(!session.is_connected());
        assert_eq!(session.users().count(), 0);
        assert_eq!(session.battles().count(), 0);
        assert_eq!(session.current_battle(), None);
        assert_eq!(
            session.drain_events(),
            vec![LobbyEvent::Disconnected { reason: "test".to_string() }]
        );
        assert!(matches!(session.say_battle(5, "hi"), Err(ClientError::NotOnline)));
    }

    #[test]
    fn test_battle_started_on_founder_ingame() {
        let mut session = in_bobs_battle();
        let status = UserStatus { in_game: true, ..Default::default() };
        feed(&mut session, &format!("CLIENTSTATUS bob {}", status.to_bits()));
        assert!(session.drain_events().contains(&LobbyEvent::BattleStarted { id: 5 }));
    }
}
