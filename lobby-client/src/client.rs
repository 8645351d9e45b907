//! 大厅客户端
//!
//! 会话由标准库 Mutex 保护，用户调用与驱动任务共享。驱动任务负责套接字
//! 读写以及每秒一次的定时器，会话产生的事件经 mpsc 通道交给上层。

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, MissedTickBehavior};

use protocol::{
    ensure_password_hash, validate_nickname, BattleId, BattleOptions, BattleStatus, ClientCommand, Colour,
    CommandLine, Connection, Connector, LineReader, LineWriter, ProtocolError, ServerMessage,
    TcpConnector, UserStatus, PING_TIMEOUT,
};

use crate::battles::{Battle, StartPos};
use crate::channels::Channel;
use crate::error::{ClientError, Result};
use crate::event::LobbyEvent;
use crate::server::LobbyServer;
use crate::session::{HostInfo, Session, SessionState};
use crate::users::User;

/// 定时器周期
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// 发往驱动任务的指令
enum Outgoing {
    Line(CommandLine),
    Close,
}

/// 用户调用与驱动任务共享的状态
#[derive(Clone)]
struct Shared {
    session: Arc<Mutex<Session>>,
    outgoing: Arc<Mutex<Option<mpsc::UnboundedSender<Outgoing>>>>,
    events: mpsc::UnboundedSender<LobbyEvent>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sender(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Outgoing>>> {
        self.outgoing.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 在锁内操作会话，随后把产生的命令与事件交给驱动和上层
    fn with<R>(&self, f: impl FnOnce(&mut Session) -> R) -> R {
        let mut session = self.lock();
        let result = f(&mut session);

        let lines = session.drain_outbox();
        if !lines.is_empty() {
            match self.sender().as_ref() {
                Some(tx) => {
                    for line in lines {
                        let _ = tx.send(Outgoing::Line(line));
                    }
                }
                None => tracing::debug!("Not connected, dropping {} lines", lines.len()),
            }
        }
        for event in session.drain_events() {
            let _ = self.events.send(event);
        }
        result
    }
}

/// 大厅客户端
pub struct LobbyClient {
    shared: Shared,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl LobbyClient {
    /// 创建客户端，同时返回事件接收端
    pub fn new() -> (Self, mpsc::UnboundedReceiver<LobbyEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let client = Self {
            shared: Shared {
                session: Arc::new(Mutex::new(Session::new())),
                outgoing: Arc::new(Mutex::new(None)),
                events,
            },
            driver: Mutex::new(None),
        };
        (client, rx)
    }

    pub fn state(&self) -> SessionState {
        self.shared.lock().state()
    }

    pub fn user(&self, nick: &str) -> Option<User> {
        self.shared.lock().users().get(nick).cloned()
    }

    pub fn channel(&self, name: &str) -> Option<Channel> {
        self.shared.lock().channels().get(name).cloned()
    }

    pub fn battle(&self, id: BattleId) -> Option<Battle> {
        self.shared.lock().battles().get(id).cloned()
    }

    pub fn battles(&self) -> Vec<Battle> {
        let mut battles: Vec<Battle> = self.shared.lock().battles().iter().cloned().collect();
        battles.sort_by_key(Battle::id);
        battles
    }

    pub fn set_ping_timeout(&self, ping_timeout: Duration) {
        self.shared.with(|s| s.set_ping_timeout(ping_timeout));
    }

    /// 修改主持中的对战，之后调用 send_host_info 同步给服务器
    pub fn update_hosted_battle<R>(&self, f: impl FnOnce(&mut Battle) -> R) -> Result<R> {
        self.shared.with(|s| s.hosted_battle_mut().map(f))
    }

    /// 设置玩家或 AI 的出生点，之后调用 send_user_position 同步
    pub fn set_start_pos(&self, nick: &str, pos: Option<StartPos>) -> Result<()> {
        self.shared.with(|s| s.set_start_pos(nick, pos))
    }

    async fn register_on<C: Connection>(conn: &mut C, nick: &str, password: &str) -> Result<()> {
        loop {
            let line = conn.recv().await?;
            match ServerMessage::parse(&line)? {
                ServerMessage::Greeting { .. } => {
                    let cmd = ClientCommand::Register {
                        nick: nick.to_string(),
                        password_hash: ensure_password_hash(password),
                    };
                    conn.send(&cmd.to_line()).await?;
                }
                ServerMessage::RegistrationAccepted => {
                    tracing::info!("Account {} registered", nick);
                    return Ok(());
                }
                ServerMessage::RegistrationDenied { reason } => {
                    return Err(ClientError::RegistrationDenied(reason));
                }
                other => tracing::debug!("Ignoring {:?} while registering", other),
            }
        }
    }
}

/// 驱动任务：读取行、写出命令、驱动定时器，结束时通知会话断开
async fn run_driver(
    mut reader: LineReader<OwnedReadHalf>,
    mut writer: LineWriter<OwnedWriteHalf>,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    shared: Shared,
) {
    // 读取放在独立任务中，select 只等待通道
    let (line_tx, mut lines) = mpsc::unbounded_channel();
    let reader_task = tokio::spawn(async move {
        loop {
            let result = reader.read_line().await;
            let failed = result.is_err();
            if line_tx.send(result).is_err() || failed {
                break;
            }
        }
    });

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let reason = loop {
        tokio::select! {
            received = lines.recv() => match received {
                Some(Ok(line)) => {
                    if let Err(e) = shared.with(|s| s.handle_line(&line, Instant::now())) {
                        tracing::warn!("Failed to handle {}: {}", line.command, e);
                    }
                }
                Some(Err(e)) => break e.to_string(),
                None => break ProtocolError::ConnectionClosed.to_string(),
            },
            out = outgoing.recv() => match out {
                Some(Outgoing::Line(line)) => {
                    if let Err(e) = writer.write_line(&line).await {
                        break e.to_string();
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = writer.shutdown().await;
                    break "closed by client".to_string();
                }
            },
            _ = ticker.tick() => {
                if shared.with(|s| s.timer_update(Instant::now())) {
                    break "ping timeout".to_string();
                }
            }
        }
    };

    reader_task.abort();
    *shared.sender() = None;
    shared.with(|s| s.on_disconnected(&reason));
}

#[async_trait]
impl LobbyServer for LobbyClient {
    fn execute_say_command(&self, cmd: &str) -> Result<bool> {
        self.shared.with(|s| s.execute_say_command(cmd))
    }

    async fn register(&self, addr: &str, nick: &str, password: &str) -> Result<()> {
        validate_nickname(nick)?;
        let mut conn = TcpConnector.connect(addr).await?;
        let result = timeout(PING_TIMEOUT, Self::register_on(&mut conn, nick, password))
            .await
            .unwrap_or(Err(ClientError::Protocol(ProtocolError::ConnectionTimeout)));
        let _ = conn.close().await;
        result
    }

    fn accept_agreement(&self) -> Result<()> {
        self.shared.with(|s| s.accept_agreement())
    }

    async fn connect(&self, server_name: &str, addr: &str) -> Result<()> {
        if self.is_connected() {
            return Err(ClientError::AlreadyConnected);
        }
        let previous = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            let _ = handle.await;
        }

        tracing::info!("Connecting to {} ({})", server_name, addr);
        let conn = TcpConnector.connect(addr).await?;
        let (reader, writer) = conn.split();

        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.sender() = Some(tx);
        self.shared.with(|s| s.on_connecting(server_name));

        let handle = tokio::spawn(run_driver(reader, writer, rx, self.shared.clone()));
        *self.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        match self.shared.sender().as_ref() {
            Some(tx) => {
                let _ = tx.send(Outgoing::Close);
                Ok(())
            }
            None => Err(ClientError::NotConnected),
        }
    }

    fn is_connected(&self) -> bool {
        self.shared.lock().is_connected()
    }

    fn login(&self, nick: &str, password: &str) -> Result<()> {
        self.shared.with(|s| s.login(nick, password))
    }

    fn logout(&self) -> Result<()> {
        self.shared.with(|s| s.logout())?;
        self.disconnect()
    }

    fn is_online(&self) -> bool {
        self.shared.lock().is_online()
    }

    fn timer_update(&self) {
        if self.shared.with(|s| s.timer_update(Instant::now())) {
            let _ = self.disconnect();
        }
    }

    fn join_channel(&self, channel: &str, key: Option<&str>) -> Result<()> {
        self.shared.with(|s| s.join_channel(channel, key))
    }

    fn part_channel(&self, channel: &str) -> Result<()> {
        self.shared.with(|s| s.part_channel(channel))
    }

    fn do_action_channel(&self, channel: &str, message: &str) -> Result<()> {
        self.shared.with(|s| s.do_action_channel(channel, message))
    }

    fn say_channel(&self, channel: &str, message: &str) -> Result<()> {
        self.shared.with(|s| s.say_channel(channel, message))
    }

    fn say_private(&self, nick: &str, message: &str) -> Result<()> {
        self.shared.with(|s| s.say_private(nick, message))
    }

    fn do_action_private(&self, nick: &str, message: &str) -> Result<()> {
        self.shared.with(|s| s.do_action_private(nick, message))
    }

    fn say_battle(&self, battle: BattleId, message: &str) -> Result<()> {
        self.shared.with(|s| s.say_battle(battle, message))
    }

    fn do_action_battle(&self, battle: BattleId, message: &str) -> Result<()> {
        self.shared.with(|s| s.do_action_battle(battle, message))
    }

    fn ring(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.ring(nick))
    }

    fn moderator_set_channel_topic(&self, channel: &str, topic: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_set_channel_topic(channel, topic))
    }

    fn moderator_set_channel_key(&self, channel: &str, key: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_set_channel_key(channel, key))
    }

    fn moderator_mute(&self, channel: &str, nick: &str, minutes: i32, by_ip: bool) -> Result<()> {
        self.shared.with(|s| s.moderator_mute(channel, nick, minutes, by_ip))
    }

    fn moderator_unmute(&self, channel: &str, nick: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_unmute(channel, nick))
    }

    fn moderator_kick(&self, nick: &str, reason: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_kick(nick, reason))
    }

    fn moderator_ban(&self, nick: &str, by_ip: bool) -> Result<()> {
        self.shared.with(|s| s.moderator_ban(nick, by_ip))
    }

    fn moderator_unban(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_unban(nick))
    }

    fn moderator_get_ip(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_get_ip(nick))
    }

    fn moderator_get_last_login(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_get_last_login(nick))
    }

    fn moderator_get_last_ip(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_get_last_ip(nick))
    }

    fn moderator_find_by_ip(&self, ip: &str) -> Result<()> {
        self.shared.with(|s| s.moderator_find_by_ip(ip))
    }

    fn admin_get_account_access(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.admin_get_account_access(nick))
    }

    fn admin_change_account_access(&self, nick: &str, access: &str) -> Result<()> {
        self.shared.with(|s| s.admin_change_account_access(nick, access))
    }

    fn admin_set_bot_mode(&self, nick: &str, bot: bool) -> Result<()> {
        self.shared.with(|s| s.admin_set_bot_mode(nick, bot))
    }

    fn host_battle(&self, options: BattleOptions) -> Result<()> {
        self.shared.with(|s| s.host_battle(options))
    }

    fn join_battle(&self, battle: BattleId, password: Option<&str>) -> Result<()> {
        self.shared.with(|s| s.join_battle(battle, password))
    }

    fn leave_battle(&self, battle: BattleId) -> Result<()> {
        self.shared.with(|s| s.leave_battle(battle))
    }

    fn start_hosted_battle(&self) -> Result<()> {
        self.shared.with(|s| s.start_hosted_battle())
    }

    fn force_side(&self, battle: BattleId, nick: &str, side: i32) -> Result<()> {
        self.shared.with(|s| s.force_side(battle, nick, side))
    }

    fn force_team(&self, battle: BattleId, nick: &str, team: i32) -> Result<()> {
        self.shared.with(|s| s.force_team(battle, nick, team))
    }

    fn force_ally(&self, battle: BattleId, nick: &str, ally: i32) -> Result<()> {
        self.shared.with(|s| s.force_ally(battle, nick, ally))
    }

    fn force_colour(&self, battle: BattleId, nick: &str, colour: Colour) -> Result<()> {
        self.shared.with(|s| s.force_colour(battle, nick, colour))
    }

    fn force_spectator(&self, battle: BattleId, nick: &str, spectator: bool) -> Result<()> {
        self.shared.with(|s| s.force_spectator(battle, nick, spectator))
    }

    fn battle_kick_player(&self, battle: BattleId, nick: &str) -> Result<()> {
        self.shared.with(|s| s.battle_kick_player(battle, nick))
    }

    fn set_handicap(&self, battle: BattleId, nick: &str, handicap: i32) -> Result<()> {
        self.shared.with(|s| s.set_handicap(battle, nick, handicap))
    }

    fn add_bot(&self, battle: BattleId, name: &str, status: BattleStatus, colour: Colour, ai: &str) -> Result<()> {
        self.shared.with(|s| s.add_bot(battle, name, status, colour, ai))
    }

    fn remove_bot(&self, battle: BattleId, name: &str) -> Result<()> {
        self.shared.with(|s| s.remove_bot(battle, name))
    }

    fn update_bot(&self, battle: BattleId, name: &str, status: BattleStatus, colour: Colour) -> Result<()> {
        self.shared.with(|s| s.update_bot(battle, name, status, colour))
    }

    fn send_host_info(&self, info: HostInfo) -> Result<()> {
        self.shared.with(|s| s.send_host_info(info))
    }

    fn send_host_info_tag(&self, key: &str) -> Result<()> {
        self.shared.with(|s| s.send_host_info_tag(key))
    }

    fn send_raw(&self, raw: &str) -> Result<()> {
        self.shared.with(|s| s.send_raw(raw))
    }

    fn send_user_position(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.send_user_position(nick))
    }

    fn request_in_game_time(&self, nick: Option<&str>) -> Result<()> {
        self.shared.with(|s| s.request_in_game_time(nick))
    }

    fn current_battle(&self) -> Option<BattleId> {
        self.shared.lock().current_battle()
    }

    fn request_channels(&self) -> Result<()> {
        self.shared.with(|s| s.request_channels())
    }

    fn send_my_battle_status(&self, status: BattleStatus, colour: Colour) -> Result<()> {
        self.shared.with(|s| s.send_my_battle_status(status, colour))
    }

    fn send_my_user_status(&self, status: UserStatus) -> Result<()> {
        self.shared.with(|s| s.send_my_user_status(status))
    }

    fn set_keepalive_interval(&self, interval: Duration) {
        self.shared.with(|s| s.set_keepalive_interval(interval));
    }

    fn keepalive_interval(&self) -> Duration {
        self.shared.lock().keepalive_interval()
    }

    fn required_spring(&self) -> String {
        self.shared.lock().required_spring().to_string()
    }

    fn set_required_spring(&self, version: &str) {
        self.shared.with(|s| s.set_required_spring(version));
    }

    fn me(&self) -> Option<String> {
        self.shared.lock().me().map(str::to_string)
    }

    fn server_name(&self) -> String {
        self.shared.lock().server_name().to_string()
    }

    fn send_script_to_clients(&self, script: &str) -> Result<()> {
        self.shared.with(|s| s.send_script_to_clients(script))
    }

    fn set_relay_ingame_password(&self, nick: &str) -> Result<()> {
        self.shared.with(|s| s.set_relay_ingame_password(nick))
    }

    fn relay_host_list(&self) -> Result<Vec<String>> {
        self.shared.with(|s| s.relay_host_list())
    }

    fn acquire_relay_host(&self) -> Result<Option<String>> {
        self.shared.with(|s| s.acquire_relay_host())
    }

    fn send_script_to_proxy(&self, script: &str) -> Result<()> {
        self.shared.with(|s| s.send_script_to_proxy(script))
    }

    fn set_private_udp_port(&self, port: u16) {
        self.shared.with(|s| s.set_private_udp_port(port));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{password_hash, Listener, TcpConnection, TcpListener};

    async fn fake_server() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    async fn send(conn: &mut TcpConnection, line: &str) {
        conn.send(&CommandLine::parse(line).unwrap()).await.unwrap();
    }

    async fn wait_for(
        events: &mut mpsc::UnboundedReceiver<LobbyEvent>,
        pred: impl Fn(&LobbyEvent) -> bool,
    ) -> LobbyEvent {
        timeout(Duration::from_secs(5), async {
            loop {
                let event = events.recv().await.expect("event channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_commands_before_connect() {
        let (client, _events) = LobbyClient::new();
        assert!(!client.is_connected());
        assert!(matches!(client.say_channel("main", "hi"), Err(ClientError::NotOnline)));
        assert!(matches!(client.disconnect(), Err(ClientError::NotConnected)));
        assert!(matches!(client.login("alice", "pw"), Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn test_login_join_logout() {
        let (mut listener, addr) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            send(&mut conn, "TASServer 0.37 104.0 8201 0").await;

            let login = conn.recv().await.unwrap();
            assert_eq!(login.command, "LOGIN");
            assert!(login.params.starts_with("alice "));
            send(&mut conn, "ACCEPTED alice").await;
            send(&mut conn, "ADDUSER alice DE 0 1").await;
            send(&mut conn, "LOGININFOEND").await;

            let join = conn.recv().await.unwrap();
            assert_eq!(join.to_string(), "JOIN main");
            send(&mut conn, "JOIN main").await;
            send(&mut conn, "CLIENTS main alice").await;

            let exit = conn.recv().await.unwrap();
            assert_eq!(exit.command, "EXIT");
        });

        let (client, mut events) = LobbyClient::new();
        client.set_keepalive_interval(Duration::ZERO);
        client.connect("test", &addr).await.unwrap();
        client.login("alice", "secret").unwrap();

        wait_for(&mut events, |e| matches!(e, LobbyEvent::LoginInfoEnd)).await;
        assert!(client.is_online());
        assert_eq!(client.me().as_deref(), Some("alice"));
        assert_eq!(client.required_spring(), "104.0");

        client.join_channel("main", None).unwrap();
        wait_for(&mut events, |e| matches!(e, LobbyEvent::ChannelJoined { .. })).await;

        client.logout().unwrap();
        wait_for(&mut events, |e| matches!(e, LobbyEvent::Disconnected { .. })).await;
        assert!(!client.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_keepalive_ping() {
        let (mut listener, addr) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            send(&mut conn, "TASServer 0.37 104.0 8201 0").await;
            conn.recv().await.unwrap();
            send(&mut conn, "ACCEPTED alice").await;

            let ping = conn.recv().await.unwrap();
            assert_eq!(ping.command, "PING");
            let id = ping.id.unwrap();
            conn.send(&CommandLine::new("PONG", "").with_id(id)).await.unwrap();
            // 保持连接直到客户端断开
            let _ = conn.recv().await;
        });

        let (client, mut events) = LobbyClient::new();
        client.set_keepalive_interval(Duration::from_secs(1));
        client.connect("test", &addr).await.unwrap();
        client.login("alice", "secret").unwrap();

        let reply = wait_for(&mut events, |e| matches!(e, LobbyEvent::PingReply { .. })).await;
        assert!(matches!(reply, LobbyEvent::PingReply { id: 1, .. }));

        client.disconnect().unwrap();
        wait_for(&mut events, |e| matches!(e, LobbyEvent::Disconnected { .. })).await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_lines_do_not_disconnect() {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(b"TASServer 0.37 104.0 8201 0\nSERVERMSG caf\xe9\n#x PONG\nMOTD still here\n")
                .await
                .unwrap();
            stream
        });

        let (client, mut events) = LobbyClient::new();
        client.set_keepalive_interval(Duration::ZERO);
        client.connect("test", &addr).await.unwrap();

        let message = wait_for(&mut events, |e| {
            matches!(e, LobbyEvent::ServerMessage { .. } | LobbyEvent::Disconnected { .. })
        })
        .await;
        assert_eq!(message, LobbyEvent::ServerMessage { message: "caf\u{FFFD}".to_string() });

        let motd = wait_for(&mut events, |e| {
            matches!(e, LobbyEvent::Motd { .. } | LobbyEvent::Disconnected { .. })
        })
        .await;
        assert_eq!(motd, LobbyEvent::Motd { line: "still here".to_string() });
        assert!(client.is_connected());

        let _stream = server.await.unwrap();
        client.disconnect().unwrap();
        wait_for(&mut events, |e| matches!(e, LobbyEvent::Disconnected { .. })).await;
    }

    #[tokio::test]
    async fn test_server_close_disconnects() {
        let (mut listener, addr) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            send(&mut conn, "TASServer 0.37 104.0 8201 0").await;
            conn.close().await.unwrap();
        });

        let (client, mut events) = LobbyClient::new();
        client.connect("test", &addr).await.unwrap();
        wait_for(&mut events, |e| matches!(e, LobbyEvent::Connected { .. })).await;
        wait_for(&mut events, |e| matches!(e, LobbyEvent::Disconnected { .. })).await;
        assert!(!client.is_connected());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_keeps_hashed_password() {
        let hash = password_hash("pw");
        let expected = format!("REGISTER alice {}", hash);
        let (mut listener, addr) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            send(&mut conn, "TASServer 0.37 104.0 8201 0").await;
            let register = conn.recv().await.unwrap();
            assert_eq!(register.to_string(), expected);
            send(&mut conn, "REGISTRATIONACCEPTED").await;
        });

        let (client, _events) = LobbyClient::new();
        client.register(&addr, "alice", &hash).await.unwrap();
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_register_denied() {
        let (mut listener, addr) = fake_server().await;
        let server = tokio::spawn(async move {
            let mut conn = listener.accept().await.unwrap();
            send(&mut conn, "TASServer 0.37 104.0 8201 0").await;
            let register = conn.recv().await.unwrap();
            assert_eq!(register.to_string(), format!("REGISTER alice {}", password_hash("pw")));
            send(&mut conn, "REGISTRATIONDENIED Name taken").await;
        });

        let (client, _events) = LobbyClient::new();
        let result = client.register(&addr, "alice", "pw").await;
        assert!(matches!(result, Err(ClientError::RegistrationDenied(reason)) if reason == "Name taken"));
        server.await.unwrap();
    }
}
