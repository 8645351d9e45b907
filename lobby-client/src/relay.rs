//! 中继主持
//!
//! 通过中继主机管理器申请一个代理机器人来主持对战，房主命令以
//! `SAYPRIVATE <bot> !<COMMAND> <params>` 的形式转发给它。

use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use rand::Rng;

use protocol::{validate_nickname, BattleOptions, ClientCommand, RELAY_MANAGER_LIST_BOT};

use crate::error::{ClientError, Result};
use crate::event::LobbyEvent;
use crate::session::Session;

/// 脚本密码长度
const SCRIPT_PASSWORD_LEN: usize = 8;

/// 中继状态
#[derive(Debug, Default)]
pub struct RelayState {
    /// 已知的中继主机管理器
    pub(crate) managers: Vec<String>,
    list_requested: bool,
    /// 至少收到过一次管理器列表
    list_received: bool,
    /// 收到管理器列表后立即申请
    spawn_after_list: bool,
    pub(crate) manager: Option<String>,
    /// 已发出 !spawn，等待管理器回复机器人昵称
    spawn_pending: bool,
    pub(crate) host_bot: Option<String>,
    /// 等待机器人就绪后转发的 OPENBATTLE
    pub(crate) pending_open: Option<BattleOptions>,
    /// 机器人开房后用此密码加入
    pub(crate) awaiting_battle: Option<Option<String>>,
}

/// 随机生成 8 位字母数字的脚本密码
pub fn generate_script_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SCRIPT_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

impl Session {
    /// 已知的中继主机管理器，列表为空时向服务器请求
    pub fn relay_host_list(&mut self) -> Result<Vec<String>> {
        self.require_online()?;
        if self.relay.managers.is_empty() && !self.relay.list_requested {
            self.request_relay_managers();
        }
        Ok(self.relay.managers.clone())
    }

    fn request_relay_managers(&mut self) {
        self.relay.list_requested = true;
        self.send(ClientCommand::SayPrivate {
            nick: RELAY_MANAGER_LIST_BOT.to_string(),
            message: "!lm".to_string(),
        });
    }

    /// 随机选择一个管理器申请中继机器人
    ///
    /// 尚无管理器列表时先请求列表，返回 None，收到列表后自动申请。
    /// 服务器给出的列表为空时返回 `NoRelayManager`。
    pub fn acquire_relay_host(&mut self) -> Result<Option<String>> {
        self.require_online()?;
        let manager = self.relay.managers.choose(&mut rand::thread_rng()).cloned();
        match manager {
            Some(manager) => {
                self.spawn_relay_host(manager.clone());
                Ok(Some(manager))
            }
            None if self.relay.list_received => {
                // 空列表，下次调用 relay_host_list 时重新请求
                self.relay.list_received = false;
                Err(ClientError::NoRelayManager)
            }
            None => {
                self.relay.spawn_after_list = true;
                if !self.relay.list_requested {
                    self.request_relay_managers();
                }
                Ok(None)
            }
        }
    }

    pub(crate) fn spawn_relay_host(&mut self, manager: String) {
        tracing::info!("Requesting relay host from {}", manager);
        self.send(ClientCommand::SayPrivate {
            nick: manager.clone(),
            message: "!spawn".to_string(),
        });
        self.relay.manager = Some(manager);
        self.relay.host_bot = None;
        self.relay.spawn_pending = true;
    }

    /// 有中继机器人时经其转发，否则直接发送
    pub(crate) fn relay_cmd(&mut self, cmd: ClientCommand) {
        let Some(bot) = self.relay.host_bot.clone() else {
            self.send(cmd);
            return;
        };
        let line = cmd.to_line();
        let message = if line.params.is_empty() {
            format!("!{}", line.command)
        } else {
            format!("!{} {}", line.command, line.params)
        };
        self.send(ClientCommand::SayPrivate { nick: bot, message });
    }

    /// 处理中继相关的私聊，已处理返回 true
    pub(crate) fn handle_relay_private(&mut self, nick: &str, message: &str) -> bool {
        if nick == RELAY_MANAGER_LIST_BOT {
            let Some(list) = message.strip_prefix("list") else {
                return false;
            };
            self.on_relay_manager_list(list.split_whitespace().map(str::to_string).collect());
            return true;
        }

        // 只接受对未完成的 !spawn 的第一条单词回复
        if self.relay.spawn_pending && self.relay.manager.as_deref() == Some(nick) {
            let bot = message.trim();
            if validate_nickname(bot).is_err() {
                return false;
            }
            self.relay.spawn_pending = false;
            self.on_relay_host_spawned(bot.to_string());
            return true;
        }
        false
    }

    fn on_relay_manager_list(&mut self, managers: Vec<String>) {
        tracing::debug!("Relay host managers: {:?}", managers);
        self.relay.managers = managers.clone();
        self.relay.list_requested = false;
        self.relay.list_received = true;
        self.events.push(LobbyEvent::RelayHostList { managers });

        if std::mem::take(&mut self.relay.spawn_after_list) {
            match self.relay.managers.choose(&mut rand::thread_rng()).cloned() {
                Some(manager) => self.spawn_relay_host(manager),
                None => {
                    tracing::warn!("No relay host manager available");
                    if self.relay.pending_open.take().is_some() {
                        self.events.push(LobbyEvent::BattleHostFailed {
                            reason: ClientError::NoRelayManager.to_string(),
                        });
                    }
                }
            }
        }
    }

    fn on_relay_host_spawned(&mut self, bot: String) {
        tracing::info!("Relay host {} acquired", bot);
        self.relay.host_bot = Some(bot.clone());
        self.events.push(LobbyEvent::RelayHostAcquired { nick: bot });
        if let Some(options) = self.relay.pending_open.take() {
            self.relay.awaiting_battle = Some(options.password.clone());
            self.relay_cmd(ClientCommand::OpenBattle(options));
        }
    }

    /// 经中继机器人发送启动脚本
    pub fn send_script_to_proxy(&mut self, script: &str) -> Result<()> {
        self.require_host()?;
        self.relay_cmd(ClientCommand::ScriptStart);
        for line in script.lines() {
            self.relay_cmd(ClientCommand::Script(line.to_string()));
        }
        self.relay_cmd(ClientCommand::ScriptEnd);
        Ok(())
    }

    /// 将玩家的脚本密码告知中继机器人，仅在游戏进行中生效
    pub fn set_relay_ingame_password(&mut self, nick: &str) -> Result<()> {
        let id = self.require_host()?;
        let Some(battle) = self.battles.get(id) else {
            return Ok(());
        };
        let in_game = self
            .users
            .get(battle.founder())
            .is_some_and(|founder| founder.status.in_game);
        if !in_game {
            tracing::debug!("Battle {} not running, ingame password not sent", id);
            return Ok(());
        }
        let password = battle
            .user(nick)
            .and_then(|u| u.script_password.clone())
            .unwrap_or_default();
        self.relay_cmd(ClientCommand::Raw(format!("SETINGAMEPASSWORD {} {}", nick, password)));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::{feed, online_session, sent};

    #[test]
    fn test_script_password() {
        let password = generate_script_password();
        assert_eq!(password.len(), SCRIPT_PASSWORD_LEN);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_relay_host_list_requests_once() {
        let mut session = online_session();
        assert!(session.relay_host_list().unwrap().is_empty());
        assert!(session.relay_host_list().unwrap().is_empty());
        assert_eq!(sent(&mut session), vec!["SAYPRIVATE RelayHostManagerList !lm"]);

        feed(&mut session, "SAIDPRIVATE RelayHostManagerList list mgr1 mgr2");
        assert_eq!(session.relay_host_list().unwrap(), vec!["mgr1", "mgr2"]);
        assert!(session.drain_events().contains(&LobbyEvent::RelayHostList {
            managers: vec!["mgr1".to_string(), "mgr2".to_string()]
        }));
    }

    #[test]
    fn test_relay_hosting_flow() {
        let mut session = online_session();
        feed(&mut session, "ADDUSER mgr1 XX 0 10");
        session
            .host_battle(BattleOptions {
                port: 8452,
                max_players: 8,
                map_name: "DeltaSiege".to_string(),
                title: "relayed".to_string(),
                game_name: "BA".to_string(),
                use_relay_host: true,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sent(&mut session), vec!["SAYPRIVATE RelayHostManagerList !lm"]);

        feed(&mut session, "SAIDPRIVATE RelayHostManagerList list mgr1");
        assert_eq!(sent(&mut session), vec!["SAYPRIVATE mgr1 !spawn"]);

        feed(&mut session, "SAIDPRIVATE mgr1 relaybot7");
        assert_eq!(
            sent(&mut session),
            vec!["SAYPRIVATE relaybot7 !OPENBATTLE 0 0 * 8452 8 0 0 0 DeltaSiege\trelayed\tBA"]
        );

        feed(&mut session, "ADDUSER relaybot7 XX 0 11");
        feed(&mut session, "BATTLEOPENED 3 0 0 relaybot7 1.2.3.4 8452 8 0 0 0 DeltaSiege\trelayed\tBA");
        let lines = sent(&mut session);
        assert!(lines[0].starts_with("JOINBATTLE 3 * "));

        feed(&mut session, "JOINBATTLE 3 0");
        assert!(session.is_host());
        assert!(session
            .drain_events()
            .contains(&LobbyEvent::BattleJoined { id: 3, hosted: true }));

        session.say_battle(3, "hello").unwrap();
        session.send_script_to_proxy("[GAME]").unwrap();
        assert_eq!(
            sent(&mut session),
            vec![
                "SAYPRIVATE relaybot7 !SAYBATTLE hello",
                "SAYPRIVATE relaybot7 !SCRIPTSTART",
                "SAYPRIVATE relaybot7 !SCRIPT [GAME]",
                "SAYPRIVATE relaybot7 !SCRIPTEND",
            ]
        );
    }

    #[test]
    fn test_relay_ingame_password() {
        let mut session = online_session();
        session
            .host_battle(BattleOptions {
                use_relay_host: true,
                relay_host: Some("mgr1".to_string()),
                ..Default::default()
            })
            .unwrap();
        feed(&mut session, "SAIDPRIVATE mgr1 relaybot7");
        feed(&mut session, "ADDUSER relaybot7 XX 0 11");
        feed(&mut session, "BATTLEOPENED 3 0 0 relaybot7 1.2.3.4 8452 8 0 0 0 DeltaSiege\trelayed\tBA");
        feed(&mut session, "JOINBATTLE 3 0");
        feed(&mut session, "JOINEDBATTLE 3 bob s3cret");
        session.drain_outbox();

        // 游戏未开始时不发送
        session.set_relay_ingame_password("bob").unwrap();
        assert!(sent(&mut session).is_empty());

        let in_game = protocol::UserStatus { in_game: true, ..Default::default() };
        feed(&mut session, &format!("CLIENTSTATUS relaybot7 {}", in_game.to_bits()));
        session.set_relay_ingame_password("bob").unwrap();
        assert_eq!(sent(&mut session), vec!["SAYPRIVATE relaybot7 !SETINGAMEPASSWORD bob s3cret"]);
    }

    #[test]
    fn test_explicit_relay_manager() {
        let mut session = online_session();
        session
            .host_battle(BattleOptions {
                use_relay_host: true,
                relay_host: Some("mgr9".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(sent(&mut session), vec!["SAYPRIVATE mgr9 !spawn"]);
    }

    #[test]
    fn test_empty_manager_list_fails_hosting() {
        let mut session = online_session();
        session
            .host_battle(BattleOptions { use_relay_host: true, ..Default::default() })
            .unwrap();
        feed(&mut session, "SAIDPRIVATE RelayHostManagerList list");
        assert!(session.drain_events().contains(&LobbyEvent::BattleHostFailed {
            reason: ClientError::NoRelayManager.to_string()
        }));
    }

    #[test]
    fn test_empty_manager_list_then_acquire_fails() {
        let mut session = online_session();
        assert_eq!(session.acquire_relay_host().unwrap(), None);
        feed(&mut session, "SAIDPRIVATE RelayHostManagerList list");
        session.drain_outbox();
        session.drain_events();

        assert!(matches!(session.acquire_relay_host(), Err(ClientError::NoRelayManager)));
        assert!(matches!(
            session.host_battle(BattleOptions { use_relay_host: true, ..Default::default() }),
            Ok(())
        ));
        // 上一次失败后重新请求列表
        assert_eq!(sent(&mut session), vec!["SAYPRIVATE RelayHostManagerList !lm"]);
    }

    #[test]
    fn test_empty_manager_list_rejects_hosting() {
        let mut session = online_session();
        session.acquire_relay_host().unwrap();
        feed(&mut session, "SAIDPRIVATE RelayHostManagerList list");
        let result = session.host_battle(BattleOptions { use_relay_host: true, ..Default::default() });
        assert!(matches!(result, Err(ClientError::NoRelayManager)));
        assert!(session.relay.pending_open.is_none());
    }

    #[test]
    fn test_manager_chatter_is_not_taken_as_bot() {
        let mut session = online_session();
        session
            .host_battle(BattleOptions {
                use_relay_host: true,
                relay_host: Some("mgr1".to_string()),
                ..Default::default()
            })
            .unwrap();
        session.drain_outbox();

        // 多个单词或含非法字符的回复不是机器人昵称
        feed(&mut session, "SAIDPRIVATE mgr1 spawning, please wait");
        feed(&mut session, "SAIDPRIVATE mgr1 busy!");
        assert_eq!(session.relay.host_bot, None);

        feed(&mut session, "SAIDPRIVATE mgr1 relaybot7");
        assert_eq!(session.relay.host_bot.as_deref(), Some("relaybot7"));

        // !spawn 已得到回复，后续的单词消息按普通私聊处理
        session.drain_events();
        feed(&mut session, "SAIDPRIVATE mgr1 hello");
        assert_eq!(session.relay.host_bot.as_deref(), Some("relaybot7"));
        assert!(session.drain_events().iter().any(|e| matches!(
            e,
            LobbyEvent::PrivateSaid { nick, message, .. } if nick == "mgr1" && message == "hello"
        )));
    }

    #[test]
    fn test_ordinary_private_message_passes_through() {
        let mut session = online_session();
        feed(&mut session, "SAIDPRIVATE bob hi there");
        assert_eq!(
            session.drain_events(),
            vec![LobbyEvent::PrivateSaid {
                nick: "bob".to_string(),
                message: "hi there".to_string(),
                kind: crate::event::ChatKind::Normal,
            }]
        );
    }
}
