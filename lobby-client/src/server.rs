//! 大厅服务器接口

use std::time::Duration;

use async_trait::async_trait;

use protocol::{BattleId, BattleOptions, BattleStatus, Colour, UserStatus};

use crate::error::Result;
use crate::session::HostInfo;

/// 大厅服务器连接
///
/// 用户、频道按名称引用，对战按 ID 引用。除连接、登录与注册外，
/// 其余命令要求已登录，否则返回 `ClientError::NotOnline`。
#[async_trait]
pub trait LobbyServer: Send + Sync {
    // === 连接与账号 ===

    /// 执行聊天框斜杠命令，不可识别时返回 false
    fn execute_say_command(&self, cmd: &str) -> Result<bool>;

    /// 在独立的连接上注册新账号
    async fn register(&self, addr: &str, nick: &str, password: &str) -> Result<()>;
    fn accept_agreement(&self) -> Result<()>;

    async fn connect(&self, server_name: &str, addr: &str) -> Result<()>;
    fn disconnect(&self) -> Result<()>;
    fn is_connected(&self) -> bool;

    fn login(&self, nick: &str, password: &str) -> Result<()>;
    fn logout(&self) -> Result<()>;
    fn is_online(&self) -> bool;

    /// 发送心跳并检测超时
    fn timer_update(&self);

    // === 频道与聊天 ===
    fn join_channel(&self, channel: &str, key: Option<&str>) -> Result<()>;
    fn part_channel(&self, channel: &str) -> Result<()>;
    fn do_action_channel(&self, channel: &str, message: &str) -> Result<()>;
    fn say_channel(&self, channel: &str, message: &str) -> Result<()>;
    fn say_private(&self, nick: &str, message: &str) -> Result<()>;
    fn do_action_private(&self, nick: &str, message: &str) -> Result<()>;
    fn say_battle(&self, battle: BattleId, message: &str) -> Result<()>;
    fn do_action_battle(&self, battle: BattleId, message: &str) -> Result<()>;
    fn ring(&self, nick: &str) -> Result<()>;

    // === 管理 ===
    fn moderator_set_channel_topic(&self, channel: &str, topic: &str) -> Result<()>;
    fn moderator_set_channel_key(&self, channel: &str, key: &str) -> Result<()>;
    fn moderator_mute(&self, channel: &str, nick: &str, minutes: i32, by_ip: bool) -> Result<()>;
    fn moderator_unmute(&self, channel: &str, nick: &str) -> Result<()>;
    fn moderator_kick(&self, nick: &str, reason: &str) -> Result<()>;
    fn moderator_ban(&self, nick: &str, by_ip: bool) -> Result<()>;
    fn moderator_unban(&self, nick: &str) -> Result<()>;
    fn moderator_get_ip(&self, nick: &str) -> Result<()>;
    fn moderator_get_last_login(&self, nick: &str) -> Result<()>;
    fn moderator_get_last_ip(&self, nick: &str) -> Result<()>;
    fn moderator_find_by_ip(&self, ip: &str) -> Result<()>;
    fn admin_get_account_access(&self, nick: &str) -> Result<()>;
    fn admin_change_account_access(&self, nick: &str, access: &str) -> Result<()>;
    fn admin_set_bot_mode(&self, nick: &str, bot: bool) -> Result<()>;

    // === 对战 ===
    fn host_battle(&self, options: BattleOptions) -> Result<()>;
    fn join_battle(&self, battle: BattleId, password: Option<&str>) -> Result<()>;
    fn leave_battle(&self, battle: BattleId) -> Result<()>;
    fn start_hosted_battle(&self) -> Result<()>;

    fn force_side(&self, battle: BattleId, nick: &str, side: i32) -> Result<()>;
    fn force_team(&self, battle: BattleId, nick: &str, team: i32) -> Result<()>;
    fn force_ally(&self, battle: BattleId, nick: &str, ally: i32) -> Result<()>;
    fn force_colour(&self, battle: BattleId, nick: &str, colour: Colour) -> Result<()>;
    fn force_spectator(&self, battle: BattleId, nick: &str, spectator: bool) -> Result<()>;
    fn battle_kick_player(&self, battle: BattleId, nick: &str) -> Result<()>;
    fn set_handicap(&self, battle: BattleId, nick: &str, handicap: i32) -> Result<()>;

    fn add_bot(&self, battle: BattleId, name: &str, status: BattleStatus, colour: Colour, ai: &str) -> Result<()>;
    fn remove_bot(&self, battle: BattleId, name: &str) -> Result<()>;
    fn update_bot(&self, battle: BattleId, name: &str, status: BattleStatus, colour: Colour) -> Result<()>;

    fn send_host_info(&self, info: HostInfo) -> Result<()>;
    fn send_host_info_tag(&self, key: &str) -> Result<()>;
    fn send_raw(&self, raw: &str) -> Result<()>;
    fn send_user_position(&self, nick: &str) -> Result<()>;

    fn request_in_game_time(&self, nick: Option<&str>) -> Result<()>;
    fn current_battle(&self) -> Option<BattleId>;
    fn request_channels(&self) -> Result<()>;

    fn send_my_battle_status(&self, status: BattleStatus, colour: Colour) -> Result<()>;
    fn send_my_user_status(&self, status: UserStatus) -> Result<()>;

    // === 心跳 ===
    fn set_keepalive_interval(&self, interval: Duration);
    fn keepalive_interval(&self) -> Duration;

    // === 杂项 ===
    fn is_password_hash(&self, password: &str) -> bool {
        protocol::is_password_hash(password)
    }
    fn password_hash(&self, password: &str) -> String {
        protocol::password_hash(password)
    }
    fn required_spring(&self) -> String;
    fn set_required_spring(&self, version: &str);
    fn me(&self) -> Option<String>;
    fn server_name(&self) -> String;

    fn send_script_to_clients(&self, script: &str) -> Result<()>;

    // === 中继主持 ===
    fn set_relay_ingame_password(&self, nick: &str) -> Result<()>;
    fn relay_host_list(&self) -> Result<Vec<String>>;
    fn acquire_relay_host(&self) -> Result<Option<String>>;
    fn send_script_to_proxy(&self, script: &str) -> Result<()>;
    fn set_private_udp_port(&self, port: u16);
    fn generate_script_password(&self) -> String {
        crate::relay::generate_script_password()
    }
}
