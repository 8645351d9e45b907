//! 用户状态、对战状态与颜色的位域编码

use serde::{Deserialize, Serialize};

/// 用户状态（CLIENTSTATUS / MYSTATUS）
///
/// 位布局: b0 游戏中, b1 离开, b2-4 等级, b5 管理员, b6 机器人
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatus {
    pub in_game: bool,
    pub away: bool,
    pub rank: u8,
    pub moderator: bool,
    pub bot: bool,
}

impl UserStatus {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            in_game: bits & 1 != 0,
            away: bits & (1 << 1) != 0,
            rank: ((bits >> 2) & 0b111) as u8,
            moderator: bits & (1 << 5) != 0,
            bot: bits & (1 << 6) != 0,
        }
    }

    pub fn to_bits(self) -> u32 {
        let mut bits = 0u32;
        bits |= self.in_game as u32;
        bits |= (self.away as u32) << 1;
        bits |= (self.rank.min(7) as u32) << 2;
        bits |= (self.moderator as u32) << 5;
        bits |= (self.bot as u32) << 6;
        bits
    }
}

/// 同步状态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    #[default]
    Unknown,
    Synced,
    Unsynced,
}

/// 对战中的玩家状态（CLIENTBATTLESTATUS / MYBATTLESTATUS）
///
/// 位布局: b1 就绪, b2-5 队伍, b6-9 同盟, b10 玩家模式(0 为观战),
/// b11-17 让分, b22-23 同步, b24-27 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BattleStatus {
    pub ready: bool,
    pub team: u8,
    pub ally: u8,
    pub spectator: bool,
    pub handicap: u8,
    pub sync: SyncStatus,
    pub side: u8,
}

impl Default for BattleStatus {
    fn default() -> Self {
        Self {
            ready: false,
            team: 0,
            ally: 0,
            spectator: false,
            handicap: 0,
            sync: SyncStatus::Unknown,
            side: 0,
        }
    }
}

impl BattleStatus {
    pub fn from_bits(bits: u32) -> Self {
        Self {
            ready: bits & (1 << 1) != 0,
            team: ((bits >> 2) & 0xF) as u8,
            ally: ((bits >> 6) & 0xF) as u8,
            spectator: bits & (1 << 10) == 0,
            handicap: ((bits >> 11) & 0x7F).min(100) as u8,
            sync: match (bits >> 22) & 0b11 {
                1 => SyncStatus::Synced,
                2 => SyncStatus::Unsynced,
                _ => SyncStatus::Unknown,
            },
            side: ((bits >> 24) & 0xF) as u8,
        }
    }

    pub fn to_bits(self) -> u32 {
        let mut bits = 0u32;
        bits |= (self.ready as u32) << 1;
        bits |= (self.team.min(15) as u32) << 2;
        bits |= (self.ally.min(15) as u32) << 6;
        bits |= (!self.spectator as u32) << 10;
        bits |= (self.handicap.min(100) as u32) << 11;
        let sync: u32 = match self.sync {
            SyncStatus::Unknown => 0,
            SyncStatus::Synced => 1,
            SyncStatus::Unsynced => 2,
        };
        bits |= sync << 22;
        bits |= (self.side.min(15) as u32) << 24;
        bits
    }

    pub fn set_team(&mut self, team: i32) {
        self.team = team.clamp(0, 15) as u8;
    }

    pub fn set_ally(&mut self, ally: i32) {
        self.ally = ally.clamp(0, 15) as u8;
    }

    pub fn set_handicap(&mut self, handicap: i32) {
        self.handicap = handicap.clamp(0, 100) as u8;
    }

    pub fn set_side(&mut self, side: i32) {
        self.side = side.clamp(0, 15) as u8;
    }
}

/// 队伍颜色，线格式为 0x00BBGGRR
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Colour {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Colour {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// 从整数值构造，超出 0-255 的分量被截断
    pub fn from_ints(r: i32, g: i32, b: i32) -> Self {
        Self::new(r.clamp(0, 255) as u8, g.clamp(0, 255) as u8, b.clamp(0, 255) as u8)
    }

    pub fn from_bits(bits: u32) -> Self {
        Self {
            r: (bits & 0xFF) as u8,
            g: ((bits >> 8) & 0xFF) as u8,
            b: ((bits >> 16) & 0xFF) as u8,
        }
    }

    pub fn to_bits(self) -> u32 {
        self.r as u32 | (self.g as u32) << 8 | (self.b as u32) << 16
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_status_bits() {
        let status = UserStatus::from_bits(0b110_1101);
        assert!(status.in_game);
        assert!(!status.away);
        assert_eq!(status.rank, 3);
        assert!(status.moderator);
        assert!(status.bot);
        assert_eq!(status.to_bits(), 0b110_1101);
    }

    #[test]
    fn test_user_status_rank_clamped() {
        let status = UserStatus { rank: 9, ..Default::default() };
        assert_eq!(UserStatus::from_bits(status.to_bits()).rank, 7);
    }

    #[test]
    fn test_battle_status_fields() {
        let mut status = BattleStatus {
            ready: true,
            spectator: false,
            sync: SyncStatus::Synced,
            ..Default::default()
        };
        status.set_team(5);
        status.set_ally(2);
        status.set_handicap(30);
        status.set_side(1);

        let bits = status.to_bits();
        assert_eq!(bits & (1 << 10), 1 << 10);
        assert_eq!((bits >> 2) & 0xF, 5);
        assert_eq!((bits >> 22) & 0b11, 1);
        assert_eq!(BattleStatus::from_bits(bits), status);
    }

    #[test]
    fn test_battle_status_spectator_is_mode_bit_clear() {
        let status = BattleStatus::from_bits(0);
        assert!(status.spectator);
        assert_eq!(status.sync, SyncStatus::Unknown);
    }

    #[test]
    fn test_battle_status_clamps() {
        let mut status = BattleStatus::default();
        status.set_team(40);
        status.set_ally(-3);
        status.set_handicap(250);
        assert_eq!(status.team, 15);
        assert_eq!(status.ally, 0);
        assert_eq!(status.handicap, 100);
    }

    #[test]
    fn test_colour_bits() {
        let colour = Colour::new(0x11, 0x22, 0x33);
        assert_eq!(colour.to_bits(), 0x0033_2211);
        assert_eq!(Colour::from_bits(0x0033_2211), colour);
        assert_eq!(Colour::from_ints(300, -1, 128), Colour::new(255, 0, 128));
    }
}
