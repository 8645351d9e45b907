//! 对战列表
//!
//! 保存每个公开对战的信息、成员状态、AI、出生区域与脚本标签。

use std::collections::{BTreeMap, BTreeSet, HashMap};

use protocol::{BattleId, BattleInfo, BattleStatus, Colour, StartRect};

/// 出生点坐标
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartPos {
    pub x: i32,
    pub y: i32,
}

/// 对战中的玩家
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BattleUser {
    pub status: BattleStatus,
    pub colour: Colour,
    pub script_password: Option<String>,
    pub start_pos: Option<StartPos>,
}

/// 对战中的 AI
#[derive(Debug, Clone, PartialEq)]
pub struct Bot {
    pub owner: String,
    pub ai: String,
    pub status: BattleStatus,
    pub colour: Colour,
    pub start_pos: Option<StartPos>,
}

/// 对战
#[derive(Debug, Clone, PartialEq)]
pub struct Battle {
    pub info: BattleInfo,
    pub spectators: u32,
    pub locked: bool,
    pub users: BTreeMap<String, BattleUser>,
    pub bots: BTreeMap<String, Bot>,
    pub start_rects: BTreeMap<u8, StartRect>,
    /// 键名均为小写
    pub script_tags: BTreeMap<String, String>,
    pub disabled_units: BTreeSet<String>,
}

impl Battle {
    pub fn new(info: BattleInfo) -> Self {
        let mut users = BTreeMap::new();
        users.insert(info.founder.clone(), BattleUser::default());
        Self {
            info,
            spectators: 0,
            locked: false,
            users,
            bots: BTreeMap::new(),
            start_rects: BTreeMap::new(),
            script_tags: BTreeMap::new(),
            disabled_units: BTreeSet::new(),
        }
    }

    pub fn id(&self) -> BattleId {
        self.info.id
    }

    pub fn founder(&self) -> &str {
        &self.info.founder
    }

    pub fn is_founder(&self, nick: &str) -> bool {
        self.info.founder == nick
    }

    pub fn add_user(&mut self, nick: &str, script_password: Option<String>) {
        let user = self.users.entry(nick.to_string()).or_default();
        if script_password.is_some() {
            user.script_password = script_password;
        }
    }

    pub fn remove_user(&mut self, nick: &str) -> Option<BattleUser> {
        self.users.remove(nick)
    }

    pub fn user(&self, nick: &str) -> Option<&BattleUser> {
        self.users.get(nick)
    }

    pub fn user_mut(&mut self, nick: &str) -> Option<&mut BattleUser> {
        self.users.get_mut(nick)
    }

    pub fn bot(&self, name: &str) -> Option<&Bot> {
        self.bots.get(name)
    }

    pub fn bot_mut(&mut self, name: &str) -> Option<&mut Bot> {
        self.bots.get_mut(name)
    }

    /// 非观战玩家数（不含 AI）
    pub fn player_count(&self) -> usize {
        self.users.values().filter(|u| !u.status.spectator).count()
    }

    pub fn set_script_tag(&mut self, key: &str, value: &str) {
        self.script_tags.insert(key.to_lowercase(), value.to_string());
    }

    pub fn script_tag(&self, key: &str) -> Option<&str> {
        self.script_tags.get(&key.to_lowercase()).map(String::as_str)
    }
}

/// 对战列表
#[derive(Debug, Default)]
pub struct BattleList {
    battles: HashMap<BattleId, Battle>,
}

impl BattleList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, battle: Battle) {
        self.battles.insert(battle.id(), battle);
    }

    pub fn remove(&mut self, id: BattleId) -> Option<Battle> {
        self.battles.remove(&id)
    }

    pub fn get(&self, id: BattleId) -> Option<&Battle> {
        self.battles.get(&id)
    }

    pub fn get_mut(&mut self, id: BattleId) -> Option<&mut Battle> {
        self.battles.get_mut(&id)
    }

    pub fn exists(&self, id: BattleId) -> bool {
        self.battles.contains_key(&id)
    }

    /// 查找用户作为房主的对战
    pub fn hosted_by(&self, nick: &str) -> Option<BattleId> {
        self.battles
            .values()
            .find(|b| b.is_founder(nick))
            .map(Battle::id)
    }

    /// 将用户从其所在的所有对战移除，返回受影响的对战
    pub fn remove_user_everywhere(&mut self, nick: &str) -> Vec<BattleId> {
        let mut affected: Vec<BattleId> = self
            .battles
            .values_mut()
            .filter_map(|b| b.remove_user(nick).map(|_| b.id()))
            .collect();
        affected.sort_unstable();
        affected
    }

    pub fn count(&self) -> usize {
        self.battles.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Battle> {
        self.battles.values()
    }

    pub fn clear(&mut self) {
        self.battles.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{BattleType, NatType};

    fn info(id: BattleId, founder: &str) -> BattleInfo {
        BattleInfo {
            id,
            battle_type: BattleType::Normal,
            nat_type: NatType::None,
            founder: founder.to_string(),
            ip: "10.0.0.1".to_string(),
            port: 8452,
            max_players: 8,
            passworded: false,
            rank: 0,
            map_hash: 1,
            map_name: "DeltaSiege".to_string(),
            title: "test".to_string(),
            game_name: "BA 9.0".to_string(),
        }
    }

    #[test]
    fn test_new_battle_contains_founder() {
        let battle = Battle::new(info(1, "bob"));
        assert!(battle.user("bob").is_some());
        assert!(battle.is_founder("bob"));
        assert_eq!(battle.player_count(), 1);
    }

    #[test]
    fn test_add_user_keeps_script_password() {
        let mut battle = Battle::new(info(1, "bob"));
        battle.add_user("alice", Some("pw".to_string()));
        battle.add_user("alice", None);
        assert_eq!(battle.user("alice").unwrap().script_password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_script_tags_case_insensitive() {
        let mut battle = Battle::new(info(1, "bob"));
        battle.set_script_tag("Game/StartMetal", "1000");
        assert_eq!(battle.script_tag("game/startmetal"), Some("1000"));
        assert_eq!(battle.script_tag("GAME/STARTMETAL"), Some("1000"));
    }

    #[test]
    fn test_remove_user_everywhere() {
        let mut list = BattleList::new();
        let mut first = Battle::new(info(1, "bob"));
        first.add_user("alice", None);
        list.add(first);
        list.add(Battle::new(info(2, "carol")));

        assert_eq!(list.remove_user_everywhere("alice"), vec![1]);
        assert!(list.get(1).unwrap().user("alice").is_none());
        assert_eq!(list.hosted_by("carol"), Some(2));
    }
}
