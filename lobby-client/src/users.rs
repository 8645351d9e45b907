//! 在线用户列表

use std::collections::HashMap;

use protocol::{BattleId, UserStatus};

/// 在线用户
#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub nick: String,
    pub country: String,
    pub cpu: u32,
    pub account_id: Option<u32>,
    pub status: UserStatus,
    /// 所在对战
    pub battle: Option<BattleId>,
}

impl User {
    pub fn new(nick: String, country: String, cpu: u32, account_id: Option<u32>) -> Self {
        Self {
            nick,
            country,
            cpu,
            account_id,
            status: UserStatus::default(),
            battle: None,
        }
    }
}

/// 用户列表，按昵称索引
#[derive(Debug, Default)]
pub struct UserList {
    users: HashMap<String, User>,
}

impl UserList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加用户，同名用户被替换
    pub fn add(&mut self, user: User) {
        self.users.insert(user.nick.clone(), user);
    }

    pub fn remove(&mut self, nick: &str) -> Option<User> {
        self.users.remove(nick)
    }

    pub fn get(&self, nick: &str) -> Option<&User> {
        self.users.get(nick)
    }

    pub fn get_mut(&mut self, nick: &str) -> Option<&mut User> {
        self.users.get_mut(nick)
    }

    pub fn exists(&self, nick: &str) -> bool {
        self.users.contains_key(nick)
    }

    /// 更新用户状态，返回旧状态
    pub fn set_status(&mut self, nick: &str, status: UserStatus) -> Option<UserStatus> {
        self.users
            .get_mut(nick)
            .map(|user| std::mem::replace(&mut user.status, status))
    }

    /// 清除所有位于该对战中的用户的对战标记
    pub fn leave_battle(&mut self, battle_id: BattleId) {
        for user in self.users.values_mut() {
            if user.battle == Some(battle_id) {
                user.battle = None;
            }
        }
    }

    pub fn count(&self) -> usize {
        self.users.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &User> {
        self.users.values()
    }

    pub fn clear(&mut self) {
        self.users.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(nick: &str) -> User {
        User::new(nick.to_string(), "DE".to_string(), 2400, Some(7))
    }

    #[test]
    fn test_add_remove() {
        let mut list = UserList::new();
        list.add(user("alice"));
        list.add(user("bob"));
        assert_eq!(list.count(), 2);
        assert!(list.exists("alice"));

        let removed = list.remove("alice").unwrap();
        assert_eq!(removed.country, "DE");
        assert!(!list.exists("alice"));
        assert!(list.remove("alice").is_none());
    }

    #[test]
    fn test_set_status() {
        let mut list = UserList::new();
        list.add(user("alice"));

        let status = UserStatus { away: true, ..Default::default() };
        let old = list.set_status("alice", status).unwrap();
        assert!(!old.away);
        assert!(list.get("alice").unwrap().status.away);
        assert!(list.set_status("nobody", status).is_none());
    }

    #[test]
    fn test_leave_battle() {
        let mut list = UserList::new();
        list.add(user("alice"));
        list.add(user("bob"));
        list.get_mut("alice").unwrap().battle = Some(3);
        list.get_mut("bob").unwrap().battle = Some(4);

        list.leave_battle(3);
        assert_eq!(list.get("alice").unwrap().battle, None);
        assert_eq!(list.get("bob").unwrap().battle, Some(4));
    }
}
