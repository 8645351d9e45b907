//! 已加入的聊天频道

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, TimeZone, Utc};

/// 频道主题
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    pub text: String,
    pub author: String,
    pub changed: Option<DateTime<Utc>>,
}

impl Topic {
    /// 服务器以字面量 `\n` 表示主题中的换行，`changed_ms` 为毫秒时间戳
    pub fn from_wire(text: &str, author: &str, changed_ms: i64) -> Self {
        Self {
            text: text.replace("\\n", "\n"),
            author: author.to_string(),
            changed: Utc.timestamp_millis_opt(changed_ms).single(),
        }
    }
}

/// 频道
#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub name: String,
    /// 加入时使用的密码
    pub key: Option<String>,
    pub topic: Option<Topic>,
    pub users: BTreeSet<String>,
}

impl Channel {
    pub fn new(name: String, key: Option<String>) -> Self {
        Self {
            name,
            key,
            topic: None,
            users: BTreeSet::new(),
        }
    }
}

/// 频道列表
#[derive(Debug, Default)]
pub struct ChannelList {
    channels: HashMap<String, Channel>,
}

impl ChannelList {
    pub fn new() -> Self {
        Self::default()
    }

    /// 加入频道，已存在时保留原有成员
    pub fn add(&mut self, name: &str, key: Option<String>) -> &mut Channel {
        self.channels
            .entry(name.to_string())
            .or_insert_with(|| Channel::new(name.to_string(), key))
    }

    pub fn remove(&mut self, name: &str) -> Option<Channel> {
        self.channels.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Channel> {
        self.channels.get_mut(name)
    }

    pub fn is_joined(&self, name: &str) -> bool {
        self.channels.contains_key(name)
    }

    /// 将用户从所有频道移除，返回受影响的频道名
    pub fn remove_user_everywhere(&mut self, nick: &str) -> Vec<String> {
        let mut affected: Vec<String> = self
            .channels
            .values_mut()
            .filter_map(|ch| ch.users.remove(nick).then(|| ch.name.clone()))
            .collect();
        affected.sort();
        affected
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.channels.len()
    }

    pub fn clear(&mut self) {
        self.channels.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_keeps_members() {
        let mut list = ChannelList::new();
        list.add("main", None).users.insert("alice".to_string());
        list.add("main", Some("ignored".to_string()));

        let channel = list.get("main").unwrap();
        assert!(channel.users.contains("alice"));
        assert_eq!(channel.key, None);
    }

    #[test]
    fn test_remove_user_everywhere() {
        let mut list = ChannelList::new();
        list.add("main", None).users.insert("bob".to_string());
        list.add("newbies", None).users.insert("bob".to_string());
        list.add("dev", None).users.insert("carol".to_string());

        assert_eq!(list.remove_user_everywhere("bob"), vec!["main", "newbies"]);
        assert!(list.get("main").unwrap().users.is_empty());
        assert_eq!(list.get("dev").unwrap().users.len(), 1);
    }

    #[test]
    fn test_topic_from_wire() {
        let topic = Topic::from_wire("line one\\nline two", "ChanServ", 1_300_000_000_000);
        assert_eq!(topic.text, "line one\nline two");
        assert_eq!(topic.changed.unwrap().timestamp(), 1_300_000_000);
    }
}
