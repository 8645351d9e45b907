//! 心跳计时
//!
//! 每个 PING 带有递增的消息 ID，收到同 ID 的 PONG 时计算往返时间。

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// 未应答的心跳记录
#[derive(Debug, Default)]
pub struct PingTracker {
    last_id: u32,
    pending: BTreeMap<u32, Instant>,
    last_sent: Option<Instant>,
}

impl PingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 距上次发送是否已超过间隔
    pub fn should_ping(&self, now: Instant, interval: Duration) -> bool {
        match self.last_sent {
            Some(last) => now.saturating_duration_since(last) >= interval,
            None => true,
        }
    }

    /// 分配新的 ID 并记录发送时间
    pub fn next(&mut self, now: Instant) -> u32 {
        self.last_id = self.last_id.wrapping_add(1).max(1);
        self.pending.insert(self.last_id, now);
        self.last_sent = Some(now);
        self.last_id
    }

    /// 处理 PONG，返回往返时间
    ///
    /// 不带 ID 的 PONG 对应最早的未应答 PING。
    pub fn pong(&mut self, id: Option<u32>, now: Instant) -> Option<(u32, Duration)> {
        let id = match id {
            Some(id) => id,
            None => *self.pending.keys().next()?,
        };
        let sent = self.pending.remove(&id)?;
        Some((id, now.saturating_duration_since(sent)))
    }

    /// 是否有超时未应答的 PING
    pub fn overdue(&self, now: Instant, timeout: Duration) -> Option<u32> {
        self.pending
            .iter()
            .find(|(_, sent)| now.saturating_duration_since(**sent) > timeout)
            .map(|(id, _)| *id)
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
        self.last_sent = None;
    }
}
