//! 客户端配置
//!
//! 保存在 `<config_dir>/springlobby-rs/config.json`

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use protocol::{ensure_password_hash, NetworkConfig, KEEPALIVE_INTERVAL_SECS};

/// 客户端配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// 服务器显示名称
    pub server_name: String,
    pub server: NetworkConfig,
    pub nick: String,
    /// 已哈希的密码
    pub password_hash: String,
    /// 登录后自动加入的频道
    pub autojoin: Vec<String>,
    /// 心跳间隔（秒），0 表示不发送
    pub keepalive_secs: u64,
    /// unitsync 动态库
    pub unitsync_path: Option<PathBuf>,
    /// 覆盖 Spring 的配置文件路径
    pub spring_config: Option<PathBuf>,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            server_name: "Official server".to_string(),
            server: NetworkConfig::default(),
            nick: String::new(),
            password_hash: String::new(),
            autojoin: vec!["main".to_string()],
            keepalive_secs: KEEPALIVE_INTERVAL_SECS,
            unitsync_path: None,
            spring_config: None,
        }
    }
}

impl LobbyConfig {
    /// 获取配置文件路径
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|mut path| {
            path.push("springlobby-rs");
            path.push("config.json");
            path
        })
    }

    /// 从默认位置加载，失败时使用默认配置
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            tracing::warn!("无法获取配置目录，使用默认配置");
            return Self::default();
        };

        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置");
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => {
                tracing::info!("已加载配置: {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("{:#}，使用默认配置", e);
                Self::default()
            }
        }
    }

    /// 从指定文件加载
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("配置文件格式无效 {}", path.display()))
    }

    /// 保存到默认位置
    pub fn save(&self) -> anyhow::Result<()> {
        let path = Self::config_path().context("无法获取配置目录")?;
        self.save_to(&path)
    }

    /// 保存到指定文件
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        // 确保目录存在
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("无法创建配置目录 {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self).context("序列化配置失败")?;
        std::fs::write(path, content)
            .with_context(|| format!("写入配置文件失败 {}", path.display()))?;

        tracing::info!("配置已保存: {:?}", path);
        Ok(())
    }

    /// 设置密码，明文会先哈希
    pub fn set_password(&mut self, password: &str) {
        self.password_hash = ensure_password_hash(password);
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::password_hash;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = LobbyConfig {
            nick: "alice".to_string(),
            autojoin: vec!["main".to_string(), "newbies".to_string()],
            ..Default::default()
        };
        config.set_password("secret");
        config.save_to(&path).unwrap();

        let loaded = LobbyConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.password_hash, password_hash("secret"));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "nick": "bob" }"#).unwrap();

        let loaded = LobbyConfig::load_from(&path).unwrap();
        assert_eq!(loaded.nick, "bob");
        assert_eq!(loaded.server, NetworkConfig::default());
        assert_eq!(loaded.keepalive(), Duration::from_secs(KEEPALIVE_INTERVAL_SECS));
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(LobbyConfig::load_from(&path).is_err());
    }

    #[test]
    fn test_hashed_password_kept() {
        let mut config = LobbyConfig::default();
        let hash = password_hash("secret");
        config.set_password(&hash);
        assert_eq!(config.password_hash, hash);
    }
}
