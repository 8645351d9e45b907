use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lobby_client::{ChatKind, LobbyClient, LobbyConfig, LobbyEvent, LobbyServer};
use unitsync::UnitSyncLib;

/// Spring 大厅命令行客户端
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// 服务器地址
    #[arg(long)]
    host: Option<String>,
    /// 服务器端口
    #[arg(long)]
    port: Option<u16>,
    #[arg(short, long)]
    nick: Option<String>,
    /// 明文或已哈希的密码
    #[arg(short, long)]
    password: Option<String>,
    /// 登录后加入的频道，可重复
    #[arg(short, long = "channel")]
    channels: Vec<String>,
    /// 配置文件路径
    #[arg(long)]
    config: Option<PathBuf>,
    /// unitsync 动态库路径
    #[arg(long)]
    unitsync: Option<PathBuf>,
    /// 注册新账号后退出
    #[arg(long)]
    register: bool,
    /// 保存合并后的配置
    #[arg(long)]
    save: bool,
}

fn load_config(args: &Args) -> Result<LobbyConfig> {
    let mut config = match &args.config {
        Some(path) => LobbyConfig::load_from(path)?,
        None => LobbyConfig::load(),
    };

    if let Some(host) = &args.host {
        config.server.host = host.clone();
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(nick) = &args.nick {
        config.nick = nick.clone();
    }
    if let Some(password) = &args.password {
        config.set_password(password);
    }
    if !args.channels.is_empty() {
        config.autojoin = args
            .channels
            .iter()
            .map(|c| c.trim_start_matches('#').to_string())
            .collect();
    }
    if let Some(path) = &args.unitsync {
        config.unitsync_path = Some(path.clone());
    }
    Ok(config)
}

fn load_unitsync(config: &LobbyConfig) -> Option<UnitSyncLib> {
    let path = config.unitsync_path.as_ref()?;
    let lib = UnitSyncLib::new();
    if let Err(e) = lib.load(path, config.spring_config.as_deref()) {
        warn!("Failed to load unitsync from {}: {}", path.display(), e);
        return None;
    }
    match (lib.spring_version(), lib.map_count(), lib.primary_mod_count()) {
        (Ok(version), Ok(maps), Ok(mods)) => {
            info!("unitsync: spring {}, {} maps, {} games", version, maps, mods)
        }
        (Err(e), ..) | (_, Err(e), _) | (.., Err(e)) => warn!("unitsync query failed: {}", e),
    }
    Some(lib)
}

/// 在终端打印事件，返回 true 表示应退出
fn print_event(client: &LobbyClient, config: &LobbyConfig, active: &mut Option<String>, event: LobbyEvent) -> bool {
    match event {
        LobbyEvent::Connected { server_version, spring_version, .. } => {
            println!("* connected, server {} (spring {})", server_version, spring_version);
        }
        LobbyEvent::Disconnected { reason } => {
            println!("* disconnected: {}", reason);
            return true;
        }
        LobbyEvent::LoggedIn { nick } => println!("* logged in as {}", nick),
        LobbyEvent::LoginFailed { reason } => println!("* login failed: {}", reason),
        LobbyEvent::Agreement { text } => {
            println!("{}", text);
            println!("* type /accept to accept the agreement");
        }
        LobbyEvent::Motd { line } => println!("MOTD: {}", line),
        LobbyEvent::LoginInfoEnd => {
            for channel in &config.autojoin {
                if let Err(e) = client.join_channel(channel, None) {
                    warn!("Autojoin {} failed: {}", channel, e);
                }
            }
        }
        LobbyEvent::PingTimeout { id } => println!("* ping {} timed out", id),
        LobbyEvent::ChannelJoined { channel } => {
            println!("* joined #{}", channel);
            *active = Some(channel);
        }
        LobbyEvent::ChannelJoinFailed { channel, reason } => {
            println!("* cannot join #{}: {}", channel, reason)
        }
        LobbyEvent::ChannelLeft { channel, .. } => {
            println!("* left #{}", channel);
            if active.as_deref() == Some(channel.as_str()) {
                *active = None;
            }
        }
        LobbyEvent::ChannelTopic { channel, author, topic } => {
            println!("#{} topic by {}: {}", channel, author, topic)
        }
        LobbyEvent::ChannelListEntry { channel, users, topic } => {
            println!("#{:<20} {:>4}  {}", channel, users, topic)
        }
        LobbyEvent::ChannelSaid { channel, nick, message, kind } => match kind {
            ChatKind::Normal => println!("#{} <{}> {}", channel, nick, message),
            ChatKind::Action => println!("#{} * {} {}", channel, nick, message),
        },
        LobbyEvent::ChannelMessage { channel, message } => println!("#{} {}", channel, message),
        LobbyEvent::PrivateSaid { nick, message, kind } => match kind {
            ChatKind::Normal => println!("[{}] {}", nick, message),
            ChatKind::Action => println!("[{}] * {} {}", nick, nick, message),
        },
        LobbyEvent::Ring { nick } => println!("* {} is ringing you", nick),
        LobbyEvent::BattleSaid { nick, message, .. } => println!("(battle) <{}> {}", nick, message),
        LobbyEvent::BattleJoined { id, hosted } => {
            println!("* joined battle {}{}", id, if hosted { " as host" } else { "" })
        }
        LobbyEvent::BattleJoinFailed { reason } => println!("* cannot join battle: {}", reason),
        LobbyEvent::BattleHostFailed { reason } => println!("* cannot host battle: {}", reason),
        LobbyEvent::ServerMessage { message } => println!("SERVER: {}", message),
        LobbyEvent::ServerMessageBox { message, url } => match url {
            Some(url) => println!("SERVER: {} ({})", message, url),
            None => println!("SERVER: {}", message),
        },
        other => tracing::trace!("{:?}", other),
    }
    false
}

/// 处理一行终端输入，返回 true 表示应退出
fn handle_input(client: &LobbyClient, active: &Option<String>, line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }

    let result = match line {
        "/quit" => return true,
        "/accept" => client.accept_agreement().map(|_| true),
        _ if line.starts_with("/me ") => match active {
            Some(channel) => client.do_action_channel(channel, &line[4..]).map(|_| true),
            None => Ok(false),
        },
        _ => client.execute_say_command(line),
    };

    match result {
        Ok(true) => {}
        Ok(false) if line.starts_with('/') => println!("* unknown command: {}", line),
        Ok(false) => match active {
            Some(channel) => {
                if let Err(e) = client.say_channel(channel, line) {
                    println!("* {}", e);
                }
            }
            None => println!("* not in a channel, use /join <channel>"),
        },
        Err(e) => println!("* {}", e),
    }
    false
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("lobby_client=debug".parse()?))
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;
    if args.save {
        config.save()?;
    }

    let _unitsync = load_unitsync(&config);

    let (client, mut events) = LobbyClient::new();
    client.set_keepalive_interval(config.keepalive());

    let addr = config.server.addr();
    if args.register {
        let password = args.password.as_deref().context("--register requires --password")?;
        client.register(&addr, &config.nick, password).await?;
        println!("* account {} registered", config.nick);
        return Ok(());
    }

    info!("Spring 大厅客户端启动中...");
    client
        .connect(&config.server_name, &addr)
        .await
        .with_context(|| format!("无法连接服务器 {}", addr))?;
    client.login(&config.nick, &config.password_hash)?;

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut active: Option<String> = None;

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                if print_event(&client, &config, &mut active, event) {
                    break;
                }
            }
            line = stdin.next_line(), if stdin_open => {
                let quit = match line? {
                    Some(line) => handle_input(&client, &active, &line),
                    None => {
                        stdin_open = false;
                        true
                    }
                };
                // 未登录时直接断开
                if quit && client.logout().is_err() && client.disconnect().is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                let _ = client.logout();
                break;
            }
        }
    }

    Ok(())
}
