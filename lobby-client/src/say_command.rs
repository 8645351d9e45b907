//! 聊天框中的斜杠命令

use crate::error::{ClientError, Result};
use crate::session::Session;

fn missing(usage: &str) -> ClientError {
    ClientError::InvalidArgument(format!("usage: {}", usage))
}

impl Session {
    /// 执行 `/命令 参数`
    ///
    /// 返回 false 表示不是可识别的命令，应当作为普通聊天内容处理。
    pub fn execute_say_command(&mut self, input: &str) -> Result<bool> {
        let Some(input) = input.trim().strip_prefix('/') else {
            return Ok(false);
        };
        let (cmd, rest) = input.split_once(' ').unwrap_or((input, ""));
        let rest = rest.trim();
        let mut args = rest.split_whitespace();

        match cmd.to_lowercase().as_str() {
            "away" => {
                let mut status = self.my_status;
                status.away = !status.away;
                self.send_my_user_status(status)?;
            }
            "back" => {
                let mut status = self.my_status;
                status.away = false;
                self.send_my_user_status(status)?;
            }
            "ingame" => self.request_in_game_time(args.next())?,
            "ip" => self.moderator_get_ip(args.next().ok_or_else(|| missing("/ip <nick>"))?)?,
            "lastlogin" => self.moderator_get_last_login(
                args.next().ok_or_else(|| missing("/lastlogin <nick>"))?,
            )?,
            "lastip" => {
                self.moderator_get_last_ip(args.next().ok_or_else(|| missing("/lastip <nick>"))?)?
            }
            "findip" => {
                self.moderator_find_by_ip(args.next().ok_or_else(|| missing("/findip <ip>"))?)?
            }
            "kick" => {
                let (nick, reason) = rest.split_once(' ').unwrap_or((rest, ""));
                if nick.is_empty() {
                    return Err(missing("/kick <nick> [reason]"));
                }
                self.moderator_kick(nick, reason.trim())?;
            }
            "ban" => self.moderator_ban(args.next().ok_or_else(|| missing("/ban <nick>"))?, false)?,
            "banip" => {
                self.moderator_ban(args.next().ok_or_else(|| missing("/banip <nick>"))?, true)?
            }
            "unban" => self.moderator_unban(args.next().ok_or_else(|| missing("/unban <nick>"))?)?,
            "topic" => {
                let (channel, topic) = rest
                    .split_once(' ')
                    .ok_or_else(|| missing("/topic <channel> <text>"))?;
                self.moderator_set_channel_topic(channel, topic.trim())?;
            }
            "mute" => {
                let usage = "/mute <channel> <nick> <minutes> [ip]";
                let channel = args.next().ok_or_else(|| missing(usage))?;
                let nick = args.next().ok_or_else(|| missing(usage))?;
                let minutes = args
                    .next()
                    .and_then(|m| m.parse().ok())
                    .ok_or_else(|| missing(usage))?;
                let by_ip = args.next() == Some("ip");
                self.moderator_mute(channel, nick, minutes, by_ip)?;
            }
            "unmute" => {
                let usage = "/unmute <channel> <nick>";
                let channel = args.next().ok_or_else(|| missing(usage))?;
                let nick = args.next().ok_or_else(|| missing(usage))?;
                self.moderator_unmute(channel, nick)?;
            }
            "getaccess" => self.admin_get_account_access(
                args.next().ok_or_else(|| missing("/getaccess <nick>"))?,
            )?,
            "changeaccess" => {
                let usage = "/changeaccess <nick> <code>";
                let nick = args.next().ok_or_else(|| missing(usage))?;
                let code = args.next().ok_or_else(|| missing(usage))?;
                self.admin_change_account_access(nick, code)?;
            }
            "botmode" => {
                let usage = "/botmode <nick> <0|1>";
                let nick = args.next().ok_or_else(|| missing(usage))?;
                let bot = args.next().ok_or_else(|| missing(usage))? == "1";
                self.admin_set_bot_mode(nick, bot)?;
            }
            "ring" => self.ring(args.next().ok_or_else(|| missing("/ring <nick>"))?)?,
            "join" | "j" => {
                let channel = args.next().ok_or_else(|| missing("/join <channel> [key]"))?;
                self.join_channel(channel.trim_start_matches('#'), args.next())?;
            }
            "part" | "leave" => {
                let channel = args.next().ok_or_else(|| missing("/part <channel>"))?;
                self.part_channel(channel.trim_start_matches('#'))?;
            }
            "msg" => {
                let (nick, message) = rest
                    .split_once(' ')
                    .ok_or_else(|| missing("/msg <nick> <text>"))?;
                self.say_private(nick, message)?;
            }
            "channels" => self.request_channels()?,
            "raw" => {
                if rest.is_empty() {
                    return Err(missing("/raw <command>"));
                }
                self.send_raw(rest)?;
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ClientError;
    use crate::session::tests::{feed, online_session, sent};

    #[test]
    fn test_not_a_command() {
        let mut session = online_session();
        assert!(!session.execute_say_command("hello").unwrap());
        assert!(!session.execute_say_command("/dance").unwrap());
        assert!(sent(&mut session).is_empty());
    }

    #[test]
    fn test_moderation_commands() {
        let mut session = online_session();
        assert!(session.execute_say_command("/kick bob spamming lobby").unwrap());
        assert!(session.execute_say_command("/banip bob").unwrap());
        assert!(session.execute_say_command("/mute main bob 10 ip").unwrap());
        assert!(session.execute_say_command("/ip bob").unwrap());
        assert_eq!(
            sent(&mut session),
            vec![
                "KICKUSER bob spamming lobby",
                "BAN bob ip",
                "MUTE main bob 10 ip",
                "GETIP bob",
            ]
        );
    }

    #[test]
    fn test_away_toggles() {
        let mut session = online_session();
        session.execute_say_command("/away").unwrap();
        assert!(session.my_status().away);
        session.execute_say_command("/back").unwrap();
        assert!(!session.my_status().away);
        assert_eq!(sent(&mut session), vec!["MYSTATUS 2", "MYSTATUS 0"]);
    }

    #[test]
    fn test_join_and_msg() {
        let mut session = online_session();
        session.execute_say_command("/join #main").unwrap();
        feed(&mut session, "JOIN main");
        session.execute_say_command("/msg bob hello there").unwrap();
        session.execute_say_command("/part main").unwrap();
        assert_eq!(
            sent(&mut session),
            vec!["JOIN main", "SAYPRIVATE bob hello there", "LEAVE main"]
        );
    }

    #[test]
    fn test_missing_arguments() {
        let mut session = online_session();
        assert!(matches!(
            session.execute_say_command("/ip"),
            Err(ClientError::InvalidArgument(_))
        ));
        assert!(matches!(
            session.execute_say_command("/mute main bob"),
            Err(ClientError::InvalidArgument(_))
        ));
    }
}
