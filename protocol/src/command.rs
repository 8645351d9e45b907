//! 命令行编解码
//!
//! 大厅协议每行一条命令: `[#<id> ]COMMAND [参数...]`。
//! 普通参数以空格分隔，"句子"参数可包含空格，以制表符分隔。

use std::fmt;
use std::str::FromStr;

use crate::error::{ProtocolError, Result};
use crate::MAX_NICKNAME_LEN;

/// 一条已拆分的命令行
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// 可选消息 ID
    pub id: Option<u32>,
    /// 命令名（大写）
    pub command: String,
    /// 命令名之后的全部参数
    pub params: String,
}

impl CommandLine {
    pub fn new(command: impl Into<String>, params: impl Into<String>) -> Self {
        Self {
            id: None,
            command: command.into(),
            params: params.into(),
        }
    }

    /// 附加消息 ID
    pub fn with_id(mut self, id: u32) -> Self {
        self.id = Some(id);
        self
    }

    /// 解析一行文本
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut rest = line.trim_start_matches(' ');

        let mut id = None;
        if let Some(stripped) = rest.strip_prefix('#') {
            let (id_str, tail) = stripped.split_once(' ').unwrap_or((stripped, ""));
            let parsed = id_str
                .parse::<u32>()
                .map_err(|_| ProtocolError::malformed(id_str, "invalid message id"))?;
            id = Some(parsed);
            rest = tail.trim_start_matches(' ');
        }

        let (command, params) = rest.split_once(' ').unwrap_or((rest, ""));
        if command.is_empty() {
            return Err(ProtocolError::EmptyLine);
        }

        Ok(Self {
            id,
            command: command.to_string(),
            params: params.to_string(),
        })
    }

    /// 参数游标
    pub fn params(&self) -> Params<'_> {
        Params::new(&self.command, &self.params)
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(id) = self.id {
            write!(f, "#{} ", id)?;
        }
        f.write_str(&self.command)?;
        if !self.params.is_empty() {
            write!(f, " {}", self.params)?;
        }
        Ok(())
    }
}

/// 参数读取游标
pub struct Params<'a> {
    command: &'a str,
    rest: &'a str,
}

impl<'a> Params<'a> {
    pub fn new(command: &'a str, params: &'a str) -> Self {
        Self { command, rest: params }
    }

    /// 读取下一个以空格分隔的单词
    pub fn word(&mut self) -> Result<&'a str> {
        self.next_word()
            .ok_or_else(|| ProtocolError::malformed(self.command, "missing parameter"))
    }

    /// 读取下一个单词（可缺省）
    pub fn next_word(&mut self) -> Option<&'a str> {
        let rest = self.rest.trim_start_matches(' ');
        if rest.is_empty() {
            self.rest = rest;
            return None;
        }
        let (word, tail) = rest.split_once(' ').unwrap_or((rest, ""));
        self.rest = tail;
        Some(word)
    }

    /// 读取并解析为整数
    pub fn int<T: FromStr>(&mut self) -> Result<T> {
        let command = self.command;
        let word = self.word()?;
        word.parse::<T>()
            .map_err(|_| ProtocolError::malformed(command, format!("expected number, got {:?}", word)))
    }

    /// 读取布尔值（"0" / "1"）
    pub fn flag(&mut self) -> Result<bool> {
        Ok(self.int::<u32>()? != 0)
    }

    /// 读取下一个以制表符分隔的句子（可含空格）
    pub fn sentence(&mut self) -> &'a str {
        let rest = self.rest;
        let (sentence, tail) = rest.split_once('\t').unwrap_or((rest, ""));
        self.rest = tail;
        sentence
    }

    /// 剩余全部内容
    pub fn rest(&mut self) -> &'a str {
        std::mem::take(&mut self.rest)
    }

    /// 是否已读完
    pub fn is_empty(&self) -> bool {
        self.rest.trim().is_empty()
    }
}

/// 验证昵称
pub fn validate_nickname(nickname: &str) -> Result<()> {
    if nickname.is_empty() {
        return Err(ProtocolError::NicknameEmpty);
    }
    let len = nickname.chars().count();
    if len > MAX_NICKNAME_LEN {
        return Err(ProtocolError::NicknameTooLong { len, max: MAX_NICKNAME_LEN });
    }
    if let Some(c) = nickname
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '[' | ']')))
    {
        return Err(ProtocolError::NicknameInvalidChar(c));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let line = CommandLine::parse("SAID main alice hello there\r\n").unwrap();
        assert_eq!(line.id, None);
        assert_eq!(line.command, "SAID");
        assert_eq!(line.params, "main alice hello there");
    }

    #[test]
    fn test_parse_with_id() {
        let line = CommandLine::parse("#42 PONG").unwrap();
        assert_eq!(line.id, Some(42));
        assert_eq!(line.command, "PONG");
        assert!(line.params.is_empty());
        assert_eq!(line.to_string(), "#42 PONG");
    }

    #[test]
    fn test_parse_bad_id() {
        assert!(matches!(
            CommandLine::parse("#x PONG"),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(CommandLine::parse("   "), Err(ProtocolError::EmptyLine)));
    }

    #[test]
    fn test_params_words_and_sentences() {
        let line = CommandLine::parse("BATTLEOPENED 7 0 0 bob 1.2.3.4 8452 16 0 0 123 Tabula v4\tmy game\tZero-K v1").unwrap();
        let mut p = line.params();
        assert_eq!(p.int::<u32>().unwrap(), 7);
        assert!(!p.flag().unwrap());
        assert_eq!(p.int::<u32>().unwrap(), 0);
        assert_eq!(p.word().unwrap(), "bob");
        assert_eq!(p.word().unwrap(), "1.2.3.4");
        assert_eq!(p.int::<u16>().unwrap(), 8452);
        assert_eq!(p.int::<u32>().unwrap(), 16);
        assert!(!p.flag().unwrap());
        assert_eq!(p.int::<u32>().unwrap(), 0);
        assert_eq!(p.int::<i64>().unwrap(), 123);
        assert_eq!(p.sentence(), "Tabula v4");
        assert_eq!(p.sentence(), "my game");
        assert_eq!(p.sentence(), "Zero-K v1");
        assert!(p.is_empty());
    }

    #[test]
    fn test_params_missing() {
        let line = CommandLine::parse("ACCEPTED").unwrap();
        let mut p = line.params();
        assert!(p.next_word().is_none());
        assert!(matches!(p.word(), Err(ProtocolError::Malformed { .. })));
    }

    #[test]
    fn test_validate_nickname() {
        assert!(validate_nickname("[Clan]Player_1").is_ok());
        assert!(matches!(validate_nickname(""), Err(ProtocolError::NicknameEmpty)));
        assert!(matches!(
            validate_nickname(&"a".repeat(21)),
            Err(ProtocolError::NicknameTooLong { len: 21, .. })
        ));
        assert!(matches!(
            validate_nickname("bad nick"),
            Err(ProtocolError::NicknameInvalidChar(' '))
        ));
    }
}
