//! 传输层抽象
//!
//! 提供 Connector/Connection/Listener traits 使上层会话与具体传输实现解耦，
//! 线上格式为以换行结尾的文本行。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::command::CommandLine;
use crate::error::{ProtocolError, Result};
use crate::{CONNECT_TIMEOUT, DEFAULT_PORT, MAX_LINE_LEN};

/// 网络配置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
}

impl NetworkConfig {
    /// `host:port` 形式的地址
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: "lobby.springrts.com".to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// 连接抽象 trait（核心抽象，用于会话层）
#[async_trait]
pub trait Connection: Send + Sync {
    /// 发送一行
    async fn send(&mut self, line: &CommandLine) -> Result<()>;

    /// 接收一行
    async fn recv(&mut self) -> Result<CommandLine>;

    /// 关闭连接
    async fn close(&mut self) -> Result<()>;

    /// 获取远端地址
    fn peer_addr(&self) -> Option<String>;
}

/// 连接器 trait（客户端使用）
#[async_trait]
pub trait Connector: Send + Sync {
    type Conn: Connection;

    /// 建立连接
    async fn connect(&self, addr: &str) -> Result<Self::Conn>;
}

/// 监听器 trait（服务端与测试使用）
#[async_trait]
pub trait Listener: Send + Sync + Sized {
    type Conn: Connection;

    /// 绑定地址
    async fn bind(addr: &str) -> Result<Self>;

    /// 接受连接
    async fn accept(&mut self) -> Result<Self::Conn>;

    /// 获取本地地址
    fn local_addr(&self) -> Option<String>;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 连接器
pub struct TcpConnector;

#[async_trait]
impl Connector for TcpConnector {
    type Conn = TcpConnection;

    async fn connect(&self, addr: &str) -> Result<Self::Conn> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
            .map_err(ProtocolError::Io)?;

        TcpConnection::from_stream(stream)
    }
}

/// TCP 连接
pub struct TcpConnection {
    reader: LineReader<OwnedReadHalf>,
    writer: LineWriter<OwnedWriteHalf>,
    peer_addr: Option<String>,
}

impl TcpConnection {
    /// 从 TcpStream 创建
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());
        let (read_half, write_half) = stream.into_split();

        Ok(Self {
            reader: LineReader::new(read_half),
            writer: LineWriter::new(write_half),
            peer_addr,
        })
    }

    /// 分离读写端
    pub fn split(self) -> (LineReader<OwnedReadHalf>, LineWriter<OwnedWriteHalf>) {
        (self.reader, self.writer)
    }
}

#[async_trait]
impl Connection for TcpConnection {
    async fn send(&mut self, line: &CommandLine) -> Result<()> {
        self.writer.write_line(line).await
    }

    async fn recv(&mut self) -> Result<CommandLine> {
        self.reader.read_line().await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await
    }

    fn peer_addr(&self) -> Option<String> {
        self.peer_addr.clone()
    }
}

/// TCP 监听器
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

#[async_trait]
impl Listener for TcpListener {
    type Conn = TcpConnection;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(ProtocolError::Io)?;
        Ok(Self { listener })
    }

    async fn accept(&mut self) -> Result<Self::Conn> {
        let (stream, _addr) = self.listener.accept().await.map_err(ProtocolError::Io)?;
        TcpConnection::from_stream(stream)
    }

    fn local_addr(&self) -> Option<String> {
        self.listener.local_addr().ok().map(|a| a.to_string())
    }
}

// ============================================================================
// 行编解码
// ============================================================================

/// 行读取器
pub struct LineReader<R> {
    reader: BufReader<R>,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    /// 创建新的行读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: Vec::with_capacity(1024),
        }
    }

    /// 读取一行原始文本（不含行尾）
    ///
    /// 空行被跳过，非 UTF-8 字节替换为 U+FFFD。`MAX_LINE_LEN` 不含行尾。
    pub async fn read_raw(&mut self) -> Result<String> {
        loop {
            self.buffer.clear();
            let mut limited = (&mut self.reader).take(MAX_LINE_LEN as u64 + 2);
            let n = limited.read_until(b'\n', &mut self.buffer).await?;
            if n == 0 {
                return Err(ProtocolError::ConnectionClosed);
            }

            let mut content = self.buffer.as_slice();
            if let Some(rest) = content.strip_suffix(b"\n") {
                content = rest.strip_suffix(b"\r").unwrap_or(rest);
            }
            if content.len() > MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong {
                    size: content.len(),
                    max: MAX_LINE_LEN,
                });
            }

            let text = String::from_utf8_lossy(content);
            if !text.trim().is_empty() {
                tracing::trace!("<< {}", text);
                return Ok(text.into_owned());
            }
        }
    }

    /// 读取并拆分一行命令
    ///
    /// 无法拆分的行记录警告后跳过，只有 I/O 错误、连接关闭和超长行会返回错误。
    pub async fn read_line(&mut self) -> Result<CommandLine> {
        loop {
            let raw = self.read_raw().await?;
            match CommandLine::parse(&raw) {
                Ok(line) => return Ok(line),
                Err(e) => tracing::warn!("Skipping malformed line {:?}: {}", raw, e),
            }
        }
    }
}

/// 行写入器
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin + Send> LineWriter<W> {
    /// 创建新的行写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 写入一行原始文本
    pub async fn write_raw(&mut self, line: &str) -> Result<()> {
        if line.len() > MAX_LINE_LEN {
            return Err(ProtocolError::LineTooLong {
                size: line.len(),
                max: MAX_LINE_LEN,
            });
        }

        tracing::trace!(">> {}", line);
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// 编码并写入一行命令
    pub async fn write_line(&mut self, line: &CommandLine) -> Result<()> {
        self.write_raw(&line.to_string()).await
    }

    /// 关闭写端
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ClientCommand, ServerMessage};

    #[tokio::test]
    async fn test_tcp_connection() {
        // 启动监听
        let mut listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // 客户端连接
        let client_handle = tokio::spawn(async move {
            let connector = TcpConnector;
            let mut conn = connector.connect(&addr).await.unwrap();

            conn.send(&ClientCommand::Ping.to_line().with_id(7)).await.unwrap();

            let line = conn.recv().await.unwrap();
            assert_eq!(line.id, Some(7));
            assert_eq!(ServerMessage::parse(&line).unwrap(), ServerMessage::Pong);
        });

        // 服务端接受连接
        let mut conn = listener.accept().await.unwrap();

        let line = conn.recv().await.unwrap();
        assert_eq!(line.command, "PING");
        assert_eq!(line.id, Some(7));

        conn.send(&CommandLine::new("PONG", "").with_id(7)).await.unwrap();

        client_handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_line_reader_skips_blank_and_strips_cr() {
        let data: &[u8] = b"\r\n\nMOTD hello world\r\nLOGININFOEND\n";
        let mut reader = LineReader::new(data);
        let first = reader.read_line().await.unwrap();
        assert_eq!(first.command, "MOTD");
        assert_eq!(first.params, "hello world");
        assert_eq!(reader.read_line().await.unwrap().command, "LOGININFOEND");
        assert!(matches!(reader.read_line().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_line_reader_rejects_oversize() {
        let mut data = vec![b'A'; MAX_LINE_LEN + 10];
        data.push(b'\n');
        let mut reader = LineReader::new(data.as_slice());
        assert!(matches!(
            reader.read_line().await,
            Err(ProtocolError::LineTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn test_line_reader_replaces_invalid_utf8() {
        let data: &[u8] = b"SERVERMSG caf\xe9\nMOTD still here\n";
        let mut reader = LineReader::new(data);
        let first = reader.read_line().await.unwrap();
        assert_eq!(first.command, "SERVERMSG");
        assert_eq!(first.params, "caf\u{FFFD}");
        assert_eq!(reader.read_line().await.unwrap().params, "still here");
    }

    #[tokio::test]
    async fn test_line_reader_skips_malformed_id() {
        let data: &[u8] = b"#x PONG\n#3 PONG\n";
        let mut reader = LineReader::new(data);
        let line = reader.read_line().await.unwrap();
        assert_eq!(line.command, "PONG");
        assert_eq!(line.id, Some(3));
        assert!(matches!(reader.read_line().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_line_limit_excludes_terminator() {
        let mut data = vec![b'A'; MAX_LINE_LEN];
        data.extend_from_slice(b"\r\n");
        let mut reader = LineReader::new(data.as_slice());
        assert_eq!(reader.read_raw().await.unwrap().len(), MAX_LINE_LEN);

        let mut out = Vec::new();
        let mut writer = LineWriter::new(&mut out);
        writer.write_raw(&"B".repeat(MAX_LINE_LEN)).await.unwrap();
        assert!(matches!(
            writer.write_raw(&"B".repeat(MAX_LINE_LEN + 1)).await,
            Err(ProtocolError::LineTooLong { .. })
        ));
    }

    #[tokio::test]
    async fn test_line_writer_appends_newline() {
        let mut out = Vec::new();
        {
            let mut writer = LineWriter::new(&mut out);
            writer.write_line(&CommandLine::new("SAY", "main hi")).await.unwrap();
        }
        assert_eq!(out, b"SAY main hi\n");
    }
}
