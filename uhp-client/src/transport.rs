//! 传输层抽象
//!
//! 提供 EngineLink/LinkConnector traits 使命令层与具体传输实现解耦，
//! 便于在 TCP 服务和本地引擎进程之间切换。协议按行交换 UTF-8 文本。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::process::{Child, ChildStdin, ChildStdout, Command as ProcessCommand};
use tokio::time::timeout;

use crate::constants::{CONNECT_TIMEOUT, MAX_LINE_LEN};
use crate::error::{EngineError, Result};

/// 引擎端点配置
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum EngineEndpoint {
    /// TCP 服务上的引擎
    Tcp { host: String, port: u16 },
    /// 本地引擎可执行文件
    Process { program: String, args: Vec<String> },
}

impl Default for EngineEndpoint {
    fn default() -> Self {
        EngineEndpoint::Tcp {
            host: "127.0.0.1".to_string(),
            port: 9601,
        }
    }
}

/// 连接抽象 trait（命令通道通过它收发行）
#[async_trait]
pub trait EngineLink: Send {
    /// 发送一行命令
    async fn send_line(&mut self, line: &str) -> Result<()>;

    /// 接收一行响应（已去掉行尾换行）
    async fn recv_line(&mut self) -> Result<String>;

    /// 关闭连接
    async fn close(&mut self) -> Result<()>;
}

/// 连接器 trait（会话层通过它建立 / 重建连接）
#[async_trait]
pub trait LinkConnector: Send + Sync {
    type Link: EngineLink + 'static;

    /// 建立连接
    async fn connect(&self) -> Result<Self::Link>;
}

/// 读取一行并去掉行尾换行；EOF 视为连接关闭
async fn read_trimmed_line<R>(reader: &mut R) -> Result<String>
where
    R: AsyncBufRead + Unpin + Send,
{
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(EngineError::ConnectionClosed);
    }
    if line.len() > MAX_LINE_LEN {
        return Err(EngineError::LineTooLong {
            len: line.len(),
            max: MAX_LINE_LEN,
        });
    }
    Ok(line.trim_end().to_string())
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 连接器
#[derive(Clone, Debug)]
pub struct TcpConnector {
    pub addr: String,
}

#[async_trait]
impl LinkConnector for TcpConnector {
    type Link = TcpLink;

    async fn connect(&self) -> Result<TcpLink> {
        let stream = timeout(CONNECT_TIMEOUT, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| EngineError::ConnectTimeout)?
            .map_err(EngineError::Io)?;

        stream.set_nodelay(true)?;

        let peer_addr = stream.peer_addr().ok().map(|a| a.to_string());
        let (read_half, write_half) = stream.into_split();

        tracing::info!("connected to engine at {}", self.addr);
        Ok(TcpLink {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer_addr,
        })
    }
}

/// TCP 连接
pub struct TcpLink {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer_addr: Option<String>,
}

impl TcpLink {
    /// 获取远端地址
    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }
}

#[async_trait]
impl EngineLink for TcpLink {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv_line(&mut self) -> Result<String> {
        read_trimmed_line(&mut self.reader).await
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

// ============================================================================
// 本地进程实现
// ============================================================================

/// 本地引擎进程连接器
#[derive(Clone, Debug)]
pub struct ProcessConnector {
    pub program: String,
    pub args: Vec<String>,
}

#[async_trait]
impl LinkConnector for ProcessConnector {
    type Link = ProcessLink;

    async fn connect(&self) -> Result<ProcessLink> {
        let mut child = ProcessCommand::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child.stdin.take().ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "engine stdin unavailable",
            ))
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "engine stdout unavailable",
            ))
        })?;

        tracing::info!("spawned engine process: {}", self.program);
        Ok(ProcessLink {
            child,
            stdin,
            stdout: BufReader::new(stdout),
        })
    }
}

/// 本地引擎进程连接，进程随连接销毁一并结束
pub struct ProcessLink {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

#[async_trait]
impl EngineLink for ProcessLink {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.write_all(b"\n").await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn recv_line(&mut self) -> Result<String> {
        read_trimmed_line(&mut self.stdout).await
    }

    async fn close(&mut self) -> Result<()> {
        self.child.start_kill()?;
        Ok(())
    }
}
