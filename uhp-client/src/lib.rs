//! 引擎桥客户端库
//!
//! 通过文本协议与外部走法搜索引擎对话，包含:
//! - 传输层抽象 (EngineLink/LinkConnector traits, TCP 与本地进程实现)
//! - 命令通道（单命令在途 + FIFO 排队 + 终止行判定 + 超时）
//! - 会话管理（指数退避重连、健康检查、失败升级）
//! - 走法仲裁（引擎建议应用前的合法性把关）

mod arbiter;
mod channel;
mod constants;
mod error;
mod session;
mod transport;

pub use arbiter::{LegalityOracle, MoveArbiter};
pub use channel::{ChannelConfig, Command, CommandChannel, Response, SearchLimit};
pub use constants::*;
pub use error::{EngineError, Result};
pub use session::{BestMove, ConnectionState, EngineSession, SessionConfig};
pub use transport::{
    EngineEndpoint, EngineLink, LinkConnector,
    ProcessConnector, ProcessLink, TcpConnector, TcpLink,
};
