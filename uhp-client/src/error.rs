//! 错误类型定义

use thiserror::Error;

use protocol::HiveError;

/// 引擎桥错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 建立连接超时
    #[error("Connect timeout")]
    ConnectTimeout,

    /// 连接被对端关闭
    #[error("Connection closed")]
    ConnectionClosed,

    /// 连接丢失（含重连尝试耗尽）
    #[error("Connection lost")]
    ConnectionLost,

    /// 命令在限定时间内没有等到终止行
    #[error("Command timeout")]
    CommandTimeout,

    /// 响应行过长
    #[error("Response line too long: {len} bytes (max: {max})")]
    LineTooLong { len: usize, max: usize },

    /// 引擎以错误行回绝了命令
    #[error("Engine rejected command: {message}")]
    EngineRejected { message: String },

    /// 引擎退化行为越过阈值，本回合交还控制权
    #[error("Engine gave up: {reason}")]
    EngineGaveUp { reason: String },

    /// 规则 / 记谱错误
    #[error("Hive error: {0}")]
    Hive(#[from] HiveError),
}

/// 引擎桥操作结果类型
pub type Result<T> = std::result::Result<T, EngineError>;
