//! 引擎桥常量定义

use std::time::Duration;

/// 单条命令的超时（秒）- 超过即强制判败并放行下一条
pub const COMMAND_TIMEOUT_SECS: u64 = 30;

/// 建立连接的超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 响应行最大长度
pub const MAX_LINE_LEN: usize = 4096;

/// 健康检查间隔（秒）
pub const HEALTH_CHECK_INTERVAL_SECS: u64 = 10;

/// 重连尝试上限
pub const MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// 重连退避基数（毫秒），每次失败翻倍
pub const BACKOFF_BASE_MS: u64 = 500;

/// 重连退避上限（毫秒）
pub const BACKOFF_MAX_MS: u64 = 30_000;

/// 连接稳定多久后重置重连计数（秒）
pub const STABLE_CONNECTION_SECS: u64 = 60;

/// 引擎连续拒绝对局字符串多少次后放弃
pub const MAX_REJECTED_GAME_STATES: u32 = 3;

/// 引擎原样重复同一走法多少次后放弃
pub const MAX_REPEATED_SUGGESTIONS: u32 = 2;

/// 同一走法字符串累计无效多少次后放弃
pub const MAX_INVALID_SUGGESTIONS: u32 = 3;

/// 响应终止行
pub const RESPONSE_OK: &str = "ok";

/// 错误终止行前缀
pub const ERROR_PREFIX: &str = "err";

/// 丢弃迟到响应行时的单次等待窗口（毫秒）
pub const STALE_DRAIN_WINDOW_MS: u64 = 50;

/// 一次最多丢弃的迟到响应行数
pub const MAX_STALE_LINES: usize = 64;

/// 命令超时 Duration
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(COMMAND_TIMEOUT_SECS);

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);

/// 健康检查间隔 Duration
pub const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS);

/// 连接稳定期 Duration
pub const STABLE_CONNECTION_PERIOD: Duration = Duration::from_secs(STABLE_CONNECTION_SECS);
