//! 错误类型定义

use thiserror::Error;

/// 记谱与登记表错误
///
/// 编解码失败一律向上抛出，由会话层决定重试或升级，
/// 任何一层都不得用猜测结果顶替失败的解码。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HiveError {
    /// 无法识别的记谱字符串
    #[error("Malformed notation: {text:?}")]
    MalformedNotation { text: String },

    /// 参照子未登记
    #[error("Unknown reference piece: {id}")]
    UnknownReferencePiece { id: String },

    /// 落点与已有棋子均不相邻（违反连通性）
    #[error("Disconnected placement at ({q}, {r})")]
    DisconnectedPlacement { q: i32, r: i32 },

    /// 该子种不允许叠在其他棋子上
    #[error("Stacking not allowed for {id}")]
    StackingNotAllowed { id: String },

    /// 引擎给出的走法未通过合法性检查
    #[error("Illegal engine move: {notation}")]
    IllegalEngineMove { notation: String },

    /// 重复登记（或乱序登记）同一身份
    #[error("Duplicate registration: {id}")]
    DuplicateRegistration { id: String },

    /// 查询了从未登记过的身份
    #[error("Unknown identity: {id}")]
    UnknownIdentity { id: String },

    /// 无效的对局字符串
    #[error("Invalid game string: {reason}")]
    InvalidGameString { reason: String },
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, HiveError>;
