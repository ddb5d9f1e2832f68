//! 协议常量定义

/// 相邻方向数量
pub const DIRECTION_COUNT: usize = 6;

/// 每方棋子总数（Q1 + A3 + B2 + G3 + S2 + M1）
pub const PIECES_PER_COLOR: usize = 12;

/// 单条走法记谱的最大长度（超过即视为畸形输入）
pub const MAX_NOTATION_LEN: usize = 16;

/// 对局字符串各段之间的分隔符
pub const GAME_STRING_SEPARATOR: char = ';';

/// 弃权走法在协议中的字面量
pub const PASS_MOVE: &str = "pass";
