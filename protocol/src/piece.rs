//! 棋子定义

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::HiveError;
use crate::hex::Hex;

/// 阵营
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Color {
    /// 先手（白方）
    White,
    /// 后手（黑方）
    Black,
}

impl Color {
    /// 获取对方阵营
    pub fn opponent(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// 获取线协议字符
    pub fn to_char(&self) -> char {
        match self {
            Color::White => 'w',
            Color::Black => 'b',
        }
    }

    /// 从线协议字符解析
    pub fn from_char(c: char) -> Option<Color> {
        match c {
            'w' => Some(Color::White),
            'b' => Some(Color::Black),
            _ => None,
        }
    }
}

/// 子种
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BugType {
    /// 蜂后（每方唯一，身份串不带序号）
    Queen,
    /// 蚂蚁
    Ant,
    /// 甲虫（唯一允许叠子的子种）
    Beetle,
    /// 蚱蜢
    Grasshopper,
    /// 蜘蛛
    Spider,
    /// 蚊子
    Mosquito,
}

impl BugType {
    /// 获取线协议字符
    pub fn to_char(&self) -> char {
        match self {
            BugType::Queen => 'Q',
            BugType::Ant => 'A',
            BugType::Beetle => 'B',
            BugType::Grasshopper => 'G',
            BugType::Spider => 'S',
            BugType::Mosquito => 'M',
        }
    }

    /// 从线协议字符解析
    pub fn from_char(c: char) -> Option<BugType> {
        match c {
            'Q' => Some(BugType::Queen),
            'A' => Some(BugType::Ant),
            'B' => Some(BugType::Beetle),
            'G' => Some(BugType::Grasshopper),
            'S' => Some(BugType::Spider),
            'M' => Some(BugType::Mosquito),
            _ => None,
        }
    }

    /// 每方拥有的数量
    pub fn count_per_color(&self) -> u8 {
        match self {
            BugType::Queen => 1,
            BugType::Ant => 3,
            BugType::Beetle => 2,
            BugType::Grasshopper => 3,
            BugType::Spider => 2,
            BugType::Mosquito => 1,
        }
    }

    /// 身份串是否携带序号（仅蜂后不带）
    pub fn has_ordinal(&self) -> bool {
        !matches!(self, BugType::Queen)
    }

    /// 是否允许落在已被占据的格子上
    pub fn can_stack(&self) -> bool {
        matches!(self, BugType::Beetle)
    }
}

/// 棋子身份：阵营 + 子种 + 落子序号
///
/// 序号由落子的先后顺序决定，一经分配永不变更，
/// 文本形式即协议中的身份串（如 "wQ"、"bA2"）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PieceId {
    pub color: Color,
    pub bug: BugType,
    /// 蜂后为 None，其余子种为 1 起的正整数
    pub ordinal: Option<u8>,
}

impl PieceId {
    /// 创建身份
    pub fn new(color: Color, bug: BugType, ordinal: Option<u8>) -> Self {
        Self {
            color,
            bug,
            ordinal,
        }
    }
}

impl std::fmt::Display for PieceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.color.to_char(), self.bug.to_char())?;
        if let Some(n) = self.ordinal {
            write!(f, "{}", n)?;
        }
        Ok(())
    }
}

impl FromStr for PieceId {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || HiveError::MalformedNotation {
            text: s.to_string(),
        };

        let mut chars = s.chars();
        let color = chars.next().and_then(Color::from_char).ok_or_else(malformed)?;
        let bug = chars.next().and_then(BugType::from_char).ok_or_else(malformed)?;

        let rest: String = chars.collect();
        let ordinal = if rest.is_empty() {
            None
        } else {
            Some(rest.parse::<u8>().map_err(|_| malformed())?)
        };

        // 序号与子种必须匹配：蜂后无序号，其余子种序号在 1..=数量 内
        match ordinal {
            None if bug.has_ordinal() => return Err(malformed()),
            Some(_) if !bug.has_ordinal() => return Err(malformed()),
            Some(n) if n == 0 || n > bug.count_per_color() => return Err(malformed()),
            _ => {}
        }

        Ok(PieceId::new(color, bug, ordinal))
    }
}

/// 已登记的棋子
///
/// 身份一经登记不可变；位置和叠放深度随落子 / 移动而更新。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub id: PieceId,
    /// 当前坐标
    pub position: Hex,
    /// 叠放深度，0 表示直接落在桌面上
    pub stack_depth: u8,
    /// 登记时的走法序号
    pub placed_seq: u32,
}
