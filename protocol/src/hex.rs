//! 六边形坐标模型
//!
//! 轴向坐标 (q, r)。六个相邻方向按顺时针固定编号 0-5，
//! 相反方向的编号相差 3（模 6）。编码器和解码器必须共用这一张方向表，
//! 表不一致会产生几何上错误但语法上合法的记谱。

use serde::{Deserialize, Serialize};

use crate::constants::DIRECTION_COUNT;

/// 轴向坐标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Hex {
    pub q: i32,
    pub r: i32,
}

/// 相邻方向（顺时针，从东北开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    NorthEast,
    East,
    SouthEast,
    SouthWest,
    West,
    NorthWest,
}

/// 各方向的单位偏移，按 Direction 编号排列
const DIRECTION_OFFSETS: [(i32, i32); DIRECTION_COUNT] = [
    (1, -1), // NorthEast
    (1, 0),  // East
    (0, 1),  // SouthEast
    (-1, 1), // SouthWest
    (-1, 0), // West
    (0, -1), // NorthWest
];

impl Direction {
    /// 全部方向，按编号顺序
    pub const ALL: [Direction; DIRECTION_COUNT] = [
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// 方向编号（0-5）
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// 从编号构造方向
    pub fn from_index(index: usize) -> Option<Direction> {
        Direction::ALL.get(index).copied()
    }

    /// 相反方向（编号相差 3）
    pub fn opposite(&self) -> Direction {
        Direction::ALL[(self.index() + 3) % DIRECTION_COUNT]
    }

    /// 该方向的单位偏移
    pub fn offset(&self) -> (i32, i32) {
        DIRECTION_OFFSETS[self.index()]
    }
}

impl Hex {
    /// 创建坐标
    pub const fn new(q: i32, r: i32) -> Self {
        Self { q, r }
    }

    /// 整个对局的起始格（首子落点）
    pub const ORIGIN: Hex = Hex::new(0, 0);

    /// 指定方向上的相邻格
    pub fn neighbor(&self, direction: Direction) -> Hex {
        let (dq, dr) = direction.offset();
        Hex::new(self.q + dq, self.r + dr)
    }

    /// 全部六个相邻格，按方向编号排列
    pub fn neighbors(&self) -> [Hex; DIRECTION_COUNT] {
        let mut out = [*self; DIRECTION_COUNT];
        for (i, dir) in Direction::ALL.iter().enumerate() {
            out[i] = self.neighbor(*dir);
        }
        out
    }

    /// 两格是否相邻
    pub fn is_adjacent(&self, other: Hex) -> bool {
        self.direction_to(other).is_some()
    }

    /// 从 self 指向 other 的方向；不相邻时返回 None
    pub fn direction_to(&self, other: Hex) -> Option<Direction> {
        let (dq, dr) = (other.q - self.q, other.r - self.r);
        Direction::ALL
            .iter()
            .copied()
            .find(|dir| dir.offset() == (dq, dr))
    }

    /// 轴向坐标距离
    pub fn distance(&self, other: Hex) -> u32 {
        let dq = self.q - other.q;
        let dr = self.r - other.r;
        ((dq.abs() + dr.abs() + (dq + dr).abs()) / 2) as u32
    }
}

impl std::fmt::Display for Hex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.q, self.r)
    }
}
