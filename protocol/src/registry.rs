//! 落子登记表
//!
//! 身份串只能按走法的时间顺序重放构建——序号是"何时落子"的函数，
//! 与棋子当前在哪无关，因此绝不允许从棋盘快照反推登记表。
//! 登记表采用 arena + 索引结构：棋子按登记顺序存放，身份串查索引。

use std::collections::HashMap;

use crate::error::{HiveError, Result};
use crate::hex::Hex;
use crate::notation::Mutation;
use crate::piece::{BugType, Color, Piece, PieceId};

/// 落子登记表
#[derive(Debug, Clone, Default)]
pub struct PlacementRegistry {
    /// 按登记顺序存放的棋子
    pieces: Vec<Piece>,
    /// 身份 -> arena 下标
    index: HashMap<PieceId, usize>,
    /// (阵营, 子种) -> 已落子数
    placed: HashMap<(Color, BugType), u8>,
}

impl PlacementRegistry {
    /// 创建空登记表
    pub fn new() -> Self {
        Self::default()
    }

    /// 已登记棋子数
    pub fn len(&self) -> usize {
        self.pieces.len()
    }

    /// 是否尚无任何棋子登记（即对局尚未落子）
    pub fn is_empty(&self) -> bool {
        self.pieces.is_empty()
    }

    /// 指定 (阵营, 子种) 的已落子数
    pub fn placed_count(&self, color: Color, bug: BugType) -> u8 {
        self.placed.get(&(color, bug)).copied().unwrap_or(0)
    }

    /// 下一个待分配的身份；该子种已用尽时返回 None
    pub fn next_id(&self, color: Color, bug: BugType) -> Option<PieceId> {
        let placed = self.placed_count(color, bug);
        if placed >= bug.count_per_color() {
            return None;
        }
        let ordinal = bug.has_ordinal().then_some(placed + 1);
        Some(PieceId::new(color, bug, ordinal))
    }

    /// 登记一次落子，分配下一个序号并返回身份
    ///
    /// 同一身份只会在首次落子时写入一次，之后永不重新分配。
    pub fn register_placement(
        &mut self,
        color: Color,
        bug: BugType,
        at: Hex,
        sequence: u32,
    ) -> Result<PieceId> {
        let id = self
            .next_id(color, bug)
            .ok_or_else(|| HiveError::DuplicateRegistration {
                id: format!("{}{}", color.to_char(), bug.to_char()),
            })?;
        if self.index.contains_key(&id) {
            return Err(HiveError::DuplicateRegistration { id: id.to_string() });
        }

        let piece = Piece {
            id,
            position: at,
            stack_depth: self.stack_height(at),
            placed_seq: sequence,
        };
        self.index.insert(id, self.pieces.len());
        self.pieces.push(piece);
        *self.placed.entry((color, bug)).or_insert(0) += 1;
        Ok(id)
    }

    /// 查找已登记的棋子
    ///
    /// 未登记的身份是硬错误，调用方必须让当前解码失败，而不是去猜。
    pub fn resolve(&self, id: PieceId) -> Result<&Piece> {
        self.index
            .get(&id)
            .map(|&i| &self.pieces[i])
            .ok_or_else(|| HiveError::UnknownIdentity { id: id.to_string() })
    }

    /// 更新棋子位置（棋子移动时调用），叠放深度随落点重新计算
    pub fn update_position(&mut self, id: PieceId, to: Hex) -> Result<()> {
        let i = *self
            .index
            .get(&id)
            .ok_or_else(|| HiveError::UnknownIdentity { id: id.to_string() })?;
        let depth = self
            .pieces
            .iter()
            .filter(|p| p.id != id && p.position == to)
            .count() as u8;
        self.pieces[i].position = to;
        self.pieces[i].stack_depth = depth;
        Ok(())
    }

    /// 指定格上的棋子数
    pub fn stack_height(&self, at: Hex) -> u8 {
        self.pieces.iter().filter(|p| p.position == at).count() as u8
    }

    /// 指定格最上层的棋子
    pub fn top_piece_at(&self, at: Hex) -> Option<&Piece> {
        self.pieces
            .iter()
            .filter(|p| p.position == at)
            .max_by_key(|p| p.stack_depth)
    }

    /// 棋子是否在其所在格的最上层
    pub fn is_topmost(&self, piece: &Piece) -> bool {
        !self
            .pieces
            .iter()
            .any(|p| p.position == piece.position && p.stack_depth > piece.stack_depth)
    }

    /// 按登记顺序遍历全部棋子
    pub fn pieces(&self) -> impl Iterator<Item = &Piece> {
        self.pieces.iter()
    }

    /// 应用一次变动：落子走登记路径，移动走位置更新路径
    ///
    /// 落子身份必须恰好是下一个待分配的身份，乱序登记直接报错。
    pub fn apply(&mut self, mutation: &Mutation, sequence: u32) -> Result<PieceId> {
        match mutation {
            Mutation::Place { id, at } => {
                if self.next_id(id.color, id.bug) != Some(*id) {
                    return Err(HiveError::DuplicateRegistration { id: id.to_string() });
                }
                self.register_placement(id.color, id.bug, *at, sequence)
            }
            Mutation::Relocate { id, to, .. } => {
                self.update_position(*id, *to)?;
                Ok(*id)
            }
        }
    }
}
