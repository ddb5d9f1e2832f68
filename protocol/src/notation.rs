//! 走法记谱编解码
//!
//! 走法以参照子相对位置表示：`<动子> <参照子><符号>` 或 `<动子> <符号><参照子>`，
//! 符号在参照子之后表示方向编号 0-2，之前表示 3-5；不带符号的
//! `<动子> <参照子>` 表示叠放在参照子上方。整局第一手只写动子身份串。
//!
//! 方向与符号的对应关系只有下面一张表，编码和解码必须逐字共用，
//! 两边不一致会产生几何上错误但语法上合法的记谱。

use crate::constants::{DIRECTION_COUNT, MAX_NOTATION_LEN};
use crate::error::{HiveError, Result};
use crate::hex::{Direction, Hex};
use crate::piece::PieceId;
use crate::registry::PlacementRegistry;

/// 一次棋盘变动
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// 新落子
    Place { id: PieceId, at: Hex },
    /// 移动已落的棋子
    Relocate { id: PieceId, from: Hex, to: Hex },
}

impl Mutation {
    /// 动子身份
    pub fn id(&self) -> PieceId {
        match self {
            Mutation::Place { id, .. } => *id,
            Mutation::Relocate { id, .. } => *id,
        }
    }

    /// 落点坐标
    pub fn destination(&self) -> Hex {
        match self {
            Mutation::Place { at, .. } => *at,
            Mutation::Relocate { to, .. } => *to,
        }
    }

    /// 是否为新落子
    pub fn is_placement(&self) -> bool {
        matches!(self, Mutation::Place { .. })
    }
}

/// 符号相对参照子的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GlyphSide {
    Before,
    After,
}

/// 方向编号 -> (符号, 符号位置)
const DIRECTION_GLYPHS: [(char, GlyphSide); DIRECTION_COUNT] = [
    ('/', GlyphSide::After),   // 东北
    ('-', GlyphSide::After),   // 东
    ('\\', GlyphSide::After),  // 东南
    ('/', GlyphSide::Before),  // 西南
    ('-', GlyphSide::Before),  // 西
    ('\\', GlyphSide::Before), // 西北
];

fn is_glyph(c: char) -> bool {
    matches!(c, '-' | '/' | '\\')
}

fn direction_for(glyph: char, side: GlyphSide) -> Option<Direction> {
    DIRECTION_GLYPHS
        .iter()
        .position(|&(g, s)| g == glyph && s == side)
        .and_then(Direction::from_index)
}

/// 记谱编解码器
pub struct Notation;

impl Notation {
    /// 将棋盘变动编码为记谱字符串
    ///
    /// 找不到相邻参照子时返回 `DisconnectedPlacement`，此时绝不能
    /// 退而求其次输出别的字符串，否则远端引擎的棋盘会与本地失同步。
    pub fn encode(mutation: &Mutation, registry: &PlacementRegistry) -> Result<String> {
        let mover = mutation.id();
        let dest = mutation.destination();

        if registry.is_empty() {
            // 整局第一手：裸身份串
            if mutation.is_placement() {
                return Ok(mover.to_string());
            }
            return Err(HiveError::UnknownIdentity {
                id: mover.to_string(),
            });
        }

        // 落点已被占据：叠子形式，仅对允许叠子的子种开放
        if let Some(reference) = registry.top_piece_at(dest).filter(|p| p.id != mover) {
            if !mover.bug.can_stack() {
                return Err(HiveError::StackingNotAllowed {
                    id: mover.to_string(),
                });
            }
            return Ok(format!("{} {}", mover, reference.id));
        }

        // 常规：按登记顺序找一枚与落点相邻、且在其格最上层的棋子作参照
        let reference = registry
            .pieces()
            .filter(|p| p.id != mover)
            .filter(|p| registry.is_topmost(p))
            .find(|p| p.position.is_adjacent(dest))
            .ok_or(HiveError::DisconnectedPlacement {
                q: dest.q,
                r: dest.r,
            })?;

        let direction = reference
            .position
            .direction_to(dest)
            .ok_or(HiveError::DisconnectedPlacement {
                q: dest.q,
                r: dest.r,
            })?;
        let (glyph, side) = DIRECTION_GLYPHS[direction.index()];
        Ok(match side {
            GlyphSide::After => format!("{} {}{}", mover, reference.id, glyph),
            GlyphSide::Before => format!("{} {}{}", mover, glyph, reference.id),
        })
    }

    /// 将记谱字符串解码为棋盘变动
    ///
    /// 解码不改写登记表：登记 / 位置更新在走法通过仲裁后由调用方执行。
    pub fn decode(text: &str, registry: &PlacementRegistry) -> Result<Mutation> {
        let malformed = || HiveError::MalformedNotation {
            text: text.to_string(),
        };

        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_NOTATION_LEN {
            return Err(malformed());
        }

        let mut parts = trimmed.split(' ');
        let mover_text = parts.next().ok_or_else(malformed)?;
        let dest_text = parts.next();
        if parts.next().is_some() {
            return Err(malformed());
        }

        let mover: PieceId = mover_text.parse().map_err(|_| malformed())?;

        let Some(dest_text) = dest_text else {
            // 裸身份串只在整局第一手合法
            if !registry.is_empty() {
                return Err(malformed());
            }
            if registry.next_id(mover.color, mover.bug) != Some(mover) {
                return Err(malformed());
            }
            return Ok(Mutation::Place {
                id: mover,
                at: Hex::ORIGIN,
            });
        };

        let (reference_text, glyph) = split_destination(dest_text).ok_or_else(malformed)?;
        let reference: PieceId = reference_text.parse().map_err(|_| malformed())?;
        let reference_piece =
            registry
                .resolve(reference)
                .map_err(|_| HiveError::UnknownReferencePiece {
                    id: reference.to_string(),
                })?;

        let destination = match glyph {
            // 不带符号：叠放在参照子上方
            None => reference_piece.position,
            Some((c, side)) => {
                let direction = direction_for(c, side).ok_or_else(malformed)?;
                reference_piece.position.neighbor(direction)
            }
        };

        match registry.resolve(mover) {
            // 已登记：移动
            Ok(piece) => Ok(Mutation::Relocate {
                id: mover,
                from: piece.position,
                to: destination,
            }),
            // 未登记：新落子。身份必须恰好是下一个待分配的，
            // 序号由登记顺序决定，绝不从字符串反推。
            Err(_) => {
                if registry.next_id(mover.color, mover.bug) != Some(mover) {
                    return Err(malformed());
                }
                Ok(Mutation::Place {
                    id: mover,
                    at: destination,
                })
            }
        }
    }
}

/// 拆出参照子身份与符号；符号只可能贴在整段开头或末尾
fn split_destination(text: &str) -> Option<(&str, Option<(char, GlyphSide)>)> {
    let first = text.chars().next()?;
    if is_glyph(first) {
        return Some((&text[1..], Some((first, GlyphSide::Before))));
    }
    let last = text.chars().last()?;
    if is_glyph(last) {
        return Some((&text[..text.len() - 1], Some((last, GlyphSide::After))));
    }
    Some((text, None))
}
