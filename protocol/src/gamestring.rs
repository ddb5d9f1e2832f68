//! 对局字符串
//!
//! 发给引擎开启搜索的完整对局描述：
//! `GameType;GameState;TurnColor[TurnNumber](;走法)*`

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::GAME_STRING_SEPARATOR;
use crate::error::{HiveError, Result};
use crate::piece::Color;

/// 对局类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameType {
    /// 基础子种
    Base,
    /// 基础子种 + 蚊子
    BaseM,
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GameType::Base => write!(f, "Base"),
            GameType::BaseM => write!(f, "Base+M"),
        }
    }
}

impl FromStr for GameType {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Base" => Ok(GameType::Base),
            "Base+M" => Ok(GameType::BaseM),
            _ => Err(HiveError::InvalidGameString {
                reason: format!("unknown game type: {s}"),
            }),
        }
    }
}

/// 对局状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameState {
    /// 尚未落子
    NotStarted,
    /// 对局进行中
    InProgress,
    /// 先手（白方）胜
    WhiteWins,
    /// 后手（黑方）胜
    BlackWins,
    /// 和棋
    Draw,
}

impl GameState {
    /// 对局是否已经结束
    pub fn is_over(&self) -> bool {
        !matches!(self, GameState::NotStarted | GameState::InProgress)
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GameState::NotStarted => "NotStarted",
            GameState::InProgress => "InProgress",
            GameState::WhiteWins => "WhiteWins",
            GameState::BlackWins => "BlackWins",
            GameState::Draw => "Draw",
        };
        write!(f, "{text}")
    }
}

impl FromStr for GameState {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "NotStarted" => Ok(GameState::NotStarted),
            "InProgress" => Ok(GameState::InProgress),
            "WhiteWins" => Ok(GameState::WhiteWins),
            "BlackWins" => Ok(GameState::BlackWins),
            "Draw" => Ok(GameState::Draw),
            _ => Err(HiveError::InvalidGameString {
                reason: format!("unknown game state: {s}"),
            }),
        }
    }
}

/// 轮次：该谁走、第几个完整回合
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub color: Color,
    /// 回合数，1 起，黑方走完后进位
    pub number: u32,
}

impl Turn {
    /// 根据已走的步数推算当前轮次
    pub fn after_moves(count: usize) -> Turn {
        let color = if count % 2 == 0 {
            Color::White
        } else {
            Color::Black
        };
        Turn {
            color,
            number: (count / 2 + 1) as u32,
        }
    }
}

fn color_word(color: Color) -> &'static str {
    match color {
        Color::White => "White",
        Color::Black => "Black",
    }
}

impl fmt::Display for Turn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", color_word(self.color), self.number)
    }
}

impl FromStr for Turn {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || HiveError::InvalidGameString {
            reason: format!("bad turn string: {s}"),
        };
        let body = s.strip_suffix(']').ok_or_else(invalid)?;
        let (color_text, number_text) = body.split_once('[').ok_or_else(invalid)?;
        let color = match color_text {
            "White" => Color::White,
            "Black" => Color::Black,
            _ => return Err(invalid()),
        };
        let number: u32 = number_text.parse().map_err(|_| invalid())?;
        if number == 0 {
            return Err(invalid());
        }
        Ok(Turn { color, number })
    }
}

/// 完整对局字符串
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameString {
    pub game_type: GameType,
    pub state: GameState,
    pub turn: Turn,
    /// 全部历史走法的记谱，按时间顺序
    pub moves: Vec<String>,
}

impl fmt::Display for GameString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{sep}{}{sep}{}",
            self.game_type,
            self.state,
            self.turn,
            sep = GAME_STRING_SEPARATOR
        )?;
        for notation in &self.moves {
            write!(f, "{}{}", GAME_STRING_SEPARATOR, notation)?;
        }
        Ok(())
    }
}

impl FromStr for GameString {
    type Err = HiveError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split(GAME_STRING_SEPARATOR);
        let invalid = |what: &str| HiveError::InvalidGameString {
            reason: format!("missing {what}: {s}"),
        };
        let game_type: GameType = parts.next().ok_or_else(|| invalid("game type"))?.parse()?;
        let state: GameState = parts.next().ok_or_else(|| invalid("game state"))?.parse()?;
        let turn: Turn = parts.next().ok_or_else(|| invalid("turn"))?.parse()?;
        let moves = parts.map(|m| m.trim().to_string()).collect();
        Ok(GameString {
            game_type,
            state,
            turn,
            moves,
        })
    }
}
