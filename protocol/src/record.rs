//! 对局记录
//!
//! 完整对局史就是这份按序追加的走法列表，棋盘快照不是。
//! 登记表永远由 `replay` 按时间顺序重放构建，保证身份串的确定性。

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::constants::PASS_MOVE;
use crate::error::Result;
use crate::gamestring::{GameState, GameString, GameType, Turn};
use crate::hex::Hex;
use crate::notation::Notation;
use crate::registry::PlacementRegistry;

/// 记录格式版本
pub const RECORD_VERSION: &str = "1.0";

/// 对局元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameMetadata {
    /// 白方玩家名
    pub white_player: String,
    /// 黑方玩家名
    pub black_player: String,
    /// 对局日期
    pub date: String,
    /// 对局结果（进行中为 None）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GameState>,
}

/// 走法记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveRecord {
    /// 走法序号，1 起单调递增
    pub sequence: u32,
    /// 协议记谱字符串
    pub notation: String,
    /// 走完后动子所在坐标；弃权无坐标
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<Hex>,
}

/// 完整对局记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRecord {
    /// 版本号
    pub version: String,
    /// 元数据
    pub metadata: GameMetadata,
    /// 对局类型
    pub game_type: GameType,
    /// 走法列表（只追加）
    pub moves: Vec<MoveRecord>,
}

impl GameRecord {
    /// 创建新的对局记录
    pub fn new(game_type: GameType, white_player: String, black_player: String) -> Self {
        Self {
            version: RECORD_VERSION.to_string(),
            metadata: GameMetadata {
                white_player,
                black_player,
                date: Utc::now().format("%Y-%m-%d").to_string(),
                result: None,
            },
            game_type,
            moves: Vec::new(),
        }
    }

    /// 追加一步走法，返回分配的序号
    pub fn add_move(&mut self, notation: String, destination: Hex) -> u32 {
        let sequence = self.moves.len() as u32 + 1;
        self.moves.push(MoveRecord {
            sequence,
            notation,
            destination: Some(destination),
        });
        sequence
    }

    /// 追加一步弃权
    pub fn add_pass(&mut self) -> u32 {
        let sequence = self.moves.len() as u32 + 1;
        self.moves.push(MoveRecord {
            sequence,
            notation: PASS_MOVE.to_string(),
            destination: None,
        });
        sequence
    }

    /// 设置对局结果
    pub fn set_result(&mut self, result: GameState) {
        self.metadata.result = Some(result);
    }

    /// 当前对局状态
    pub fn state(&self) -> GameState {
        if let Some(result) = self.metadata.result {
            return result;
        }
        if self.moves.is_empty() {
            GameState::NotStarted
        } else {
            GameState::InProgress
        }
    }

    /// 当前轮次
    pub fn turn(&self) -> Turn {
        Turn::after_moves(self.moves.len())
    }

    /// 重放全部走法，构建落子登记表
    ///
    /// 这是构建登记表的唯一途径，任何从棋盘现状反推的捷径都会弄错序号。
    pub fn replay(&self) -> Result<PlacementRegistry> {
        let mut registry = PlacementRegistry::new();
        for record in &self.moves {
            // 弃权不改变棋盘
            if record.notation == PASS_MOVE {
                continue;
            }
            let mutation = Notation::decode(&record.notation, &registry)?;
            registry.apply(&mutation, record.sequence)?;
        }
        tracing::debug!("replayed {} moves into registry", self.moves.len());
        Ok(registry)
    }

    /// 渲染发给引擎的对局字符串
    pub fn game_string(&self) -> GameString {
        GameString {
            game_type: self.game_type,
            state: self.state(),
            turn: self.turn(),
            moves: self.moves.iter().map(|m| m.notation.clone()).collect(),
        }
    }

    /// 转换为 JSON 字符串
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 从 JSON 字符串解析
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::piece::Color;

    fn sample_record() -> GameRecord {
        let mut record = GameRecord::new(
            GameType::Base,
            "player1".to_string(),
            "engine".to_string(),
        );
        record.add_move("wQ".to_string(), Hex::new(0, 0));
        record.add_move("bQ wQ-".to_string(), Hex::new(1, 0));
        record.add_move("wA1 -wQ".to_string(), Hex::new(-1, 0));
        record
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let record = sample_record();
        let sequences: Vec<u32> = record.moves.iter().map(|m| m.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[test]
    fn test_state_and_turn() {
        let mut record = GameRecord::new(GameType::Base, "a".to_string(), "b".to_string());
        assert_eq!(record.state(), GameState::NotStarted);
        assert_eq!(record.turn().color, Color::White);

        record.add_move("wQ".to_string(), Hex::new(0, 0));
        assert_eq!(record.state(), GameState::InProgress);
        assert_eq!(record.turn().color, Color::Black);

        record.set_result(GameState::WhiteWins);
        assert_eq!(record.state(), GameState::WhiteWins);
    }

    #[test]
    fn test_game_string_from_record() {
        let record = sample_record();
        assert_eq!(
            record.game_string().to_string(),
            "Base;InProgress;Black[2];wQ;bQ wQ-;wA1 -wQ"
        );
    }

    #[test]
    fn test_replay_builds_registry() {
        let record = sample_record();
        let registry = record.replay().unwrap();
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.resolve("wA1".parse().unwrap()).unwrap().position,
            Hex::new(-1, 0)
        );
    }

    #[test]
    fn test_replay_skips_passes() {
        let mut record = sample_record();
        record.add_pass();
        record.add_move("wA2 \\wQ".to_string(), Hex::new(0, -1));

        let registry = record.replay().unwrap();
        assert_eq!(registry.len(), 4);
        assert_eq!(record.turn().number, 3);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let record = sample_record();
        let first = record.replay().unwrap();
        let second = record.replay().unwrap();
        let ids = |r: &PlacementRegistry| {
            r.pieces().map(|p| p.id.to_string()).collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
    }

    #[test]
    fn test_json_roundtrip() {
        let mut record = sample_record();
        record.set_result(GameState::Draw);

        let json = record.to_json().unwrap();
        let parsed = GameRecord::from_json(&json).unwrap();
        assert_eq!(parsed.version, RECORD_VERSION);
        assert_eq!(parsed.metadata.white_player, "player1");
        assert_eq!(parsed.metadata.result, Some(GameState::Draw));
        assert_eq!(parsed.moves, record.moves);
    }
}
