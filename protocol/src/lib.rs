//! 六角棋引擎桥共享协议库
//!
//! 包含:
//! - 轴向坐标与方向表
//! - 棋子身份定义和落子登记表
//! - 走法记谱编解码
//! - 对局字符串和对局记录格式

mod constants;
mod error;
mod gamestring;
mod hex;
mod notation;
mod piece;
mod record;
mod registry;

pub use constants::*;
pub use error::{HiveError, Result};
pub use gamestring::{GameState, GameString, GameType, Turn};
pub use hex::{Direction, Hex};
pub use notation::{Mutation, Notation};
pub use piece::{BugType, Color, Piece, PieceId};
pub use record::{GameMetadata, GameRecord, MoveRecord, RECORD_VERSION};
pub use registry::PlacementRegistry;
