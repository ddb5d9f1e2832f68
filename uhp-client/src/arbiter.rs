//! 走法仲裁
//!
//! 引擎建议的走法在应用之前必须先过本方规则这一关，
//! 原地不动的退化"走法"同样拒绝。

use protocol::{HiveError, Mutation, PlacementRegistry, Result};

/// 合法性裁判，由对局规则的持有方实现
pub trait LegalityOracle {
    /// 动子占据落点是否合法
    fn is_legal(&self, mutation: &Mutation, registry: &PlacementRegistry) -> bool;
}

/// 走法仲裁器
pub struct MoveArbiter;

impl MoveArbiter {
    /// 校验一次解码出的变动，通过则原样返回交由调用方应用
    pub fn validate(
        mutation: Mutation,
        notation: &str,
        registry: &PlacementRegistry,
        oracle: &impl LegalityOracle,
    ) -> Result<Mutation> {
        let illegal = || HiveError::IllegalEngineMove {
            notation: notation.to_string(),
        };

        // 原地"移动"是退化走法
        if let Mutation::Relocate { from, to, .. } = &mutation {
            if from == to {
                return Err(illegal());
            }
        }

        // 落点被占时只有允许叠子的子种能上去
        let destination_occupied = registry
            .top_piece_at(mutation.destination())
            .is_some_and(|p| p.id != mutation.id());
        if destination_occupied && !mutation.id().bug.can_stack() {
            return Err(illegal());
        }

        if !oracle.is_legal(&mutation, registry) {
            return Err(illegal());
        }

        Ok(mutation)
    }
}
