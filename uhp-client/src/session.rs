//! 会话与重试管理
//!
//! 维护与引擎的连接生命周期：连接、周期健康检查、指数退避重连。
//! 同时对引擎的退化行为做升级处理——连续拒绝对局字符串、原样重复
//! 同一建议、同一走法反复无效，任一计数越过阈值立即以 EngineGaveUp
//! 结束本回合并交还控制权，绝不进入无限重试。

use std::collections::HashMap;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};

use protocol::{GameRecord, Mutation, Notation, PASS_MOVE};

use crate::arbiter::{LegalityOracle, MoveArbiter};
use crate::channel::{ChannelConfig, Command, CommandChannel, Response, SearchLimit};
use crate::constants::{
    BACKOFF_BASE_MS, BACKOFF_MAX_MS, MAX_INVALID_SUGGESTIONS, MAX_RECONNECT_ATTEMPTS,
    MAX_REJECTED_GAME_STATES, MAX_REPEATED_SUGGESTIONS, STABLE_CONNECTION_PERIOD,
};
use crate::error::{EngineError, Result};
use crate::transport::LinkConnector;

/// 连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// 未连接
    #[default]
    Disconnected,
    /// 正在建立连接
    Connecting,
    /// 已连上传输，引擎尚未接受对局
    Connected,
    /// 引擎已接受对局，可以请求走法
    EngineRunning,
}

/// 会话配置
#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub channel: ChannelConfig,
    /// 重连尝试上限
    pub max_reconnect_attempts: u32,
    /// 退避基数，每次失败翻倍
    pub backoff_base: Duration,
    /// 退避上限
    pub backoff_max: Duration,
    /// 连接稳定多久后重置重连计数
    pub stable_period: Duration,
    /// 引擎连续拒绝对局字符串的上限
    pub max_rejected_game_states: u32,
    /// 引擎原样重复同一建议的上限
    pub max_repeated_suggestions: u32,
    /// 同一走法累计无效的上限
    pub max_invalid_suggestions: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            channel: ChannelConfig::default(),
            max_reconnect_attempts: MAX_RECONNECT_ATTEMPTS,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(BACKOFF_MAX_MS),
            stable_period: STABLE_CONNECTION_PERIOD,
            max_rejected_game_states: MAX_REJECTED_GAME_STATES,
            max_repeated_suggestions: MAX_REPEATED_SUGGESTIONS,
            max_invalid_suggestions: MAX_INVALID_SUGGESTIONS,
        }
    }
}

/// 引擎给出的建议
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BestMove {
    /// 一步已通过仲裁、可直接应用的变动
    Move {
        mutation: Mutation,
        notation: String,
    },
    /// 引擎弃权
    Pass,
}

/// 升级计数器
#[derive(Debug, Default)]
struct EscalationTracker {
    /// 连续被引擎拒绝（或无应答）的命令数
    rejected_game_states: u32,
    /// 引擎上一次给出的走法
    last_suggestion: Option<String>,
    /// 上一走法连续出现的次数
    repeat_count: u32,
    /// 走法字符串 -> 累计无效次数
    invalid_counts: HashMap<String, u32>,
}

impl EscalationTracker {
    /// 记录一次建议，返回该走法连续出现的次数
    fn note_suggestion(&mut self, text: &str) -> u32 {
        if self.last_suggestion.as_deref() == Some(text) {
            self.repeat_count += 1;
        } else {
            self.last_suggestion = Some(text.to_string());
            self.repeat_count = 1;
        }
        self.repeat_count
    }

    /// 记录一次无效建议，返回该走法累计无效次数
    fn strike(&mut self, text: &str) -> u32 {
        let count = self.invalid_counts.entry(text.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// 回合收尾（成功或放弃）后清零
    fn clear_for_turn(&mut self) {
        self.rejected_game_states = 0;
        self.last_suggestion = None;
        self.repeat_count = 0;
        self.invalid_counts.clear();
    }
}

/// 引擎会话
pub struct EngineSession<C: LinkConnector> {
    connector: C,
    config: SessionConfig,
    channel: Option<CommandChannel>,
    state: ConnectionState,
    /// 自上次成功连接以来的失败尝试数
    attempts: u32,
    connected_at: Option<Instant>,
    engine_id: Option<String>,
    escalation: EscalationTracker,
}

impl<C: LinkConnector> EngineSession<C> {
    /// 以默认配置创建会话
    pub fn new(connector: C) -> Self {
        Self::with_config(connector, SessionConfig::default())
    }

    /// 以指定配置创建会话
    pub fn with_config(connector: C, config: SessionConfig) -> Self {
        Self {
            connector,
            config,
            channel: None,
            state: ConnectionState::Disconnected,
            attempts: 0,
            connected_at: None,
            engine_id: None,
            escalation: EscalationTracker::default(),
        }
    }

    /// 当前连接状态
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// 引擎自报的标识行（来自 info 响应）
    pub fn engine_id(&self) -> Option<&str> {
        self.engine_id.as_deref()
    }

    /// 请求引擎给出当前局面的最佳走法
    ///
    /// 完整流程：重放历史构建登记表 → newgame → bestmove → 解码 →
    /// 仲裁。所有重试都发生在这里；编解码和登记表的失败原样上抛到
    /// 这里裁决，越过升级阈值立即返回 EngineGaveUp。
    pub async fn best_move(
        &mut self,
        record: &GameRecord,
        oracle: &impl LegalityOracle,
        limit: SearchLimit,
    ) -> Result<BestMove> {
        let registry = record.replay()?;
        let game_string = record.game_string().to_string();
        let mut connection_losses: u32 = 0;

        loop {
            self.ensure_connected().await?;

            // 每轮重试都重发 newgame，保证引擎内部局面与本地一致
            match self.send_command(Command::NewGame(game_string.clone())).await {
                Ok(_) => {
                    self.state = ConnectionState::EngineRunning;
                    self.escalation.rejected_game_states = 0;
                }
                Err(e) => {
                    self.recover_from(e, &mut connection_losses)?;
                    continue;
                }
            }

            let response = match self.send_command(Command::BestMove(limit)).await {
                Ok(response) => response,
                Err(e) => {
                    self.recover_from(e, &mut connection_losses)?;
                    continue;
                }
            };

            let move_text = response.move_line.ok_or_else(|| EngineError::EngineRejected {
                message: "bestmove response carried no move line".to_string(),
            })?;

            if move_text == PASS_MOVE {
                self.escalation.clear_for_turn();
                tracing::info!("engine suggests passing");
                return Ok(BestMove::Pass);
            }

            // 原样重复同一建议说明引擎已经打转
            let repeats = self.escalation.note_suggestion(&move_text);
            if repeats >= self.config.max_repeated_suggestions {
                self.escalation.clear_for_turn();
                return Err(EngineError::EngineGaveUp {
                    reason: format!("engine repeated suggestion {move_text:?}"),
                });
            }

            let validated = Notation::decode(&move_text, &registry)
                .and_then(|m| MoveArbiter::validate(m, &move_text, &registry, oracle));
            match validated {
                Ok(mutation) => {
                    self.escalation.clear_for_turn();
                    tracing::info!("engine suggested {}", move_text);
                    return Ok(BestMove::Move {
                        mutation,
                        notation: move_text,
                    });
                }
                Err(e) => {
                    let strikes = self.escalation.strike(&move_text);
                    tracing::warn!(
                        "invalid engine suggestion {:?} (strike {}): {}",
                        move_text,
                        strikes,
                        e
                    );
                    if strikes >= self.config.max_invalid_suggestions {
                        self.escalation.clear_for_turn();
                        return Err(EngineError::EngineGaveUp {
                            reason: format!("suggestion {move_text:?} invalid {strikes} times"),
                        });
                    }
                }
            }
        }
    }

    /// 告知引擎本方弃权
    pub async fn notify_pass(&mut self) -> Result<()> {
        self.ensure_connected().await?;
        self.send_command(Command::Pass).await.map(|_| ())
    }

    /// 周期健康检查
    ///
    /// 连接存活时发 info 探测；断线且还有剩余尝试时补一次重连；
    /// 连接稳定超过一个周期后重置重连计数。
    pub async fn health_check(&mut self) -> ConnectionState {
        let alive = self.channel.as_ref().is_some_and(|c| c.is_open());
        if alive {
            match self.send_command(Command::Info).await {
                Ok(response) => {
                    if self.engine_id.is_none() {
                        self.engine_id = response.lines.first().cloned();
                    }
                    self.maybe_reset_attempts();
                }
                Err(e) => {
                    tracing::warn!("health check failed: {}", e);
                    self.note_disconnect();
                }
            }
        } else if self.attempts < self.config.max_reconnect_attempts {
            if let Err(e) = self.attempt_connect().await {
                tracing::warn!("health check reconnect failed: {}", e);
            }
        }
        self.state
    }

    /// 主动断开连接
    pub fn shutdown(&mut self) {
        self.note_disconnect();
        tracing::info!("engine session shut down");
    }

    /// 清零重连计数（调用方确认环境恢复后重新放行重连）
    pub fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    /// 确保连接可用，必要时按指数退避重连
    async fn ensure_connected(&mut self) -> Result<()> {
        if self.channel.as_ref().is_some_and(|c| c.is_open()) {
            self.maybe_reset_attempts();
            return Ok(());
        }
        while self.attempts < self.config.max_reconnect_attempts {
            match self.attempt_connect().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    tracing::warn!("connect attempt {} failed: {}", self.attempts, e);
                    if self.attempts >= self.config.max_reconnect_attempts {
                        break;
                    }
                    sleep(self.backoff_delay()).await;
                }
            }
        }
        self.state = ConnectionState::Disconnected;
        Err(EngineError::ConnectionLost)
    }

    /// 单次连接尝试
    async fn attempt_connect(&mut self) -> Result<()> {
        self.state = ConnectionState::Connecting;
        self.attempts += 1;
        let link = match self.connector.connect().await {
            Ok(link) => link,
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                return Err(e);
            }
        };
        self.channel = Some(CommandChannel::with_config(link, self.config.channel.clone()));
        self.state = ConnectionState::Connected;
        self.connected_at = Some(Instant::now());
        tracing::info!("engine link established (attempt {})", self.attempts);
        Ok(())
    }

    /// 带抖动的指数退避
    fn backoff_delay(&self) -> Duration {
        let exponent = self.attempts.saturating_sub(1).min(16);
        let base = self.config.backoff_base.as_millis() as u64;
        let capped = (base << exponent).min(self.config.backoff_max.as_millis() as u64);
        let jitter = rand::thread_rng().gen_range(0..=capped / 4);
        Duration::from_millis(capped + jitter)
    }

    /// 连接稳定超过一个周期后重置重连计数
    fn maybe_reset_attempts(&mut self) {
        if self.attempts == 0 {
            return;
        }
        if let Some(connected_at) = self.connected_at {
            if connected_at.elapsed() >= self.config.stable_period {
                tracing::debug!("connection stable, resetting reconnect attempts");
                self.attempts = 0;
            }
        }
    }

    /// 记录断线，丢弃通道（通道任务随之结束并关闭连接）
    fn note_disconnect(&mut self) {
        self.channel = None;
        self.connected_at = None;
        self.state = ConnectionState::Disconnected;
    }

    async fn send_command(&self, command: Command) -> Result<Response> {
        match &self.channel {
            Some(channel) => channel.send(command).await,
            None => Err(EngineError::ConnectionLost),
        }
    }

    /// 命令失败后的处置：可重试返回 Ok，越过阈值返回终局错误
    fn recover_from(&mut self, error: EngineError, connection_losses: &mut u32) -> Result<()> {
        match error {
            e @ (EngineError::EngineRejected { .. } | EngineError::CommandTimeout) => {
                self.escalation.rejected_game_states += 1;
                tracing::warn!(
                    "engine did not accept command ({} in a row): {}",
                    self.escalation.rejected_game_states,
                    e
                );
                if self.escalation.rejected_game_states >= self.config.max_rejected_game_states {
                    let rejected = self.escalation.rejected_game_states;
                    self.escalation.clear_for_turn();
                    return Err(EngineError::EngineGaveUp {
                        reason: format!(
                            "engine rejected or ignored the game state {rejected} times in a row"
                        ),
                    });
                }
                Ok(())
            }
            EngineError::ConnectionLost | EngineError::ConnectionClosed | EngineError::Io(_) => {
                *connection_losses += 1;
                self.note_disconnect();
                if *connection_losses >= self.config.max_reconnect_attempts.max(1) {
                    return Err(EngineError::ConnectionLost);
                }
                Ok(())
            }
            other => Err(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    use protocol::{GameType, Hex};

    use crate::transport::EngineLink;

    struct AcceptAll;

    impl LegalityOracle for AcceptAll {
        fn is_legal(&self, _mutation: &Mutation, _registry: &protocol::PlacementRegistry) -> bool {
            true
        }
    }

    struct RejectAll;

    impl LegalityOracle for RejectAll {
        fn is_legal(&self, _mutation: &Mutation, _registry: &protocol::PlacementRegistry) -> bool {
            false
        }
    }

    struct FakeLink {
        commands: mpsc::UnboundedSender<String>,
        lines: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl EngineLink for FakeLink {
        async fn send_line(&mut self, line: &str) -> Result<()> {
            self.commands
                .send(line.to_string())
                .map_err(|_| EngineError::ConnectionClosed)
        }

        async fn recv_line(&mut self) -> Result<String> {
            self.lines.recv().await.ok_or(EngineError::ConnectionClosed)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// 脚本化假引擎：newgame 前 N 次回 err，bestmove 按脚本逐个回应
    #[derive(Clone)]
    struct FakeEngine {
        newgame_errors: Arc<AtomicU32>,
        bestmoves: Arc<Mutex<VecDeque<Vec<String>>>>,
        bestmove_calls: Arc<AtomicU32>,
    }

    impl FakeEngine {
        fn new(newgame_errors: u32, bestmoves: Vec<Vec<&str>>) -> Self {
            let scripted = bestmoves
                .into_iter()
                .map(|lines| lines.into_iter().map(String::from).collect())
                .collect();
            Self {
                newgame_errors: Arc::new(AtomicU32::new(newgame_errors)),
                bestmoves: Arc::new(Mutex::new(scripted)),
                bestmove_calls: Arc::new(AtomicU32::new(0)),
            }
        }

        fn spawn_link(&self) -> FakeLink {
            let (commands_tx, mut commands_rx) = mpsc::unbounded_channel::<String>();
            let (lines_tx, lines_rx) = mpsc::unbounded_channel::<String>();
            let engine = self.clone();
            tokio::spawn(async move {
                while let Some(command) = commands_rx.recv().await {
                    if command.starts_with("newgame") {
                        if engine.newgame_errors.load(Ordering::SeqCst) > 0 {
                            engine.newgame_errors.fetch_sub(1, Ordering::SeqCst);
                            let _ = lines_tx.send("err invalid game state".to_string());
                        } else {
                            let _ = lines_tx.send("ok".to_string());
                        }
                    } else if command.starts_with("bestmove") {
                        engine.bestmove_calls.fetch_add(1, Ordering::SeqCst);
                        let scripted = engine.bestmoves.lock().unwrap().pop_front();
                        let lines = scripted
                            .unwrap_or_else(|| vec!["pass".to_string(), "ok".to_string()]);
                        for line in lines {
                            let _ = lines_tx.send(line);
                        }
                    } else if command == "info" {
                        let _ = lines_tx.send("id fake-engine v1".to_string());
                        let _ = lines_tx.send("ok".to_string());
                    } else {
                        let _ = lines_tx.send("ok".to_string());
                    }
                }
            });
            FakeLink {
                commands: commands_tx,
                lines: lines_rx,
            }
        }
    }

    struct FakeConnector {
        engine: FakeEngine,
        connects: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LinkConnector for FakeConnector {
        type Link = FakeLink;

        async fn connect(&self) -> Result<FakeLink> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(self.engine.spawn_link())
        }
    }

    struct DeadConnector {
        connects: Arc<AtomicU32>,
    }

    #[async_trait]
    impl LinkConnector for DeadConnector {
        type Link = FakeLink;

        async fn connect(&self) -> Result<FakeLink> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Err(EngineError::ConnectTimeout)
        }
    }

    fn session_with(engine: &FakeEngine) -> EngineSession<FakeConnector> {
        let connector = FakeConnector {
            engine: engine.clone(),
            connects: Arc::new(AtomicU32::new(0)),
        };
        let config = SessionConfig {
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
            max_reconnect_attempts: 3,
            ..SessionConfig::default()
        };
        EngineSession::with_config(connector, config)
    }

    fn opening_record() -> GameRecord {
        let mut record = GameRecord::new(GameType::Base, "local".to_string(), "engine".to_string());
        record.add_move("wQ".to_string(), Hex::new(0, 0));
        record
    }

    #[tokio::test]
    async fn test_best_move_happy_path() {
        let engine = FakeEngine::new(0, vec![vec!["bA1 wQ-", "ok"]]);
        let mut session = session_with(&engine);

        let best = session
            .best_move(&opening_record(), &AcceptAll, SearchLimit::Depth(3))
            .await
            .unwrap();

        match best {
            BestMove::Move { mutation, notation } => {
                assert_eq!(notation, "bA1 wQ-");
                assert_eq!(
                    mutation,
                    Mutation::Place {
                        id: "bA1".parse().unwrap(),
                        at: Hex::new(1, 0),
                    }
                );
            }
            BestMove::Pass => panic!("expected a move"),
        }
        assert_eq!(session.state(), ConnectionState::EngineRunning);
    }

    #[tokio::test]
    async fn test_engine_pass_suggestion() {
        let engine = FakeEngine::new(0, vec![vec!["pass", "ok"]]);
        let mut session = session_with(&engine);

        let best = session
            .best_move(&opening_record(), &AcceptAll, SearchLimit::Depth(1))
            .await
            .unwrap();
        assert_eq!(best, BestMove::Pass);
    }

    #[tokio::test]
    async fn test_repeated_suggestion_escalates() {
        // 同一走法原样出现两次：第二次直接放弃，不再重试
        let engine = FakeEngine::new(
            0,
            vec![vec!["bA1 wQ-", "ok"], vec!["bA1 wQ-", "ok"], vec!["bA1 wQ-", "ok"]],
        );
        let mut session = session_with(&engine);

        let err = session
            .best_move(&opening_record(), &RejectAll, SearchLimit::Depth(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EngineGaveUp { .. }));
        assert_eq!(engine.bestmove_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_suggestions_strike_out() {
        // 两个无法解析的走法轮流出现，其中一个累计三次后放弃
        let engine = FakeEngine::new(
            0,
            vec![
                vec!["wZ1", "ok"],
                vec!["wZ2", "ok"],
                vec!["wZ1", "ok"],
                vec!["wZ2", "ok"],
                vec!["wZ1", "ok"],
                vec!["wZ2", "ok"],
            ],
        );
        let mut session = session_with(&engine);

        let err = session
            .best_move(&opening_record(), &AcceptAll, SearchLimit::Depth(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EngineGaveUp { .. }));
        assert_eq!(engine.bestmove_calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_rejected_game_state_escalates() {
        let engine = FakeEngine::new(5, vec![]);
        let mut session = session_with(&engine);

        let err = session
            .best_move(&opening_record(), &AcceptAll, SearchLimit::Depth(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EngineGaveUp { .. }));
        // newgame 被拒三次后再没有发过 bestmove
        assert_eq!(engine.bestmove_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_attempts_are_bounded() {
        let connects = Arc::new(AtomicU32::new(0));
        let connector = DeadConnector {
            connects: connects.clone(),
        };
        let config = SessionConfig {
            backoff_base: Duration::from_millis(10),
            backoff_max: Duration::from_millis(50),
            max_reconnect_attempts: 3,
            ..SessionConfig::default()
        };
        let mut session = EngineSession::with_config(connector, config);

        let err = session
            .best_move(&opening_record(), &AcceptAll, SearchLimit::Depth(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ConnectionLost));
        assert_eq!(connects.load(Ordering::SeqCst), 3);
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_health_check_reconnects_and_probes() {
        let engine = FakeEngine::new(0, vec![]);
        let mut session = session_with(&engine);
        assert_eq!(session.state(), ConnectionState::Disconnected);

        // 第一次 tick 补上连接并完成 info 探测
        let state = session.health_check().await;
        assert_eq!(state, ConnectionState::Connected);
        let state = session.health_check().await;
        assert_eq!(state, ConnectionState::Connected);
        assert_eq!(session.engine_id(), Some("id fake-engine v1"));
    }

    #[tokio::test]
    async fn test_escalation_resets_between_turns() {
        // 上一回合放弃后，下一回合的计数从零开始
        let engine = FakeEngine::new(
            0,
            vec![
                vec!["bA1 wQ-", "ok"],
                vec!["bA1 wQ-", "ok"],
                vec!["bA1 wQ-", "ok"],
            ],
        );
        let mut session = session_with(&engine);
        let record = opening_record();

        let err = session
            .best_move(&record, &RejectAll, SearchLimit::Depth(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EngineGaveUp { .. }));

        // 换上接受一切的裁判，同一建议这回直接通过
        let best = session
            .best_move(&record, &AcceptAll, SearchLimit::Depth(3))
            .await
            .unwrap();
        assert!(matches!(best, BestMove::Move { .. }));
    }
}
