//! 命令通道
//!
//! 命令串行发往引擎：任一时刻至多一条命令在途，其余按 FIFO 排队，
//! 队列永不重排。响应以终止行（"ok" 或 err 前缀行）为界；bestmove
//! 额外要求在完成之前见过真正的走法行，因为引擎可能先输出若干中间
//! 状态行。每条命令都有固定超时：超时的命令被强制判败并放行下一条，
//! 迟到的响应行在下一条命令发出前整批丢弃，绝不会被配给新命令。

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, timeout_at, Instant};

use protocol::PASS_MOVE;

use crate::constants::{
    COMMAND_TIMEOUT, ERROR_PREFIX, MAX_STALE_LINES, RESPONSE_OK, STALE_DRAIN_WINDOW_MS,
};
use crate::error::{EngineError, Result};
use crate::transport::EngineLink;

/// 搜索限制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchLimit {
    /// 限定思考时间
    Time(Duration),
    /// 限定搜索深度
    Depth(u32),
}

/// 发往引擎的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 以完整对局字符串开启对局
    NewGame(String),
    /// 搜索最佳走法
    BestMove(SearchLimit),
    /// 告知引擎本方弃权
    Pass,
    /// 健康探测 / 引擎信息
    Info,
}

impl Command {
    /// 渲染为协议命令行
    pub fn line(&self) -> String {
        match self {
            Command::NewGame(game) => format!("newgame {game}"),
            Command::BestMove(SearchLimit::Time(duration)) => {
                format!("bestmove time {}", format_hms(*duration))
            }
            Command::BestMove(SearchLimit::Depth(depth)) => format!("bestmove depth {depth}"),
            Command::Pass => PASS_MOVE.to_string(),
            Command::Info => "info".to_string(),
        }
    }

    /// 响应必须包含走法行才算完成
    fn expects_move_line(&self) -> bool {
        matches!(self, Command::BestMove(_))
    }
}

fn format_hms(duration: Duration) -> String {
    let total = duration.as_secs();
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// 引擎对一条命令的完整响应
#[derive(Debug, Clone)]
pub struct Response {
    /// 终止行之前的全部信息行
    pub lines: Vec<String>,
    /// bestmove 响应中的走法行（或字面量 pass）
    pub move_line: Option<String>,
}

/// 命令通道配置
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// 单条命令的超时
    pub command_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            command_timeout: COMMAND_TIMEOUT,
        }
    }
}

/// 在途命令
struct PendingCommand {
    command: Command,
    lines: Vec<String>,
    move_line: Option<String>,
    responder: oneshot::Sender<Result<Response>>,
}

/// 收下一行后的判定
enum LineOutcome {
    NeedMore,
    Complete,
    Failed(String),
}

impl PendingCommand {
    fn accept(&mut self, line: String) -> LineOutcome {
        if line == RESPONSE_OK {
            // bestmove 在见到走法行之前不算完成
            if self.command.expects_move_line() && self.move_line.is_none() {
                return LineOutcome::NeedMore;
            }
            return LineOutcome::Complete;
        }
        if line.starts_with(ERROR_PREFIX) {
            return LineOutcome::Failed(line);
        }
        if self.command.expects_move_line() && is_move_line(&line) {
            self.move_line = Some(line.clone());
        }
        self.lines.push(line);
        LineOutcome::NeedMore
    }
}

/// 粗判一行是否是走法行（身份串以 w/b 开头，或字面量 pass）
fn is_move_line(line: &str) -> bool {
    line == PASS_MOVE || line.starts_with('w') || line.starts_with('b')
}

/// 命令通道
///
/// 接管一条连接，串行处理命令。克隆后的句柄共享同一队列。
#[derive(Clone)]
pub struct CommandChannel {
    sender: mpsc::UnboundedSender<PendingCommand>,
}

impl CommandChannel {
    /// 以默认配置启动命令通道，接管给定连接
    pub fn start<L: EngineLink + 'static>(link: L) -> Self {
        Self::with_config(link, ChannelConfig::default())
    }

    /// 以指定配置启动命令通道
    pub fn with_config<L: EngineLink + 'static>(link: L, config: ChannelConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_channel(link, receiver, config));
        Self { sender }
    }

    /// 发送一条命令并等待完整响应
    ///
    /// 有命令在途时本条在队列中等待，严格按提交顺序发出。
    pub async fn send(&self, command: Command) -> Result<Response> {
        let (responder, receiver) = oneshot::channel();
        let pending = PendingCommand {
            command,
            lines: Vec::new(),
            move_line: None,
            responder,
        };
        self.sender
            .send(pending)
            .map_err(|_| EngineError::ConnectionLost)?;
        receiver.await.map_err(|_| EngineError::ConnectionLost)?
    }

    /// 通道是否仍在运行
    pub fn is_open(&self) -> bool {
        !self.sender.is_closed()
    }
}

/// 通道主循环：逐条取命令、发送、收行直到终止条件或超时
async fn run_channel<L: EngineLink>(
    mut link: L,
    mut receiver: mpsc::UnboundedReceiver<PendingCommand>,
    config: ChannelConfig,
) {
    let mut stale = false;
    while let Some(mut pending) = receiver.recv().await {
        if stale {
            drain_stale_lines(&mut link).await;
            stale = false;
        }

        let command_line = pending.command.line();
        if let Err(e) = link.send_line(&command_line).await {
            tracing::error!("failed to transmit command: {}", e);
            let _ = pending.responder.send(Err(EngineError::ConnectionLost));
            fail_queued(&mut receiver);
            let _ = link.close().await;
            return;
        }
        tracing::debug!("sent command: {}", command_line);

        let deadline = Instant::now() + config.command_timeout;
        loop {
            match timeout_at(deadline, link.recv_line()).await {
                Err(_) => {
                    tracing::warn!("command timed out: {}", command_line);
                    let _ = pending.responder.send(Err(EngineError::CommandTimeout));
                    stale = true;
                    break;
                }
                Ok(Err(e)) => {
                    tracing::error!("connection lost awaiting response: {}", e);
                    let _ = pending.responder.send(Err(EngineError::ConnectionLost));
                    fail_queued(&mut receiver);
                    let _ = link.close().await;
                    return;
                }
                Ok(Ok(text)) => match pending.accept(text) {
                    LineOutcome::NeedMore => continue,
                    LineOutcome::Complete => {
                        let PendingCommand {
                            lines,
                            move_line,
                            responder,
                            ..
                        } = pending;
                        let _ = responder.send(Ok(Response { lines, move_line }));
                        break;
                    }
                    LineOutcome::Failed(message) => {
                        let _ = pending
                            .responder
                            .send(Err(EngineError::EngineRejected { message }));
                        break;
                    }
                },
            }
        }
    }
    let _ = link.close().await;
}

/// 丢弃上一条已超时命令的迟到响应行
async fn drain_stale_lines<L: EngineLink>(link: &mut L) {
    let window = Duration::from_millis(STALE_DRAIN_WINDOW_MS);
    let mut discarded = 0usize;
    while discarded < MAX_STALE_LINES {
        match timeout(window, link.recv_line()).await {
            Ok(Ok(line)) => {
                tracing::debug!("discarding stale line: {}", line);
                discarded += 1;
            }
            _ => break,
        }
    }
}

/// 传输已死：让队列中所有命令立即失败
fn fail_queued(receiver: &mut mpsc::UnboundedReceiver<PendingCommand>) {
    receiver.close();
    while let Ok(pending) = receiver.try_recv() {
        let _ = pending.responder.send(Err(EngineError::ConnectionLost));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// 测试用连接：收发两端都接在测试手里
    struct ScriptLink {
        outgoing: mpsc::UnboundedSender<String>,
        incoming: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl EngineLink for ScriptLink {
        async fn send_line(&mut self, line: &str) -> Result<()> {
            self.outgoing
                .send(line.to_string())
                .map_err(|_| EngineError::ConnectionClosed)
        }

        async fn recv_line(&mut self) -> Result<String> {
            self.incoming
                .recv()
                .await
                .ok_or(EngineError::ConnectionClosed)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        sent: mpsc::UnboundedReceiver<String>,
        feed: mpsc::UnboundedSender<String>,
    }

    fn script_link() -> (ScriptLink, Harness) {
        let (outgoing, sent) = mpsc::unbounded_channel();
        let (feed, incoming) = mpsc::unbounded_channel();
        (ScriptLink { outgoing, incoming }, Harness { sent, feed })
    }

    fn short_config() -> ChannelConfig {
        ChannelConfig {
            command_timeout: Duration::from_millis(100),
        }
    }

    #[tokio::test]
    async fn test_simple_command_completes_on_ok() {
        let (link, mut harness) = script_link();
        let channel = CommandChannel::start(link);

        let send = channel.send(Command::Info);
        let respond = async {
            assert_eq!(harness.sent.recv().await.unwrap(), "info");
            harness.feed.send("id fake-engine v1".to_string()).unwrap();
            harness.feed.send("ok".to_string()).unwrap();
        };
        let (response, _) = tokio::join!(send, respond);
        let response = response.unwrap();
        assert_eq!(response.lines, vec!["id fake-engine v1"]);
        assert_eq!(response.move_line, None);
    }

    #[tokio::test]
    async fn test_error_line_terminates_as_rejection() {
        let (link, mut harness) = script_link();
        let channel = CommandChannel::start(link);

        let send = channel.send(Command::NewGame("Base;NotStarted;White[1]".to_string()));
        let respond = async {
            let line = harness.sent.recv().await.unwrap();
            assert_eq!(line, "newgame Base;NotStarted;White[1]");
            harness
                .feed
                .send("err invalid game string".to_string())
                .unwrap();
        };
        let (result, _) = tokio::join!(send, respond);
        match result {
            Err(EngineError::EngineRejected { message }) => {
                assert_eq!(message, "err invalid game string");
            }
            other => panic!("expected EngineRejected, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_bestmove_requires_move_line() {
        let (link, mut harness) = script_link();
        let channel = CommandChannel::start(link);

        let send = channel.send(Command::BestMove(SearchLimit::Depth(3)));
        let respond = async {
            assert_eq!(harness.sent.recv().await.unwrap(), "bestmove depth 3");
            // 单独一个终止行不足以完成 bestmove
            harness.feed.send("ok".to_string()).unwrap();
            harness.feed.send("bA1 wQ-".to_string()).unwrap();
            harness.feed.send("ok".to_string()).unwrap();
        };
        let (response, _) = tokio::join!(send, respond);
        let response = response.unwrap();
        assert_eq!(response.move_line.as_deref(), Some("bA1 wQ-"));
    }

    #[tokio::test]
    async fn test_bestmove_pass_is_a_move_line() {
        let (link, mut harness) = script_link();
        let channel = CommandChannel::start(link);

        let send = channel.send(Command::BestMove(SearchLimit::Time(Duration::from_secs(5))));
        let respond = async {
            assert_eq!(
                harness.sent.recv().await.unwrap(),
                "bestmove time 00:00:05"
            );
            harness.feed.send("pass".to_string()).unwrap();
            harness.feed.send("ok".to_string()).unwrap();
        };
        let (response, _) = tokio::join!(send, respond);
        assert_eq!(response.unwrap().move_line.as_deref(), Some("pass"));
    }

    #[tokio::test]
    async fn test_fifo_order_is_preserved() {
        let (link, mut harness) = script_link();
        let channel = CommandChannel::start(link);

        let c1 = channel.send(Command::NewGame("Base;NotStarted;White[1]".to_string()));
        let c2 = channel.send(Command::Info);
        let c3 = channel.send(Command::Pass);

        let respond = async {
            // 传输顺序必须与提交顺序一致
            assert_eq!(
                harness.sent.recv().await.unwrap(),
                "newgame Base;NotStarted;White[1]"
            );
            harness.feed.send("ok".to_string()).unwrap();
            assert_eq!(harness.sent.recv().await.unwrap(), "info");
            harness.feed.send("ok".to_string()).unwrap();
            assert_eq!(harness.sent.recv().await.unwrap(), "pass");
            harness.feed.send("ok".to_string()).unwrap();
        };
        let (r1, r2, r3, _) = tokio::join!(c1, c2, c3, respond);
        r1.unwrap();
        r2.unwrap();
        r3.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_does_not_block_queue() {
        let (link, mut harness) = script_link();
        let channel = CommandChannel::with_config(link, short_config());

        let started = Instant::now();
        let first = channel.send(Command::Info).await;
        assert!(matches!(first, Err(EngineError::CommandTimeout)));
        // 超时在 timeout + ε 内触发
        assert!(started.elapsed() < Duration::from_millis(500));

        // 队列没有被堵死：下一条命令正常完成
        let send = channel.send(Command::Pass);
        let respond = async {
            // 第一条命令的传输
            assert_eq!(harness.sent.recv().await.unwrap(), "info");
            assert_eq!(harness.sent.recv().await.unwrap(), "pass");
            harness.feed.send("ok".to_string()).unwrap();
        };
        let (result, _) = tokio::join!(send, respond);
        result.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_is_discarded() {
        let (link, mut harness) = script_link();
        let channel = CommandChannel::with_config(link, short_config());

        // 第一条命令超时，引擎的响应在超时之后才到
        let first = channel.send(Command::Info).await;
        assert!(matches!(first, Err(EngineError::CommandTimeout)));
        assert_eq!(harness.sent.recv().await.unwrap(), "info");
        harness.feed.send("id late-engine".to_string()).unwrap();
        harness.feed.send("ok".to_string()).unwrap();

        // 迟到的行不会被配给下一条命令
        let send = channel.send(Command::Info);
        let respond = async {
            assert_eq!(harness.sent.recv().await.unwrap(), "info");
            harness.feed.send("ok".to_string()).unwrap();
        };
        let (response, _) = tokio::join!(send, respond);
        let response = response.unwrap();
        assert!(response.lines.is_empty(), "stale lines leaked: {:?}", response.lines);
    }

    #[tokio::test]
    async fn test_connection_loss_fails_queued_commands() {
        let (link, harness) = script_link();
        let channel = CommandChannel::start(link);

        let c1 = channel.send(Command::Info);
        let c2 = channel.send(Command::Pass);
        // 挂断连接
        drop(harness);

        let (r1, r2) = tokio::join!(c1, c2);
        assert!(matches!(r1, Err(EngineError::ConnectionLost)));
        assert!(matches!(r2, Err(EngineError::ConnectionLost)));
    }
}
