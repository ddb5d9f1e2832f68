//! 端到端演示：连上引擎，请求一步最佳走法
//!
//! 用法:
//!   cargo run --example bestmove -- tcp 127.0.0.1:9601
//!   cargo run --example bestmove -- process /path/to/engine

use protocol::{GameRecord, GameType, Hex, Mutation, PlacementRegistry};
use uhp_client::{
    BestMove, EngineEndpoint, EngineSession, LegalityOracle, LinkConnector, ProcessConnector,
    SearchLimit, TcpConnector,
};

/// 演示用裁判：放行一切（真实调用方接自己的规则实现）
struct TrustEngine;

impl LegalityOracle for TrustEngine {
    fn is_legal(&self, _mutation: &Mutation, _registry: &PlacementRegistry) -> bool {
        true
    }
}

async fn run<C: LinkConnector>(connector: C) -> anyhow::Result<()> {
    let mut session = EngineSession::new(connector);

    let mut record = GameRecord::new(GameType::Base, "demo".to_string(), "engine".to_string());
    record.add_move("wQ".to_string(), Hex::new(0, 0));

    let state = session.health_check().await;
    tracing::info!("connection state: {:?}", state);
    if let Some(id) = session.engine_id() {
        tracing::info!("engine identified itself: {}", id);
    }

    match session
        .best_move(&record, &TrustEngine, SearchLimit::Depth(3))
        .await?
    {
        BestMove::Move { mutation, notation } => {
            println!("engine suggests: {notation} ({mutation:?})");
        }
        BestMove::Pass => println!("engine suggests passing"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let kind = args.next().unwrap_or_else(|| "tcp".to_string());
    let endpoint = match kind.as_str() {
        "tcp" => {
            let addr = args.next().unwrap_or_else(|| "127.0.0.1:9601".to_string());
            let (host, port) = addr
                .split_once(':')
                .ok_or_else(|| anyhow::anyhow!("expected host:port, got {addr}"))?;
            EngineEndpoint::Tcp {
                host: host.to_string(),
                port: port.parse()?,
            }
        }
        "process" => {
            let program = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("expected path to engine executable"))?;
            EngineEndpoint::Process {
                program,
                args: args.collect(),
            }
        }
        other => anyhow::bail!("unknown endpoint kind: {other}"),
    };

    match endpoint {
        EngineEndpoint::Tcp { host, port } => {
            run(TcpConnector {
                addr: format!("{host}:{port}"),
            })
            .await
        }
        EngineEndpoint::Process { program, args } => run(ProcessConnector { program, args }).await,
    }
}
