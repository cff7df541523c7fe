//! UDPFT 서버 (송신자)
//!
//! 루트 디렉터리의 파일을 UDP로 제공
//! - GET 요청에 FILE_INFO + 세그먼트 스트리밍으로 응답
//! - RETRANSMIT 요청에 단일 세그먼트로 응답
//!
//! 사용법:
//!   cargo run --release --bin udpft-server -- [OPTIONS]
//!
//! 예시:
//!   # 현재 디렉터리 제공
//!   cargo run --release --bin udpft-server -- --bind 0.0.0.0:8888
//!
//!   # 클라이언트별 전용 포트
//!   cargo run --release --bin udpft-server -- -r ./files --per-client-port

use std::net::SocketAddr;
use std::path::PathBuf;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use udpft::config::validate_port;
use udpft::{Config, Dispatcher, Topology, DEFAULT_PORT};

/// 서버 실행 인자
struct ServerArgs {
    bind_addr: SocketAddr,
    topology: Topology,
    config: Config,
}

impl Default for ServerArgs {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            topology: Topology::SharedPort,
            config: Config::default(),
        }
    }
}

const HELP: &str = r#"UDPFT Server - UDP File Transfer 서버

세그먼트 단위 MD5 검증 + 단일 세그먼트 재전송 파일 전송 서버

사용법:
  cargo run --release --bin udpft-server -- [OPTIONS]

옵션:
  -b, --bind <ADDR>         바인드 주소 (기본: 0.0.0.0:8888, 포트는 1024 초과)
  -r, --root <DIR>          파일 루트 디렉터리 (기본: .)
  --per-client-port         클라이언트마다 전용 포트로 응답
  --interval-us <N>         세그먼트 전송 간격 마이크로초 (기본: 10000)
  --max-in-flight <N>       동시 처리 요청 상한 (기본: 64)
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG로 조정 (기본: info)
"#;

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} 옵션에 값이 필요함"))
}

fn parse_args() -> Result<ServerArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut parsed = ServerArgs::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--bind" | "-b" => {
                parsed.bind_addr = value(&args, i, "--bind")?.parse()?;
                i += 1;
            }
            "--root" | "-r" => {
                parsed.config.root_dir = PathBuf::from(value(&args, i, "--root")?);
                i += 1;
            }
            "--per-client-port" => {
                parsed.topology = Topology::PortPerClient;
            }
            "--interval-us" => {
                parsed.config.segment_interval_us = value(&args, i, "--interval-us")?.parse()?;
                i += 1;
            }
            "--max-in-flight" => {
                parsed.config.max_in_flight_requests = value(&args, i, "--max-in-flight")?.parse()?;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{HELP}");
                std::process::exit(0);
            }
            other => return Err(format!("알 수 없는 옵션: {other}").into()),
        }
        i += 1;
    }

    validate_port(parsed.bind_addr.port())?;
    parsed.config.validate()?;
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 로깅 설정
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            error!("인자 오류: {}", e);
            eprintln!("{HELP}");
            std::process::exit(2);
        }
    };

    info!("UDPFT Server starting...");
    info!("Bind address: {}", args.bind_addr);
    info!("Root directory: {:?}", args.config.root_dir);
    info!("Segment interval: {} us", args.config.segment_interval_us);

    let dispatcher = Dispatcher::bind(args.bind_addr, args.config, args.topology).await?;
    let handle = dispatcher.handle()?;

    let server = tokio::spawn(dispatcher.run());

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    handle.stop();

    server.await??;
    Ok(())
}
