//! UDPFT 클라이언트 (수신자)
//!
//! 서버에 파일을 요청하고 누락/손상 세그먼트를 재전송 요청으로 복구
//!
//! 사용법:
//!   cargo run --release --bin udpft-client -- <HOST> <PORT> <FILENAME> [OPTIONS]
//!
//! 예시:
//!   cargo run --release --bin udpft-client -- 127.0.0.1 8888 data.bin --output-dir ./out
//!
//!   # 30% 손실 시뮬레이션
//!   cargo run --release --bin udpft-client -- 127.0.0.1 8888 data.bin --simulate-loss --loss-probability 0.3

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use udpft::config::validate_port;
use udpft::{Config, FileClient};

/// 기본 손실 확률 (`--simulate-loss`만 지정했을 때)
const DEFAULT_LOSS_PROBABILITY: f64 = 0.1;

/// 클라이언트 실행 인자
struct ClientArgs {
    host: String,
    port: u16,
    filename: String,
    output_dir: PathBuf,
    timeout: Duration,
    simulate_loss: bool,
    loss_probability: f64,
}

const HELP: &str = r#"UDPFT Client - UDP File Transfer 클라이언트

사용법:
  cargo run --release --bin udpft-client -- <HOST> <PORT> <FILENAME> [OPTIONS]

인자:
  <HOST>                    서버 주소
  <PORT>                    서버 포트 (1024 초과)
  <FILENAME>                요청할 파일 이름

옵션:
  -o, --output-dir <DIR>    저장 디렉터리 (기본: .)
  -t, --timeout <SECS>      수신/재전송 타임아웃 초 (기본: 5.0)
  --simulate-loss           수신 세그먼트 손실 시뮬레이션 활성화
  --loss-probability <P>    손실 확률 0.0~1.0 (기본: 0.1)
  -h, --help                이 도움말 출력

로그 레벨은 RUST_LOG로 조정 (기본: info)
"#;

fn value<'a>(args: &'a [String], i: usize, flag: &str) -> Result<&'a str, String> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("{flag} 옵션에 값이 필요함"))
}

fn parse_args() -> Result<ClientArgs, Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();
    let mut positional = Vec::new();
    let mut output_dir = PathBuf::from(".");
    let mut timeout_secs = 5.0f64;
    let mut simulate_loss = false;
    let mut loss_probability = DEFAULT_LOSS_PROBABILITY;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--output-dir" | "-o" => {
                output_dir = PathBuf::from(value(&args, i, "--output-dir")?);
                i += 1;
            }
            "--timeout" | "-t" => {
                timeout_secs = value(&args, i, "--timeout")?.parse()?;
                i += 1;
            }
            "--simulate-loss" => {
                simulate_loss = true;
            }
            "--loss-probability" => {
                loss_probability = value(&args, i, "--loss-probability")?.parse()?;
                i += 1;
            }
            "--help" | "-h" => {
                println!("{HELP}");
                std::process::exit(0);
            }
            flag if flag.starts_with('-') => return Err(format!("알 수 없는 옵션: {flag}").into()),
            other => positional.push(other.to_owned()),
        }
        i += 1;
    }

    let [host, port, filename]: [String; 3] = positional
        .try_into()
        .map_err(|_| "HOST, PORT, FILENAME 인자가 필요함".to_string())?;

    let port: u16 = port.parse()?;
    validate_port(port)?;

    if !timeout_secs.is_finite() || timeout_secs <= 0.0 {
        return Err(format!("타임아웃은 양수여야 함: {timeout_secs}").into());
    }

    Ok(ClientArgs {
        host,
        port,
        filename,
        output_dir,
        timeout: Duration::from_secs_f64(timeout_secs),
        simulate_loss,
        loss_probability,
    })
}

async fn resolve(host: &str, port: u16) -> Result<SocketAddr, Box<dyn std::error::Error>> {
    tokio::net::lookup_host((host, port))
        .await?
        .next()
        .ok_or_else(|| format!("주소를 찾을 수 없음: {host}:{port}").into())
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

    let server_addr = resolve(&args.host, args.port).await?;

    let timeout_ms = args.timeout.as_millis() as u64;
    let config = Config {
        recv_timeout_ms: timeout_ms,
        retransmit_timeout_ms: timeout_ms,
        loss_probability: args.simulate_loss.then_some(args.loss_probability),
        ..Config::default()
    };

    info!("UDPFT Client starting...");
    info!("Server: {}", server_addr);
    info!("File: {} -> {:?}", args.filename, args.output_dir);

    let mut client = FileClient::new(server_addr, config)?;

    match client.request_file(&args.filename, &args.output_dir).await {
        Ok(report) => {
            info!("=== Transfer Complete ===");
            info!("Output: {:?}", report.output_path);
            info!("Size: {} bytes", report.descriptor.file_size);
            info!("{}", report.stats.summary());
            Ok(())
        }
        Err(e) => {
            error!("전송 실패: {}", e);
            std::process::exit(1);
        }
    }
}
