//! # UDPFT (UDP File Transfer)
//!
//! UDP 위에서 단일 파일을 신뢰성 있게 전달하는 애플리케이션 계층 프로토콜
//!
//! ## 핵심 특징
//! - **세그먼트 분할**: 파일을 1024바이트 세그먼트로 나누어 번호를 붙여 전송
//! - **무결성 검증**: 세그먼트마다 MD5 체크섬을 실어 보내고 수신측에서 재계산
//! - **단일 세그먼트 재전송**: 누락된 세그먼트를 하나씩 RETRANSMIT로 요청
//! - **명시적 프레이밍**: 모든 데이터그램 앞 1바이트로 제어/데이터 구분
//! - **무상태 송신자**: 요청마다 디스크의 파일에서 모든 것을 다시 계산
//! - **손실 시뮬레이터**: 재전송 경로를 결정적으로 시험하기 위한 수신측 장치

pub mod codec;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod integrity;
pub mod loss;
pub mod message;
pub mod responder;
pub mod session;
pub mod source;
pub mod stats;

pub use codec::{FileTransferDescriptor, Segment, SegmentNumber};
pub use config::Config;
pub use dispatcher::{Dispatcher, DispatcherHandle, Topology};
pub use error::{Error, Result};
pub use loss::LossSimulator;
pub use message::{ControlMessage, Frame, FrameKind};
pub use responder::Responder;
pub use session::{FileClient, ReceivedFile, SessionState, TransferReport};
pub use source::FileSegmentSource;
pub use stats::{ServerStats, TransferStats};

/// 세그먼트당 최대 페이로드 크기 (바이트)
///
/// 헤더를 더해도 일반적인 경로 MTU 아래에 머물도록 정한 값
pub const MAX_PAYLOAD_SIZE: usize = 1024;

/// 세그먼트 헤더 크기 (바이트): number(4) + checksum(16) + filename_len(2) + payload_len(2)
pub const SEGMENT_HEADER_SIZE: usize = 24;

/// 체크섬 길이 (MD5, 바이트)
pub const CHECKSUM_SIZE: usize = 16;

/// 기본 서버 포트
pub const DEFAULT_PORT: u16 = 8888;

/// `segment_count = ceil(file_size / MAX_PAYLOAD_SIZE)`
pub fn segment_count_for(file_size: u64) -> u64 {
    file_size.div_ceil(MAX_PAYLOAD_SIZE as u64)
}
