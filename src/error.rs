//! 에러 타입 정의

use thiserror::Error;

use crate::codec::SegmentNumber;

/// UDPFT 프로토콜 에러 타입
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO 에러: {0}")]
    Io(#[from] std::io::Error),

    #[error("파일을 찾을 수 없음: {filename}")]
    NotFound { filename: String },

    #[error("잘못된 요청 형식: {0}")]
    MalformedRequest(String),

    #[error("잘못된 프레임: {0}")]
    MalformedFrame(String),

    #[error("잘못된 세그먼트: {len} bytes, 최소 {needed} bytes 필요")]
    MalformedSegment { len: usize, needed: usize },

    #[error("체크섬 불일치: segment={segment_number}, expected {expected}, got {actual}")]
    ChecksumMismatch {
        segment_number: SegmentNumber,
        expected: String,
        actual: String,
    },

    #[error("유효하지 않은 세그먼트 번호: {segment_number}")]
    InvalidSegmentNumber { segment_number: SegmentNumber },

    #[error("파일이 너무 큼: {filename} ({size} bytes, 최대 {max} bytes)")]
    FileTooLarge { filename: String, size: u64, max: u64 },

    #[error("페이로드가 너무 큼: {len} bytes (최대 {max} bytes)")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("타임아웃: {stage}")]
    Timeout { stage: &'static str },

    #[error("불완전한 전송: {received}/{expected} 세그먼트, 누락 {missing:?}")]
    IncompleteTransfer {
        received: u32,
        expected: u32,
        missing: Vec<SegmentNumber>,
    },

    #[error("서버 에러: {0}")]
    ServerError(String),

    #[error("유효하지 않은 설정: {0}")]
    InvalidConfig(String),

    #[error("내부 에러: {0}")]
    InternalError(String),
}

/// Result 타입 별칭
pub type Result<T> = std::result::Result<T, Error>;
