//! 프로토콜 메시지 정의
//!
//! 모든 데이터그램은 1바이트 구분자로 시작:
//! - `0x01`: 제어 메시지 (UTF-8 텍스트)
//! - `0x02`: 데이터 세그먼트 (`codec` 레이아웃)
//!
//! 페이로드 내용이 우연히 텍스트로 읽히는지에 의존하지 않음

use std::fmt;
use std::str::FromStr;

use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::{Segment, SegmentNumber};
use crate::{Error, Result};

/// 프레임 타입 (데이터그램 첫 바이트)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    /// 텍스트 제어 메시지
    Control = 1,

    /// 바이너리 데이터 세그먼트
    Segment = 2,
}

impl TryFrom<u8> for FrameKind {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(FrameKind::Control),
            2 => Ok(FrameKind::Segment),
            other => Err(Error::MalformedFrame(format!("알 수 없는 프레임 타입: {other:#04x}"))),
        }
    }
}

/// 제어 메시지
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// 파일 요청 (수신자 → 송신자)
    Get { filename: String },

    /// 파일 메타데이터 (송신자 → 수신자)
    FileInfo {
        filename: String,
        file_size: u64,
        segment_count: u32,
    },

    /// 단일 세그먼트 재전송 요청 (수신자 → 송신자)
    Retransmit {
        filename: String,
        segment_number: SegmentNumber,
    },

    /// 초기 전송 종료 알림 (송신자 → 수신자)
    EndTransmission { filename: String },

    /// 에러 응답 (송신자 → 수신자)
    Error { message: String },
}

impl ControlMessage {
    /// 키워드 반환 (로그용)
    pub fn keyword(&self) -> &'static str {
        match self {
            ControlMessage::Get { .. } => "GET",
            ControlMessage::FileInfo { .. } => "FILE_INFO",
            ControlMessage::Retransmit { .. } => "RETRANSMIT",
            ControlMessage::EndTransmission { .. } => "END_TRANSMISSION",
            ControlMessage::Error { .. } => "ERROR",
        }
    }
}

impl fmt::Display for ControlMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlMessage::Get { filename } => write!(f, "GET {filename}"),
            ControlMessage::FileInfo {
                filename,
                file_size,
                segment_count,
            } => write!(f, "FILE_INFO {filename} {file_size} {segment_count}"),
            ControlMessage::Retransmit {
                filename,
                segment_number,
            } => write!(f, "RETRANSMIT {filename} {segment_number}"),
            ControlMessage::EndTransmission { filename } => {
                write!(f, "END_TRANSMISSION {filename}")
            }
            ControlMessage::Error { message } => write!(f, "ERROR {message}"),
        }
    }
}

/// 파일 이름 토큰 검증 (비어 있지 않고 공백 없음)
fn filename_token(token: &str) -> Result<String> {
    if token.is_empty() || token.chars().any(char::is_whitespace) {
        return Err(Error::MalformedRequest(format!("잘못된 파일 이름: {token:?}")));
    }
    Ok(token.to_owned())
}

fn number_token<T: FromStr>(token: &str, field: &str) -> Result<T> {
    token
        .parse()
        .map_err(|_| Error::MalformedRequest(format!("{field}가 숫자가 아님: {token:?}")))
}

impl FromStr for ControlMessage {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let text = text.trim();
        let (keyword, rest) = text.split_once(' ').unwrap_or((text, ""));

        match keyword {
            "GET" => Ok(ControlMessage::Get {
                filename: filename_token(rest.trim())?,
            }),
            "FILE_INFO" => match rest.split(' ').collect::<Vec<_>>().as_slice() {
                [filename, size, count] => Ok(ControlMessage::FileInfo {
                    filename: filename_token(filename)?,
                    file_size: number_token(size, "file_size")?,
                    segment_count: number_token(count, "segment_count")?,
                }),
                _ => Err(Error::MalformedRequest(format!("FILE_INFO 형식 오류: {text:?}"))),
            },
            "RETRANSMIT" => match rest.split(' ').collect::<Vec<_>>().as_slice() {
                [filename, number] => Ok(ControlMessage::Retransmit {
                    filename: filename_token(filename)?,
                    segment_number: number_token(number, "segment_number")?,
                }),
                _ => Err(Error::MalformedRequest(format!("RETRANSMIT 형식 오류: {text:?}"))),
            },
            "END_TRANSMISSION" => Ok(ControlMessage::EndTransmission {
                filename: filename_token(rest.trim())?,
            }),
            "ERROR" => Ok(ControlMessage::Error {
                message: rest.trim().to_owned(),
            }),
            _ => Err(Error::MalformedRequest(format!("알 수 없는 제어 메시지: {text:?}"))),
        }
    }
}

/// 데이터그램 하나
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Control(ControlMessage),
    Segment(Segment),
}

impl Frame {
    /// 프레임 타입 반환
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Control(_) => FrameKind::Control,
            Frame::Segment(_) => FrameKind::Segment,
        }
    }

    /// 바이트로 직렬화
    pub fn to_bytes(&self) -> Bytes {
        match self {
            Frame::Control(msg) => {
                let text = msg.to_string();
                let mut buf = BytesMut::with_capacity(1 + text.len());
                buf.put_u8(FrameKind::Control as u8);
                buf.put_slice(text.as_bytes());
                buf.freeze()
            }
            Frame::Segment(segment) => Self::encode_segment(segment),
        }
    }

    /// 세그먼트를 복제 없이 데이터 프레임으로 직렬화
    pub fn encode_segment(segment: &Segment) -> Bytes {
        let mut buf = BytesMut::with_capacity(1 + segment.encoded_len());
        buf.put_u8(FrameKind::Segment as u8);
        segment.encode(&mut buf);
        buf.freeze()
    }

    /// 바이트에서 역직렬화
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (&first, body) = bytes
            .split_first()
            .ok_or_else(|| Error::MalformedFrame("빈 데이터그램".into()))?;

        match FrameKind::try_from(first)? {
            FrameKind::Control => {
                let text = std::str::from_utf8(body)
                    .map_err(|e| Error::MalformedFrame(format!("제어 메시지가 UTF-8 아님: {e}")))?;
                Ok(Frame::Control(text.parse()?))
            }
            FrameKind::Segment => Ok(Frame::Segment(Segment::decode(body)?)),
        }
    }
}

impl From<ControlMessage> for Frame {
    fn from(msg: ControlMessage) -> Self {
        Frame::Control(msg)
    }
}

impl From<Segment> for Frame {
    fn from(segment: Segment) -> Self {
        Frame::Segment(segment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CHECKSUM_SIZE;

    #[test]
    fn test_control_text_forms() {
        let msgs = [
            (ControlMessage::Get { filename: "a.txt".into() }, "GET a.txt"),
            (
                ControlMessage::FileInfo {
                    filename: "a.txt".into(),
                    file_size: 2500,
                    segment_count: 3,
                },
                "FILE_INFO a.txt 2500 3",
            ),
            (
                ControlMessage::Retransmit {
                    filename: "a.txt".into(),
                    segment_number: 1,
                },
                "RETRANSMIT a.txt 1",
            ),
            (
                ControlMessage::EndTransmission { filename: "a.txt".into() },
                "END_TRANSMISSION a.txt",
            ),
            (
                ControlMessage::Error {
                    message: "file not found: a.txt".into(),
                },
                "ERROR file not found: a.txt",
            ),
        ];

        for (msg, text) in msgs {
            assert_eq!(msg.to_string(), text);
            assert_eq!(text.parse::<ControlMessage>().unwrap(), msg);
        }
    }

    #[test]
    fn test_malformed_retransmit() {
        for text in [
            "RETRANSMIT a.txt",
            "RETRANSMIT a.txt one",
            "RETRANSMIT a.txt 1 2",
            "RETRANSMIT a.txt -1",
        ] {
            assert!(
                matches!(text.parse::<ControlMessage>(), Err(Error::MalformedRequest(_))),
                "{text} should be rejected"
            );
        }
    }

    #[test]
    fn test_malformed_get() {
        assert!("GET".parse::<ControlMessage>().is_err());
        assert!("GET ".parse::<ControlMessage>().is_err());
        assert!("GET two words".parse::<ControlMessage>().is_err());
        assert!("FETCH a.txt".parse::<ControlMessage>().is_err());
    }

    #[test]
    fn test_frame_discriminator() {
        let frame = Frame::from(ControlMessage::Get { filename: "x".into() });
        let bytes = frame.to_bytes();
        assert_eq!(bytes[0], FrameKind::Control as u8);
        assert_eq!(&bytes[1..], b"GET x");
        assert_eq!(Frame::from_bytes(&bytes).unwrap(), frame);
    }

    #[test]
    fn test_text_payload_stays_a_segment() {
        // 페이로드가 제어 메시지처럼 보여도 세그먼트로 해석
        let payload = Bytes::from_static(b"END_TRANSMISSION x");
        let segment = Segment::new(0, [0; CHECKSUM_SIZE], "x", payload).unwrap();
        let frame = Frame::from_bytes(&Frame::from(segment.clone()).to_bytes()).unwrap();
        assert_eq!(frame, Frame::Segment(segment));
    }

    #[test]
    fn test_bad_frames() {
        assert!(matches!(Frame::from_bytes(&[]), Err(Error::MalformedFrame(_))));
        assert!(matches!(Frame::from_bytes(b"GET x"), Err(Error::MalformedFrame(_))));
        assert!(matches!(
            Frame::from_bytes(&[1, 0xFF, 0xFE]),
            Err(Error::MalformedFrame(_))
        ));
        assert!(matches!(
            Frame::from_bytes(&[2, 0, 0]),
            Err(Error::MalformedSegment { .. })
        ));
    }
}
