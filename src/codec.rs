//! 세그먼트 코덱
//!
//! 데이터 세그먼트의 바이너리 레이아웃 인코딩/디코딩 (I/O 없음, 상태 없음)
//!
//! ```text
//! [segment_number:4][checksum:16][filename_length:2][payload_length:2][filename][payload]
//! ```
//!
//! 모든 정수는 빅엔디언. 체크섬은 실어 나르기만 하고 계산/검증은 `integrity` 담당.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{
    segment_count_for, Error, Result, CHECKSUM_SIZE, MAX_PAYLOAD_SIZE, SEGMENT_HEADER_SIZE,
};

/// 세그먼트 번호 (32비트, 0부터 시작)
pub type SegmentNumber = u32;

/// 데이터 세그먼트 (데이터그램 하나에 실리는 파일 조각)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 세그먼트 번호
    pub number: SegmentNumber,

    /// 페이로드의 MD5 다이제스트
    pub checksum: [u8; CHECKSUM_SIZE],

    /// 파일 이름
    pub filename: String,

    /// 실제 데이터
    pub payload: Bytes,
}

impl Segment {
    /// 새 세그먼트 생성
    ///
    /// 페이로드가 `MAX_PAYLOAD_SIZE`를 넘거나 파일 이름이 u16 길이를 넘으면 실패
    pub fn new(
        number: SegmentNumber,
        checksum: [u8; CHECKSUM_SIZE],
        filename: impl Into<String>,
        payload: Bytes,
    ) -> Result<Self> {
        let filename = filename.into();

        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }
        if filename.len() > u16::MAX as usize {
            return Err(Error::MalformedRequest(format!(
                "파일 이름이 너무 김: {} bytes",
                filename.len()
            )));
        }

        Ok(Self {
            number,
            checksum,
            filename,
            payload,
        })
    }

    /// 인코딩된 바이트 길이
    pub fn encoded_len(&self) -> usize {
        SEGMENT_HEADER_SIZE + self.filename.len() + self.payload.len()
    }

    /// 세그먼트를 버퍼에 인코딩
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(self.encoded_len());
        buf.put_u32(self.number);
        buf.put_slice(&self.checksum);
        buf.put_u16(self.filename.len() as u16);
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(self.filename.as_bytes());
        buf.put_slice(&self.payload);
    }

    /// 세그먼트를 바이트로 인코딩
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode(&mut buf);
        buf.freeze()
    }

    /// 바이트에서 세그먼트 디코딩
    ///
    /// 선언된 길이 뒤에 남는 바이트는 무시
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < SEGMENT_HEADER_SIZE {
            return Err(Error::MalformedSegment {
                len: bytes.len(),
                needed: SEGMENT_HEADER_SIZE,
            });
        }

        let mut header = &bytes[..SEGMENT_HEADER_SIZE];
        let number = header.get_u32();
        let mut checksum = [0u8; CHECKSUM_SIZE];
        header.copy_to_slice(&mut checksum);
        let filename_len = header.get_u16() as usize;
        let payload_len = header.get_u16() as usize;

        let needed = SEGMENT_HEADER_SIZE + filename_len + payload_len;
        if bytes.len() < needed {
            return Err(Error::MalformedSegment {
                len: bytes.len(),
                needed,
            });
        }

        let filename_end = SEGMENT_HEADER_SIZE + filename_len;
        let filename = std::str::from_utf8(&bytes[SEGMENT_HEADER_SIZE..filename_end])
            .map_err(|e| Error::MalformedFrame(format!("세그먼트 파일 이름이 UTF-8 아님: {e}")))?
            .to_owned();
        let payload = Bytes::copy_from_slice(&bytes[filename_end..needed]);

        Ok(Self {
            number,
            checksum,
            filename,
            payload,
        })
    }
}

/// 파일 전송 메타데이터 (GET 요청마다 한 번 생성, 전송 동안 불변)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTransferDescriptor {
    pub filename: String,
    pub file_size: u64,
    pub segment_count: u32,
}

impl FileTransferDescriptor {
    /// 파일 크기로부터 생성
    ///
    /// 세그먼트 수가 u32 범위를 넘으면 `FileTooLarge`
    pub fn new(filename: impl Into<String>, file_size: u64) -> Result<Self> {
        let filename = filename.into();
        let count = segment_count_for(file_size);
        let segment_count = u32::try_from(count).map_err(|_| Error::FileTooLarge {
            filename: filename.clone(),
            size: file_size,
            max: u32::MAX as u64 * MAX_PAYLOAD_SIZE as u64,
        })?;

        Ok(Self {
            filename,
            file_size,
            segment_count,
        })
    }

    /// 세그먼트 번호의 예상 페이로드 길이 (범위 밖이면 None)
    pub fn expected_payload_len(&self, number: SegmentNumber) -> Option<usize> {
        if number >= self.segment_count {
            return None;
        }
        let offset = number as u64 * MAX_PAYLOAD_SIZE as u64;
        Some((self.file_size - offset).min(MAX_PAYLOAD_SIZE as u64) as usize)
    }
}
