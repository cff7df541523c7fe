//! 세그먼트 무결성 (MD5)
//!
//! 우발적 손상 검출용이며 보안 보장이 아님

use md5::{Digest, Md5};

use crate::codec::{Segment, SegmentNumber};
use crate::{Error, Result, CHECKSUM_SIZE};

/// 페이로드 다이제스트 계산 (송신측)
pub fn digest(payload: &[u8]) -> [u8; CHECKSUM_SIZE] {
    let mut out = [0u8; CHECKSUM_SIZE];
    out.copy_from_slice(&Md5::digest(payload));
    out
}

/// 다이제스트 재계산 후 비교 (수신측)
pub fn verify(
    segment_number: SegmentNumber,
    payload: &[u8],
    expected: &[u8; CHECKSUM_SIZE],
) -> Result<()> {
    let actual = digest(payload);
    if &actual != expected {
        return Err(Error::ChecksumMismatch {
            segment_number,
            expected: hex::encode(expected),
            actual: hex::encode(actual),
        });
    }
    Ok(())
}

/// 세그먼트 검증
pub fn verify_segment(segment: &Segment) -> Result<()> {
    verify(segment.number, &segment.payload, &segment.checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[test]
    fn test_known_digest() {
        assert_eq!(hex::encode(digest(b"")), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(
            hex::encode(digest(b"The quick brown fox jumps over the lazy dog")),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_single_byte_corruption_detected() {
        let payload = vec![0x5Au8; 1024];
        let checksum = digest(&payload);
        assert!(verify(0, &payload, &checksum).is_ok());

        let mut corrupted = payload.clone();
        corrupted[513] ^= 0x01;
        let err = verify(4, &corrupted, &checksum).unwrap_err();
        assert!(matches!(err, Error::ChecksumMismatch { segment_number: 4, .. }));
    }

    #[test]
    fn test_verify_segment() {
        let payload = Bytes::from_static(b"segment payload");
        let segment = Segment::new(1, digest(&payload), "f", payload).unwrap();
        assert!(verify_segment(&segment).is_ok());
    }
}
