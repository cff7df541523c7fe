//! 파일 세그먼트 소스 (송신측)
//!
//! 요청마다 파일을 새로 열어 `MAX_PAYLOAD_SIZE` 단위로 읽음.
//! 순차 읽기 (초기 전송) 와 오프셋 직접 읽기 (단일 세그먼트 재전송) 지원.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::codec::{FileTransferDescriptor, SegmentNumber};
use crate::{Error, Result, MAX_PAYLOAD_SIZE};

/// 루트 디렉터리 아래로 파일 이름 해석
///
/// 단일 일반 경로 요소만 허용 (`..`, 절대 경로, 하위 디렉터리 거부)
pub fn resolve(root: &Path, filename: &str) -> Result<PathBuf> {
    let mut components = Path::new(filename).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(name)), None) => Ok(root.join(name)),
        _ => Err(Error::NotFound {
            filename: filename.to_owned(),
        }),
    }
}

/// 파일 세그먼트 소스
#[derive(Debug)]
pub struct FileSegmentSource {
    file: File,
    descriptor: FileTransferDescriptor,
    next_number: SegmentNumber,
}

impl FileSegmentSource {
    /// 파일 열기
    pub async fn open(root: &Path, filename: &str) -> Result<Self> {
        let not_found = || Error::NotFound {
            filename: filename.to_owned(),
        };

        let path = resolve(root, filename)?;
        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err(not_found()),
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(not_found());
        }

        Ok(Self {
            file,
            descriptor: FileTransferDescriptor::new(filename, metadata.len())?,
            next_number: 0,
        })
    }

    /// 파일 메타데이터
    pub fn descriptor(&self) -> &FileTransferDescriptor {
        &self.descriptor
    }

    /// 다음 순차 슬라이스 (EOF면 None)
    pub async fn next_segment(&mut self) -> Result<Option<(SegmentNumber, Bytes)>> {
        let number = self.next_number;
        match self.read_slice().await? {
            Some(payload) => {
                self.next_number += 1;
                Ok(Some((number, payload)))
            }
            None => Ok(None),
        }
    }

    /// 지정 번호의 슬라이스 (범위 밖이면 None)
    pub async fn read_segment(&mut self, number: SegmentNumber) -> Result<Option<Bytes>> {
        let offset = number as u64 * MAX_PAYLOAD_SIZE as u64;
        self.file.seek(SeekFrom::Start(offset)).await?;
        self.read_slice().await
    }

    /// 현재 위치에서 최대 `MAX_PAYLOAD_SIZE` 바이트 읽기 (짧은 읽기는 EOF까지 계속)
    async fn read_slice(&mut self) -> Result<Option<Bytes>> {
        let mut buf = Vec::with_capacity(MAX_PAYLOAD_SIZE);
        (&mut self.file)
            .take(MAX_PAYLOAD_SIZE as u64)
            .read_to_end(&mut buf)
            .await?;

        if buf.is_empty() {
            return Ok(None);
        }
        Ok(Some(Bytes::from(buf)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_confines_to_root() {
        let root = Path::new("/srv/files");
        assert_eq!(resolve(root, "a.bin").unwrap(), root.join("a.bin"));

        for bad in ["../etc/passwd", "/etc/passwd", "sub/a.bin", "..", "."] {
            assert!(
                matches!(resolve(root, bad), Err(Error::NotFound { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_sequential_slices() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(dir.path().join("f.bin"), &data).unwrap();

        let mut source = FileSegmentSource::open(dir.path(), "f.bin").await.unwrap();
        assert_eq!(source.descriptor().file_size, 2500);
        assert_eq!(source.descriptor().segment_count, 3);

        let mut lens = Vec::new();
        let mut joined = Vec::new();
        while let Some((number, payload)) = source.next_segment().await.unwrap() {
            assert_eq!(number as usize, lens.len());
            lens.push(payload.len());
            joined.extend_from_slice(&payload);
        }
        assert_eq!(lens, vec![1024, 1024, 452]);
        assert_eq!(joined, data);
    }

    #[tokio::test]
    async fn test_exact_multiple_has_no_short_segment() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("f.bin"), vec![7u8; 3 * 1024]).unwrap();

        let mut source = FileSegmentSource::open(dir.path(), "f.bin").await.unwrap();
        assert_eq!(source.descriptor().segment_count, 3);

        let mut count = 0;
        while let Some((_, payload)) = source.next_segment().await.unwrap() {
            assert_eq!(payload.len(), MAX_PAYLOAD_SIZE);
            count += 1;
        }
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_read_segment_by_offset() {
        let dir = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 13) as u8).collect();
        std::fs::write(dir.path().join("f.bin"), &data).unwrap();

        let mut source = FileSegmentSource::open(dir.path(), "f.bin").await.unwrap();
        assert_eq!(source.read_segment(1).await.unwrap().unwrap().as_ref(), &data[1024..2048]);
        assert_eq!(source.read_segment(2).await.unwrap().unwrap().as_ref(), &data[2048..]);
        assert!(source.read_segment(3).await.unwrap().is_none());
        assert!(source.read_segment(u32::MAX).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = FileSegmentSource::open(dir.path(), "nope.bin").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { filename } if filename == "nope.bin"));
    }

    #[tokio::test]
    async fn test_directory_is_not_a_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let err = FileSegmentSource::open(dir.path(), "sub").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
