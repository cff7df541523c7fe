//! 전송 응답자 (송신측)
//!
//! - 요청 검증 후 FILE_INFO 응답
//! - 세그먼트 스트리밍 + END_TRANSMISSION
//! - 단일 세그먼트 재전송
//! - 표준 ERROR 응답
//!
//! 요청 사이에 공유하는 상태가 없음 (통계 카운터 제외). 모든 요청은 디스크의
//! 파일에서 다시 계산하므로 요청 사이에 파일이 바뀌면 그대로 반영됨.

use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use crate::codec::{Segment, SegmentNumber};
use crate::integrity;
use crate::message::{ControlMessage, Frame};
use crate::source::FileSegmentSource;
use crate::stats::ServerStats;
use crate::{Config, Error, Result};

/// 디스패처가 받아들이는 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get {
        filename: String,
    },
    Retransmit {
        filename: String,
        segment_number: SegmentNumber,
    },
}

impl Request {
    /// 데이터그램을 요청으로 해석
    ///
    /// GET / RETRANSMIT 외의 모든 것은 `MalformedRequest`
    pub fn parse(datagram: &[u8]) -> Result<Self> {
        let frame = Frame::from_bytes(datagram).map_err(|e| match e {
            Error::MalformedRequest(reason) => Error::MalformedRequest(reason),
            other => Error::MalformedRequest(other.to_string()),
        })?;

        match frame {
            Frame::Control(ControlMessage::Get { filename }) => Ok(Request::Get { filename }),
            Frame::Control(ControlMessage::Retransmit {
                filename,
                segment_number,
            }) => Ok(Request::Retransmit {
                filename,
                segment_number,
            }),
            Frame::Control(other) => Err(Error::MalformedRequest(format!(
                "요청이 아닌 제어 메시지: {}",
                other.keyword()
            ))),
            Frame::Segment(_) => Err(Error::MalformedRequest(
                "데이터 세그먼트는 요청이 아님".into(),
            )),
        }
    }
}

/// 전송 응답자
///
/// 응답 소켓과 설정만 들고 있으며 요청마다 복제해서 사용
#[derive(Clone)]
pub struct Responder {
    socket: Arc<UdpSocket>,
    config: Arc<Config>,
    stats: Arc<RwLock<ServerStats>>,
}

impl Responder {
    pub fn new(
        socket: Arc<UdpSocket>,
        config: Arc<Config>,
        stats: Arc<RwLock<ServerStats>>,
    ) -> Self {
        Self {
            socket,
            config,
            stats,
        }
    }

    /// 요청 하나 처리 (디스패치 경계)
    ///
    /// 처리 중 에러는 전파하지 않고 `ERROR <message>` 응답으로 변환
    pub async fn serve(&self, request: Request, peer: SocketAddr) {
        let result = match &request {
            Request::Get { filename } => {
                self.stats.write().get_requests += 1;
                self.handle_get(filename, peer).await
            }
            Request::Retransmit {
                filename,
                segment_number,
            } => {
                self.stats.write().retransmit_requests += 1;
                self.handle_retransmit(filename, *segment_number, peer).await
            }
        };

        if let Err(e) = result {
            warn!("요청 처리 실패 ({:?} from {}): {}", request, peer, e);
            self.send_error(peer, &e.to_string()).await;
        }
    }

    /// GET 처리: FILE_INFO 응답 후 세그먼트 스트리밍
    pub async fn handle_get(&self, filename: &str, peer: SocketAddr) -> Result<()> {
        self.check_filename(filename)?;

        let mut source = FileSegmentSource::open(&self.config.root_dir, filename).await?;
        let descriptor = source.descriptor().clone();

        if descriptor.file_size > self.config.max_file_size {
            return Err(Error::FileTooLarge {
                filename: filename.to_owned(),
                size: descriptor.file_size,
                max: self.config.max_file_size,
            });
        }

        info!(
            "파일 요청: {} ({} bytes, {} segments) from {}",
            filename, descriptor.file_size, descriptor.segment_count, peer
        );

        let file_info = ControlMessage::FileInfo {
            filename: descriptor.filename.clone(),
            file_size: descriptor.file_size,
            segment_count: descriptor.segment_count,
        };
        self.send_frame(&file_info.into(), peer).await?;

        // 수신측이 FILE_INFO를 처리할 시간
        tokio::time::sleep(self.config.file_info_delay()).await;

        self.stream_from(&mut source, peer).await
    }

    /// 파일 전체를 세그먼트로 스트리밍 후 END_TRANSMISSION 전송
    pub async fn stream_segments(&self, filename: &str, peer: SocketAddr) -> Result<()> {
        self.check_filename(filename)?;
        let mut source = FileSegmentSource::open(&self.config.root_dir, filename).await?;
        self.stream_from(&mut source, peer).await
    }

    async fn stream_from(&self, source: &mut FileSegmentSource, peer: SocketAddr) -> Result<()> {
        let filename = source.descriptor().filename.clone();
        let interval = self.config.segment_interval();
        let mut sent = 0u32;

        while let Some((number, payload)) = source.next_segment().await? {
            let checksum = integrity::digest(&payload);
            let segment = Segment::new(number, checksum, filename.as_str(), payload)?;
            self.send_segment(&segment, peer).await?;
            debug!("세그먼트 {} 전송 ({} bytes) -> {}", number, segment.payload.len(), peer);
            sent += 1;

            if !interval.is_zero() {
                tokio::time::sleep(interval).await;
            }
        }

        let end = ControlMessage::EndTransmission {
            filename: filename.clone(),
        };
        self.send_frame(&end.into(), peer).await?;

        info!("파일 {} 전송 완료: {} segments -> {}", filename, sent, peer);
        Ok(())
    }

    /// 단일 세그먼트 재전송
    pub async fn handle_retransmit(
        &self,
        filename: &str,
        segment_number: SegmentNumber,
        peer: SocketAddr,
    ) -> Result<()> {
        self.check_filename(filename)?;

        let mut source = FileSegmentSource::open(&self.config.root_dir, filename).await?;
        let payload = source
            .read_segment(segment_number)
            .await?
            .ok_or(Error::InvalidSegmentNumber { segment_number })?;

        let segment = Segment::new(segment_number, integrity::digest(&payload), filename, payload)?;
        self.send_segment(&segment, peer).await?;

        info!("세그먼트 {} 재전송: {} -> {}", segment_number, filename, peer);
        Ok(())
    }

    /// ERROR 응답 (fire-and-forget, 전송 실패는 로그만 남김)
    pub async fn send_error(&self, peer: SocketAddr, message: &str) {
        let error = ControlMessage::Error {
            message: message.to_owned(),
        };

        self.stats.write().error_replies += 1;
        match self.send_frame(&error.into(), peer).await {
            Ok(()) => warn!("ERROR 응답 -> {}: {}", peer, message),
            Err(e) => warn!("ERROR 응답 전송 실패 -> {}: {}", peer, e),
        }
    }

    fn check_filename(&self, filename: &str) -> Result<()> {
        if filename.len() > self.config.max_filename_length {
            return Err(Error::MalformedRequest(format!(
                "파일 이름이 너무 김: {} bytes (최대 {})",
                filename.len(),
                self.config.max_filename_length
            )));
        }
        Ok(())
    }

    async fn send_segment(&self, segment: &Segment, peer: SocketAddr) -> Result<()> {
        self.socket.send_to(&Frame::encode_segment(segment), peer).await?;

        let mut stats = self.stats.write();
        stats.segments_sent += 1;
        stats.bytes_sent += segment.payload.len() as u64;
        Ok(())
    }

    async fn send_frame(&self, frame: &Frame, peer: SocketAddr) -> Result<()> {
        self.socket.send_to(&frame.to_bytes(), peer).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn control(text: &str) -> Vec<u8> {
        let mut datagram = vec![1u8];
        datagram.extend_from_slice(text.as_bytes());
        datagram
    }

    #[test]
    fn test_parse_requests() {
        assert_eq!(
            Request::parse(&control("GET a.bin")).unwrap(),
            Request::Get {
                filename: "a.bin".into()
            }
        );
        assert_eq!(
            Request::parse(&control("RETRANSMIT a.bin 12")).unwrap(),
            Request::Retransmit {
                filename: "a.bin".into(),
                segment_number: 12
            }
        );
    }

    #[test]
    fn test_parse_rejects_non_requests() {
        for datagram in [
            control("FILE_INFO a.bin 1 1"),
            control("END_TRANSMISSION a.bin"),
            control("ERROR nope"),
            control("RETRANSMIT a.bin x"),
            control("HELLO"),
            b"GET a.bin".to_vec(),
            vec![],
        ] {
            assert!(matches!(Request::parse(&datagram), Err(Error::MalformedRequest(_))));
        }
    }

    #[tokio::test]
    async fn test_stream_segments_then_end() {
        let root = tempfile::tempdir().unwrap();
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 199) as u8).collect();
        std::fs::write(root.path().join("f.bin"), &data).unwrap();

        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let config = Arc::new(Config::local_test().with_root_dir(root.path()));
        let stats = Arc::new(RwLock::new(ServerStats::new()));
        let responder = Responder::new(socket, config, stats.clone());

        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        responder
            .stream_segments("f.bin", peer.local_addr().unwrap())
            .await
            .unwrap();

        let mut buf = vec![0u8; 4096];
        let mut joined = Vec::new();
        for expected in 0..3u32 {
            let (len, _) = tokio::time::timeout(Duration::from_secs(1), peer.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            match Frame::from_bytes(&buf[..len]).unwrap() {
                Frame::Segment(segment) => {
                    assert_eq!(segment.number, expected);
                    integrity::verify_segment(&segment).unwrap();
                    joined.extend_from_slice(&segment.payload);
                }
                other => panic!("unexpected frame: {other:?}"),
            }
        }
        assert_eq!(joined, data);

        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        assert_eq!(
            Frame::from_bytes(&buf[..len]).unwrap(),
            Frame::Control(ControlMessage::EndTransmission {
                filename: "f.bin".into()
            })
        );

        let stats = stats.read();
        assert_eq!(stats.segments_sent, 3);
        assert_eq!(stats.bytes_sent, 2500);
    }

    #[tokio::test]
    async fn test_stream_segments_missing_file() {
        let root = tempfile::tempdir().unwrap();
        let socket = Arc::new(UdpSocket::bind("127.0.0.1:0").await.unwrap());
        let config = Arc::new(Config::local_test().with_root_dir(root.path()));
        let responder = Responder::new(socket, config, Arc::new(RwLock::new(ServerStats::new())));

        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let err = responder.stream_segments("nope.bin", peer).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
