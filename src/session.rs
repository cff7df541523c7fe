//! 전송 세션 (수신측)
//!
//! 순차 상태 머신:
//! `INIT → AWAITING_FILE_INFO → RECEIVING → RETRY_MISSING → DONE | FAILED`
//!
//! - 동시성 없음: 한 번에 하나의 수신만 대기
//! - 수신 타임아웃이 유일한 취소/생존 확인 수단
//! - 재전송 요청은 하나씩 동기적으로 (파이프라이닝 없음)

use std::collections::{BTreeSet, HashMap};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::{Path, PathBuf};

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::codec::{FileTransferDescriptor, Segment, SegmentNumber};
use crate::integrity;
use crate::loss::LossSimulator;
use crate::message::{ControlMessage, Frame};
use crate::stats::TransferStats;
use crate::{segment_count_for, Config, Error, Result, CHECKSUM_SIZE};

/// 세션 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    AwaitingFileInfo,
    Receiving,
    RetryMissing,
    Done,
    Failed,
}

/// 검증을 통과해 저장된 세그먼트
#[derive(Debug, Clone)]
struct ReceivedSegment {
    payload: Bytes,
    checksum: [u8; CHECKSUM_SIZE],
}

/// 메모리에 재조립된 파일
#[derive(Debug)]
pub struct ReceivedFile {
    pub descriptor: FileTransferDescriptor,
    pub data: Bytes,
    pub stats: TransferStats,
}

/// 디스크에 저장된 전송 결과
#[derive(Debug)]
pub struct TransferReport {
    pub descriptor: FileTransferDescriptor,
    pub output_path: PathBuf,
    pub stats: TransferStats,
}

/// 파일 수신 클라이언트
///
/// `request_file` 호출마다 새 소켓과 새 세션 상태를 사용하며 호출 사이에 공유하는
/// 전송 상태가 없음. 손실 시뮬레이터만 호출 사이에 유지됨.
pub struct FileClient {
    server_addr: SocketAddr,
    config: Config,
    loss: Option<LossSimulator>,
}

impl FileClient {
    /// 새 클라이언트 생성
    ///
    /// `config.loss_probability`가 있으면 확률 기반 손실 시뮬레이터 활성화
    pub fn new(server_addr: SocketAddr, config: Config) -> Result<Self> {
        config.validate()?;
        let loss = match config.loss_probability {
            Some(p) => {
                info!("손실 시뮬레이션 활성화: p={}", p);
                Some(LossSimulator::new(p)?)
            }
            None => None,
        };

        Ok(Self {
            server_addr,
            config,
            loss,
        })
    }

    /// 손실 시뮬레이터 지정
    pub fn with_loss_simulator(mut self, loss: LossSimulator) -> Self {
        self.loss = Some(loss);
        self
    }

    /// 손실 시뮬레이터 참조
    pub fn loss_simulator(&self) -> Option<&LossSimulator> {
        self.loss.as_ref()
    }

    /// 파일을 받아 `output_dir`에 저장
    ///
    /// 실패하면 출력 파일을 만들지 않음
    pub async fn request_file(
        &mut self,
        filename: &str,
        output_dir: &Path,
    ) -> Result<TransferReport> {
        let received = self.receive(filename).await?;

        let basename = Path::new(&received.descriptor.filename)
            .file_name()
            .ok_or_else(|| Error::MalformedRequest(format!("잘못된 파일 이름: {filename}")))?;
        let output_path = output_dir.join(basename);

        // 완성된 내용만 최종 경로에 보이도록 임시 파일에 쓴 뒤 이름 변경
        let mut part_name = basename.to_os_string();
        part_name.push(".part");
        let part_path = output_dir.join(part_name);

        tokio::fs::create_dir_all(output_dir).await?;
        tokio::fs::write(&part_path, &received.data).await?;
        tokio::fs::rename(&part_path, &output_path).await?;

        info!("파일 저장: {:?} ({} bytes)", output_path, received.data.len());

        Ok(TransferReport {
            descriptor: received.descriptor,
            output_path,
            stats: received.stats,
        })
    }

    /// 파일을 받아 메모리에서 재조립
    pub async fn receive(&mut self, filename: &str) -> Result<ReceivedFile> {
        let bind_ip: IpAddr = match self.server_addr {
            SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
            SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
        };
        let socket = UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await?;

        let session = TransferSession::new(
            socket,
            self.server_addr,
            filename,
            &self.config,
            self.loss.as_mut(),
        );
        session.run().await
    }
}

/// 요청 하나 동안만 존재하는 세션 상태
struct TransferSession<'a> {
    socket: UdpSocket,
    server_addr: SocketAddr,
    /// FILE_INFO를 보낸 주소 (이후 이 주소의 데이터그램만 수락)
    peer: SocketAddr,
    filename: String,
    config: &'a Config,
    loss: Option<&'a mut LossSimulator>,
    state: SessionState,
    received: HashMap<SegmentNumber, ReceivedSegment>,
    stats: TransferStats,
    buf: Vec<u8>,
}

impl<'a> TransferSession<'a> {
    fn new(
        socket: UdpSocket,
        server_addr: SocketAddr,
        filename: &str,
        config: &'a Config,
        loss: Option<&'a mut LossSimulator>,
    ) -> Self {
        Self {
            socket,
            server_addr,
            peer: server_addr,
            filename: filename.to_owned(),
            config,
            loss,
            state: SessionState::Init,
            received: HashMap::new(),
            stats: TransferStats::new(),
            buf: vec![0u8; config.recv_buffer_size],
        }
    }

    async fn run(mut self) -> Result<ReceivedFile> {
        info!("파일 요청: {} from {}", self.filename, self.server_addr);

        match self.drive().await {
            Ok((descriptor, data)) => {
                self.transition(SessionState::Done);
                info!("전송 완료: {}", self.stats.summary());
                Ok(ReceivedFile {
                    descriptor,
                    data,
                    stats: self.stats,
                })
            }
            Err(e) => {
                self.transition(SessionState::Failed);
                warn!("전송 실패 ({}): {} | {}", self.filename, e, self.stats.summary());
                Err(e)
            }
        }
    }

    async fn drive(&mut self) -> Result<(FileTransferDescriptor, Bytes)> {
        let descriptor = self.await_file_info().await?;

        self.receive_segments(&descriptor).await?;

        if self.received.len() < descriptor.segment_count as usize {
            self.retry_missing(&descriptor).await?;
        }

        let data = self.assemble(&descriptor)?;
        Ok((descriptor, data))
    }

    fn transition(&mut self, next: SessionState) {
        debug!("세션 상태: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// GET 전송 후 FILE_INFO 대기
    async fn await_file_info(&mut self) -> Result<FileTransferDescriptor> {
        self.transition(SessionState::AwaitingFileInfo);

        let get = ControlMessage::Get {
            filename: self.filename.clone(),
        };
        self.send(get, self.server_addr).await?;

        let deadline = Instant::now() + self.config.recv_timeout();
        loop {
            let Some((frame, from)) = self.recv_until(deadline).await? else {
                return Err(Error::Timeout { stage: "FILE_INFO" });
            };

            // 전용 포트 토폴로지에서는 응답 포트가 다를 수 있으므로 IP만 비교
            if from.ip() != self.server_addr.ip() {
                self.note_foreign(from, "FILE_INFO 대기 중");
                continue;
            }

            match frame {
                Frame::Control(ControlMessage::FileInfo {
                    filename,
                    file_size,
                    segment_count,
                }) if filename == self.filename => {
                    if segment_count as u64 != segment_count_for(file_size) {
                        return Err(Error::MalformedRequest(format!(
                            "FILE_INFO 세그먼트 수 불일치: size={file_size}, segment_count={segment_count}"
                        )));
                    }

                    // 서버가 보낸 크기로 메모리를 잡기 전에 수신측 상한 확인
                    if file_size > self.config.max_file_size {
                        return Err(Error::FileTooLarge {
                            filename,
                            size: file_size,
                            max: self.config.max_file_size,
                        });
                    }

                    let descriptor = FileTransferDescriptor {
                        filename,
                        file_size,
                        segment_count,
                    };
                    info!(
                        "FILE_INFO 수신: {} bytes, {} segments (peer {})",
                        file_size, segment_count, from
                    );

                    self.peer = from;
                    self.stats.segments_expected = segment_count;
                    self.received = HashMap::with_capacity((segment_count as usize).min(1024));
                    return Ok(descriptor);
                }
                Frame::Control(ControlMessage::Error { message }) => {
                    warn!("서버 에러: {}", message);
                    return Err(Error::ServerError(message));
                }
                _ => self.note_foreign(from, "FILE_INFO 대기 중"),
            }
        }
    }

    /// 초기 전송 수신 루프
    ///
    /// 맵이 가득 차거나, END_TRANSMISSION / ERROR 수신, 또는 수신 타임아웃 시 종료
    async fn receive_segments(&mut self, descriptor: &FileTransferDescriptor) -> Result<()> {
        self.transition(SessionState::Receiving);

        while self.received.len() < descriptor.segment_count as usize {
            let deadline = Instant::now() + self.config.recv_timeout();
            let Some((frame, from)) = self.recv_until(deadline).await? else {
                warn!(
                    "세그먼트 수신 타임아웃: {}/{}",
                    self.received.len(),
                    descriptor.segment_count
                );
                break;
            };

            if from != self.peer {
                self.note_foreign(from, "세그먼트 수신 중");
                continue;
            }

            match frame {
                Frame::Segment(segment) => {
                    self.ingest(segment, descriptor);
                }
                Frame::Control(ControlMessage::EndTransmission { filename })
                    if filename == self.filename =>
                {
                    info!(
                        "END_TRANSMISSION 수신: {}/{}",
                        self.received.len(),
                        descriptor.segment_count
                    );
                    break;
                }
                Frame::Control(ControlMessage::Error { message }) => {
                    warn!("서버 에러 (수신 중): {}", message);
                    break;
                }
                Frame::Control(other) => {
                    debug!("예상하지 못한 제어 메시지 무시: {}", other.keyword());
                    self.stats.foreign_datagrams += 1;
                }
            }
        }

        Ok(())
    }

    /// 누락 세그먼트마다 RETRANSMIT 한 번 + 응답 하나 대기
    async fn retry_missing(&mut self, descriptor: &FileTransferDescriptor) -> Result<()> {
        self.transition(SessionState::RetryMissing);

        let missing = self.missing_set(descriptor);
        warn!("누락 세그먼트 {}개: {:?}", missing.len(), missing);

        for segment_number in missing {
            let request = ControlMessage::Retransmit {
                filename: self.filename.clone(),
                segment_number,
            };
            self.send(request, self.peer).await?;
            self.stats.retransmit_requests += 1;
            debug!("RETRANSMIT 요청: {}", segment_number);

            let deadline = Instant::now() + self.config.retransmit_timeout();
            let reply = loop {
                match self.recv_until(deadline).await? {
                    Some((_, from)) if from != self.peer => {
                        self.note_foreign(from, "재전송 대기 중")
                    }
                    other => break other,
                }
            };

            match reply {
                None => {
                    self.stats.retransmit_timeouts += 1;
                    warn!("세그먼트 {} 재전송 타임아웃", segment_number);
                }
                Some((Frame::Segment(segment), _)) => {
                    let number = segment.number;
                    if self.ingest(segment, descriptor) {
                        self.stats.retransmit_recovered += 1;
                        info!("세그먼트 {} 재전송으로 복구", number);
                    }
                }
                Some((Frame::Control(ControlMessage::Error { message }), _)) => {
                    warn!("세그먼트 {} 재전송 거부: {}", segment_number, message);
                }
                Some((Frame::Control(other), _)) => {
                    debug!("재전송 응답 대신 제어 메시지: {}", other.keyword());
                    self.stats.foreign_datagrams += 1;
                }
            }
        }

        Ok(())
    }

    /// 분류 → 손실 시뮬레이션 → 검증 → 저장
    ///
    /// 저장했으면 true
    fn ingest(&mut self, segment: Segment, descriptor: &FileTransferDescriptor) -> bool {
        if segment.filename != self.filename {
            debug!("다른 파일의 세그먼트 무시: {}", segment.filename);
            self.stats.foreign_datagrams += 1;
            return false;
        }

        let Some(expected_len) = descriptor.expected_payload_len(segment.number) else {
            warn!("범위 밖 세그먼트 번호 무시: {}", segment.number);
            self.stats.foreign_datagrams += 1;
            return false;
        };

        if let Some(loss) = self.loss.as_deref_mut() {
            if loss.should_drop(segment.number) {
                info!("손실 시뮬레이션: 세그먼트 {} 버림", segment.number);
                self.stats.simulated_drops += 1;
                return false;
            }
        }

        if let Err(e) = integrity::verify_segment(&segment) {
            warn!("{}", e);
            self.stats.checksum_failures += 1;
            return false;
        }

        if segment.payload.len() != expected_len {
            warn!(
                "세그먼트 {} 길이 불일치: {} != {}",
                segment.number,
                segment.payload.len(),
                expected_len
            );
            self.stats.length_mismatches += 1;
            return false;
        }

        if let Some(existing) = self.received.get(&segment.number) {
            if existing.checksum != segment.checksum {
                warn!("세그먼트 {} 중복 수신 (내용 다름, 먼저 받은 것 유지)", segment.number);
            }
            self.stats.duplicate_segments += 1;
            return false;
        }

        debug!("세그먼트 {} 수신 및 검증", segment.number);
        self.stats.segments_received += 1;
        self.stats.bytes_received += segment.payload.len() as u64;
        self.received.insert(
            segment.number,
            ReceivedSegment {
                payload: segment.payload,
                checksum: segment.checksum,
            },
        );
        true
    }

    /// `{0 .. segment_count-1} \ keys(received)` (매번 새로 계산)
    fn missing_set(&self, descriptor: &FileTransferDescriptor) -> BTreeSet<SegmentNumber> {
        (0..descriptor.segment_count)
            .filter(|n| !self.received.contains_key(n))
            .collect()
    }

    /// 번호 순서대로 페이로드 연결
    fn assemble(&self, descriptor: &FileTransferDescriptor) -> Result<Bytes> {
        let missing = self.missing_set(descriptor);
        if !missing.is_empty() {
            return Err(Error::IncompleteTransfer {
                received: self.received.len() as u32,
                expected: descriptor.segment_count,
                missing: missing.into_iter().collect(),
            });
        }

        let mut data = BytesMut::with_capacity(descriptor.file_size as usize);
        for number in 0..descriptor.segment_count {
            let segment = self.received.get(&number).ok_or_else(|| {
                Error::InternalError(format!("세그먼트 {number}가 맵에 없음"))
            })?;
            data.extend_from_slice(&segment.payload);
        }

        if data.len() as u64 != descriptor.file_size {
            return Err(Error::IncompleteTransfer {
                received: self.received.len() as u32,
                expected: descriptor.segment_count,
                missing: Vec::new(),
            });
        }

        Ok(data.freeze())
    }

    async fn send(&self, msg: ControlMessage, to: SocketAddr) -> Result<()> {
        self.socket.send_to(&Frame::from(msg).to_bytes(), to).await?;
        Ok(())
    }

    /// 기한까지 해석 가능한 프레임 하나 수신 (기한 초과 시 None)
    async fn recv_until(&mut self, deadline: Instant) -> Result<Option<(Frame, SocketAddr)>> {
        loop {
            let recv = self.socket.recv_from(&mut self.buf);
            let (len, from) = match tokio::time::timeout_at(deadline, recv).await {
                Ok(result) => result?,
                Err(_) => return Ok(None),
            };

            match Frame::from_bytes(&self.buf[..len]) {
                Ok(frame) => return Ok(Some((frame, from))),
                Err(e) => {
                    warn!("해석할 수 없는 데이터그램 무시 ({}): {}", from, e);
                    self.stats.foreign_datagrams += 1;
                }
            }
        }
    }

    fn note_foreign(&mut self, from: SocketAddr, stage: &str) {
        debug!("예상하지 않은 데이터그램 무시 ({}): {}", stage, from);
        self.stats.foreign_datagrams += 1;
    }
}
