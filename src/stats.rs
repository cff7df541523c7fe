//! 전송 통계

use std::time::{Duration, Instant};

/// 수신측 전송 통계 (세션 하나 단위)
#[derive(Debug, Clone)]
pub struct TransferStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 예상 세그먼트 수
    pub segments_expected: u32,

    /// 저장된 세그먼트 수
    pub segments_received: u32,

    /// 저장된 페이로드 바이트
    pub bytes_received: u64,

    /// 이미 받은 번호로 다시 온 세그먼트
    pub duplicate_segments: u64,

    /// 체크섬 불일치로 버린 세그먼트
    pub checksum_failures: u64,

    /// 체크섬은 맞지만 길이가 FILE_INFO와 맞지 않아 버린 세그먼트
    pub length_mismatches: u64,

    /// 손실 시뮬레이터가 버린 세그먼트
    pub simulated_drops: u64,

    /// 다른 주소/파일에서 온 데이터그램 또는 해석 불가 데이터그램
    pub foreign_datagrams: u64,

    /// 보낸 RETRANSMIT 요청 수
    pub retransmit_requests: u64,

    /// 재전송으로 복구된 세그먼트 수
    pub retransmit_recovered: u64,

    /// 재전송 응답 타임아웃 수
    pub retransmit_timeouts: u64,
}

impl TransferStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            segments_expected: 0,
            segments_received: 0,
            bytes_received: 0,
            duplicate_segments: 0,
            checksum_failures: 0,
            length_mismatches: 0,
            simulated_drops: 0,
            foreign_datagrams: 0,
            retransmit_requests: 0,
            retransmit_recovered: 0,
            retransmit_timeouts: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 처리율 (bytes/sec)
    pub fn throughput(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed == 0.0 {
            return 0.0;
        }
        self.bytes_received as f64 / elapsed
    }

    /// 초기 전송에서 잃은 비율
    pub fn loss_rate(&self) -> f64 {
        if self.segments_expected == 0 {
            return 0.0;
        }
        self.retransmit_requests as f64 / self.segments_expected as f64
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Elapsed: {:.2}s | Segments: {}/{} | Bytes: {} | Throughput: {:.2} KB/s | Loss: {:.2}% | Retransmits: {} ({} recovered) | Checksum failures: {} | Simulated drops: {}",
            self.elapsed().as_secs_f64(),
            self.segments_received,
            self.segments_expected,
            self.bytes_received,
            self.throughput() / 1024.0,
            self.loss_rate() * 100.0,
            self.retransmit_requests,
            self.retransmit_recovered,
            self.checksum_failures,
            self.simulated_drops,
        )
    }
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

/// 송신측 통계 (디스패처 수명 단위)
#[derive(Debug, Clone)]
pub struct ServerStats {
    /// 시작 시간
    pub start_time: Instant,

    /// 받은 요청 데이터그램 수
    pub requests: u64,

    /// GET 요청 수
    pub get_requests: u64,

    /// RETRANSMIT 요청 수
    pub retransmit_requests: u64,

    /// 보낸 세그먼트 수
    pub segments_sent: u64,

    /// 보낸 페이로드 바이트
    pub bytes_sent: u64,

    /// 보낸 ERROR 응답 수
    pub error_replies: u64,

    /// 생성된 클라이언트 전용 엔드포인트 수
    pub client_endpoints: u64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            requests: 0,
            get_requests: 0,
            retransmit_requests: 0,
            segments_sent: 0,
            bytes_sent: 0,
            error_replies: 0,
            client_endpoints: 0,
        }
    }

    /// 경과 시간
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// 통계 요약 문자열
    pub fn summary(&self) -> String {
        format!(
            "Uptime: {:.2}s | Requests: {} (GET {}, RETRANSMIT {}) | Segments sent: {} | Bytes: {} | Errors: {} | Client endpoints: {}",
            self.elapsed().as_secs_f64(),
            self.requests,
            self.get_requests,
            self.retransmit_requests,
            self.segments_sent,
            self.bytes_sent,
            self.error_replies,
            self.client_endpoints,
        )
    }
}

impl Default for ServerStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loss_rate() {
        let mut stats = TransferStats::new();
        assert_eq!(stats.loss_rate(), 0.0);

        stats.segments_expected = 4;
        stats.retransmit_requests = 1;
        assert!((stats.loss_rate() - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_summary_mentions_counts() {
        let mut stats = ServerStats::new();
        stats.requests = 3;
        stats.get_requests = 2;
        stats.retransmit_requests = 1;
        let summary = stats.summary();
        assert!(summary.contains("Requests: 3 (GET 2, RETRANSMIT 1)"));
    }
}
