//! 프로토콜 설정

use std::path::PathBuf;
use std::time::Duration;

use crate::{Error, Result};

/// 특권 포트 상한 (이 값 이하 포트는 거부)
pub const PRIVILEGED_PORT_MAX: u16 = 1024;

/// UDPFT 설정
#[derive(Debug, Clone)]
pub struct Config {
    /// 송신측이 파일을 찾는 루트 디렉터리
    pub root_dir: PathBuf,

    /// 세그먼트 전송 간격 (마이크로초)
    /// 로컬 버퍼 넘침 방지용 스로틀링이며 혼잡제어가 아님
    pub segment_interval_us: u64,

    /// FILE_INFO 응답 후 세그먼트 스트리밍 시작 전 대기 (밀리초)
    pub file_info_delay_ms: u64,

    /// 수신 대기 타임아웃 (밀리초)
    pub recv_timeout_ms: u64,

    /// 재전송 응답 대기 타임아웃 (밀리초)
    pub retransmit_timeout_ms: u64,

    /// 동시 처리 요청 상한
    pub max_in_flight_requests: usize,

    /// 수신 버퍼 크기
    pub recv_buffer_size: usize,

    /// 전송 가능한 최대 파일 크기 (바이트)
    pub max_file_size: u64,

    /// 최대 파일 이름 길이 (바이트)
    pub max_filename_length: usize,

    /// 클라이언트 전용 엔드포인트 유휴 타임아웃 (밀리초)
    pub client_idle_timeout_ms: u64,

    /// 동시에 유지하는 클라이언트 전용 엔드포인트 상한
    /// 가득 차면 새 피어는 수신 소켓에서 응답받음
    pub max_client_endpoints: usize,

    /// 손실 시뮬레이션 확률 (None이면 비활성)
    pub loss_probability: Option<f64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("."),
            segment_interval_us: 10_000,          // 10ms
            file_info_delay_ms: 100,
            recv_timeout_ms: 5000,                // 5초
            retransmit_timeout_ms: 5000,
            max_in_flight_requests: 64,
            recv_buffer_size: 65535,
            max_file_size: 100 * 1024 * 1024,     // 100MB
            max_filename_length: 255,
            client_idle_timeout_ms: 30_000,
            max_client_endpoints: 256,
            loss_probability: None,
        }
    }
}

impl Config {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 루트 디렉터리 지정
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    pub fn segment_interval(&self) -> Duration {
        Duration::from_micros(self.segment_interval_us)
    }

    pub fn file_info_delay(&self) -> Duration {
        Duration::from_millis(self.file_info_delay_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    pub fn retransmit_timeout(&self) -> Duration {
        Duration::from_millis(self.retransmit_timeout_ms)
    }

    pub fn client_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.client_idle_timeout_ms)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.recv_timeout_ms == 0
            || self.retransmit_timeout_ms == 0
            || self.client_idle_timeout_ms == 0
        {
            return Err(Error::InvalidConfig("타임아웃은 0보다 커야 함".into()));
        }
        if self.max_in_flight_requests == 0 || self.max_client_endpoints == 0 {
            return Err(Error::InvalidConfig(
                "max_in_flight_requests / max_client_endpoints는 0보다 커야 함".into(),
            ));
        }
        if self.max_filename_length == 0 || self.max_filename_length > u16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max_filename_length 범위 오류: {}",
                self.max_filename_length
            )));
        }
        // 가장 큰 세그먼트 + 구분자 1바이트가 버퍼에 들어가야 함
        let largest_frame =
            1 + crate::SEGMENT_HEADER_SIZE + self.max_filename_length + crate::MAX_PAYLOAD_SIZE;
        if self.recv_buffer_size < largest_frame {
            return Err(Error::InvalidConfig(format!(
                "recv_buffer_size가 너무 작음: {} < {}",
                self.recv_buffer_size, largest_frame
            )));
        }
        if let Some(p) = self.loss_probability {
            if !(0.0..=1.0).contains(&p) {
                return Err(Error::InvalidConfig(format!("손실 확률은 0과 1 사이여야 함: {p}")));
            }
        }
        Ok(())
    }

    /// 루프백 테스트용 설정 (짧은 타임아웃, 최소 간격)
    pub fn local_test() -> Self {
        Self {
            segment_interval_us: 200,
            file_info_delay_ms: 20,
            recv_timeout_ms: 1000,
            retransmit_timeout_ms: 500,
            max_in_flight_requests: 16,
            client_idle_timeout_ms: 2000,
            max_client_endpoints: 16,
            ..Self::default()
        }
    }

    /// 불안정한 네트워크용 설정
    pub fn unstable_network() -> Self {
        Self {
            segment_interval_us: 20_000,          // 20ms
            file_info_delay_ms: 200,
            recv_timeout_ms: 15_000,
            retransmit_timeout_ms: 10_000,        // MAX_RETRANSMISSION_WAIT
            max_in_flight_requests: 32,
            client_idle_timeout_ms: 60_000,
            ..Self::default()
        }
    }
}

/// 포트 검증 (특권 포트 범위 거부)
pub fn validate_port(port: u16) -> Result<()> {
    if port <= PRIVILEGED_PORT_MAX {
        return Err(Error::InvalidConfig(format!(
            "포트는 {PRIVILEGED_PORT_MAX}보다 커야 함: {port}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        assert!(Config::default().validate().is_ok());
        assert!(Config::local_test().validate().is_ok());
        assert!(Config::unstable_network().validate().is_ok());
    }

    #[test]
    fn test_invalid_loss_probability() {
        let config = Config {
            loss_probability: Some(1.5),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_small_recv_buffer() {
        let config = Config {
            recv_buffer_size: 512,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_limits_rejected() {
        for config in [
            Config {
                max_client_endpoints: 0,
                ..Config::default()
            },
            Config {
                client_idle_timeout_ms: 0,
                ..Config::default()
            },
        ] {
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        }
    }

    #[test]
    fn test_port_validation() {
        assert!(validate_port(80).is_err());
        assert!(validate_port(1024).is_err());
        assert!(validate_port(1025).is_ok());
        assert!(validate_port(8888).is_ok());
    }
}
