//! 요청 디스패처 (송신측)
//!
//! - 바인딩된 UDP 엔드포인트에서 데이터그램 수신
//! - 데이터그램마다 독립 태스크에서 `Responder` 실행
//! - 동시 처리 요청 수는 세마포어로 제한 (포화 시 수신 루프가 대기)
//! - 두 가지 토폴로지: 단일 포트 공유 / 클라이언트별 전용 포트
//! - 전용 엔드포인트 수는 세마포어와 별개로 `max_client_endpoints`로 제한

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::net::UdpSocket;
use tokio::sync::{watch, Semaphore};
use tracing::{debug, info, warn};

use crate::responder::{Request, Responder};
use crate::stats::ServerStats;
use crate::{Config, Error, Result};

/// 응답 토폴로지
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Topology {
    /// 모든 응답을 수신 소켓에서 전송 (피어 주소로만 구분)
    #[default]
    SharedPort,

    /// 새 피어마다 전용 엔드포인트를 새 포트에 할당
    PortPerClient,
}

/// 클라이언트 전용 엔드포인트
struct ClientEndpoint {
    socket: Arc<UdpSocket>,
    last_activity: Mutex<Instant>,
    /// 처리 중인 요청 수 (0일 때만 정리 대상)
    active: AtomicUsize,
}

impl ClientEndpoint {
    fn new(socket: Arc<UdpSocket>) -> Self {
        Self {
            socket,
            last_activity: Mutex::new(Instant::now()),
            active: AtomicUsize::new(0),
        }
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn is_idle(&self, timeout: Duration) -> bool {
        self.active.load(Ordering::SeqCst) == 0 && self.last_activity.lock().elapsed() >= timeout
    }
}

/// 요청 처리 중 엔드포인트를 활성 상태로 유지
struct ActiveGuard(Arc<ClientEndpoint>);

impl ActiveGuard {
    fn new(endpoint: Arc<ClientEndpoint>) -> Self {
        endpoint.active.fetch_add(1, Ordering::SeqCst);
        Self(endpoint)
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.touch();
        self.0.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 수신 루프와 전용 엔드포인트 태스크가 공유하는 상태
struct Shared {
    config: Arc<Config>,
    stats: Arc<RwLock<ServerStats>>,
    permits: Arc<Semaphore>,
    endpoints: DashMap<SocketAddr, Arc<ClientEndpoint>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

/// 디스패처 제어 핸들 (외부에서 정지/통계 조회용)
#[derive(Clone)]
pub struct DispatcherHandle {
    local_addr: SocketAddr,
    stats: Arc<RwLock<ServerStats>>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl DispatcherHandle {
    /// 수신 루프 정지 (처리 중인 요청은 끝까지 진행)
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// 실행 중 여부
    pub fn is_running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// 바인딩된 주소
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 통계 반환
    pub fn stats(&self) -> ServerStats {
        self.stats.read().clone()
    }
}

/// 요청 디스패처
pub struct Dispatcher {
    socket: Arc<UdpSocket>,
    topology: Topology,
    shared: Arc<Shared>,
}

impl Dispatcher {
    /// 엔드포인트 바인딩
    pub async fn bind(bind_addr: SocketAddr, config: Config, topology: Topology) -> Result<Self> {
        config.validate()?;

        let socket = Arc::new(UdpSocket::bind(bind_addr).await?);
        let (shutdown_tx, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            permits: Arc::new(Semaphore::new(config.max_in_flight_requests)),
            config: Arc::new(config),
            stats: Arc::new(RwLock::new(ServerStats::new())),
            endpoints: DashMap::new(),
            shutdown_tx: Arc::new(shutdown_tx),
        });

        Ok(Self {
            socket,
            topology,
            shared,
        })
    }

    /// 바인딩된 주소
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// 제어 핸들 생성
    pub fn handle(&self) -> Result<DispatcherHandle> {
        Ok(DispatcherHandle {
            local_addr: self.local_addr()?,
            stats: self.shared.stats.clone(),
            shutdown_tx: self.shared.shutdown_tx.clone(),
        })
    }

    /// 메인 수신 루프 (정지 요청 전까지 실행)
    pub async fn run(self) -> Result<()> {
        let local_addr = self.local_addr()?;
        info!("UDPFT Dispatcher started on {} ({:?})", local_addr, self.topology);
        info!(
            "Max payload: {} bytes, max in-flight requests: {}",
            crate::MAX_PAYLOAD_SIZE,
            self.shared.config.max_in_flight_requests
        );

        let mut shutdown = self.shared.shutdown_tx.subscribe();
        let mut buf = vec![0u8; self.shared.config.recv_buffer_size];

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let (len, peer) = tokio::select! {
                _ = shutdown.changed() => break,
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok(received) => received,
                    Err(e) => {
                        warn!("수신 에러: {}", e);
                        continue;
                    }
                },
            };

            debug!("요청 수신: {} bytes from {}", len, peer);
            self.shared.stats.write().requests += 1;

            let datagram = buf[..len].to_vec();
            match self.topology {
                Topology::SharedPort => {
                    dispatch(&self.shared, datagram, peer, self.socket.clone(), None).await;
                }
                Topology::PortPerClient => match self.client_endpoint(peer).await {
                    Ok(Some(endpoint)) => {
                        let socket = endpoint.socket.clone();
                        dispatch(&self.shared, datagram, peer, socket, Some(endpoint)).await;
                    }
                    Ok(None) => {
                        dispatch(&self.shared, datagram, peer, self.socket.clone(), None).await;
                    }
                    Err(e) => {
                        warn!("전용 엔드포인트 생성 실패 ({}): {}", peer, e);
                        let responder = self.responder(self.socket.clone());
                        responder.send_error(peer, &e.to_string()).await;
                    }
                },
            }
        }

        self.shared.endpoints.clear();
        info!("Dispatcher stopped: {}", self.shared.stats.read().summary());
        Ok(())
    }

    fn responder(&self, socket: Arc<UdpSocket>) -> Responder {
        Responder::new(socket, self.shared.config.clone(), self.shared.stats.clone())
    }

    /// 피어 전용 엔드포인트 조회 또는 생성
    ///
    /// 전용 엔드포인트는 요청 허용량과 별도로 `max_client_endpoints`까지만 유지.
    /// 가득 차면 None (해당 피어는 수신 소켓에서 응답받음)
    async fn client_endpoint(&self, peer: SocketAddr) -> Result<Option<Arc<ClientEndpoint>>> {
        let existing = self.shared.endpoints.get(&peer).map(|entry| entry.value().clone());
        if let Some(endpoint) = existing {
            endpoint.touch();
            return Ok(Some(endpoint));
        }

        let limit = self.shared.config.max_client_endpoints;
        if self.shared.endpoints.len() >= limit {
            debug!("전용 엔드포인트 상한 도달 ({}), {}는 수신 소켓에서 응답", limit, peer);
            return Ok(None);
        }

        let bind_ip = self.socket.local_addr()?.ip();
        let socket = Arc::new(UdpSocket::bind(SocketAddr::new(bind_ip, 0)).await?);
        let endpoint_addr = socket.local_addr()?;
        let endpoint = Arc::new(ClientEndpoint::new(socket));

        self.shared.endpoints.insert(peer, endpoint.clone());
        self.shared.stats.write().client_endpoints += 1;
        info!("클라이언트 {} 전용 엔드포인트: {}", peer, endpoint_addr);

        tokio::spawn(serve_client_endpoint(self.shared.clone(), peer, endpoint.clone()));
        Ok(Some(endpoint))
    }
}

/// 전용 엔드포인트 수신 루프 (해당 피어의 요청만 처리, 유휴 시 정리)
async fn serve_client_endpoint(
    shared: Arc<Shared>,
    peer: SocketAddr,
    endpoint: Arc<ClientEndpoint>,
) {
    let mut shutdown = shared.shutdown_tx.subscribe();
    let mut buf = vec![0u8; shared.config.recv_buffer_size];
    let idle_timeout = shared.config.client_idle_timeout();

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let recv = tokio::time::timeout(idle_timeout, endpoint.socket.recv_from(&mut buf));
        let received = tokio::select! {
            _ = shutdown.changed() => break,
            result = recv => result,
        };

        match received {
            Err(_) => {
                if endpoint.is_idle(idle_timeout) {
                    info!("클라이언트 {} 전용 엔드포인트 유휴 정리", peer);
                    break;
                }
            }
            Ok(Err(e)) => warn!("전용 엔드포인트 수신 에러 ({}): {}", peer, e),
            Ok(Ok((_, from))) if from != peer => {
                debug!(
                    "전용 엔드포인트에 다른 피어의 데이터그램 무시: {} (owner {})",
                    from, peer
                );
            }
            Ok(Ok((len, _))) => {
                endpoint.touch();
                shared.stats.write().requests += 1;
                let socket = endpoint.socket.clone();
                dispatch(&shared, buf[..len].to_vec(), peer, socket, Some(endpoint.clone())).await;
            }
        }
    }

    shared
        .endpoints
        .remove_if(&peer, |_, current| Arc::ptr_eq(current, &endpoint));
}

/// 데이터그램 하나를 독립 태스크로 처리
///
/// 허용량이 가득 차면 여기서 대기. 처리 중 에러와 패닉은 모두 ERROR 응답으로 변환.
async fn dispatch(
    shared: &Arc<Shared>,
    datagram: Vec<u8>,
    peer: SocketAddr,
    reply_socket: Arc<UdpSocket>,
    endpoint: Option<Arc<ClientEndpoint>>,
) {
    let permit = match shared.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => return,
    };
    let responder = Responder::new(reply_socket, shared.config.clone(), shared.stats.clone());
    let guard = endpoint.map(ActiveGuard::new);

    tokio::spawn(async move {
        let _permit = permit;
        let _guard = guard;

        let request = match Request::parse(&datagram) {
            Ok(request) => request,
            Err(e) => {
                responder.send_error(peer, &e.to_string()).await;
                return;
            }
        };
        debug!("요청 처리: {:?} from {}", request, peer);

        let worker = responder.clone();
        let outcome = tokio::spawn(async move { worker.serve(request, peer).await }).await;

        if let Err(e) = outcome {
            warn!("요청 처리 태스크 실패 ({}): {}", peer, e);
            let error = Error::InternalError("요청 처리 중 예기치 않은 실패".into());
            responder.send_error(peer, &error.to_string()).await;
        }
    });
}
