//! 손실 시뮬레이터 (수신측 시험 장치)
//!
//! 디코딩은 됐지만 아직 검증 전인 데이터 세그먼트를 저장 전에 버림.
//! 제어 메시지에는 적용하지 않고 송신측에는 영향 없음.

use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::codec::SegmentNumber;
use crate::{Error, Result};

/// 손실 정책
#[derive(Debug)]
enum LossPolicy {
    /// 세그먼트마다 독립적으로 확률 p로 버림
    Probability { p: f64, rng: StdRng },

    /// 지정된 번호의 첫 도착만 버림 (결정적)
    DropOnce { pending: HashSet<SegmentNumber> },
}

/// 손실 시뮬레이터
#[derive(Debug)]
pub struct LossSimulator {
    policy: LossPolicy,
    dropped: u64,
}

impl LossSimulator {
    /// 확률 기반 시뮬레이터 (엔트로피 시드)
    pub fn new(p: f64) -> Result<Self> {
        Self::build(p, StdRng::from_entropy())
    }

    /// 재현 가능한 시드 지정
    pub fn with_seed(p: f64, seed: u64) -> Result<Self> {
        Self::build(p, StdRng::seed_from_u64(seed))
    }

    fn build(p: f64, rng: StdRng) -> Result<Self> {
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::InvalidConfig(format!("손실 확률은 0과 1 사이여야 함: {p}")));
        }
        Ok(Self {
            policy: LossPolicy::Probability { p, rng },
            dropped: 0,
        })
    }

    /// 나열된 세그먼트 번호를 각각 정확히 한 번씩 버림
    pub fn drop_once(numbers: impl IntoIterator<Item = SegmentNumber>) -> Self {
        Self {
            policy: LossPolicy::DropOnce {
                pending: numbers.into_iter().collect(),
            },
            dropped: 0,
        }
    }

    /// 이 세그먼트를 버릴지 결정
    pub fn should_drop(&mut self, number: SegmentNumber) -> bool {
        let drop = match &mut self.policy {
            LossPolicy::Probability { p, rng } => rng.gen::<f64>() < *p,
            LossPolicy::DropOnce { pending } => pending.remove(&number),
        };
        if drop {
            self.dropped += 1;
        }
        drop
    }

    /// 지금까지 버린 세그먼트 수
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probability_bounds() {
        let mut never = LossSimulator::with_seed(0.0, 1).unwrap();
        let mut always = LossSimulator::with_seed(1.0, 1).unwrap();

        for n in 0..1000 {
            assert!(!never.should_drop(n));
            assert!(always.should_drop(n));
        }
        assert_eq!(never.dropped(), 0);
        assert_eq!(always.dropped(), 1000);
    }

    #[test]
    fn test_seeded_rate_is_plausible() {
        let mut sim = LossSimulator::with_seed(0.1, 42).unwrap();
        let dropped = (0..10_000).filter(|&n| sim.should_drop(n)).count();
        assert!((700..1300).contains(&dropped), "dropped {dropped}");
    }

    #[test]
    fn test_drop_once() {
        let mut sim = LossSimulator::drop_once([1]);
        assert!(!sim.should_drop(0));
        assert!(sim.should_drop(1));
        assert!(!sim.should_drop(1));
        assert!(!sim.should_drop(2));
        assert_eq!(sim.dropped(), 1);
    }

    #[test]
    fn test_invalid_probability() {
        assert!(LossSimulator::new(-0.1).is_err());
        assert!(LossSimulator::new(1.01).is_err());
    }
}
