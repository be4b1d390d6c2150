//! ROI Accrual Processor
//!
//! 일일 배치: 활성 투자마다 부스트가 반영된 일일 수익을 계산해 원장에
//! 적립한다.
//!
//! # Interview Q&A
//!
//! Q: 왜 투자 1건 단위로 SQL 트랜잭션을 여는가?
//! A: 부분 실패 격리
//!    - 투자 1건의 판단-기록 시퀀스(잔액 읽기 → 캡 → leg 기록 → 투자 갱신)가
//!      원자적으로 묶이고, 실패하면 그 투자만 롤백된다
//!    - 배치 전체를 한 트랜잭션으로 묶으면 1건 실패가 전체를 되돌림
//!
//! Q: 서브 트랜잭션 합성은 왜 하는가?
//! A: 감사 현실성
//!    - 하루 수익을 단일 행으로 적지 않고 3~5건의 거래 leg로 기록
//!    - 부호 있는 금액의 합이 승인 총액과 정확히 일치 (마지막 leg가
//!      반올림 잔차를 흡수)
//!    - 개수 기준 60% 이상은 수익(profit) leg, 나머지는 손실(loss) leg

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::{Database, Investment, NewTransaction};
use crate::error::EngineError;
use crate::services::ledger::{self, CapDecision, AMOUNT_EPSILON};
use crate::types::{BatchSummary, SkipReason};

/// 활성화 후 추천 가입 집계 윈도우 (일)
pub const BOOST_WINDOW_DAYS: i64 = 7;

/// 부스트 구간: 윈도우 내 추천 가입 수 → 절대 퍼센트 포인트 가산
///
/// 추천인 수 기반 부스트가 단일 공식 모델이다. boosters 테이블 경로는
/// 관리 데이터로만 남아 있고 적립에는 관여하지 않는다.
pub fn boost_percentage(referral_count: i64) -> f64 {
    if referral_count >= 5 {
        2.0
    } else if referral_count >= 2 {
        1.0
    } else {
        0.0
    }
}

/// 일일 적립 계산 결과
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accrual {
    /// 플랜 배수 상한 잔여까지 감액된 지급액 (0이면 상한 도달)
    pub amount: f64,
    /// 이번 지급으로 배수 상한에 도달하는지 (투자 completed 전환)
    pub completes: bool,
}

/// 플랜 배수 상한 대비 일일 적립 계산 (순수 함수)
pub fn compute_accrual(
    invested_amount: f64,
    daily_percentage: f64,
    boost_percentage: f64,
    total_earned: f64,
    max_multiplier: f64,
) -> Accrual {
    let cap_total = invested_amount * max_multiplier;
    let headroom = cap_total - total_earned;
    if headroom <= AMOUNT_EPSILON {
        return Accrual {
            amount: 0.0,
            completes: true,
        };
    }

    let raw = invested_amount * (daily_percentage + boost_percentage) / 100.0;
    let amount = raw.min(headroom);

    Accrual {
        amount,
        completes: total_earned + amount + AMOUNT_EPSILON >= cap_total,
    }
}

/// 합성 leg 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegKind {
    Profit,
    Loss,
}

impl LegKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LegKind::Profit => "profit",
            LegKind::Loss => "loss",
        }
    }
}

/// 합성된 서브 트랜잭션 1건
#[derive(Debug, Clone)]
pub struct SubLeg {
    /// 부호 있는 금액 (loss는 음수)
    pub amount: f64,
    pub kind: LegKind,
    pub pair: &'static str,
}

const TRADE_PAIRS: [&str; 6] = [
    "BTC/USDT",
    "ETH/USDT",
    "SOL/USDT",
    "BNB/USDT",
    "XRP/USDT",
    "AVAX/USDT",
];

/// 승인 총액을 3~5건의 leg로 분해 (순수 함수, rng 주입)
///
/// 보장:
/// - 부호 있는 합 == total (마지막 leg가 반올림 잔차 흡수, 오차 ≤ 1e-6)
/// - profit leg 수 ≥ ceil(0.6 × n)
/// - profit leg는 양수, loss leg는 음수
pub fn synthesize_sub_legs(total: f64, rng: &mut impl Rng) -> Vec<SubLeg> {
    debug_assert!(total > 0.0);

    let n: usize = rng.gen_range(3..=5);
    let profit_count = ((n as f64) * 0.6).ceil() as usize;
    let loss_count = n - profit_count;

    // 손실 leg 먼저: 각각 총액의 5~20%
    let mut legs: Vec<SubLeg> = Vec::with_capacity(n);
    let mut loss_sum = 0.0;
    for _ in 0..loss_count {
        let magnitude = total * rng.gen_range(0.05..0.20);
        loss_sum += magnitude;
        legs.push(SubLeg {
            amount: -magnitude,
            kind: LegKind::Loss,
            pair: TRADE_PAIRS[rng.gen_range(0..TRADE_PAIRS.len())],
        });
    }

    // 수익 leg: 손실을 메우고 총액이 남도록 분배, 마지막 1건은 잔차 흡수용으로 남김
    let gross_profit = total + loss_sum;
    let weights: Vec<f64> = (0..profit_count)
        .map(|_| rng.gen_range(0.5..1.5))
        .collect();
    let weight_sum: f64 = weights.iter().sum();

    for weight in weights.iter().take(profit_count - 1) {
        let amount = gross_profit * weight / weight_sum;
        legs.push(SubLeg {
            amount,
            kind: LegKind::Profit,
            pair: TRADE_PAIRS[rng.gen_range(0..TRADE_PAIRS.len())],
        });
    }

    // 앞선 leg들을 섞은 뒤 흡수 leg를 마지막에 둔다
    for i in (1..legs.len()).rev() {
        let j = rng.gen_range(0..=i);
        legs.swap(i, j);
    }

    let partial: f64 = legs.iter().map(|l| l.amount).sum();
    legs.push(SubLeg {
        amount: total - partial,
        kind: LegKind::Profit,
        pair: TRADE_PAIRS[rng.gen_range(0..TRADE_PAIRS.len())],
    });

    legs
}

/// 투자 1건의 처리 결과
#[derive(Debug)]
enum InvestmentOutcome {
    Paid(f64),
    Skipped(SkipReason),
}

pub struct RoiProcessor {
    db: Arc<Database>,
}

impl RoiProcessor {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// 전체 활성 투자 일일 적립 (스케줄러 진입점)
    pub async fn process_all(
        &self,
        settings: &EngineSettings,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        if !settings.roi_processing.enabled {
            return Ok(BatchSummary::disabled("disabled"));
        }

        let today = now.date_naive();
        let investments = self
            .db
            .eligible_investments(today, settings.roi_processing.allow_duplicate_day)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        tracing::info!(count = investments.len(), "ROI batch starting");
        self.process_batch(settings, investments, now).await
    }

    /// 수동 변형: 특정 사용자 (같은 날 중복 가드 없음)
    pub async fn process_user(
        &self,
        settings: &EngineSettings,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        self.process_users(settings, &[user_id], now).await
    }

    /// 수동 변형: 사용자 목록 (같은 날 중복 가드 없음)
    pub async fn process_users(
        &self,
        settings: &EngineSettings,
        user_ids: &[Uuid],
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        if !settings.roi_processing.enabled {
            return Ok(BatchSummary::disabled("disabled"));
        }

        let today = now.date_naive();
        let investments = self
            .db
            .eligible_investments_for_users(user_ids, today)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        self.process_batch(settings, investments, now).await
    }

    /// 안정된 순서(생성 시각 오름차순)의 순차 처리.
    /// 상한을 소모하는 지급이 서로의 효과를 관측할 수 있어야 하므로
    /// 병렬화하지 않는다.
    async fn process_batch(
        &self,
        settings: &EngineSettings,
        investments: Vec<Investment>,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        let mut summary = BatchSummary::new();

        for investment in investments {
            match self.process_investment(settings, &investment, now).await {
                Ok(InvestmentOutcome::Paid(amount)) => {
                    summary.record_paid(investment.id, amount);
                }
                Ok(InvestmentOutcome::Skipped(reason)) => {
                    summary.record_skipped(investment.id, reason);
                }
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        investment = %investment.id,
                        user = %investment.user_id,
                        error = %e,
                        "ROI accrual failed, investment rolled back"
                    );
                    summary.record_failed(investment.id, e.to_string());
                }
            }
        }

        tracing::info!(
            processed = summary.processed,
            successful = summary.successful,
            skipped = summary.skipped,
            failed = summary.failed,
            total = summary.total_amount,
            "ROI batch finished"
        );

        Ok(summary)
    }

    async fn process_investment(
        &self,
        settings: &EngineSettings,
        investment: &Investment,
        now: DateTime<Utc>,
    ) -> Result<InvestmentOutcome, EngineError> {
        let plan = self
            .db
            .get_plan(investment.plan_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?
            .ok_or_else(|| {
                EngineError::NotFound(format!("investment plan {}", investment.plan_id))
            })?;

        if !plan.is_active {
            return Ok(InvestmentOutcome::Skipped(SkipReason::NotEligible));
        }

        let boost = if settings.roi_processing.is_booster {
            self.referral_boost(investment.user_id, now).await?
        } else {
            0.0
        };

        let max_multiplier = if plan.max_earning_multiplier > 0.0 {
            plan.max_earning_multiplier
        } else {
            settings.roi_processing.max_limit
        };

        let accrual = compute_accrual(
            investment.invested_amount,
            plan.daily_roi_percentage,
            boost,
            investment.total_earned,
            max_multiplier,
        );

        if accrual.amount <= AMOUNT_EPSILON {
            return Ok(InvestmentOutcome::Skipped(SkipReason::EarningCapReached));
        }

        // 투자 1건의 원자적 스코프
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let decision = ledger::authorize_earning(
            &mut *tx,
            &settings.daily_capping,
            investment.user_id,
            "roi_earning",
            accrual.amount,
            now,
        )
        .await?;

        let final_amount = match decision {
            CapDecision::Full(amount) => amount,
            CapDecision::Reduced { amount, .. } => amount,
            CapDecision::Zero(reason) => {
                // 트랜잭션은 드롭 시 롤백
                return Ok(InvestmentOutcome::Skipped(reason));
            }
        };

        let cap_total = investment.invested_amount * max_multiplier;
        let completes = investment.total_earned + final_amount + AMOUNT_EPSILON >= cap_total;

        Database::apply_investment_accrual(
            &mut *tx,
            investment.id,
            final_amount,
            now.date_naive(),
            completes,
        )
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;

        let mut rng = StdRng::from_entropy();
        let legs = synthesize_sub_legs(final_amount, &mut rng);
        let group_ref = Uuid::new_v4();

        for (index, leg) in legs.iter().enumerate() {
            let reference_id = ledger::new_reference_id();
            let tx_hash =
                ledger::hash_for(investment.user_id, "roi_earning", leg.amount, &reference_id);

            let row = NewTransaction {
                user_id: investment.user_id,
                tx_type: "roi_earning".to_string(),
                amount: leg.amount,
                fee_amount: 0.0,
                net_amount: leg.amount,
                currency: "USD".to_string(),
                status: "completed".to_string(),
                source_type: Some("roi".to_string()),
                source_details: Some(json!({
                    "investment_id": investment.id,
                    "group_ref": group_ref,
                    "leg_index": index,
                    "leg_kind": leg.kind.as_str(),
                    "pair": leg.pair,
                    "daily_percentage": plan.daily_roi_percentage,
                    "boost_percentage": boost,
                    "authorized_total": final_amount,
                })),
                related_user_id: None,
                related_investment_id: Some(investment.id),
                processed_by: "system".to_string(),
                reference_id,
                tx_hash,
                admin_notes: None,
            };

            ledger::append_authorized_leg(&mut *tx, &row).await?;
        }

        ledger::credit_authorized_total(&mut *tx, investment.user_id, "roi_earning", final_amount)
            .await?;

        if completes {
            tracing::info!(
                investment = %investment.id,
                user = %investment.user_id,
                "investment reached earning cap, marked completed"
            );
        }

        tx.commit()
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(InvestmentOutcome::Paid(final_amount))
    }

    /// 추천인 수 기반 부스트 계산
    ///
    /// 활성화 일자(해당 사용자의 가장 이른 투자 시작일)로부터 7일 안에
    /// 가입한 직추천 수로 구간을 정한다.
    async fn referral_boost(&self, user_id: Uuid, _now: DateTime<Utc>) -> Result<f64, EngineError> {
        let activation = self
            .db
            .earliest_investment_start(user_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let Some(activation_date) = activation else {
            return Ok(0.0);
        };

        let window_start = activation_date
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let window_end = window_start + Duration::days(BOOST_WINDOW_DAYS);

        let count = self
            .db
            .count_referrals_joined_between(user_id, window_start, window_end)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(boost_percentage(count))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boost_tiers() {
        assert_eq!(boost_percentage(0), 0.0);
        assert_eq!(boost_percentage(1), 0.0);
        assert_eq!(boost_percentage(2), 1.0);
        assert_eq!(boost_percentage(4), 1.0);
        assert_eq!(boost_percentage(5), 2.0);
        assert_eq!(boost_percentage(50), 2.0);
    }

    #[test]
    fn test_accrual_with_boost_within_cap() {
        // 투자 1000, 일 1% + 부스트 2% = 3% → 30
        // 기존 적립 1970, 상한 2000 (2×) → 30 그대로 지급, 상한 도달
        let accrual = compute_accrual(1000.0, 1.0, 2.0, 1970.0, 2.0);
        assert!((accrual.amount - 30.0).abs() < 1e-9);
        assert!(accrual.completes);
    }

    #[test]
    fn test_accrual_capped_to_headroom() {
        // 기존 적립 1990 → 잔여 10만 지급
        let accrual = compute_accrual(1000.0, 1.0, 2.0, 1990.0, 2.0);
        assert!((accrual.amount - 10.0).abs() < 1e-9);
        assert!(accrual.completes);
    }

    #[test]
    fn test_accrual_cap_already_reached() {
        let accrual = compute_accrual(1000.0, 1.0, 0.0, 2000.0, 2.0);
        assert_eq!(accrual.amount, 0.0);
        assert!(accrual.completes);
    }

    #[test]
    fn test_accrual_normal_day_not_completing() {
        let accrual = compute_accrual(1000.0, 1.0, 0.0, 0.0, 2.0);
        assert!((accrual.amount - 10.0).abs() < 1e-9);
        assert!(!accrual.completes);
    }

    #[test]
    fn test_synthesis_sums_exactly() {
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let total = 30.0 + (seed as f64) * 0.137;
            let legs = synthesize_sub_legs(total, &mut rng);

            let sum: f64 = legs.iter().map(|l| l.amount).sum();
            assert!(
                (sum - total).abs() <= 1e-6,
                "seed {}: sum {} != total {}",
                seed,
                sum,
                total
            );
        }
    }

    #[test]
    fn test_synthesis_leg_count_and_mix() {
        for seed in 0..200u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let legs = synthesize_sub_legs(100.0, &mut rng);

            let n = legs.len();
            assert!((3..=5).contains(&n), "seed {}: {} legs", seed, n);

            let profit_count = legs.iter().filter(|l| l.kind == LegKind::Profit).count();
            let min_profit = ((n as f64) * 0.6).ceil() as usize;
            assert!(
                profit_count >= min_profit,
                "seed {}: {}/{} profit legs",
                seed,
                profit_count,
                n
            );
        }
    }

    #[test]
    fn test_synthesis_signs_match_kind() {
        for seed in 0..50u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let legs = synthesize_sub_legs(42.5, &mut rng);

            for leg in &legs {
                match leg.kind {
                    LegKind::Profit => assert!(leg.amount > 0.0, "seed {}", seed),
                    LegKind::Loss => assert!(leg.amount < 0.0, "seed {}", seed),
                }
            }
        }
    }

    #[test]
    fn test_synthesis_small_amount() {
        // 상한 잔여가 아주 작아도 합성은 정확해야 함
        let mut rng = StdRng::seed_from_u64(7);
        let legs = synthesize_sub_legs(0.01, &mut rng);
        let sum: f64 = legs.iter().map(|l| l.amount).sum();
        assert!((sum - 0.01).abs() <= 1e-6);
    }
}
