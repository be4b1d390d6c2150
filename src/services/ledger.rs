//! Ledger Service
//!
//! 원장(append-only transactions 테이블)으로 들어가는 모든 적립의 단일 관문.
//!
//! # Interview Q&A
//!
//! Q: 캡 도달을 왜 에러로 던지지 않는가?
//! A: 캡은 기대 가능한 비즈니스 결과이지 실패가 아니다
//!    - throw/catch 제어 흐름 대신 AppendOutcome variant로 반환
//!    - Recorded / Capped / NotRecorded 세 결과를 호출자가 명시적으로 처리
//!    - 에러는 진짜 실패(검증 실패, 유니크 제약 위반)에만 사용
//!
//! Q: 캡 계산의 동시성 안전은?
//! A: 호출자가 연 SQL 트랜잭션 안에서 지갑 행을 FOR UPDATE로 읽는다.
//!    배치가 순차 처리라 실질 경합은 없지만, 같은 사용자에 대한
//!    read-then-write 경쟁은 행 잠금으로 차단된다.

use chrono::{DateTime, Utc};
use serde_json::json;
use sha3::{Digest, Sha3_256};
use sqlx::PgConnection;
use uuid::Uuid;

use crate::config::DailyCapping;
use crate::db::{Database, NewTransaction, Wallet};
use crate::error::EngineError;
use crate::types::SkipReason;

/// 부동소수점 잔여 허용 오차
pub const AMOUNT_EPSILON: f64 = 1e-6;

/// 적립성 거래 유형: 일일 상한 합산 대상
pub const EARNING_TYPES: &[&str] = &[
    "roi_earning",
    "level_commission",
    "upline_commission",
    "direct_bonus",
    "reward_bonus",
    "salary",
];

/// ROI 잔액 상한: roi_balance ≤ 2 × total_invested
const ROI_CAP_MULTIPLIER: f64 = 2.0;

/// 총 적립 상한: roi + commission + bonus ≤ 4 × total_invested
const TOTAL_CAP_MULTIPLIER: f64 = 4.0;

/// append 요청 (검증/캡 적용 전)
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub user_id: Uuid,
    pub tx_type: String,
    pub amount: f64,
    pub source_type: Option<String>,
    pub source_details: Option<serde_json::Value>,
    pub related_user_id: Option<Uuid>,
    pub related_investment_id: Option<Uuid>,
    pub processed_by: String,
}

/// append 결과: 캡은 variant, 에러 아님
#[derive(Debug, Clone)]
pub enum AppendOutcome {
    /// 요청 금액 전액 기록됨
    Recorded { id: Uuid, amount: f64 },
    /// 상한 잔여분만큼 감액 기록됨
    Capped {
        id: Uuid,
        amount: f64,
        original: f64,
        reason: SkipReason,
    },
    /// 기록할 금액 없음 (행 미생성)
    NotRecorded { reason: SkipReason },
}

impl AppendOutcome {
    /// 실제 기록된 금액 (미기록이면 0)
    pub fn recorded_amount(&self) -> f64 {
        match self {
            AppendOutcome::Recorded { amount, .. } => *amount,
            AppendOutcome::Capped { amount, .. } => *amount,
            AppendOutcome::NotRecorded { .. } => 0.0,
        }
    }

    pub fn was_written(&self) -> bool {
        !matches!(self, AppendOutcome::NotRecorded { .. })
    }
}

/// 캡 판정에 필요한 지갑 스냅샷
#[derive(Debug, Clone, Copy)]
pub struct WalletSnapshot {
    pub roi_balance: f64,
    pub commission_balance: f64,
    pub bonus_balance: f64,
    pub total_invested: f64,
}

impl From<&Wallet> for WalletSnapshot {
    fn from(w: &Wallet) -> Self {
        Self {
            roi_balance: w.roi_balance,
            commission_balance: w.commission_balance,
            bonus_balance: w.bonus_balance,
            total_invested: w.total_invested,
        }
    }
}

/// 캡 판정 결과 (순수 계산)
#[derive(Debug, Clone, PartialEq)]
pub enum CapDecision {
    Full(f64),
    Reduced {
        amount: f64,
        trimmed: f64,
        reason: SkipReason,
    },
    Zero(SkipReason),
}

pub fn is_earning_type(tx_type: &str) -> bool {
    EARNING_TYPES.contains(&tx_type)
}

/// 적립 금액 캡 판정: 순수 함수
///
/// 순서대로:
/// 1. total_invested == 0 → 거부
/// 2. 일일 상한 (enabled일 때): 오늘 완료 적립 합계 대비 잔여만큼 감액
/// 3. roi_earning: roi_balance ≤ 2× 서브캡
/// 4. 모든 적립 유형: roi+commission+bonus ≤ 4× 총캡
///    (4× 총캡을 전 유형에 적용해야 지갑 불변식이 어떤 지급 경로에서도 유지됨)
///
/// 감액은 있어도 증액은 절대 없다.
pub fn decide_earning_amount(
    daily_capping: &DailyCapping,
    wallet: WalletSnapshot,
    daily_earned_today: f64,
    tx_type: &str,
    requested: f64,
) -> CapDecision {
    if wallet.total_invested <= 0.0 {
        return CapDecision::Zero(SkipReason::ZeroInvestment);
    }

    let mut amount = requested;
    let mut reason = None;

    // 일일 상한
    if daily_capping.enabled && daily_capping.limit > 0.0 {
        let headroom = daily_capping.limit - daily_earned_today;
        if headroom <= AMOUNT_EPSILON {
            return CapDecision::Zero(SkipReason::DailyCapReached);
        }
        if amount > headroom {
            amount = headroom;
            reason = Some(SkipReason::DailyCapReached);
        }
    }

    // 원금 배수 상한
    let total_earning_balance =
        wallet.roi_balance + wallet.commission_balance + wallet.bonus_balance;
    let mut principal_headroom =
        TOTAL_CAP_MULTIPLIER * wallet.total_invested - total_earning_balance;

    if tx_type == "roi_earning" {
        let roi_headroom = ROI_CAP_MULTIPLIER * wallet.total_invested - wallet.roi_balance;
        principal_headroom = principal_headroom.min(roi_headroom);
    }

    if principal_headroom <= AMOUNT_EPSILON {
        return CapDecision::Zero(SkipReason::EarningCapReached);
    }
    if amount > principal_headroom {
        amount = principal_headroom;
        reason = Some(SkipReason::EarningCapReached);
    }

    if amount <= AMOUNT_EPSILON {
        return CapDecision::Zero(SkipReason::ZeroAmount);
    }

    match reason {
        None => CapDecision::Full(amount),
        Some(reason) => CapDecision::Reduced {
            amount,
            trimmed: requested - amount,
            reason,
        },
    }
}

/// 적립 유형 → 지갑 버킷 컬럼
fn earning_bucket(tx_type: &str) -> Option<&'static str> {
    match tx_type {
        "roi_earning" => Some("roi_balance"),
        "level_commission" | "upline_commission" | "direct_bonus" => Some("commission_balance"),
        "reward_bonus" | "salary" => Some("bonus_balance"),
        _ => None,
    }
}

/// 거래 해시 생성 (유니크 제약 대상)
fn transaction_hash(user_id: Uuid, tx_type: &str, amount: f64, reference_id: &str) -> String {
    let mut hasher = Sha3_256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(tx_type.as_bytes());
    hasher.update(format!("{:.6}", amount).as_bytes());
    hasher.update(reference_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// 원장 append: 지갑 잔액이 바뀌는 유일한 경로
///
/// 호출자가 연 SQL 트랜잭션(conn) 안에서 실행된다.
/// 검증 실패는 Validation, 유니크 충돌은 Constraint 에러로 해당 append만
/// 실패시키고, 캡은 AppendOutcome variant로 돌려준다.
pub async fn append(
    conn: &mut PgConnection,
    daily_capping: &DailyCapping,
    entry: NewLedgerEntry,
    now: DateTime<Utc>,
) -> Result<AppendOutcome, EngineError> {
    if entry.amount <= 0.0 || !entry.amount.is_finite() {
        return Err(EngineError::Validation(format!(
            "transaction amount must be positive, got {}",
            entry.amount
        )));
    }

    let mut amount = entry.amount;
    let mut capped = None;

    if is_earning_type(&entry.tx_type) {
        let wallet = Database::wallet_for_update(conn, entry.user_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("wallet for user {}", entry.user_id)))?;

        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .expect("midnight is always valid")
            .and_utc();
        let day_end = day_start + chrono::Duration::days(1);

        let daily_earned =
            Database::daily_completed_earnings(conn, entry.user_id, EARNING_TYPES, day_start, day_end)
                .await
                .map_err(|e| EngineError::Database(e.to_string()))?;

        match decide_earning_amount(
            daily_capping,
            WalletSnapshot::from(&wallet),
            daily_earned,
            &entry.tx_type,
            entry.amount,
        ) {
            CapDecision::Full(a) => amount = a,
            CapDecision::Reduced {
                amount: a,
                trimmed,
                reason,
            } => {
                amount = a;
                capped = Some((trimmed, reason));
            }
            CapDecision::Zero(reason) => {
                tracing::debug!(
                    user_id = %entry.user_id,
                    tx_type = %entry.tx_type,
                    requested = entry.amount,
                    reason = reason.as_str(),
                    "earning not recorded"
                );
                return Ok(AppendOutcome::NotRecorded { reason });
            }
        }
    }

    let reference_id = format!("TXN-{}", Uuid::new_v4().simple());
    let tx_hash = transaction_hash(entry.user_id, &entry.tx_type, amount, &reference_id);

    // 감액분은 감사 추적을 위해 payload와 admin_notes 양쪽에 남긴다
    let (source_details, admin_notes) = match &capped {
        Some((trimmed, reason)) => {
            let mut details = entry.source_details.clone().unwrap_or_else(|| json!({}));
            if let Some(obj) = details.as_object_mut() {
                obj.insert("original_amount".to_string(), json!(entry.amount));
                obj.insert("capped_residue".to_string(), json!(trimmed));
                obj.insert("cap_reason".to_string(), json!(reason.as_str()));
            }
            (
                Some(details),
                Some(format!(
                    "amount reduced from {:.6} to {:.6} ({})",
                    entry.amount,
                    amount,
                    reason.as_str()
                )),
            )
        }
        None => (entry.source_details.clone(), None),
    };

    let row = NewTransaction {
        user_id: entry.user_id,
        tx_type: entry.tx_type.clone(),
        amount,
        fee_amount: 0.0,
        net_amount: amount,
        currency: "USD".to_string(),
        status: "completed".to_string(),
        source_type: entry.source_type,
        source_details,
        related_user_id: entry.related_user_id,
        related_investment_id: entry.related_investment_id,
        processed_by: entry.processed_by,
        reference_id,
        tx_hash,
        admin_notes,
    };

    let id = Database::insert_transaction(conn, &row)
        .await
        .map_err(EngineError::from)?;

    if let Some(bucket) = earning_bucket(&entry.tx_type) {
        Database::credit_wallet(conn, entry.user_id, bucket, amount)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;
    }

    match capped {
        Some((_, reason)) => Ok(AppendOutcome::Capped {
            id,
            amount,
            original: entry.amount,
            reason,
        }),
        None => Ok(AppendOutcome::Recorded { id, amount }),
    }
}

/// 적립 총액 사전 승인: 행 기록 없이 캡 판정만 수행
///
/// ROI처럼 하나의 승인 총액을 여러 서브 트랜잭션으로 나눠 기록하는 경로에서
/// 사용한다. 같은 트랜잭션 안에서 지갑을 FOR UPDATE로 잠근 뒤 판정하므로
/// 이후의 분할 기록과 일관된다.
pub async fn authorize_earning(
    conn: &mut PgConnection,
    daily_capping: &DailyCapping,
    user_id: Uuid,
    tx_type: &str,
    amount: f64,
    now: DateTime<Utc>,
) -> Result<CapDecision, EngineError> {
    if amount <= 0.0 || !amount.is_finite() {
        return Err(EngineError::Validation(format!(
            "transaction amount must be positive, got {}",
            amount
        )));
    }

    let wallet = Database::wallet_for_update(conn, user_id)
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?
        .ok_or_else(|| EngineError::NotFound(format!("wallet for user {}", user_id)))?;

    let day_start = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always valid")
        .and_utc();
    let day_end = day_start + chrono::Duration::days(1);

    let daily_earned =
        Database::daily_completed_earnings(conn, user_id, EARNING_TYPES, day_start, day_end)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

    Ok(decide_earning_amount(
        daily_capping,
        WalletSnapshot::from(&wallet),
        daily_earned,
        tx_type,
        amount,
    ))
}

/// 사전 승인된 서브 트랜잭션 행 기록 (재판정 없음)
///
/// authorize_earning으로 총액이 승인된 뒤에만 호출할 것.
/// 서브 트랜잭션은 부호 있는 금액(손실 leg는 음수)을 가지며 합이 승인
/// 총액과 일치해야 한다: 합 검증은 호출자(ROI 프로세서) 책임.
pub async fn append_authorized_leg(
    conn: &mut PgConnection,
    row: &NewTransaction,
) -> Result<Uuid, EngineError> {
    Database::insert_transaction(conn, row)
        .await
        .map_err(EngineError::from)
}

/// 승인 총액만큼 지갑 버킷 적립 (leg 기록 후 1회)
pub async fn credit_authorized_total(
    conn: &mut PgConnection,
    user_id: Uuid,
    tx_type: &str,
    total: f64,
) -> Result<(), EngineError> {
    if let Some(bucket) = earning_bucket(tx_type) {
        Database::credit_wallet(conn, user_id, bucket, total)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;
    }
    Ok(())
}

/// 거래 해시/참조 id 생성 유틸 (leg 기록 경로에서 재사용)
pub fn new_reference_id() -> String {
    format!("TXN-{}", Uuid::new_v4().simple())
}

pub fn hash_for(user_id: Uuid, tx_type: &str, amount: f64, reference_id: &str) -> String {
    transaction_hash(user_id, tx_type, amount, reference_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(roi: f64, commission: f64, bonus: f64, invested: f64) -> WalletSnapshot {
        WalletSnapshot {
            roi_balance: roi,
            commission_balance: commission,
            bonus_balance: bonus,
            total_invested: invested,
        }
    }

    fn capping(limit: f64) -> DailyCapping {
        DailyCapping {
            enabled: true,
            limit,
        }
    }

    fn no_capping() -> DailyCapping {
        DailyCapping {
            enabled: false,
            limit: 0.0,
        }
    }

    #[test]
    fn test_zero_investment_rejected() {
        let decision = decide_earning_amount(
            &no_capping(),
            wallet(0.0, 0.0, 0.0, 0.0),
            0.0,
            "roi_earning",
            10.0,
        );
        assert_eq!(decision, CapDecision::Zero(SkipReason::ZeroInvestment));
    }

    #[test]
    fn test_within_all_caps_passes_full() {
        let decision = decide_earning_amount(
            &capping(500.0),
            wallet(100.0, 0.0, 0.0, 1000.0),
            50.0,
            "roi_earning",
            30.0,
        );
        assert_eq!(decision, CapDecision::Full(30.0));
    }

    #[test]
    fn test_daily_cap_partial_reduction() {
        // 오늘 이미 480 적립, 한도 500 → 잔여 20
        let decision = decide_earning_amount(
            &capping(500.0),
            wallet(0.0, 0.0, 0.0, 10_000.0),
            480.0,
            "level_commission",
            50.0,
        );
        match decision {
            CapDecision::Reduced {
                amount,
                trimmed,
                reason,
            } => {
                assert!((amount - 20.0).abs() < 1e-9);
                assert!((trimmed - 30.0).abs() < 1e-9);
                assert_eq!(reason, SkipReason::DailyCapReached);
            }
            other => panic!("expected Reduced, got {:?}", other),
        }
    }

    #[test]
    fn test_daily_cap_exhausted_rejects() {
        let decision = decide_earning_amount(
            &capping(500.0),
            wallet(0.0, 0.0, 0.0, 10_000.0),
            500.0,
            "roi_earning",
            10.0,
        );
        assert_eq!(decision, CapDecision::Zero(SkipReason::DailyCapReached));
    }

    #[test]
    fn test_roi_two_x_subcap() {
        // roi_balance 1990, invested 1000 → 2× 상한 2000, 잔여 10
        let decision = decide_earning_amount(
            &no_capping(),
            wallet(1990.0, 0.0, 0.0, 1000.0),
            0.0,
            "roi_earning",
            30.0,
        );
        match decision {
            CapDecision::Reduced { amount, reason, .. } => {
                assert!((amount - 10.0).abs() < 1e-9);
                assert_eq!(reason, SkipReason::EarningCapReached);
            }
            other => panic!("expected Reduced, got {:?}", other),
        }
    }

    #[test]
    fn test_roi_subcap_does_not_gate_commission() {
        // roi는 2×에 막혀도 커미션은 4× 총캡까지 허용
        let decision = decide_earning_amount(
            &no_capping(),
            wallet(2000.0, 0.0, 0.0, 1000.0),
            0.0,
            "level_commission",
            100.0,
        );
        assert_eq!(decision, CapDecision::Full(100.0));
    }

    #[test]
    fn test_four_x_aggregate_cap() {
        // roi 2000 + commission 1500 + bonus 400 = 3900, invested 1000 → 4× 상한 4000
        let decision = decide_earning_amount(
            &no_capping(),
            wallet(2000.0, 1500.0, 400.0, 1000.0),
            0.0,
            "reward_bonus",
            500.0,
        );
        match decision {
            CapDecision::Reduced {
                amount, trimmed, ..
            } => {
                assert!((amount - 100.0).abs() < 1e-9);
                assert!((trimmed - 400.0).abs() < 1e-9);
            }
            other => panic!("expected Reduced, got {:?}", other),
        }
    }

    #[test]
    fn test_aggregate_cap_exhausted() {
        let decision = decide_earning_amount(
            &no_capping(),
            wallet(2000.0, 1500.0, 500.0, 1000.0),
            0.0,
            "salary",
            50.0,
        );
        assert_eq!(decision, CapDecision::Zero(SkipReason::EarningCapReached));
    }

    #[test]
    fn test_never_increases_amount() {
        let decision = decide_earning_amount(
            &capping(10_000.0),
            wallet(0.0, 0.0, 0.0, 1000.0),
            0.0,
            "roi_earning",
            25.0,
        );
        assert_eq!(decision, CapDecision::Full(25.0));
    }

    #[test]
    fn test_hash_is_deterministic_per_reference() {
        let user = Uuid::new_v4();
        let h1 = transaction_hash(user, "roi_earning", 10.0, "TXN-a");
        let h2 = transaction_hash(user, "roi_earning", 10.0, "TXN-a");
        let h3 = transaction_hash(user, "roi_earning", 10.0, "TXN-b");
        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
        assert_eq!(h1.len(), 64);
    }

    #[test]
    fn test_earning_bucket_mapping() {
        assert_eq!(earning_bucket("roi_earning"), Some("roi_balance"));
        assert_eq!(earning_bucket("level_commission"), Some("commission_balance"));
        assert_eq!(earning_bucket("upline_commission"), Some("commission_balance"));
        assert_eq!(earning_bucket("salary"), Some("bonus_balance"));
        assert_eq!(earning_bucket("withdrawal"), None);
    }
}
