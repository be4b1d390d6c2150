//! Common Types Module
//!
//! 애플리케이션 전반에서 사용되는 공통 타입 정의
//!
//! 모든 배치 진입점은 BatchSummary를 반환한다: 기대 가능한 비즈니스 조건
//! (캡, 설정 꺼짐, 대상 없음)으로는 절대 에러를 던지지 않는다.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// API 응답 래퍼
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

/// 엔티티 1건 스킵 사유
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// 관련 설정이 꺼져 있거나 없음
    Disabled,
    /// total_invested == 0
    ZeroInvestment,
    /// 일일 상한 도달 (잔여 0)
    DailyCapReached,
    /// 원금 배수 상한 도달 (잔여 0)
    EarningCapReached,
    /// 같은 날 이미 처리됨
    AlreadyProcessedToday,
    /// 최근 지급 이력 존재 (주급 7일 가드)
    RecentlyPaid,
    /// 매핑되는 설정 값 없음 (주급 레벨 등)
    NoMatchingLevel,
    /// 조건 미달
    NotEligible,
    /// 이미 동일 이상 구간 수령
    AlreadyClaimed,
    /// 계산 결과 금액 ≤ 0
    ZeroAmount,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Disabled => "disabled",
            SkipReason::ZeroInvestment => "zero_investment",
            SkipReason::DailyCapReached => "daily_cap_reached",
            SkipReason::EarningCapReached => "earning_cap_reached",
            SkipReason::AlreadyProcessedToday => "already_processed_today",
            SkipReason::RecentlyPaid => "recently_paid",
            SkipReason::NoMatchingLevel => "no_matching_level",
            SkipReason::NotEligible => "not_eligible",
            SkipReason::AlreadyClaimed => "already_claimed",
            SkipReason::ZeroAmount => "zero_amount",
        }
    }
}

/// 배치 내 엔티티 1건의 처리 결과
#[derive(Debug, Clone, Serialize)]
pub struct BatchDetail {
    /// 대상 엔티티 (투자 id, 사용자 id 등)
    pub entity_id: Uuid,

    /// paid | skipped | failed
    pub outcome: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchDetail {
    pub fn paid(entity_id: Uuid, amount: f64) -> Self {
        Self {
            entity_id,
            outcome: "paid".to_string(),
            amount: Some(amount),
            skip_reason: None,
            error: None,
        }
    }

    pub fn skipped(entity_id: Uuid, reason: SkipReason) -> Self {
        Self {
            entity_id,
            outcome: "skipped".to_string(),
            amount: None,
            skip_reason: Some(reason),
            error: None,
        }
    }

    pub fn failed(entity_id: Uuid, error: String) -> Self {
        Self {
            entity_id,
            outcome: "failed".to_string(),
            amount: None,
            skip_reason: None,
            error: Some(error),
        }
    }
}

/// 배치 실행 요약
///
/// processed = successful + failed + skipped
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub success: bool,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub skipped: u64,
    pub total_amount: f64,
    pub skip_reasons: Vec<String>,
    pub details: Vec<BatchDetail>,
}

impl BatchSummary {
    pub fn new() -> Self {
        Self {
            success: true,
            processed: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            total_amount: 0.0,
            skip_reasons: Vec::new(),
            details: Vec::new(),
        }
    }

    /// 설정이 꺼져 있거나 없어서 아무것도 하지 않은 run
    pub fn disabled(reason: &str) -> Self {
        let mut summary = Self::new();
        summary.skip_reasons.push(reason.to_string());
        summary
    }

    pub fn record_paid(&mut self, entity_id: Uuid, amount: f64) {
        self.processed += 1;
        self.successful += 1;
        self.total_amount += amount;
        self.details.push(BatchDetail::paid(entity_id, amount));
    }

    pub fn record_skipped(&mut self, entity_id: Uuid, reason: SkipReason) {
        self.processed += 1;
        self.skipped += 1;
        let reason_str = reason.as_str().to_string();
        if !self.skip_reasons.contains(&reason_str) {
            self.skip_reasons.push(reason_str);
        }
        self.details.push(BatchDetail::skipped(entity_id, reason));
    }

    pub fn record_failed(&mut self, entity_id: Uuid, error: String) {
        self.processed += 1;
        self.failed += 1;
        self.details.push(BatchDetail::failed(entity_id, error));
    }
}

impl Default for BatchSummary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_counts() {
        let mut summary = BatchSummary::new();
        summary.record_paid(Uuid::new_v4(), 30.0);
        summary.record_paid(Uuid::new_v4(), 10.0);
        summary.record_skipped(Uuid::new_v4(), SkipReason::AlreadyProcessedToday);
        summary.record_skipped(Uuid::new_v4(), SkipReason::AlreadyProcessedToday);
        summary.record_failed(Uuid::new_v4(), "duplicate hash".to_string());

        assert_eq!(summary.processed, 5);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 1);
        assert!((summary.total_amount - 40.0).abs() < 1e-9);
        // 같은 사유는 한 번만 집계
        assert_eq!(summary.skip_reasons, vec!["already_processed_today"]);
    }

    #[test]
    fn test_disabled_summary() {
        let summary = BatchSummary::disabled("disabled");
        assert!(summary.success);
        assert_eq!(summary.processed, 0);
        assert_eq!(summary.skip_reasons, vec!["disabled"]);
    }
}
