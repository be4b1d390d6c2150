//! Recurring Salary Processor
//!
//! 달성(achieved) 상태의 레벨 보상을 근거로 주 단위 급여를 지급한다.
//!
//! - 달성 후 20주까지만 지급
//! - 최근 7일 내 salary 지급이 있으면 건너뜀 (주 1회 가드)
//! - 레벨 키가 설정 테이블에 없으면 "사용자 레벨 이하의 최고 설정 레벨"로
//!   폴백

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::config::EngineSettings;
use crate::db::Database;
use crate::error::EngineError;
use crate::services::ledger::{self, AppendOutcome, NewLedgerEntry};
use crate::types::{BatchSummary, SkipReason};

/// 급여 지급 간 최소 간격 (일)
pub const SALARY_GUARD_DAYS: i64 = 7;

/// 레벨 → 급여액 해석 (순수 함수)
///
/// 정확한 키가 없으면 사용자 레벨 이하의 최고 설정 레벨로 폴백.
/// 그마저 없으면 None (지급 대상 아님).
pub fn resolve_salary_level(levels: &BTreeMap<i32, f64>, level: i32) -> Option<(i32, f64)> {
    levels
        .range(..=level)
        .next_back()
        .map(|(&lvl, &amount)| (lvl, amount))
}

pub struct SalaryProcessor {
    db: Arc<Database>,
}

impl SalaryProcessor {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// 주급 배치 (스케줄러 진입점)
    pub async fn process_weekly(
        &self,
        settings: &EngineSettings,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        if !settings.week_salary.enabled {
            return Ok(BatchSummary::disabled("disabled"));
        }
        if settings.week_salary.levels.is_empty() {
            return Ok(BatchSummary::disabled("not_found"));
        }

        // 시한이 지난 보상을 먼저 정리: expired는 지급 대상에서 빠진다
        let expired = self
            .db
            .expire_overdue_rewards(now)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;
        if expired > 0 {
            tracing::info!(count = expired, "rewards expired before salary run");
        }

        let candidates = self
            .db
            .salary_candidates(now)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let mut summary = BatchSummary::new();

        for candidate in candidates {
            let Some((level, amount)) =
                resolve_salary_level(&settings.week_salary.levels, candidate.level)
            else {
                summary.record_skipped(candidate.user_id, SkipReason::NoMatchingLevel);
                continue;
            };

            // 주 1회 가드: 순차 처리라 같은 run 안의 선행 지급도 관측된다
            let recently_paid = self
                .db
                .has_salary_within_days(candidate.user_id, SALARY_GUARD_DAYS, now)
                .await
                .map_err(|e| EngineError::Database(e.to_string()))?;
            if recently_paid {
                summary.record_skipped(candidate.user_id, SkipReason::RecentlyPaid);
                continue;
            }

            match self
                .pay_one(settings, candidate.user_id, candidate.reward_id, level, amount, now)
                .await
            {
                Ok(AppendOutcome::Recorded { amount, .. })
                | Ok(AppendOutcome::Capped { amount, .. }) => {
                    summary.record_paid(candidate.user_id, amount);
                }
                Ok(AppendOutcome::NotRecorded { reason }) => {
                    summary.record_skipped(candidate.user_id, reason);
                }
                Err(e) => {
                    tracing::warn!(
                        user = %candidate.user_id,
                        error = %e,
                        "salary payment failed"
                    );
                    summary.record_failed(candidate.user_id, e.to_string());
                }
            }
        }

        Ok(summary)
    }

    async fn pay_one(
        &self,
        settings: &EngineSettings,
        user_id: uuid::Uuid,
        reward_id: uuid::Uuid,
        level: i32,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<AppendOutcome, EngineError> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let outcome = ledger::append(
            &mut *tx,
            &settings.daily_capping,
            NewLedgerEntry {
                user_id,
                tx_type: "salary".to_string(),
                amount,
                source_type: Some("week_salary".to_string()),
                source_details: Some(json!({
                    "reward_id": reward_id,
                    "salary_level": level,
                })),
                related_user_id: None,
                related_investment_id: None,
                processed_by: "system".to_string(),
            },
            now,
        )
        .await?;

        tx.commit()
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn levels() -> BTreeMap<i32, f64> {
        BTreeMap::from([(1, 50.0), (3, 150.0), (5, 400.0)])
    }

    #[test]
    fn test_exact_level_match() {
        assert_eq!(resolve_salary_level(&levels(), 3), Some((3, 150.0)));
    }

    #[test]
    fn test_fallback_to_highest_below() {
        // 레벨 4 설정이 없으면 3으로 폴백
        assert_eq!(resolve_salary_level(&levels(), 4), Some((3, 150.0)));
        // 상한 너머도 최고 설정 레벨로
        assert_eq!(resolve_salary_level(&levels(), 9), Some((5, 400.0)));
    }

    #[test]
    fn test_below_lowest_level_not_paid() {
        assert_eq!(resolve_salary_level(&levels(), 0), None);
    }

    #[test]
    fn test_empty_table() {
        assert_eq!(resolve_salary_level(&BTreeMap::new(), 3), None);
    }
}
