//! Level Commission Service
//!
//! 적립 이벤트 발생 시 구매자의 조상 체인을 걷어 레벨별 커미션을 지급한다.
//!
//! 지급 실패(캡, 제약 위반)는 해당 조상 1건에만 영향: 나머지 조상 지급은
//! 계속 진행된다.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::{Database, LevelConfig, User};
use crate::error::EngineError;
use crate::services::ledger::{self, AppendOutcome, NewLedgerEntry};
use crate::services::referral_tree::ReferralTreeService;
use crate::types::BatchSummary;

/// 레벨 설정 조회 상한 (설계 상수)
pub const MAX_COMMISSION_LEVELS: i32 = 10;

/// 계획된 커미션 지급 1건
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPayout {
    pub ancestor_id: Uuid,
    pub level: i32,
    pub amount: f64,
}

/// 조상 체인 + 레벨 설정 → 지급 계획 (순수 함수)
///
/// - ancestors는 가까운 순 (index 0 = 레벨 1)
/// - 비활성 조상은 지급만 건너뛰고 체인 진행은 계속
/// - 체인이 설정보다 짧으면 실제 길이까지만: 체인 너머로 지급하지 않음
pub fn plan_level_payouts(
    ancestors: &[User],
    configs: &[LevelConfig],
    base_amount: f64,
) -> Vec<PlannedPayout> {
    let by_level: BTreeMap<i32, f64> = configs
        .iter()
        .filter(|c| c.is_active)
        .map(|c| (c.level_number, c.commission_percentage))
        .collect();

    ancestors
        .iter()
        .enumerate()
        .filter_map(|(idx, ancestor)| {
            let level = idx as i32 + 1;
            let pct = by_level.get(&level)?;
            if !ancestor.is_active() {
                return None;
            }
            let amount = base_amount * pct / 100.0;
            if amount <= 0.0 {
                return None;
            }
            Some(PlannedPayout {
                ancestor_id: ancestor.id,
                level,
                amount,
            })
        })
        .collect()
}

pub struct LevelCommissionService {
    db: Arc<Database>,
    tree: ReferralTreeService,
}

impl LevelCommissionService {
    pub fn new(db: Arc<Database>) -> Self {
        let tree = ReferralTreeService::new(Arc::clone(&db));
        Self { db, tree }
    }

    /// 트리거 사용자의 적립 이벤트에 대한 레벨 커미션 분배
    pub async fn distribute(
        &self,
        settings: &EngineSettings,
        trigger_user_id: Uuid,
        base_amount: f64,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        if base_amount <= 0.0 || !base_amount.is_finite() {
            return Err(EngineError::Validation(format!(
                "commission base amount must be positive, got {}",
                base_amount
            )));
        }

        let configs = self
            .db
            .active_level_configs(MAX_COMMISSION_LEVELS)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        if configs.is_empty() {
            return Ok(BatchSummary::disabled("disabled"));
        }

        let max_level = configs.iter().map(|c| c.level_number).max().unwrap_or(0);
        let ancestors = self
            .tree
            .ancestor_chain(trigger_user_id, max_level as usize)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let payouts = plan_level_payouts(&ancestors, &configs, base_amount);

        let mut summary = BatchSummary::new();
        for payout in payouts {
            match self
                .pay_one(settings, trigger_user_id, &payout, now)
                .await
            {
                Ok(AppendOutcome::Recorded { amount, .. })
                | Ok(AppendOutcome::Capped { amount, .. }) => {
                    summary.record_paid(payout.ancestor_id, amount);
                }
                Ok(AppendOutcome::NotRecorded { reason }) => {
                    summary.record_skipped(payout.ancestor_id, reason);
                }
                // 조상 1건 실패는 로그 후 다음 조상으로
                Err(e) => {
                    tracing::warn!(
                        ancestor = %payout.ancestor_id,
                        level = payout.level,
                        error = %e,
                        "level commission payment failed"
                    );
                    summary.record_failed(payout.ancestor_id, e.to_string());
                }
            }
        }

        Ok(summary)
    }

    async fn pay_one(
        &self,
        settings: &EngineSettings,
        trigger_user_id: Uuid,
        payout: &PlannedPayout,
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
                user_id: payout.ancestor_id,
                tx_type: "level_commission".to_string(),
                amount: payout.amount,
                source_type: Some("level_commission".to_string()),
                source_details: Some(json!({
                    "level": payout.level,
                    "trigger_user_id": trigger_user_id,
                })),
                related_user_id: Some(trigger_user_id),
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

    /// 정기 실행 변형: 최근 24시간 적립이 있는 사용자 전체에 대해 분배
    pub async fn distribute_for_all_users(
        &self,
        settings: &EngineSettings,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        let since = now - Duration::hours(24);
        let earners = self
            .db
            .users_with_earnings_since(since)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let mut summary = BatchSummary::new();
        for (user_id, base_amount) in earners {
            match self.distribute(settings, user_id, base_amount, now).await {
                Ok(user_summary) => {
                    summary.processed += user_summary.processed;
                    summary.successful += user_summary.successful;
                    summary.failed += user_summary.failed;
                    summary.skipped += user_summary.skipped;
                    summary.total_amount += user_summary.total_amount;
                    for reason in user_summary.skip_reasons {
                        if !summary.skip_reasons.contains(&reason) {
                            summary.skip_reasons.push(reason);
                        }
                    }
                    summary.details.extend(user_summary.details);
                }
                Err(e) if e.is_fatal_to_run() => return Err(e),
                Err(e) => {
                    tracing::warn!(user_id = %user_id, error = %e, "commission run failed for user");
                    summary.record_failed(user_id, e.to_string());
                }
            }
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(active: bool) -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: format!("{}@example.com", Uuid::new_v4().simple()),
            referral_code: Uuid::new_v4().simple().to_string(),
            referrer_id: None,
            status: if active { "active" } else { "suspended" }.into(),
            role: "user".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn config(level: i32, pct: f64) -> LevelConfig {
        LevelConfig {
            level_number: level,
            commission_percentage: pct,
            is_active: true,
        }
    }

    #[test]
    fn test_two_ancestors_three_levels() {
        // 설정 {1:5%, 2:3%, 3:1%}, 기준 200, 조상 2명
        // → 레벨1 10, 레벨2 6, 체인 길이 너머 지급 없음
        let ancestors = vec![user(true), user(true)];
        let configs = vec![config(1, 5.0), config(2, 3.0), config(3, 1.0)];

        let payouts = plan_level_payouts(&ancestors, &configs, 200.0);

        assert_eq!(payouts.len(), 2);
        assert_eq!(payouts[0].level, 1);
        assert!((payouts[0].amount - 10.0).abs() < 1e-9);
        assert_eq!(payouts[1].level, 2);
        assert!((payouts[1].amount - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_inactive_ancestor_skipped_but_chain_continues() {
        let a1 = user(false);
        let a2 = user(true);
        let configs = vec![config(1, 5.0), config(2, 3.0)];

        let payouts = plan_level_payouts(&[a1, a2.clone()], &configs, 100.0);

        // 레벨 1은 비활성이라 건너뛰고 레벨 2는 정상 지급
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].ancestor_id, a2.id);
        assert_eq!(payouts[0].level, 2);
        assert!((payouts[0].amount - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_level_without_config_not_paid() {
        let ancestors = vec![user(true), user(true), user(true)];
        // 레벨 2 설정 없음
        let configs = vec![config(1, 5.0), config(3, 1.0)];

        let payouts = plan_level_payouts(&ancestors, &configs, 100.0);

        let levels: Vec<i32> = payouts.iter().map(|p| p.level).collect();
        assert_eq!(levels, vec![1, 3]);
    }

    #[test]
    fn test_inactive_config_excluded() {
        let ancestors = vec![user(true)];
        let mut cfg = config(1, 5.0);
        cfg.is_active = false;

        assert!(plan_level_payouts(&ancestors, &[cfg], 100.0).is_empty());
    }

    #[test]
    fn test_empty_chain_no_payouts() {
        let configs = vec![config(1, 5.0)];
        assert!(plan_level_payouts(&[], &configs, 100.0).is_empty());
    }
}
