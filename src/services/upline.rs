//! Upline Qualification Distributor
//!
//! 트리거 사용자의 자손을 BFS로 내려가며, 레벨별 최소 직추천 수를 충족한
//! (qualified) 노드에게 정률 보상을 지급한다.
//!
//! 자격 미달 노드는 지급만 건너뛴다: 그 노드의 하위 탐색은 계속된다.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::{Database, User};
use crate::error::EngineError;
use crate::services::ledger::{self, AppendOutcome, NewLedgerEntry};
use crate::services::referral_tree::ReferralTreeService;
use crate::types::BatchSummary;

/// 레벨별 보상 설정
#[derive(Debug, Clone, Copy)]
pub struct UplineLevel {
    pub level: u32,
    pub percentage: f64,
    pub min_children: i64,
}

/// 기본 3레벨: 5%/2%/1%, 각 레벨 최소 직추천 15명
pub const DEFAULT_UPLINE_LEVELS: [UplineLevel; 3] = [
    UplineLevel {
        level: 1,
        percentage: 5.0,
        min_children: 15,
    },
    UplineLevel {
        level: 2,
        percentage: 2.0,
        min_children: 15,
    },
    UplineLevel {
        level: 3,
        percentage: 1.0,
        min_children: 15,
    },
];

/// 계획된 지급 1건 (자격 충족 노드만)
#[derive(Debug, Clone, PartialEq)]
pub struct UplinePayout {
    pub user_id: Uuid,
    pub level: u32,
    pub amount: f64,
    pub direct_children: i64,
}

/// BFS 결과 + 직추천 수 → 지급 계획 (순수 함수)
///
/// 자격: direct_children ≥ 해당 레벨의 min_children
/// 자격 미달 노드에는 어떤 지급도 생성되지 않는다.
pub fn plan_upline_rewards(
    descendants: &BTreeMap<u32, Vec<User>>,
    direct_counts: &HashMap<Uuid, i64>,
    levels: &[UplineLevel],
    base_amount: f64,
) -> Vec<UplinePayout> {
    let mut payouts = Vec::new();

    for cfg in levels {
        let Some(users) = descendants.get(&cfg.level) else {
            continue;
        };

        for user in users {
            let count = direct_counts.get(&user.id).copied().unwrap_or(0);
            if count < cfg.min_children {
                continue;
            }
            let amount = base_amount * cfg.percentage / 100.0;
            if amount <= 0.0 {
                continue;
            }
            payouts.push(UplinePayout {
                user_id: user.id,
                level: cfg.level,
                amount,
                direct_children: count,
            });
        }
    }

    payouts
}

pub struct UplineDistributor {
    db: Arc<Database>,
    tree: ReferralTreeService,
    levels: Vec<UplineLevel>,
}

impl UplineDistributor {
    pub fn new(db: Arc<Database>) -> Self {
        let tree = ReferralTreeService::new(Arc::clone(&db));
        Self {
            db,
            tree,
            levels: DEFAULT_UPLINE_LEVELS.to_vec(),
        }
    }

    pub fn with_levels(db: Arc<Database>, levels: Vec<UplineLevel>) -> Self {
        let tree = ReferralTreeService::new(Arc::clone(&db));
        Self { db, tree, levels }
    }

    /// 트리거 사용자 기준 자손 보상 분배
    ///
    /// 노드 1건의 지급 실패는 수집만 하고 전체 분배는 계속된다.
    pub async fn distribute(
        &self,
        settings: &EngineSettings,
        trigger_user_id: Uuid,
        base_amount: f64,
        now: DateTime<Utc>,
    ) -> Result<BatchSummary, EngineError> {
        if base_amount <= 0.0 || !base_amount.is_finite() {
            return Err(EngineError::Validation(format!(
                "upline base amount must be positive, got {}",
                base_amount
            )));
        }

        let max_level = self.levels.iter().map(|l| l.level).max().unwrap_or(0);
        let descendants = self
            .tree
            .descendants_by_level(trigger_user_id, max_level)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        // 레벨 순회 전에 직추천 수를 한 번씩만 계산
        let mut direct_counts: HashMap<Uuid, i64> = HashMap::new();
        for users in descendants.values() {
            for user in users {
                if let std::collections::hash_map::Entry::Vacant(entry) =
                    direct_counts.entry(user.id)
                {
                    let count = self
                        .tree
                        .direct_children_count(user.id)
                        .await
                        .map_err(|e| EngineError::Database(e.to_string()))?;
                    entry.insert(count);
                }
            }
        }

        let payouts =
            plan_upline_rewards(&descendants, &direct_counts, &self.levels, base_amount);

        let mut summary = BatchSummary::new();
        for payout in payouts {
            match self.pay_one(settings, trigger_user_id, &payout, now).await {
                Ok(AppendOutcome::Recorded { amount, .. })
                | Ok(AppendOutcome::Capped { amount, .. }) => {
                    summary.record_paid(payout.user_id, amount);
                }
                Ok(AppendOutcome::NotRecorded { reason }) => {
                    summary.record_skipped(payout.user_id, reason);
                }
                Err(e) => {
                    tracing::warn!(
                        descendant = %payout.user_id,
                        level = payout.level,
                        error = %e,
                        "upline reward payment failed"
                    );
                    summary.record_failed(payout.user_id, e.to_string());
                }
            }
        }

        Ok(summary)
    }

    async fn pay_one(
        &self,
        settings: &EngineSettings,
        trigger_user_id: Uuid,
        payout: &UplinePayout,
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
                user_id: payout.user_id,
                tx_type: "upline_commission".to_string(),
                amount: payout.amount,
                source_type: Some("upline_commission".to_string()),
                source_details: Some(json!({
                    "level": payout.level,
                    "direct_children": payout.direct_children,
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user() -> User {
        User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: format!("{}@example.com", Uuid::new_v4().simple()),
            referral_code: Uuid::new_v4().simple().to_string(),
            referrer_id: None,
            status: "active".into(),
            role: "user".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn levels() -> Vec<UplineLevel> {
        DEFAULT_UPLINE_LEVELS.to_vec()
    }

    #[test]
    fn test_qualification_threshold() {
        let qualified = user();
        let unqualified = user();

        let mut descendants = BTreeMap::new();
        descendants.insert(1, vec![qualified.clone(), unqualified.clone()]);

        let mut counts = HashMap::new();
        counts.insert(qualified.id, 15);
        counts.insert(unqualified.id, 14);

        let payouts = plan_upline_rewards(&descendants, &counts, &levels(), 1000.0);

        // 자격 미달 노드에는 지급이 절대 생성되지 않음
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].user_id, qualified.id);
        assert!((payouts[0].amount - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_per_level_percentages() {
        let l1 = user();
        let l2 = user();
        let l3 = user();

        let mut descendants = BTreeMap::new();
        descendants.insert(1, vec![l1.clone()]);
        descendants.insert(2, vec![l2.clone()]);
        descendants.insert(3, vec![l3.clone()]);

        let mut counts = HashMap::new();
        for u in [&l1, &l2, &l3] {
            counts.insert(u.id, 20);
        }

        let payouts = plan_upline_rewards(&descendants, &counts, &levels(), 1000.0);

        assert_eq!(payouts.len(), 3);
        assert!((payouts[0].amount - 50.0).abs() < 1e-9); // 5%
        assert!((payouts[1].amount - 20.0).abs() < 1e-9); // 2%
        assert!((payouts[2].amount - 10.0).abs() < 1e-9); // 1%
    }

    #[test]
    fn test_unqualified_level1_does_not_block_level2() {
        // 레벨 1이 전원 미달이어도 레벨 2 자격자는 지급받는다
        // (자격이 하위 탐색을 막지 않음)
        let l1 = user();
        let l2 = user();

        let mut descendants = BTreeMap::new();
        descendants.insert(1, vec![l1.clone()]);
        descendants.insert(2, vec![l2.clone()]);

        let mut counts = HashMap::new();
        counts.insert(l1.id, 0);
        counts.insert(l2.id, 15);

        let payouts = plan_upline_rewards(&descendants, &counts, &levels(), 500.0);

        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].user_id, l2.id);
        assert_eq!(payouts[0].level, 2);
    }

    #[test]
    fn test_missing_count_treated_as_zero() {
        let u = user();
        let mut descendants = BTreeMap::new();
        descendants.insert(1, vec![u]);

        let payouts = plan_upline_rewards(&descendants, &HashMap::new(), &levels(), 100.0);
        assert!(payouts.is_empty());
    }

    #[test]
    fn test_empty_tree() {
        let payouts =
            plan_upline_rewards(&BTreeMap::new(), &HashMap::new(), &levels(), 100.0);
        assert!(payouts.is_empty());
    }
}
