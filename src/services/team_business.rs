//! Team Business Aggregator
//!
//! 중첩 팀 실적 집계와 레그(leg) 분배, 실적 구간 보상 수령을 담당한다.
//!
//! - 트리 구축은 materialized path prefix 조회 1회로 끝낸다 (재귀 쿼리 없음)
//! - 레그 분배: 직추천별 서브트리 실적을 내림차순 정렬 후 라운드로빈으로
//!   비율 버킷에 배정: 버킷 실적 합 == 전체 레그 실적 (정확히)

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::db::{Database, ReferralNode, RewardProgram};
use crate::error::EngineError;
use crate::services::ledger::{self, AppendOutcome, NewLedgerEntry};
use crate::services::referral_tree::MAX_TREE_DEPTH;

/// 인메모리 팀 트리 노드 (상대 레벨, 루트 = 0)
#[derive(Debug, Clone)]
pub struct TeamNode {
    pub user_id: Uuid,
    pub level: i32,
    pub children: Vec<TeamNode>,
}

/// materialized 노드 행들 → 인메모리 트리 (순수 함수)
///
/// parent_id 무결성을 신뢰하지 않는다: visited set으로 순환/중복을 차단.
pub fn assemble_tree(root_id: Uuid, nodes: &[ReferralNode]) -> TeamNode {
    let root_level = nodes
        .iter()
        .find(|n| n.user_id == root_id)
        .map(|n| n.level)
        .unwrap_or(0);

    let mut children_of: HashMap<Uuid, Vec<Uuid>> = HashMap::new();
    for node in nodes {
        if node.user_id == root_id {
            continue;
        }
        if let Some(parent) = node.parent_id {
            children_of.entry(parent).or_default().push(node.user_id);
        }
    }

    let mut visited: HashSet<Uuid> = HashSet::new();
    visited.insert(root_id);
    build_node(root_id, 0, root_level, &children_of, &mut visited)
}

fn build_node(
    user_id: Uuid,
    relative_level: i32,
    root_level: i32,
    children_of: &HashMap<Uuid, Vec<Uuid>>,
    visited: &mut HashSet<Uuid>,
) -> TeamNode {
    let mut children = Vec::new();

    if relative_level < MAX_TREE_DEPTH {
        if let Some(child_ids) = children_of.get(&user_id) {
            for &child_id in child_ids {
                // 데이터 손상으로 인한 순환 방어
                if !visited.insert(child_id) {
                    tracing::warn!(user_id = %child_id, "cycle detected while assembling team tree");
                    continue;
                }
                children.push(build_node(
                    child_id,
                    relative_level + 1,
                    root_level,
                    children_of,
                    visited,
                ));
            }
        }
    }

    TeamNode {
        user_id,
        level: relative_level,
        children,
    }
}

/// 팀 실적 집계 결과
#[derive(Debug, Clone, Serialize)]
pub struct BusinessReport {
    /// 레벨 1 이하 전체 팀 실적 (자기 자신 제외)
    pub total_team_business: f64,
    /// 레벨 1(직추천) 실적
    pub direct_business: f64,
    /// 상대 레벨별 실적 (0 = 본인)
    pub by_level: BTreeMap<i32, f64>,
    pub team_size: usize,
}

/// DFS 집계 (순수 함수): personal: user_id → 개인 투자 실적
pub fn aggregate_business(root: &TeamNode, personal: &HashMap<Uuid, f64>) -> BusinessReport {
    let mut by_level: BTreeMap<i32, f64> = BTreeMap::new();
    let mut team_size = 0usize;

    let mut stack: Vec<&TeamNode> = vec![root];
    while let Some(node) = stack.pop() {
        let business = personal.get(&node.user_id).copied().unwrap_or(0.0);
        *by_level.entry(node.level).or_insert(0.0) += business;
        if node.level > 0 {
            team_size += 1;
        }
        for child in &node.children {
            stack.push(child);
        }
    }

    let total_team_business: f64 = by_level
        .iter()
        .filter(|(level, _)| **level > 0)
        .map(|(_, amount)| amount)
        .sum();
    let direct_business = by_level.get(&1).copied().unwrap_or(0.0);

    BusinessReport {
        total_team_business,
        direct_business,
        by_level,
        team_size,
    }
}

/// 비율 문자열 파싱: "50:50" → [50.0, 50.0]
///
/// 빈 문자열, 숫자 아님, 음수/0 합은 ValidationError.
pub fn parse_ratio(ratio: &str) -> Result<Vec<f64>, EngineError> {
    let parts: Result<Vec<f64>, _> = ratio
        .split(':')
        .map(|part| part.trim().parse::<f64>())
        .collect();

    let parts = parts
        .map_err(|_| EngineError::Validation(format!("invalid leg ratio '{}'", ratio)))?;

    if parts.is_empty() || parts.iter().any(|p| *p < 0.0) || parts.iter().sum::<f64>() <= 0.0 {
        return Err(EngineError::Validation(format!(
            "invalid leg ratio '{}'",
            ratio
        )));
    }

    Ok(parts)
}

/// 레그 버킷
#[derive(Debug, Clone, Serialize)]
pub struct LegBucket {
    pub ratio: f64,
    pub business: f64,
    pub weighted_business: f64,
    pub referral_ids: Vec<Uuid>,
}

/// 레그 분배 결과
#[derive(Debug, Clone, Serialize)]
pub struct LegDistribution {
    pub buckets: Vec<LegBucket>,
    /// Σ bucket.business == total_leg_business (정확히)
    pub total_leg_business: f64,
}

/// 직추천별 서브트리 실적 → 라운드로빈 버킷 배정 (순수 함수)
///
/// 실적 내림차순 정렬 후 i번째 추천인을 i % N 버킷에 배정.
pub fn distribute_legs(
    mut referral_business: Vec<(Uuid, f64)>,
    ratios: &[f64],
) -> LegDistribution {
    referral_business.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    let mut buckets: Vec<LegBucket> = ratios
        .iter()
        .map(|&ratio| LegBucket {
            ratio,
            business: 0.0,
            weighted_business: 0.0,
            referral_ids: Vec::new(),
        })
        .collect();

    let mut total = 0.0;
    for (index, (referral_id, business)) in referral_business.into_iter().enumerate() {
        let bucket = &mut buckets[index % ratios.len()];
        bucket.business += business;
        bucket.referral_ids.push(referral_id);
        total += business;
    }

    for bucket in &mut buckets {
        bucket.weighted_business = bucket.business * bucket.ratio / 100.0;
    }

    LegDistribution {
        buckets,
        total_leg_business: total,
    }
}

/// 구간 선택: 내림차순 스캔, total ≥ target인 최고 구간
pub fn select_tier(tiers: &[RewardProgram], total_business: f64) -> Option<&RewardProgram> {
    tiers
        .iter()
        .filter(|t| t.business_threshold > 0.0)
        .filter(|t| total_business >= t.business_threshold)
        .max_by(|a, b| {
            a.business_threshold
                .partial_cmp(&b.business_threshold)
                .unwrap_or(std::cmp::Ordering::Equal)
        })
}

/// 보상 수령 결과: 기대 가능한 결과는 전부 variant
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ClaimOutcome {
    Claimed {
        program_id: Uuid,
        tier_target: f64,
        reward_amount: f64,
        achievement_percentage: f64,
    },
    NotEligible {
        total_leg_business: f64,
    },
    AlreadyClaimed {
        claimed_target: f64,
    },
}

pub struct TeamBusinessAggregator {
    db: Arc<Database>,
}

impl TeamBusinessAggregator {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// 서브트리 행 조회 → 인메모리 트리 구축 (깊이 제한 10)
    pub async fn build_nested_tree(&self, user_id: Uuid) -> Result<TeamNode, EngineError> {
        let nodes = self.fetch_subtree(user_id).await?;
        Ok(assemble_tree(user_id, &nodes))
    }

    /// 팀 실적 집계 (기간 필터 옵션)
    pub async fn team_summary(
        &self,
        user_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<BusinessReport, EngineError> {
        let nodes = self.fetch_subtree(user_id).await?;
        let tree = assemble_tree(user_id, &nodes);

        let mut personal: HashMap<Uuid, f64> = HashMap::with_capacity(nodes.len() + 1);
        personal.insert(
            user_id,
            self.db
                .user_business(user_id, from, to)
                .await
                .map_err(|e| EngineError::Database(e.to_string()))?,
        );
        for node in &nodes {
            if node.user_id == user_id {
                continue;
            }
            let business = self
                .db
                .user_business(node.user_id, from, to)
                .await
                .map_err(|e| EngineError::Database(e.to_string()))?;
            personal.insert(node.user_id, business);
        }

        Ok(aggregate_business(&tree, &personal))
    }

    /// 레그 분배: 직추천별 전체 서브트리 실적 → 비율 버킷
    pub async fn leg_distribution(
        &self,
        user_id: Uuid,
        ratio: &str,
    ) -> Result<LegDistribution, EngineError> {
        let ratios = parse_ratio(ratio)?;

        let direct_children = self
            .db
            .direct_children_nodes(user_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let mut referral_business = Vec::with_capacity(direct_children.len());
        for child in &direct_children {
            let business = self
                .db
                .subtree_business(&child.path)
                .await
                .map_err(|e| EngineError::Database(e.to_string()))?;
            referral_business.push((child.user_id, business));
        }

        Ok(distribute_legs(referral_business, &ratios))
    }

    /// 실적 구간 보상 수령
    ///
    /// 구간을 내림차순으로 스캔해 도달한 최고 구간을 고르고, 이미 같은
    /// 이상의 목표를 수령했으면 AlreadyClaimed를 돌려준다. 수령 시
    /// UserReward upsert + reward_bonus 원장 지급이 함께 일어난다.
    pub async fn claim_reward(
        &self,
        settings: &EngineSettings,
        user_id: Uuid,
        program_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, EngineError> {
        let program = self
            .db
            .get_program(program_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("reward program {}", program_id)))?;

        let tiers = self
            .db
            .active_programs_of_type(&program.reward_type)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        let distribution = self
            .leg_distribution(user_id, &settings.reward_programs.ratio)
            .await?;
        let total = distribution.total_leg_business;

        let Some(tier) = select_tier(&tiers, total) else {
            return Ok(ClaimOutcome::NotEligible {
                total_leg_business: total,
            });
        };

        if let Some(claimed_target) = self
            .db
            .highest_claimed_target(user_id, &program.reward_type)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?
        {
            if claimed_target >= tier.business_threshold {
                return Ok(ClaimOutcome::AlreadyClaimed { claimed_target });
            }
        }

        let achievement = (total / tier.business_threshold * 100.0).min(100.0);
        let expiry_days = if tier.duration_days > 0 {
            tier.duration_days as i64
        } else {
            settings.reward_programs.expiry_days
        };
        let expires_at = now + Duration::days(expiry_days);

        self.db
            .upsert_claimed_reward(
                user_id,
                tier.id,
                total,
                tier.business_threshold,
                achievement,
                expires_at,
            )
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?;

        // 보상금 지급: 캡에 걸려 일부/전부 미지급이어도 수령 자체는 유효
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
                tx_type: "reward_bonus".to_string(),
                amount: tier.reward_amount,
                source_type: Some("reward_program".to_string()),
                source_details: Some(json!({
                    "program_id": tier.id,
                    "tier_target": tier.business_threshold,
                    "total_leg_business": total,
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

        if let AppendOutcome::NotRecorded { ref reason } = outcome {
            tracing::warn!(
                user = %user_id,
                program = %tier.id,
                reason = reason.as_str(),
                "reward bonus not recorded"
            );
        }

        Ok(ClaimOutcome::Claimed {
            program_id: tier.id,
            tier_target: tier.business_threshold,
            reward_amount: outcome.recorded_amount(),
            achievement_percentage: achievement,
        })
    }

    async fn fetch_subtree(&self, user_id: Uuid) -> Result<Vec<ReferralNode>, EngineError> {
        let node = self
            .db
            .get_node(user_id)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))?
            .ok_or_else(|| EngineError::NotFound(format!("referral node {}", user_id)))?;

        self.db
            .subtree_nodes(&node.path, node.level + MAX_TREE_DEPTH)
            .await
            .map_err(|e| EngineError::Database(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn node(user_id: Uuid, parent_id: Option<Uuid>, level: i32, path: String) -> ReferralNode {
        ReferralNode {
            user_id,
            parent_id,
            level,
            path,
            direct_referrals: 0,
            total_team_size: 0,
            team_business: 0.0,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_ratio_two_way() {
        assert_eq!(parse_ratio("50:50").unwrap(), vec![50.0, 50.0]);
        assert_eq!(parse_ratio("40:30:30").unwrap(), vec![40.0, 30.0, 30.0]);
        assert_eq!(parse_ratio(" 60 : 40 ").unwrap(), vec![60.0, 40.0]);
    }

    #[test]
    fn test_parse_ratio_rejects_garbage() {
        assert!(parse_ratio("").is_err());
        assert!(parse_ratio("50:abc").is_err());
        assert!(parse_ratio("0:0").is_err());
        assert!(parse_ratio("-50:150").is_err());
    }

    #[test]
    fn test_round_robin_scenario() {
        // 직추천 실적 [300, 200, 100], "50:50"
        // 내림차순 정렬 후 r1→버킷1, r2→버킷2, r3→버킷1
        // → 버킷1 = 400, 버킷2 = 200, 가중 200 / 100
        let r1 = Uuid::new_v4();
        let r2 = Uuid::new_v4();
        let r3 = Uuid::new_v4();
        let input = vec![(r3, 100.0), (r1, 300.0), (r2, 200.0)];

        let distribution = distribute_legs(input, &[50.0, 50.0]);

        assert!((distribution.buckets[0].business - 400.0).abs() < 1e-9);
        assert!((distribution.buckets[1].business - 200.0).abs() < 1e-9);
        assert!((distribution.buckets[0].weighted_business - 200.0).abs() < 1e-9);
        assert!((distribution.buckets[1].weighted_business - 100.0).abs() < 1e-9);
        assert!((distribution.total_leg_business - 600.0).abs() < 1e-9);
        assert_eq!(distribution.buckets[0].referral_ids, vec![r1, r3]);
        assert_eq!(distribution.buckets[1].referral_ids, vec![r2]);
    }

    #[test]
    fn test_bucket_sum_equals_total_exactly() {
        // 어떤 비율/입력이든 Σ bucket.business == total
        let inputs: Vec<(Uuid, f64)> = (0..17)
            .map(|i| (Uuid::new_v4(), 13.37 * (i as f64) + 0.003))
            .collect();
        let expected: f64 = inputs.iter().map(|(_, b)| b).sum();

        for ratio in ["50:50", "40:30:30", "70:20:10", "100"] {
            let ratios = parse_ratio(ratio).unwrap();
            let distribution = distribute_legs(inputs.clone(), &ratios);
            let bucket_sum: f64 = distribution.buckets.iter().map(|b| b.business).sum();
            assert!(
                (bucket_sum - expected).abs() < 1e-9,
                "ratio {}: {} != {}",
                ratio,
                bucket_sum,
                expected
            );
            assert!((distribution.total_leg_business - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn test_assemble_and_aggregate() {
        let root = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();

        let root_path = format!("/{}/", root);
        let nodes = vec![
            node(root, None, 0, root_path.clone()),
            node(a, Some(root), 1, format!("{}{}/", root_path, a)),
            node(b, Some(root), 1, format!("{}{}/", root_path, b)),
            node(c, Some(a), 2, format!("{}{}/{}/", root_path, a, c)),
        ];

        let tree = assemble_tree(root, &nodes);
        assert_eq!(tree.children.len(), 2);

        let mut personal = HashMap::new();
        personal.insert(root, 1000.0);
        personal.insert(a, 300.0);
        personal.insert(b, 200.0);
        personal.insert(c, 50.0);

        let report = aggregate_business(&tree, &personal);
        assert!((report.direct_business - 500.0).abs() < 1e-9);
        assert!((report.total_team_business - 550.0).abs() < 1e-9);
        assert!((report.by_level[&0] - 1000.0).abs() < 1e-9);
        assert!((report.by_level[&2] - 50.0).abs() < 1e-9);
        assert_eq!(report.team_size, 3);
    }

    #[test]
    fn test_assemble_tree_breaks_cycles() {
        let root = Uuid::new_v4();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        // 손상 데이터: a가 b의 자식으로도 다시 등장 (a ↔ b 순환)
        let nodes = vec![
            node(root, None, 0, format!("/{}/", root)),
            node(a, Some(root), 1, format!("/{}/{}/", root, a)),
            node(b, Some(a), 2, format!("/{}/{}/{}/", root, a, b)),
            node(a, Some(b), 3, format!("/{}/{}/{}/{}/", root, a, b, a)),
        ];

        let tree = assemble_tree(root, &nodes);
        // 순환이 끊겨 유한 트리로 끝나야 함: root → a → b, b 아래에 a 재등장 없음
        assert_eq!(tree.children.len(), 1);
        let a_node = &tree.children[0];
        assert_eq!(a_node.user_id, a);
        assert_eq!(a_node.children.len(), 1);
        assert!(a_node.children[0].children.is_empty());
    }

    #[test]
    fn test_select_tier_highest_reached() {
        fn tier(threshold: f64, amount: f64) -> RewardProgram {
            RewardProgram {
                id: Uuid::new_v4(),
                name: "t".into(),
                reward_type: "team_business".into(),
                business_threshold: threshold,
                team_size_threshold: 0,
                direct_referrals_threshold: 0,
                reward_amount: amount,
                duration_days: 30,
                level: None,
                is_active: true,
            }
        }

        let tiers = vec![tier(10_000.0, 500.0), tier(5_000.0, 200.0), tier(1_000.0, 50.0)];

        assert!(select_tier(&tiers, 500.0).is_none());
        assert!(
            (select_tier(&tiers, 1_200.0).unwrap().business_threshold - 1_000.0).abs() < 1e-9
        );
        assert!(
            (select_tier(&tiers, 50_000.0).unwrap().business_threshold - 10_000.0).abs() < 1e-9
        );
    }
}
