//! Referral Tree Service
//!
//! 추천 트리의 두 가지 표현을 다룬다:
//! - 포인터 추적: users.referrer_id를 따라 조상/자손을 걷는다 (커미션 지급 경로)
//! - materialized path: referral_nodes.path prefix 매칭으로 재귀 없이
//!   서브트리를 조회한다 (대규모 집계 경로)
//!
//! 트리는 구조상 비순환이지만(사용자당 추천인 1명) parent_id 무결성을
//! 신뢰하지 않는다: 모든 탐색이 visited set으로 순환을 차단한다.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use crate::db::{Database, ReferralNode, User};

/// 서브트리 조회 깊이 제한
pub const MAX_TREE_DEPTH: i32 = 10;

/// 부모 path에 자식 id를 붙여 자식 path 생성
///
/// path는 자기 자신을 포함하는 "/id1/.../self/" 형태라서
/// 자신의 path가 그대로 서브트리 prefix가 된다.
pub fn child_path(parent_path: Option<&str>, child_id: Uuid) -> String {
    match parent_path {
        Some(parent) => format!("{}{}/", parent, child_id),
        None => format!("/{}/", child_id),
    }
}

/// path에서 조상 id 목록 추출 (자기 자신 제외, 루트부터 순서대로)
pub fn ancestor_ids_from_path(path: &str, self_id: Uuid) -> Vec<Uuid> {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .filter_map(|seg| Uuid::parse_str(seg).ok())
        .filter(|id| *id != self_id)
        .collect()
}

pub struct ReferralTreeService {
    db: Arc<Database>,
}

impl ReferralTreeService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// 조상 체인: referrer_id 포인터를 루트 또는 max_depth까지 추적
    ///
    /// 반환 순서는 가까운 조상부터 (레벨 1 = 직접 추천인).
    pub async fn ancestor_chain(&self, user_id: Uuid, max_depth: usize) -> Result<Vec<User>> {
        let mut chain = Vec::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        visited.insert(user_id);

        let mut current = match self.db.get_user(user_id).await? {
            Some(user) => user.referrer_id,
            None => return Ok(chain),
        };

        while let Some(ancestor_id) = current {
            if chain.len() >= max_depth {
                break;
            }
            // 데이터 손상으로 인한 순환 방어
            if !visited.insert(ancestor_id) {
                tracing::warn!(user_id = %user_id, at = %ancestor_id, "referral cycle detected in ancestor walk");
                break;
            }

            match self.db.get_user(ancestor_id).await? {
                Some(ancestor) => {
                    current = ancestor.referrer_id;
                    chain.push(ancestor);
                }
                None => break,
            }
        }

        Ok(chain)
    }

    /// 레벨별 자손 조회 (BFS, 레벨 1 = 직추천)
    ///
    /// active 사용자만 포함. 레벨 단위로 일괄 쿼리해서 N+1을 피한다.
    pub async fn descendants_by_level(
        &self,
        user_id: Uuid,
        max_depth: u32,
    ) -> Result<BTreeMap<u32, Vec<User>>> {
        let mut levels: BTreeMap<u32, Vec<User>> = BTreeMap::new();
        let mut visited: HashSet<Uuid> = HashSet::new();
        visited.insert(user_id);

        let mut frontier = vec![user_id];

        for level in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }

            let children = self.db.get_active_children_of(&frontier).await?;

            let mut next_frontier = Vec::with_capacity(children.len());
            let mut level_users = Vec::with_capacity(children.len());
            for child in children {
                // 순환/중복 방어
                if !visited.insert(child.id) {
                    tracing::warn!(user_id = %child.id, "referral cycle detected in BFS");
                    continue;
                }
                next_frontier.push(child.id);
                level_users.push(child);
            }

            if !level_users.is_empty() {
                levels.insert(level, level_users);
            }
            frontier = next_frontier;
        }

        Ok(levels)
    }

    /// active 직추천 수
    pub async fn direct_children_count(&self, user_id: Uuid) -> Result<i64> {
        self.db.count_active_children(user_id).await
    }

    /// path prefix 매칭 서브트리 (자기 자신 포함)
    pub async fn subtree(&self, user_id: Uuid) -> Result<Vec<ReferralNode>> {
        let node = match self.db.get_node(user_id).await? {
            Some(node) => node,
            None => return Ok(Vec::new()),
        };

        self.db
            .subtree_nodes(&node.path, node.level + MAX_TREE_DEPTH)
            .await
    }

    /// 신규 가입 시 materialized 노드 등록 + 조상 카운터 갱신
    pub async fn register_node(&self, user_id: Uuid, referrer_id: Option<Uuid>) -> Result<()> {
        let (parent_path, parent_level) = match referrer_id {
            Some(rid) => match self.db.get_node(rid).await? {
                Some(parent) => (Some(parent.path), parent.level),
                // 부모 노드가 아직 없으면 루트로 취급 (백필은 관리자 도구 몫)
                None => (None, -1),
            },
            None => (None, -1),
        };

        let path = child_path(parent_path.as_deref(), user_id);
        self.db
            .insert_node(user_id, referrer_id, parent_level + 1, &path)
            .await?;

        if let Some(rid) = referrer_id {
            self.db.increment_direct_referrals(rid).await?;
        }

        let ancestors = ancestor_ids_from_path(&path, user_id);
        if !ancestors.is_empty() {
            self.db.increment_team_size(&ancestors).await?;
        }

        Ok(())
    }

    /// 투자 발생 시 조상들의 team_business 누적
    pub async fn record_team_business(&self, user_id: Uuid, amount: f64) -> Result<()> {
        let node = match self.db.get_node(user_id).await? {
            Some(node) => node,
            None => return Ok(()),
        };

        let ancestors = ancestor_ids_from_path(&node.path, user_id);
        if !ancestors.is_empty() {
            self.db.add_team_business(&ancestors, amount).await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_path_root() {
        let id = Uuid::new_v4();
        let path = child_path(None, id);
        assert_eq!(path, format!("/{}/", id));
    }

    #[test]
    fn test_child_path_nested() {
        let root = Uuid::new_v4();
        let child = Uuid::new_v4();
        let root_path = child_path(None, root);
        let nested = child_path(Some(&root_path), child);
        assert_eq!(nested, format!("/{}/{}/", root, child));
        // 자식 path는 부모 path를 prefix로 가짐 → prefix 매칭으로 서브트리 조회
        assert!(nested.starts_with(&root_path));
    }

    #[test]
    fn test_ancestor_ids_excludes_self() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        let path = format!("/{}/{}/{}/", a, b, c);

        let ancestors = ancestor_ids_from_path(&path, c);
        assert_eq!(ancestors, vec![a, b]);
    }

    #[test]
    fn test_ancestor_ids_tolerates_garbage_segments() {
        let a = Uuid::new_v4();
        let path = format!("/{}/not-a-uuid/", a);
        let ancestors = ancestor_ids_from_path(&path, Uuid::new_v4());
        assert_eq!(ancestors, vec![a]);
    }

    #[test]
    fn test_root_has_no_ancestors() {
        let id = Uuid::new_v4();
        let path = child_path(None, id);
        assert!(ancestor_ids_from_path(&path, id).is_empty());
    }
}
