//! Database Models
//!
//! Entity rows for the commission/reward engine: users and their wallets,
//! the append-only transaction ledger, investments, reward programs and the
//! materialized referral tree.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use uuid::Uuid;

/// 회원
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,

    /// 가입 시 발급되는 고유 추천 코드
    pub referral_code: String,

    /// 추천인 (NULL이면 루트): 추천 트리를 형성
    pub referrer_id: Option<Uuid>,

    /// active | inactive | suspended | banned
    /// 엔진은 hard-delete 하지 않음 (soft-disable만)
    pub status: String,

    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// 지갑 (사용자당 1개)
///
/// 잔액 변경은 원장(transactions)을 통과한 적립만 허용.
/// 캡 검사가 읽는 컬럼: roi_balance, commission_balance, bonus_balance,
/// total_invested
#[derive(Debug, Clone, FromRow)]
pub struct Wallet {
    pub user_id: Uuid,
    pub main_balance: f64,
    pub roi_balance: f64,
    pub commission_balance: f64,
    pub bonus_balance: f64,
    pub locked_amount: f64,
    pub total_earned: f64,
    pub total_withdrawn: f64,
    pub total_invested: f64,
    pub updated_at: DateTime<Utc>,
}

/// 원장 거래 (생성 후 불변)
#[derive(Debug, Clone, FromRow)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub user_id: Uuid,

    /// roi_earning | level_commission | upline_commission | direct_bonus |
    /// reward_bonus | salary | ...
    pub tx_type: String,

    pub amount: f64,
    pub fee_amount: f64,
    pub net_amount: f64,
    pub currency: String,

    /// pending | completed | failed | cancelled
    /// 내부 지급분은 생성 시점에 completed
    pub status: String,

    pub source_type: Option<String>,

    /// 구조화된 지급 내역 (ROI 서브 트랜잭션 내역, 캡 잔여분 등)
    pub source_details: Option<JsonValue>,

    /// 지급을 유발한 사용자 (커미션의 경우 구매자)
    pub related_user_id: Option<Uuid>,
    pub related_investment_id: Option<Uuid>,

    pub processed_by: String,
    pub processed_at: Option<DateTime<Utc>>,

    /// 멱등성 보장용 유니크 키
    pub reference_id: String,
    pub tx_hash: String,

    pub admin_notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 투자 플랜 (관리자 관리, 엔진은 읽기 전용)
#[derive(Debug, Clone, FromRow)]
pub struct InvestmentPlan {
    pub id: Uuid,
    pub name: String,
    pub daily_roi_percentage: f64,
    pub duration_days: i32,

    /// 원금 대비 최대 수익 배수 (기본 2.0)
    pub max_earning_multiplier: f64,

    pub is_active: bool,
}

/// 투자
#[derive(Debug, Clone, FromRow)]
pub struct Investment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: Uuid,
    pub invested_amount: f64,
    pub current_value: f64,
    pub total_earned: f64,

    /// active | completed: 배수 캡 도달 시 completed 전환
    pub status: String,

    pub start_date: NaiveDate,
    pub end_date: NaiveDate,

    /// 마지막 ROI 적립일 (같은 날 중복 처리 방지 가드)
    pub last_roi_date: Option<NaiveDate>,

    pub created_at: DateTime<Utc>,
}

/// 레벨별 커미션 설정
#[derive(Debug, Clone, FromRow)]
pub struct LevelConfig {
    pub level_number: i32,
    pub commission_percentage: f64,
    pub is_active: bool,
}

/// 보상 프로그램
#[derive(Debug, Clone, FromRow)]
pub struct RewardProgram {
    pub id: Uuid,
    pub name: String,
    pub reward_type: String,
    pub business_threshold: f64,
    pub team_size_threshold: i32,
    pub direct_referrals_threshold: i32,
    pub reward_amount: f64,
    pub duration_days: i32,

    /// 주급 지급 레벨 매핑용 (없으면 주급 대상 아님)
    pub level: Option<i32>,

    pub is_active: bool,
}

/// 사용자별 보상 진행 상태
///
/// 상태 머신:
/// in_progress →(progress ≥ target) achieved →(claim) claimed
/// achieved | in_progress →(now > expires_at) expired
/// 종결 상태: claimed, expired
#[derive(Debug, Clone, FromRow)]
pub struct UserReward {
    pub id: Uuid,
    pub user_id: Uuid,
    pub program_id: Uuid,
    pub current_progress: f64,
    pub required_target: f64,
    pub achievement_percentage: f64,
    pub status: String,
    pub achieved_at: Option<DateTime<Utc>>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 부스터 (now < started_at + days 동안 활성)
///
/// 여러 개가 겹칠 수 있고 최고 활성 레벨만 적용됨.
/// 현재 적립 경로에서는 추천인 수 기반 부스트가 단일 공식 모델이고
/// 이 테이블은 관리 데이터로만 유지된다.
#[derive(Debug, Clone, FromRow)]
pub struct Booster {
    pub id: Uuid,
    pub user_id: Uuid,
    pub level: i32,
    pub days: i32,
    pub started_at: DateTime<Utc>,
}

impl Booster {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        now < self.started_at + chrono::Duration::days(self.days as i64)
    }
}

/// 추천 트리의 materialized 노드
#[derive(Debug, Clone, FromRow)]
pub struct ReferralNode {
    pub user_id: Uuid,
    pub parent_id: Option<Uuid>,

    /// 루트로부터의 깊이 (루트 = 0)
    pub level: i32,

    /// 루트부터의 조상 id 체인 "/id1/id2/.../idN/"
    /// prefix 매칭으로 재귀 없이 서브트리 조회
    pub path: String,

    pub direct_referrals: i32,
    pub total_team_size: i32,
    pub team_business: f64,
    pub updated_at: DateTime<Utc>,
}

/// key-value 설정 행
#[derive(Debug, Clone, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: JsonValue,
    pub updated_at: DateTime<Utc>,
}

/// 원장 INSERT 입력 (검증/캡 적용이 끝난 최종 행)
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub tx_type: String,
    pub amount: f64,
    pub fee_amount: f64,
    pub net_amount: f64,
    pub currency: String,
    pub status: String,
    pub source_type: Option<String>,
    pub source_details: Option<JsonValue>,
    pub related_user_id: Option<Uuid>,
    pub related_investment_id: Option<Uuid>,
    pub processed_by: String,
    pub reference_id: String,
    pub tx_hash: String,
    pub admin_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_booster_active_window() {
        let started = Utc::now() - chrono::Duration::days(3);
        let booster = Booster {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            level: 2,
            days: 7,
            started_at: started,
        };

        assert!(booster.is_active_at(Utc::now()));
        assert!(!booster.is_active_at(started + chrono::Duration::days(7)));
    }

    #[test]
    fn test_user_active_status() {
        let mut user = User {
            id: Uuid::new_v4(),
            username: "u".into(),
            email: "u@example.com".into(),
            referral_code: "REF1".into(),
            referrer_id: None,
            status: "active".into(),
            role: "user".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(user.is_active());

        user.status = "suspended".into();
        assert!(!user.is_active());
    }
}
