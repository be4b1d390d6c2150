//! Database Module
//!
//! # Interview Q&A
//!
//! Q: 왜 PostgreSQL을 선택했는가?
//! A: 금융 원장 백엔드에 적합한 이유
//!
//!    1. ACID 트랜잭션: 투자 1건의 판단-기록 시퀀스를 원자적으로 묶음
//!    2. 유니크 제약: reference_id / tx_hash 중복 차단 → 멱등성
//!    3. JSONB: source_details 구조화 payload, settings 테이블
//!    4. 인덱싱: (user_id, tx_type, status, created_at) 일일 합산 최적화
//!    5. 생태계: SQLx, Diesel 등 Rust 라이브러리 지원
//!
//! Q: 트랜잭션 경계는 어디에 두는가?
//! A: 엔티티(투자/사용자) 1건 단위
//!    - 잔액 읽기 → 캡 계산 → 원장 기록 → 집계 갱신을 한 트랜잭션으로
//!    - 실패 시 해당 엔티티만 롤백, 배치는 다음 엔티티로 진행
//!    - 배치는 순차 처리이므로 별도 버전 컬럼 없이 FOR UPDATE로 충분
//!
//! Q: 커넥션 풀은 어떻게 관리하는가?
//! A: SQLx의 PgPool 사용
//!    - 최소/최대 커넥션 수 설정
//!    - 커넥션 재사용 (오버헤드 감소)
//!    - 자동 health check

mod models;

pub use models::*;

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

/// 데이터베이스 연결 및 쿼리 담당
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// 데이터베이스 연결
    ///
    /// # Connection Pool Settings
    ///
    /// - max_connections: 10 (배치는 순차 처리라 많이 필요 없음)
    /// - min_connections: 1 (idle 시 최소 유지)
    /// - acquire_timeout: 3초 (커넥션 획득 대기)
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(3))
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// 마이그레이션 실행
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Health check
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// 엔티티 단위 트랜잭션을 열 때 사용
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ============ 설정 ============

    /// settings 테이블 전체 로드 (배치 시작 시 스냅샷용)
    pub async fn load_settings(&self) -> Result<Vec<(String, JsonValue)>> {
        let rows: Vec<(String, JsonValue)> =
            sqlx::query_as("SELECT key, value FROM settings")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows)
    }

    // ============ 사용자 / 지갑 ============

    pub async fn get_user(&self, user_id: Uuid) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, referral_code, referrer_id,
                   status, role, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// 여러 부모의 active 직추천 일괄 조회 (BFS 레벨 단위)
    pub async fn get_active_children_of(&self, parent_ids: &[Uuid]) -> Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, referral_code, referrer_id,
                   status, role, created_at, updated_at
            FROM users
            WHERE referrer_id = ANY($1) AND status = 'active'
            ORDER BY created_at ASC
            "#,
        )
        .bind(parent_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(users)
    }

    /// active 직추천 수
    pub async fn count_active_children(&self, user_id: Uuid) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM users WHERE referrer_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    /// 특정 시점 이후 가입한 직추천 수 (ROI 부스트 판정용)
    pub async fn count_referrals_joined_between(
        &self,
        referrer_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<i64> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM users
            WHERE referrer_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(referrer_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    pub async fn get_wallet(&self, user_id: Uuid) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, main_balance, roi_balance, commission_balance,
                   bonus_balance, locked_amount, total_earned, total_withdrawn,
                   total_invested, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(wallet)
    }

    /// 최근 적립 이력이 있는 사용자와 적립 합계 (정기 커미션 run 대상 선정)
    pub async fn users_with_earnings_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<(Uuid, f64)>> {
        let rows: Vec<(Uuid, f64)> = sqlx::query_as(
            r#"
            SELECT user_id, SUM(amount)
            FROM transactions
            WHERE tx_type = 'roi_earning' AND status = 'completed' AND created_at >= $1
            GROUP BY user_id
            ORDER BY user_id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    // ============ 원장 (트랜잭션 스코프) ============
    //
    // 아래 함수들은 호출자가 연 SQL 트랜잭션 안에서 실행된다.
    // 잔액 읽기와 원장 기록이 같은 스코프를 공유해야 캡 계산이 안전하다.

    /// 지갑 행 잠금 조회
    pub async fn wallet_for_update(
        conn: &mut PgConnection,
        user_id: Uuid,
    ) -> Result<Option<Wallet>> {
        let wallet = sqlx::query_as::<_, Wallet>(
            r#"
            SELECT user_id, main_balance, roi_balance, commission_balance,
                   bonus_balance, locked_amount, total_earned, total_withdrawn,
                   total_invested, updated_at
            FROM wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;

        Ok(wallet)
    }

    /// 오늘(UTC) 완료된 적립성 거래 합계
    pub async fn daily_completed_earnings(
        conn: &mut PgConnection,
        user_id: Uuid,
        earning_types: &[&str],
        day_start: DateTime<Utc>,
        day_end: DateTime<Utc>,
    ) -> Result<f64> {
        let types: Vec<String> = earning_types.iter().map(|s| s.to_string()).collect();
        let sum: (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT SUM(amount)
            FROM transactions
            WHERE user_id = $1
              AND tx_type = ANY($2)
              AND status = 'completed'
              AND created_at >= $3 AND created_at < $4
            "#,
        )
        .bind(user_id)
        .bind(&types)
        .bind(day_start)
        .bind(day_end)
        .fetch_one(conn)
        .await?;

        Ok(sum.0.unwrap_or(0.0))
    }

    /// 원장 거래 INSERT: 잔액 변경의 유일한 경로
    pub async fn insert_transaction(
        conn: &mut PgConnection,
        tx: &NewTransaction,
    ) -> Result<Uuid, sqlx::Error> {
        let row: (Uuid,) = sqlx::query_as(
            r#"
            INSERT INTO transactions (
                user_id, tx_type, amount, fee_amount, net_amount, currency,
                status, source_type, source_details, related_user_id,
                related_investment_id, processed_by, processed_at,
                reference_id, tx_hash, admin_notes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, NOW(), $13, $14, $15)
            RETURNING id
            "#,
        )
        .bind(tx.user_id)
        .bind(&tx.tx_type)
        .bind(tx.amount)
        .bind(tx.fee_amount)
        .bind(tx.net_amount)
        .bind(&tx.currency)
        .bind(&tx.status)
        .bind(&tx.source_type)
        .bind(&tx.source_details)
        .bind(tx.related_user_id)
        .bind(tx.related_investment_id)
        .bind(&tx.processed_by)
        .bind(&tx.reference_id)
        .bind(&tx.tx_hash)
        .bind(&tx.admin_notes)
        .fetch_one(conn)
        .await?;

        Ok(row.0)
    }

    /// 적립 버킷 컬럼 + total_earned 갱신
    ///
    /// bucket_column은 ledger 서비스가 고정 문자열 중에서 고른다
    /// (동적 SQL이지만 입력이 열 이름 화이트리스트로 제한됨).
    pub async fn credit_wallet(
        conn: &mut PgConnection,
        user_id: Uuid,
        bucket_column: &'static str,
        amount: f64,
    ) -> Result<()> {
        let sql = format!(
            r#"
            UPDATE wallets
            SET {bucket} = {bucket} + $2,
                total_earned = total_earned + $2,
                updated_at = NOW()
            WHERE user_id = $1
            "#,
            bucket = bucket_column
        );

        sqlx::query(&sql)
            .bind(user_id)
            .bind(amount)
            .execute(conn)
            .await?;

        Ok(())
    }

    // ============ 투자 ============

    /// 오늘 ROI 적립 대상 투자
    ///
    /// allow_duplicate_day = true면 last_roi_date 가드 해제 (수동 재실행)
    pub async fn eligible_investments(
        &self,
        today: NaiveDate,
        allow_duplicate_day: bool,
    ) -> Result<Vec<Investment>> {
        let investments = sqlx::query_as::<_, Investment>(
            r#"
            SELECT i.id, i.user_id, i.plan_id, i.invested_amount, i.current_value,
                   i.total_earned, i.status, i.start_date, i.end_date,
                   i.last_roi_date, i.created_at
            FROM investments i
            JOIN investment_plans p ON p.id = i.plan_id
            WHERE i.status = 'active'
              AND i.end_date >= $1
              AND p.is_active
              AND ($2 OR i.last_roi_date IS NULL OR i.last_roi_date < $1)
            ORDER BY i.created_at ASC
            "#,
        )
        .bind(today)
        .bind(allow_duplicate_day)
        .fetch_all(&self.pool)
        .await?;

        Ok(investments)
    }

    /// 특정 사용자들의 적립 대상 투자 (수동 변형, 같은 날 가드 없음)
    pub async fn eligible_investments_for_users(
        &self,
        user_ids: &[Uuid],
        today: NaiveDate,
    ) -> Result<Vec<Investment>> {
        let investments = sqlx::query_as::<_, Investment>(
            r#"
            SELECT i.id, i.user_id, i.plan_id, i.invested_amount, i.current_value,
                   i.total_earned, i.status, i.start_date, i.end_date,
                   i.last_roi_date, i.created_at
            FROM investments i
            JOIN investment_plans p ON p.id = i.plan_id
            WHERE i.user_id = ANY($1)
              AND i.status = 'active'
              AND i.end_date >= $2
              AND p.is_active
            ORDER BY i.created_at ASC
            "#,
        )
        .bind(user_ids)
        .bind(today)
        .fetch_all(&self.pool)
        .await?;

        Ok(investments)
    }

    pub async fn get_plan(&self, plan_id: Uuid) -> Result<Option<InvestmentPlan>> {
        let plan = sqlx::query_as::<_, InvestmentPlan>(
            r#"
            SELECT id, name, daily_roi_percentage, duration_days,
                   max_earning_multiplier, is_active
            FROM investment_plans
            WHERE id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    /// 활성화 일자: 해당 사용자의 active/completed 투자 중 가장 이른 시작일
    pub async fn earliest_investment_start(&self, user_id: Uuid) -> Result<Option<NaiveDate>> {
        let row: (Option<NaiveDate>,) = sqlx::query_as(
            r#"
            SELECT MIN(start_date) FROM investments
            WHERE user_id = $1 AND status IN ('active', 'completed')
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// 개인 실적: active/completed 투자 원금 합 (기간 필터 옵션)
    pub async fn user_business(
        &self,
        user_id: Uuid,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<f64> {
        let sum: (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT SUM(invested_amount) FROM investments
            WHERE user_id = $1
              AND status IN ('active', 'completed')
              AND ($2::date IS NULL OR start_date >= $2)
              AND ($3::date IS NULL OR start_date <= $3)
            "#,
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_one(&self.pool)
        .await?;

        Ok(sum.0.unwrap_or(0.0))
    }

    /// 적립 반영: current_value / total_earned / last_roi_date 갱신,
    /// 캡 도달 시 completed 전환
    pub async fn apply_investment_accrual(
        conn: &mut PgConnection,
        investment_id: Uuid,
        amount: f64,
        today: NaiveDate,
        completed: bool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE investments
            SET current_value = current_value + $2,
                total_earned = total_earned + $2,
                last_roi_date = $3,
                status = CASE WHEN $4 THEN 'completed' ELSE status END
            WHERE id = $1
            "#,
        )
        .bind(investment_id)
        .bind(amount)
        .bind(today)
        .bind(completed)
        .execute(conn)
        .await?;

        Ok(())
    }

    // ============ 레벨 커미션 설정 ============

    pub async fn active_level_configs(&self, max_level: i32) -> Result<Vec<LevelConfig>> {
        let configs = sqlx::query_as::<_, LevelConfig>(
            r#"
            SELECT level_number, commission_percentage, is_active
            FROM level_configs
            WHERE is_active AND level_number <= $1
            ORDER BY level_number ASC
            "#,
        )
        .bind(max_level)
        .fetch_all(&self.pool)
        .await?;

        Ok(configs)
    }

    // ============ 추천 트리 (materialized) ============

    pub async fn get_node(&self, user_id: Uuid) -> Result<Option<ReferralNode>> {
        let node = sqlx::query_as::<_, ReferralNode>(
            r#"
            SELECT user_id, parent_id, level, path, direct_referrals,
                   total_team_size, team_business, updated_at
            FROM referral_nodes
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(node)
    }

    pub async fn insert_node(
        &self,
        user_id: Uuid,
        parent_id: Option<Uuid>,
        level: i32,
        path: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO referral_nodes (user_id, parent_id, level, path)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .bind(parent_id)
        .bind(level)
        .bind(path)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn increment_direct_referrals(&self, user_id: Uuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE referral_nodes
            SET direct_referrals = direct_referrals + 1, updated_at = NOW()
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn increment_team_size(&self, ancestor_ids: &[Uuid]) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE referral_nodes
            SET total_team_size = total_team_size + 1, updated_at = NOW()
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(ancestor_ids)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 조상들의 team_business 누적 (투자 발생 시)
    pub async fn add_team_business(&self, ancestor_ids: &[Uuid], amount: f64) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE referral_nodes
            SET team_business = team_business + $2, updated_at = NOW()
            WHERE user_id = ANY($1)
            "#,
        )
        .bind(ancestor_ids)
        .bind(amount)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// path prefix 매칭으로 서브트리 전체 조회 (재귀 없음, O(log n) 인덱스 탐색)
    ///
    /// max_level 제한으로 깊이 폭주 방지
    pub async fn subtree_nodes(
        &self,
        path_prefix: &str,
        max_level: i32,
    ) -> Result<Vec<ReferralNode>> {
        let nodes = sqlx::query_as::<_, ReferralNode>(
            r#"
            SELECT user_id, parent_id, level, path, direct_referrals,
                   total_team_size, team_business, updated_at
            FROM referral_nodes
            WHERE path LIKE $1 AND level <= $2
            ORDER BY level ASC, user_id ASC
            "#,
        )
        .bind(format!("{}%", path_prefix))
        .bind(max_level)
        .fetch_all(&self.pool)
        .await?;

        Ok(nodes)
    }

    /// 서브트리 실적 합계: prefix에 걸리는 모든 노드의 투자 원금 합
    pub async fn subtree_business(&self, path_prefix: &str) -> Result<f64> {
        let sum: (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT SUM(i.invested_amount)
            FROM investments i
            JOIN referral_nodes rn ON rn.user_id = i.user_id
            WHERE rn.path LIKE $1 AND i.status IN ('active', 'completed')
            "#,
        )
        .bind(format!("{}%", path_prefix))
        .fetch_one(&self.pool)
        .await?;

        Ok(sum.0.unwrap_or(0.0))
    }

    pub async fn direct_children_nodes(&self, user_id: Uuid) -> Result<Vec<ReferralNode>> {
        let nodes = sqlx::query_as::<_, ReferralNode>(
            r#"
            SELECT user_id, parent_id, level, path, direct_referrals,
                   total_team_size, team_business, updated_at
            FROM referral_nodes
            WHERE parent_id = $1
            ORDER BY user_id ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(nodes)
    }

    // ============ 보상 프로그램 / 사용자 보상 ============

    pub async fn get_program(&self, program_id: Uuid) -> Result<Option<RewardProgram>> {
        let program = sqlx::query_as::<_, RewardProgram>(
            r#"
            SELECT id, name, reward_type, business_threshold, team_size_threshold,
                   direct_referrals_threshold, reward_amount, duration_days,
                   level, is_active
            FROM reward_programs
            WHERE id = $1
            "#,
        )
        .bind(program_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(program)
    }

    /// 같은 유형의 활성 프로그램 전체 = 보상 구간(tier) 목록
    pub async fn active_programs_of_type(
        &self,
        reward_type: &str,
    ) -> Result<Vec<RewardProgram>> {
        let programs = sqlx::query_as::<_, RewardProgram>(
            r#"
            SELECT id, name, reward_type, business_threshold, team_size_threshold,
                   direct_referrals_threshold, reward_amount, duration_days,
                   level, is_active
            FROM reward_programs
            WHERE reward_type = $1 AND is_active
            ORDER BY business_threshold DESC
            "#,
        )
        .bind(reward_type)
        .fetch_all(&self.pool)
        .await?;

        Ok(programs)
    }

    /// 이미 수령(claimed)한 최고 목표치: 같은 구간 재수령 방지
    pub async fn highest_claimed_target(
        &self,
        user_id: Uuid,
        reward_type: &str,
    ) -> Result<Option<f64>> {
        let row: (Option<f64>,) = sqlx::query_as(
            r#"
            SELECT MAX(ur.required_target)
            FROM user_rewards ur
            JOIN reward_programs rp ON rp.id = ur.program_id
            WHERE ur.user_id = $1 AND ur.status = 'claimed' AND rp.reward_type = $2
            "#,
        )
        .bind(user_id)
        .bind(reward_type)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0)
    }

    /// 보상 수령 upsert: (user, program) 행을 claimed로 확정
    pub async fn upsert_claimed_reward(
        &self,
        user_id: Uuid,
        program_id: Uuid,
        current_progress: f64,
        required_target: f64,
        achievement_percentage: f64,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO user_rewards (
                user_id, program_id, current_progress, required_target,
                achievement_percentage, status, achieved_at, claimed_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, 'claimed', NOW(), NOW(), $6)
            ON CONFLICT (user_id, program_id)
            DO UPDATE SET
                current_progress = EXCLUDED.current_progress,
                required_target = EXCLUDED.required_target,
                achievement_percentage = EXCLUDED.achievement_percentage,
                status = 'claimed',
                achieved_at = COALESCE(user_rewards.achieved_at, NOW()),
                claimed_at = NOW(),
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(program_id)
        .bind(current_progress)
        .bind(required_target)
        .bind(achievement_percentage)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 만료 시한이 지난 achieved/in_progress 보상을 expired로 전환
    pub async fn expire_overdue_rewards(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE user_rewards
            SET status = 'expired', updated_at = NOW()
            WHERE status IN ('achieved', 'in_progress')
              AND expires_at IS NOT NULL AND expires_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// 주급 지급 후보: achieved 상태 + 활성 프로그램 + 레벨 보유 + 미만료
    /// + 달성 후 20주 미경과
    pub async fn salary_candidates(&self, now: DateTime<Utc>) -> Result<Vec<SalaryCandidate>> {
        let candidates = sqlx::query_as::<_, SalaryCandidate>(
            r#"
            SELECT ur.id AS reward_id, ur.user_id, rp.level, ur.achieved_at
            FROM user_rewards ur
            JOIN reward_programs rp ON rp.id = ur.program_id
            WHERE ur.status = 'achieved'
              AND rp.is_active
              AND rp.level IS NOT NULL
              AND (ur.expires_at IS NULL OR ur.expires_at > $1)
              AND ur.achieved_at IS NOT NULL
              AND ur.achieved_at > $1 - INTERVAL '140 days'
            ORDER BY ur.achieved_at ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(candidates)
    }

    /// 최근 N일 내 salary 지급 존재 여부 (중복 지급 가드)
    pub async fn has_salary_within_days(
        &self,
        user_id: Uuid,
        days: i64,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM transactions
            WHERE user_id = $1 AND tx_type = 'salary' AND status = 'completed'
              AND created_at > $2
            "#,
        )
        .bind(user_id)
        .bind(now - chrono::Duration::days(days))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.0 > 0)
    }
}

/// 주급 후보 행 (user_rewards ⨝ reward_programs)
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SalaryCandidate {
    pub reward_id: Uuid,
    pub user_id: Uuid,
    pub level: i32,
    pub achieved_at: Option<DateTime<Utc>>,
}
