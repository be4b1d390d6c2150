//! Admin Trigger Endpoints
//!
//! 운영자 수동 실행 표면. 스케줄러와 같은 배치 로직을 같은 설정 스냅샷
//! 규칙으로 태운다: 설정이 꺼져 있으면 여기서도 "disabled" 요약이 돌아온다.

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::services::{
    ClaimOutcome, LevelCommissionService, RoiProcessor, SalaryProcessor, TeamBusinessAggregator,
    UplineDistributor,
};
use crate::types::{ApiResponse, BatchSummary};
use crate::AppState;

/// 실행 시작 시점의 설정 스냅샷 로드
async fn load_settings(state: &AppState) -> Result<EngineSettings, EngineError> {
    let rows = state
        .db
        .load_settings()
        .await
        .map_err(|e| EngineError::Database(e.to_string()))?;
    EngineSettings::from_rows(&rows)
}

// ============ ROI ============

/// POST /admin/roi/run
///
/// 전체 활성 투자 ROI 배치 (스케줄러와 동일 경로)
pub async fn run_roi(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BatchSummary>>, EngineError> {
    let settings = load_settings(&state).await?;
    let summary = RoiProcessor::new(state.db.clone())
        .process_all(&settings, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// POST /admin/roi/user/:user_id
///
/// 단일 사용자 수동 처리: 같은 날 중복 가드 없음
pub async fn run_roi_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<Json<ApiResponse<BatchSummary>>, EngineError> {
    let settings = load_settings(&state).await?;
    let summary = RoiProcessor::new(state.db.clone())
        .process_user(&settings, user_id, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[derive(Debug, Deserialize)]
pub struct RoiUsersRequest {
    pub user_ids: Vec<Uuid>,
}

/// POST /admin/roi/users
pub async fn run_roi_for_users(
    State(state): State<AppState>,
    Json(request): Json<RoiUsersRequest>,
) -> Result<Json<ApiResponse<BatchSummary>>, EngineError> {
    if request.user_ids.is_empty() {
        return Err(EngineError::Validation("user_ids must not be empty".into()));
    }

    let settings = load_settings(&state).await?;
    let summary = RoiProcessor::new(state.db.clone())
        .process_users(&settings, &request.user_ids, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

// ============ 커미션 ============

/// POST /admin/commission/run
///
/// 최근 24시간 적립 보유 사용자 전체 커미션 분배
pub async fn run_commission(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BatchSummary>>, EngineError> {
    let settings = load_settings(&state).await?;
    let summary = LevelCommissionService::new(state.db.clone())
        .distribute_for_all_users(&settings, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[derive(Debug, Deserialize)]
pub struct TriggerRequest {
    pub base_amount: f64,
}

/// POST /admin/commission/user/:user_id
///
/// 특정 적립 이벤트에 대한 수동 분배
pub async fn run_commission_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<ApiResponse<BatchSummary>>, EngineError> {
    let settings = load_settings(&state).await?;
    let summary = LevelCommissionService::new(state.db.clone())
        .distribute(&settings, user_id, request.base_amount, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

/// POST /admin/upline/user/:user_id
///
/// 자손 자격 보상 수동 분배
pub async fn run_upline_for_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<TriggerRequest>,
) -> Result<Json<ApiResponse<BatchSummary>>, EngineError> {
    let settings = load_settings(&state).await?;
    let summary = UplineDistributor::new(state.db.clone())
        .distribute(&settings, user_id, request.base_amount, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

// ============ 주급 / 보상 ============

/// POST /admin/salary/run
pub async fn run_salary(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<BatchSummary>>, EngineError> {
    let settings = load_settings(&state).await?;
    let summary = SalaryProcessor::new(state.db.clone())
        .process_weekly(&settings, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(summary)))
}

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub program_id: Uuid,
}

/// POST /admin/rewards/:user_id/claim
pub async fn claim_reward(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(request): Json<ClaimRequest>,
) -> Result<Json<ApiResponse<ClaimOutcome>>, EngineError> {
    let settings = load_settings(&state).await?;
    let outcome = TeamBusinessAggregator::new(state.db.clone())
        .claim_reward(&settings, user_id, request.program_id, Utc::now())
        .await?;
    Ok(Json(ApiResponse::success(outcome)))
}
