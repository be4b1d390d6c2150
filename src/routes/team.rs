//! Team Business Endpoints
//!
//! 팀 실적 집계와 레그 분배 조회.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::error::EngineError;
use crate::services::{BusinessReport, LegDistribution, TeamBusinessAggregator};
use crate::types::ApiResponse;
use crate::AppState;

/// 기간 필터 쿼리 파라미터
#[derive(Debug, Deserialize)]
pub struct BusinessQuery {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// GET /team/:user_id/business
///
/// 중첩 팀 실적 집계 (레벨별 합계, 직추천 실적, 팀 규모)
pub async fn get_team_business(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<BusinessQuery>,
) -> Result<Json<ApiResponse<BusinessReport>>, EngineError> {
    let report = TeamBusinessAggregator::new(state.db.clone())
        .team_summary(user_id, query.from, query.to)
        .await?;
    Ok(Json(ApiResponse::success(report)))
}

#[derive(Debug, Deserialize)]
pub struct LegQuery {
    /// 미지정 시 설정 테이블의 비율 사용
    pub ratio: Option<String>,
}

/// GET /team/:user_id/legs
///
/// 직추천 서브트리 실적의 비율 버킷 분배
pub async fn get_leg_distribution(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<LegQuery>,
) -> Result<Json<ApiResponse<LegDistribution>>, EngineError> {
    let ratio = match query.ratio {
        Some(ratio) => ratio,
        None => {
            let rows = state
                .db
                .load_settings()
                .await
                .map_err(|e| EngineError::Database(e.to_string()))?;
            EngineSettings::from_rows(&rows)?.reward_programs.ratio
        }
    };

    let distribution = TeamBusinessAggregator::new(state.db.clone())
        .leg_distribution(user_id, &ratio)
        .await?;
    Ok(Json(ApiResponse::success(distribution)))
}
