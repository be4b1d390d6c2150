//! Error Handling Module
//!
//! Provides type-safe error handling with proper HTTP status code mapping.
//! Uses thiserror for domain errors and integrates with tracing for structured logging.
//!
//! # Design Decision
//!
//! 비즈니스 결과(캡 도달, 설정 꺼짐, 대상 없음)는 에러가 아니다.
//! - 캡: AppendOutcome::Capped / NotRecorded variant로 반환
//! - 설정 꺼짐: BatchSummary에 "disabled"로 보고
//! 에러는 진짜 실패만 표현한다:
//! - Configuration: run 전체 중단
//! - Validation / NotFound / Constraint: 해당 엔티티만 실패, 배치는 계속

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// 엔진 에러 타입
#[derive(Debug, Error)]
pub enum EngineError {
    // ============ run 전체를 중단시키는 에러 ============
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ============ 엔티티 단위 에러 (배치는 계속) ============
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// 유니크 제약 위반 (reference_id / tx_hash 중복), 잘못된 JSON payload
    #[error("Constraint violation: {0}")]
    Constraint(String),

    // ============ 인프라 에러 ============
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error")]
    Internal,
}

/// API 에러 응답 구조
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            EngineError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                "Validation failed".to_string(),
                Some(msg.clone()),
            ),
            EngineError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("{} not found", resource),
                None,
            ),
            EngineError::Constraint(msg) => (
                StatusCode::CONFLICT,
                "CONSTRAINT_VIOLATION",
                "Constraint violation".to_string(),
                Some(msg.clone()),
            ),
            EngineError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIGURATION_ERROR",
                    "Configuration error".to_string(),
                    Some(msg.clone()),
                )
            }

            // 내부 에러는 클라이언트에 상세 정보 노출 안 함
            EngineError::Database(_) => {
                tracing::error!("Database error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "Database error occurred".to_string(),
                    None,
                )
            }
            EngineError::Internal => {
                tracing::error!("Internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// SQLx 에러를 EngineError로 변환
///
/// 유니크 제약 위반(23505)은 Constraint로 분류: 해당 append만 실패하고
/// 배치의 나머지는 계속되어야 하므로 Database와 구분한다.
impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return EngineError::Constraint(db_err.message().to_string());
            }
        }
        tracing::error!("SQLx error: {:?}", err);
        EngineError::Database(err.to_string())
    }
}

/// serde_json 에러 (JSONB payload 직렬화 실패)
impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Constraint(format!("invalid JSON payload: {}", err))
    }
}

/// anyhow 에러를 EngineError로 변환
impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!("Anyhow error: {:?}", err);
        EngineError::Internal
    }
}

impl EngineError {
    /// run 전체를 중단시켜야 하는 에러인지
    pub fn is_fatal_to_run(&self) -> bool {
        matches!(self, EngineError::Configuration(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_error_is_fatal() {
        assert!(EngineError::Configuration("missing".into()).is_fatal_to_run());
        assert!(!EngineError::Validation("bad amount".into()).is_fatal_to_run());
        assert!(!EngineError::Constraint("dup hash".into()).is_fatal_to_run());
    }

    #[test]
    fn test_json_error_maps_to_constraint() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let engine_err: EngineError = err.into();
        assert!(matches!(engine_err, EngineError::Constraint(_)));
    }
}
