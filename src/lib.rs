//! Multi-Level Commission & Reward Distribution Engine
//!
//! # Overview
//!
//! 추천 트리와 append-only 원장을 공유하는 다단계 커미션/보상 엔진.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                        Engine                            │
//! │                                                          │
//! │  ┌─────────┐  ┌─────────┐  ┌─────────┐  ┌─────────┐    │
//! │  │ Routes  │  │Services │  │   DB    │  │  Types  │    │
//! │  └────┬────┘  └────┬────┘  └────┬────┘  └────┬────┘    │
//! │       │            │            │            │          │
//! │       └────────────┴────────────┴────────────┘          │
//! │                         │                                │
//! └─────────────────────────┼────────────────────────────────┘
//!                           │
//!                           ▼
//!                  ┌────────────────┐
//!                  │   PostgreSQL   │
//!                  └────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: 환경 설정 + 배치별 설정 스냅샷
//! - `error`: 에러 타입 및 처리
//! - `routes`: 헬스 체크 / 운영자 트리거 엔드포인트
//! - `services`: 비즈니스 로직 (원장, 트리, 커미션, ROI, 팀 실적, 주급)
//! - `db`: 데이터베이스 연동
//! - `types`: 공통 타입 정의 (배치 요약 등)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rewards_engine_api::{config::Config, db::Database, services::RoiProcessor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let db = Database::connect(&config.database_url).await?;
//!
//!     // ... 스케줄러/서버 시작
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod services;
pub mod types;

// Re-exports for convenience
pub use config::{Config, EngineSettings};
pub use db::Database;
pub use error::EngineError;
pub use types::BatchSummary;

/// 애플리케이션 전역 상태
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub config: Arc<Config>,
}
