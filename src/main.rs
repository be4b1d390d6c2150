//! Rewards Engine Server
//!
//! # Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Scheduler (tokio interval)               │
//! │        ProcessAllROI / WeeklySalary / Commissions            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Axum Server                             │
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                      Routes Layer                        ││
//! │  │  /health  /admin/*  /team/*                              ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Services Layer                        ││
//! │  │  Ledger  Tree  Commission  Upline  ROI  Team  Salary    ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                    Data Layer                            ││
//! │  │  PostgreSQL (wallets / transactions / referral_nodes)   ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use chrono::Utc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rewards_engine_api::services::{LevelCommissionService, RoiProcessor, SalaryProcessor};
use rewards_engine_api::{routes, AppState, Config, Database, EngineSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 환경변수 로드
    dotenvy::dotenv().ok();

    // 로깅 초기화
    // RUST_LOG=debug,sqlx=warn 형태로 레벨 제어 가능
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rewards_engine_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Rewards Engine Server");

    // 설정 로드
    let config = Config::from_env()?;
    tracing::info!("📋 Configuration loaded");

    // 데이터베이스 연결
    let db = Database::connect(&config.database_url).await?;
    tracing::info!("🗄️  Database connected");

    // 마이그레이션 실행
    db.run_migrations().await?;
    tracing::info!("📦 Migrations completed");

    // 앱 상태 구성
    let state = AppState {
        db: Arc::new(db),
        config: Arc::new(config.clone()),
    };

    // 배치 스케줄러 시작
    tokio::spawn(run_scheduler(state.clone()));
    tracing::info!("⏰ Scheduler started (tick: {}s)", config.scheduler_tick_secs);

    // 라우터 구성
    let app = create_router(state);

    // 서버 시작
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🌐 Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// 배치 스케줄러 루프
///
/// 매 tick마다 설정 스냅샷을 새로 읽고 ROI → 커미션 → 주급 순으로 돌린다.
/// 각 배치는 자체 가드(last_roi_date, 7일 주급 가드)로 멱등이라 tick이
/// 하루에 여러 번 와도 중복 지급이 없다. 설정 로드 실패는 해당 run만
/// 건너뛰고 프로세스는 유지한다.
async fn run_scheduler(state: AppState) {
    let mut interval =
        tokio::time::interval(std::time::Duration::from_secs(state.config.scheduler_tick_secs));

    loop {
        interval.tick().await;

        let now = Utc::now();
        let settings = match state.db.load_settings().await {
            Ok(rows) => match EngineSettings::from_rows(&rows) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::error!(error = %e, "settings snapshot invalid, skipping run");
                    continue;
                }
            },
            Err(e) => {
                tracing::error!(error = %e, "failed to load settings, skipping run");
                continue;
            }
        };

        match RoiProcessor::new(state.db.clone())
            .process_all(&settings, now)
            .await
        {
            Ok(summary) => tracing::info!(
                successful = summary.successful,
                skipped = summary.skipped,
                failed = summary.failed,
                total = summary.total_amount,
                "💰 ROI run finished"
            ),
            Err(e) => tracing::error!(error = %e, "ROI run aborted"),
        }

        match LevelCommissionService::new(state.db.clone())
            .distribute_for_all_users(&settings, now)
            .await
        {
            Ok(summary) => tracing::info!(
                successful = summary.successful,
                total = summary.total_amount,
                "🤝 Commission run finished"
            ),
            Err(e) => tracing::error!(error = %e, "commission run aborted"),
        }

        match SalaryProcessor::new(state.db.clone())
            .process_weekly(&settings, now)
            .await
        {
            Ok(summary) => tracing::info!(
                successful = summary.successful,
                skipped = summary.skipped,
                total = summary.total_amount,
                "💵 Salary run finished"
            ),
            Err(e) => tracing::error!(error = %e, "salary run aborted"),
        }
    }
}

/// 라우터 생성
///
/// # Route Structure
///
/// ```text
/// GET  /health                      - 서버 상태 확인
///
/// POST /admin/roi/run               - ROI 전체 배치
/// POST /admin/roi/user/:id          - 단일 사용자 수동 처리
/// POST /admin/roi/users             - 사용자 목록 수동 처리
/// POST /admin/commission/run        - 커미션 전체 분배
/// POST /admin/commission/user/:id   - 단일 이벤트 커미션 분배
/// POST /admin/upline/user/:id       - 자손 자격 보상 분배
/// POST /admin/salary/run            - 주급 배치
/// POST /admin/rewards/:id/claim     - 실적 구간 보상 수령
///
/// GET  /team/:id/business           - 팀 실적 집계
/// GET  /team/:id/legs               - 레그 분배 조회
/// ```
fn create_router(state: AppState) -> Router {
    // CORS: 운영자 대시보드 전용 표면이라 프로덕션에서는 도메인 제한
    let cors = if state.config.is_production() {
        let allowed_origins = std::env::var("ALLOWED_ORIGINS").unwrap_or_default();
        let origins: Vec<_> = allowed_origins
            .split(',')
            .filter_map(|s| s.trim().parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
            .allow_headers([axum::http::header::CONTENT_TYPE])
    } else {
        CorsLayer::permissive()
    };

    Router::new()
        // Health check
        .route("/health", get(routes::health::health_check))
        // Manual batch triggers
        .route("/admin/roi/run", post(routes::admin::run_roi))
        .route("/admin/roi/user/:user_id", post(routes::admin::run_roi_for_user))
        .route("/admin/roi/users", post(routes::admin::run_roi_for_users))
        .route("/admin/commission/run", post(routes::admin::run_commission))
        .route(
            "/admin/commission/user/:user_id",
            post(routes::admin::run_commission_for_user),
        )
        .route(
            "/admin/upline/user/:user_id",
            post(routes::admin::run_upline_for_user),
        )
        .route("/admin/salary/run", post(routes::admin::run_salary))
        .route(
            "/admin/rewards/:user_id/claim",
            post(routes::admin::claim_reward),
        )
        // Team business queries
        .route("/team/:user_id/business", get(routes::team::get_team_business))
        .route("/team/:user_id/legs", get(routes::team::get_leg_distribution))
        // 미들웨어
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        // 상태 주입
        .with_state(state)
}
