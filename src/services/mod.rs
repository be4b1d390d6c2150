//! Services Module
//!
//! 비즈니스 로직을 담당하는 서비스 레이어
//!
//! # Services
//! - `ledger`: 원장 append + 캡 검증 (잔액 변경의 단일 관문)
//! - `ReferralTreeService`: 추천 트리 탐색 (조상 체인, BFS, path 서브트리)
//! - `LevelCommissionService`: 레벨 커미션 분배
//! - `UplineDistributor`: 자손 자격 보상 분배
//! - `RoiProcessor`: 일일 ROI 적립 배치
//! - `TeamBusinessAggregator`: 팀 실적 집계 / 레그 분배 / 구간 보상
//! - `SalaryProcessor`: 주급 배치

pub mod ledger;
mod level_commission;
mod referral_tree;
mod roi_processor;
mod salary;
mod team_business;
mod upline;

pub use ledger::{AppendOutcome, CapDecision, NewLedgerEntry};
pub use level_commission::{plan_level_payouts, LevelCommissionService, MAX_COMMISSION_LEVELS};
pub use referral_tree::{ReferralTreeService, MAX_TREE_DEPTH};
pub use roi_processor::{boost_percentage, compute_accrual, synthesize_sub_legs, RoiProcessor};
pub use salary::{resolve_salary_level, SalaryProcessor};
pub use team_business::{
    distribute_legs, parse_ratio, BusinessReport, ClaimOutcome, LegDistribution,
    TeamBusinessAggregator,
};
pub use upline::{plan_upline_rewards, UplineDistributor, DEFAULT_UPLINE_LEVELS};
