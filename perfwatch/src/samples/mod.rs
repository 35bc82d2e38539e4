//! Metric samples, bounded per-metric history and metric profiles

pub mod profile;
pub mod sample;
pub mod store;

pub use profile::{MetricProfile, ProfileRegistry, Threshold};
pub use sample::{MetricSample, Tags};
pub use store::{MetricQuery, MetricStore, MetricSummary};

/// Conventional metric names written by the domain recording helpers
pub mod names {
    pub const API_RESPONSE_TIME: &str = "api_response_time";
    pub const API_ERRORS: &str = "api_errors";
    pub const AI_OPERATION_DURATION: &str = "ai_operation_duration";
    pub const AI_TOKENS_USED: &str = "ai_tokens_used";
    pub const AI_OPERATION_COST: &str = "ai_operation_cost";
    pub const DB_QUERY_DURATION: &str = "db_query_duration";
    pub const CACHE_HIT: &str = "cache_hit";
    pub const ERRORS: &str = "errors";
}

/// Conventional tag keys
pub mod tags {
    pub const CATEGORY: &str = "category";
    pub const ENDPOINT: &str = "endpoint";
    pub const METHOD: &str = "method";
    pub const STATUS: &str = "status";
    pub const OPERATION: &str = "operation";
    pub const MODEL: &str = "model";
    pub const SUCCESS: &str = "success";
    pub const TABLE: &str = "table";
    pub const CACHE: &str = "cache";
    pub const KIND: &str = "kind";
    pub const USER_ID: &str = "user_id";
    pub const ORGANIZATION_ID: &str = "organization_id";
}
