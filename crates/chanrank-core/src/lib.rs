mod app_config;
mod channels;
mod config;
mod plan;
mod store;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use channels::{
    engagement_rate, ChannelRecord, PageRequest, RankingFilter, SortKey, StoredChannel,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use plan::{
    load_plan, parse_plan, CategoryPlan, CollectionPlan, PlanDefaults, RegionPlan,
};
pub use store::{RankingStore, StoreError, UpsertOutcome};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read collection plan at {path}: {source}")]
    PlanFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse collection plan: {0}")]
    PlanFileParse(#[from] serde_yaml::Error),

    #[error("collection plan validation failed: {0}")]
    Validation(String),
}
