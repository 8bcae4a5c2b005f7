use crate::db::{MigrationPolicy, StoreConfig};
use crate::domain::Decimal;
use crate::engine::{ClusterPolicy, DetectorPolicy, IntentMode, IntentPolicy, LineagePolicy};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub store: StoreConfig,
    pub detector: DetectorPolicy,
    pub cluster: ClusterPolicy,
    pub intent: IntentPolicy,
    pub lineage: LineagePolicy,
    pub positions_csv: Option<String>,
    pub executions_csv: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let migration_policy = match env_map
            .get("MIGRATION_POLICY")
            .map(|s| s.as_str())
            .unwrap_or("additive")
        {
            "additive" => MigrationPolicy::Additive,
            "strict" => MigrationPolicy::Strict,
            other => {
                return Err(ConfigError::InvalidValue(
                    "MIGRATION_POLICY".to_string(),
                    format!("must be additive or strict, got {}", other),
                ))
            }
        };

        let detector_defaults = DetectorPolicy::default();
        let detector = DetectorPolicy {
            butterfly_tolerance_pct: parse_decimal(
                &env_map,
                "BUTTERFLY_TOLERANCE_PCT",
                detector_defaults.butterfly_tolerance_pct,
            )?,
            butterfly_tolerance_floor: parse_decimal(
                &env_map,
                "BUTTERFLY_TOLERANCE_FLOOR",
                detector_defaults.butterfly_tolerance_floor,
            )?,
        };

        let cluster = ClusterPolicy {
            window_ms: parse_i64(
                &env_map,
                "CLUSTER_WINDOW_MS",
                ClusterPolicy::default().window_ms,
            )?,
        };
        if cluster.window_ms < 0 {
            return Err(ConfigError::InvalidValue(
                "CLUSTER_WINDOW_MS".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let intent_defaults = IntentPolicy::default();
        let mode = match env_map
            .get("INTENT_MODE")
            .map(|s| s.as_str())
            .unwrap_or("streaming")
        {
            "streaming" => IntentMode::Streaming,
            "rowwise" => IntentMode::RowWise,
            other => {
                return Err(ConfigError::InvalidValue(
                    "INTENT_MODE".to_string(),
                    format!("must be streaming or rowwise, got {}", other),
                ))
            }
        };
        let roll_markers = env_map
            .get("ROLL_MARKERS")
            .map(|s| {
                s.split(',')
                    .map(|m| m.trim().to_ascii_lowercase())
                    .filter(|m| !m.is_empty())
                    .collect()
            })
            .unwrap_or(intent_defaults.roll_markers);
        let intent = IntentPolicy {
            strike_tolerance: parse_decimal(
                &env_map,
                "STRIKE_TOLERANCE",
                intent_defaults.strike_tolerance,
            )?,
            strike_round_dp: parse_u32(&env_map, "STRIKE_ROUND_DP", intent_defaults.strike_round_dp)?,
            roll_markers,
            mode,
        };

        let lineage_defaults = LineagePolicy::default();
        let lineage = LineagePolicy {
            max_gap_days: parse_i64(&env_map, "ROLL_GAP_DAYS", lineage_defaults.max_gap_days)?,
            max_shape_gap_days: parse_i64(
                &env_map,
                "ROLL_SHAPE_GAP_DAYS",
                lineage_defaults.max_shape_gap_days,
            )?,
        };

        Ok(Config {
            store: StoreConfig {
                database_path,
                migration_policy,
            },
            detector,
            cluster,
            intent,
            lineage,
            positions_csv: env_map.get("POSITIONS_CSV").cloned(),
            executions_csv: env_map.get("EXECUTIONS_CSV").cloned(),
        })
    }
}

fn parse_decimal(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Decimal,
) -> Result<Decimal, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => {
            let value = Decimal::from_str_canonical(raw).map_err(|_| {
                ConfigError::InvalidValue(key.to_string(), "must be a decimal".to_string())
            })?;
            if value.is_negative() {
                return Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must not be negative".to_string(),
                ));
            }
            Ok(value)
        }
    }
}

fn parse_i64(env_map: &HashMap<String, String>, key: &str, default: i64) -> Result<i64, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().parse::<i64>())
        .transpose()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid i64".to_string()))
        .map(|v| v.unwrap_or(default))
}

fn parse_u32(env_map: &HashMap<String, String>, key: &str, default: u32) -> Result<u32, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().parse::<u32>())
        .transpose()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), "must be a valid u32".to_string()))
        .map(|v| v.unwrap_or(default))
}
