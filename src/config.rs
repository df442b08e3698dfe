use std::env;
use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;

use crate::engine::selection::{AcceptancePolicy, ScoreWeights, SelectionStrategy};
use crate::engine::settlement::FeePolicy;
use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub scheduler_interval_secs: u64,
    pub scheduler_batch_limit: usize,
    pub lifecycle: LifecycleSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::BadRequest(format!(
                "unknown log format: {other}, expected compact/json"
            ))),
        }
    }
}

/// Business knobs shared by the lifecycle components.
#[derive(Debug, Clone)]
pub struct LifecycleSettings {
    /// How long before departure a route stops taking bids.
    pub bid_closing_offset: Duration,
    pub fee_policy: FeePolicy,
    pub acceptance: AcceptancePolicy,
}

impl Default for LifecycleSettings {
    fn default() -> Self {
        Self {
            bid_closing_offset: Duration::hours(2),
            fee_policy: FeePolicy::Percentage(Decimal::from(10)),
            acceptance: AcceptancePolicy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let closing_offset_minutes: i64 = parse_or_default("BID_CLOSING_OFFSET_MINUTES", 120)?;
        if closing_offset_minutes < 0 {
            return Err(AppError::Internal(
                "invalid BID_CLOSING_OFFSET_MINUTES: must not be negative".to_string(),
            ));
        }

        let fee_mode: String = parse_or_default("APP_FEE_MODE", "percentage".to_string())?;
        let fee_value: Decimal = parse_or_default("APP_FEE_VALUE", Decimal::from(10))?;
        let fee_policy = FeePolicy::from_parts(&fee_mode, fee_value)
            .map_err(|err| AppError::Internal(format!("invalid app fee: {err}")))?;

        let defaults = ScoreWeights::default();
        let acceptance = AcceptancePolicy {
            strategy: parse_or_default("AUTO_ACCEPT_POLICY", SelectionStrategy::LowestPrice)?,
            weights: ScoreWeights {
                price: parse_or_default("BID_WEIGHT_PRICE", defaults.price)?,
                volume: parse_or_default("BID_WEIGHT_VOLUME", defaults.volume)?,
                distance: parse_or_default("BID_WEIGHT_DISTANCE", defaults.distance)?,
                detour: parse_or_default("BID_WEIGHT_DETOUR", defaults.detour)?,
            },
            vehicle_capacity_m3: parse_or_default("VEHICLE_CAPACITY_M3", 100.0)?,
        };

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: parse_or_default("LOG_FORMAT", LogFormat::Compact)?,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            scheduler_interval_secs: parse_or_default("SCHEDULER_INTERVAL_SECS", 60)?,
            scheduler_batch_limit: parse_or_default("SCHEDULER_BATCH_LIMIT", 100)?,
            lifecycle: LifecycleSettings {
                bid_closing_offset: Duration::minutes(closing_offset_minutes),
                fee_policy,
                acceptance,
            },
        })
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
