use rentline_catalog::{DeliveryPolicy, PricingRules};
use rentline_order::HoldSchedulerConfig;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Absent means a single process with an in-memory hold lease
    pub redis: Option<RedisConfig>,
    pub routing: RoutingConfig,
    pub auth: AuthConfig,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub payments: PaymentsConfig,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct PaymentsConfig {
    /// In-process processor that approves every card. Local runs only.
    #[serde(default)]
    pub simulated: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    pub daily_rate: Decimal,
    pub waiver_daily_rate: Decimal,
    pub tax_rate: Decimal,
    pub delivery_leg_fee: Decimal,
    pub delivery_included_km: Decimal,
    pub delivery_per_km: Decimal,
    pub hold_amount: Decimal,
    #[serde(default = "default_hold_lead_hours")]
    pub hold_lead_hours: i64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_hold_lead_hours() -> i64 { 48 }
fn default_currency() -> String { "CAD".to_string() }

impl From<&BusinessRules> for PricingRules {
    fn from(rules: &BusinessRules) -> Self {
        PricingRules {
            daily_rate: rules.daily_rate,
            waiver_daily_rate: rules.waiver_daily_rate,
            tax_rate: rules.tax_rate,
            delivery: DeliveryPolicy {
                leg_fee: rules.delivery_leg_fee,
                included_km: rules.delivery_included_km,
                per_km: rules.delivery_per_km,
            },
            hold_amount: rules.hold_amount,
            currency: rules.currency.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    pub sweep_interval_seconds: u64,
    pub sweep_batch_size: i64,
    pub late_alert_minutes: i64,
    pub lease_ttl_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            sweep_interval_seconds: 300,
            sweep_batch_size: 100,
            late_alert_minutes: 15,
            lease_ttl_seconds: 60,
        }
    }
}

impl Config {
    pub fn pricing_rules(&self) -> PricingRules {
        PricingRules::from(&self.business_rules)
    }

    pub fn hold_scheduler(&self) -> HoldSchedulerConfig {
        HoldSchedulerConfig {
            lead: chrono::Duration::hours(self.business_rules.hold_lead_hours),
            currency: self.business_rules.currency.clone(),
            lease_ttl: std::time::Duration::from_secs(self.scheduler.lease_ttl_seconds),
            sweep_batch_size: self.scheduler.sweep_batch_size,
            late_alert_after: chrono::Duration::minutes(self.scheduler.late_alert_minutes),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RoutingConfig {
    pub base_url: String,
    #[serde(default = "default_routing_timeout")]
    pub timeout_seconds: u64,
}

fn default_routing_timeout() -> u64 { 10 }

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // RENTLINE_SERVER__PORT=8080 sets server.port
            .add_source(config::Environment::with_prefix("RENTLINE").separator("__"))
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let scheduler = &self.scheduler;
        if scheduler.sweep_interval_seconds == 0 {
            return Err(invalid("scheduler.sweep_interval_seconds must be greater than 0"));
        }
        if scheduler.sweep_batch_size <= 0 {
            return Err(invalid("scheduler.sweep_batch_size must be greater than 0"));
        }
        if scheduler.lease_ttl_seconds == 0 {
            return Err(invalid("scheduler.lease_ttl_seconds must be greater than 0"));
        }
        Ok(())
    }
}

fn invalid(message: &str) -> config::ConfigError {
    config::ConfigError::Message(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn rules() -> BusinessRules {
        BusinessRules {
            daily_rate: dec!(500),
            waiver_daily_rate: dec!(35),
            tax_rate: dec!(0.13),
            delivery_leg_fee: dec!(120),
            delivery_included_km: dec!(25),
            delivery_per_km: dec!(2.5),
            hold_amount: dec!(750),
            hold_lead_hours: 72,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn test_business_rules_become_pricing_rules() {
        let pricing = PricingRules::from(&rules());
        assert_eq!(pricing.daily_rate, dec!(500));
        assert_eq!(pricing.delivery.per_km, dec!(2.5));
        assert_eq!(pricing.hold_amount, dec!(750));
        assert_eq!(pricing.currency, "USD");
    }

    fn defaults() -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(
                include_str!("../../config/default.toml"),
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize::<Config>()
            .unwrap()
    }

    #[test]
    fn test_defaults_file_parses() {
        let config = defaults();

        assert!(config.validate().is_ok());
        assert!(!config.payments.simulated);
        assert!(config.redis.is_none());
        assert_eq!(config.business_rules.hold_lead_hours, 48);
        assert_eq!(config.hold_scheduler().sweep_batch_size, 100);
        assert_eq!(config.pricing_rules().tax_rate, dec!(0.15));
    }

    #[test]
    fn test_zero_scheduler_settings_rejected() {
        let mut config = defaults();
        config.scheduler.sweep_interval_seconds = 0;
        assert!(config.validate().is_err());

        let mut config = defaults();
        config.scheduler.lease_ttl_seconds = 0;
        assert!(config.validate().is_err());
    }
}
