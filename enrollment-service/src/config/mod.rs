use secrecy::Secret;
use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct EnrollmentConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub mongodb: MongoConfig,
    pub institute: InstituteConfig,
    pub fees: FeePolicyConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: Secret<String>,
    pub database: String,
}

/// Institute details snapshotted onto every receipt.
#[derive(Debug, Clone, Deserialize)]
pub struct InstituteConfig {
    pub name: String,
    pub address: String,
    pub phone: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeePolicyConfig {
    /// Day of the month a fee falls due when the payload gives no due date.
    pub due_day_of_month: u32,
}

impl Default for FeePolicyConfig {
    fn default() -> Self {
        Self {
            due_day_of_month: 10,
        }
    }
}

impl EnrollmentConfig {
    pub fn load() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;
        let is_prod = common_config.is_production();

        let due_day_of_month = get_env("FEE_DUE_DAY_OF_MONTH", Some("10"), is_prod)?
            .parse::<u32>()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("FEE_DUE_DAY_OF_MONTH: {}", e)))?;
        if !(1..=28).contains(&due_day_of_month) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "FEE_DUE_DAY_OF_MONTH must be between 1 and 28, got {}",
                due_day_of_month
            )));
        }

        Ok(EnrollmentConfig {
            common: common_config,
            mongodb: MongoConfig {
                uri: Secret::new(get_env("MONGODB_URI", None, is_prod)?),
                database: get_env("MONGODB_DATABASE", Some("enrollment_db"), is_prod)?,
            },
            institute: InstituteConfig {
                name: get_env("INSTITUTE_NAME", Some("Madrasa Administration"), is_prod)?,
                address: get_env("INSTITUTE_ADDRESS", Some(""), is_prod)?,
                phone: get_env("INSTITUTE_PHONE", Some(""), is_prod)?,
            },
            fees: FeePolicyConfig { due_day_of_month },
        })
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}
