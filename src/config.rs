use std::{env, fmt::Display, str::FromStr, time::Duration};

use anyhow::{Context, anyhow, bail};
use chrono::NaiveTime;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::Level;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_dir: String,
    pub log_level: Level,

    pub attendance: AttendancePolicy,
    pub leave: LeavePolicy,
    pub payroll: PayrollPolicy,

    // Employee directory cache
    pub directory_cache_capacity: u64,
    pub directory_cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct AttendancePolicy {
    /// Check-ins strictly after this local time are late.
    pub work_start: NaiveTime,
    pub standard_daily_hours: Decimal,
}

#[derive(Debug, Clone)]
pub struct LeavePolicy {
    pub annual_days: u32,
    pub sick_days: u32,
    pub personal_days: u32,
    pub min_reason_len: usize,
}

#[derive(Debug, Clone)]
pub struct PayrollPolicy {
    pub tax_rate: Decimal,
    pub insurance_rate: Decimal,
    pub retirement_rate: Decimal,
    pub overtime_multiplier: Decimal,
    /// Hours in a full-time working year, used to derive the hourly rate.
    pub standard_annual_hours: Decimal,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_level: Level::INFO,
            attendance: AttendancePolicy::default(),
            leave: LeavePolicy::default(),
            payroll: PayrollPolicy::default(),
            directory_cache_capacity: 10_000,
            directory_cache_ttl: Duration::from_secs(300),
        }
    }
}

impl Default for AttendancePolicy {
    fn default() -> Self {
        Self {
            work_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            standard_daily_hours: dec!(8),
        }
    }
}

impl Default for LeavePolicy {
    fn default() -> Self {
        Self {
            annual_days: 21,
            sick_days: 10,
            personal_days: 5,
            min_reason_len: 10,
        }
    }
}

impl Default for PayrollPolicy {
    fn default() -> Self {
        Self {
            tax_rate: dec!(0.22),
            insurance_rate: dec!(0.05),
            retirement_rate: dec!(0.06),
            overtime_multiplier: dec!(1.5),
            standard_annual_hours: dec!(2080),
        }
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{key}={raw:?} is invalid: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Reads `HRM_*` variables (after loading `.env`), falling back to the
    /// defaults for anything unset.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenv().ok();

        let defaults = Self::default();

        let work_start = match env::var("HRM_WORK_START") {
            Ok(raw) => NaiveTime::parse_from_str(raw.trim(), "%H:%M")
                .with_context(|| format!("HRM_WORK_START={raw:?} must be HH:MM"))?,
            Err(_) => defaults.attendance.work_start,
        };

        let config = Self {
            log_dir: env_or("HRM_LOG_DIR", defaults.log_dir)?,
            log_level: env_or("HRM_LOG_LEVEL", defaults.log_level)?,
            attendance: AttendancePolicy {
                work_start,
                standard_daily_hours: env_or(
                    "HRM_STANDARD_DAILY_HOURS",
                    defaults.attendance.standard_daily_hours,
                )?,
            },
            leave: LeavePolicy {
                annual_days: env_or("HRM_ANNUAL_LEAVE_DAYS", defaults.leave.annual_days)?,
                sick_days: env_or("HRM_SICK_LEAVE_DAYS", defaults.leave.sick_days)?,
                personal_days: env_or("HRM_PERSONAL_LEAVE_DAYS", defaults.leave.personal_days)?,
                min_reason_len: env_or("HRM_MIN_REASON_LEN", defaults.leave.min_reason_len)?,
            },
            payroll: PayrollPolicy {
                tax_rate: env_or("HRM_TAX_RATE", defaults.payroll.tax_rate)?,
                insurance_rate: env_or("HRM_INSURANCE_RATE", defaults.payroll.insurance_rate)?,
                retirement_rate: env_or("HRM_RETIREMENT_RATE", defaults.payroll.retirement_rate)?,
                overtime_multiplier: env_or(
                    "HRM_OVERTIME_MULTIPLIER",
                    defaults.payroll.overtime_multiplier,
                )?,
                standard_annual_hours: env_or(
                    "HRM_STANDARD_ANNUAL_HOURS",
                    defaults.payroll.standard_annual_hours,
                )?,
            },
            directory_cache_capacity: env_or(
                "HRM_DIRECTORY_CACHE_CAPACITY",
                defaults.directory_cache_capacity,
            )?,
            directory_cache_ttl: Duration::from_secs(env_or(
                "HRM_DIRECTORY_CACHE_TTL_SECS",
                defaults.directory_cache_ttl.as_secs(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects policies the pay and attendance math cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.payroll.standard_annual_hours <= Decimal::ZERO {
            bail!("HRM_STANDARD_ANNUAL_HOURS must be positive");
        }
        if self.attendance.standard_daily_hours <= Decimal::ZERO {
            bail!("HRM_STANDARD_DAILY_HOURS must be positive");
        }
        let rates = [
            ("HRM_TAX_RATE", self.payroll.tax_rate),
            ("HRM_INSURANCE_RATE", self.payroll.insurance_rate),
            ("HRM_RETIREMENT_RATE", self.payroll.retirement_rate),
            ("HRM_OVERTIME_MULTIPLIER", self.payroll.overtime_multiplier),
        ];
        for (key, value) in rates {
            if value < Decimal::ZERO {
                bail!("{key} cannot be negative");
            }
        }
        Ok(())
    }
}
