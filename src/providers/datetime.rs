//! Date/time provider tools

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Local, NaiveDate};
use serde_json::{Value, json};

use crate::domain::{ParamSpec, ParamType, ToolDescriptor};
use crate::error::Result;

use super::registry::{ToolFault, ToolRegistry, str_arg};

pub const PROVIDER_ID: &str = "datetime";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Unit for `calculate_date_difference`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Days,
    Weeks,
    Months,
    Years,
}

impl DateUnit {
    pub const ALL: [&'static str; 4] = ["days", "weeks", "months", "years"];
}

impl FromStr for DateUnit {
    type Err = ToolFault;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "days" => Ok(Self::Days),
            "weeks" => Ok(Self::Weeks),
            "months" => Ok(Self::Months),
            "years" => Ok(Self::Years),
            other => Err(ToolFault::InvalidArguments(format!(
                "invalid unit '{}', must be one of: {}",
                other,
                Self::ALL.join(", ")
            ))),
        }
    }
}

impl fmt::Display for DateUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Days => "days",
            Self::Weeks => "weeks",
            Self::Months => "months",
            Self::Years => "years",
        };
        f.write_str(name)
    }
}

/// Whole units from `start` to `end`; negative when `end` is earlier.
///
/// Weeks use floor division. Months and years only count once the end day
/// (or month and day) has reached the start's.
pub fn date_difference(start: NaiveDate, end: NaiveDate, unit: DateUnit) -> i64 {
    match unit {
        DateUnit::Days => (end - start).num_days(),
        DateUnit::Weeks => (end - start).num_days().div_euclid(7),
        DateUnit::Months => {
            let mut months =
                (end.year() as i64 - start.year() as i64) * 12 + end.month() as i64 - start.month() as i64;
            if end.day() < start.day() {
                months -= 1;
            }
            months
        }
        DateUnit::Years => {
            let mut years = end.year() as i64 - start.year() as i64;
            if (end.month(), end.day()) < (start.month(), start.day()) {
                years -= 1;
            }
            years
        }
    }
}

fn parse_date(name: &str, raw: &str) -> std::result::Result<NaiveDate, ToolFault> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        ToolFault::InvalidArguments(format!(
            "invalid {} '{}', expected YYYY-MM-DD: {}",
            name, raw, e
        ))
    })
}

fn current_time() -> Value {
    json!(Local::now().format("%H:%M:%S").to_string())
}

fn current_date() -> Value {
    json!(Local::now().date_naive().format(DATE_FORMAT).to_string())
}

fn calculate(arguments: &serde_json::Map<String, Value>) -> std::result::Result<Value, ToolFault> {
    let start = parse_date("start_date", str_arg(arguments, "start_date")?)?;
    let end = parse_date("end_date", str_arg(arguments, "end_date")?)?;
    let unit: DateUnit = str_arg(arguments, "unit")?.parse()?;

    let result = date_difference(start, end, unit);
    log::info!("Date difference {} -> {}: {} {}", start, end, result, unit);
    Ok(json!(result))
}

/// Registry with the date/time tools
pub fn registry() -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new(PROVIDER_ID);

    registry.register(
        ToolDescriptor::new("get_current_time", "Returns the current time in HH:MM:SS format."),
        |_| Ok(current_time()),
    )?;
    registry.register(
        ToolDescriptor::new("get_current_date", "Returns the current date in YYYY-MM-DD format."),
        |_| Ok(current_date()),
    )?;
    registry.register(
        ToolDescriptor::new(
            "calculate_date_difference",
            "Calculates the difference between two dates in the specified unit (days, weeks, months, or years).",
        )
        .with_param(ParamSpec::required(
            "start_date",
            ParamType::String,
            "The start date in YYYY-MM-DD format.",
        ))
        .with_param(ParamSpec::required(
            "end_date",
            ParamType::String,
            "The end date in YYYY-MM-DD format.",
        ))
        .with_param(
            ParamSpec::required(
                "unit",
                ParamType::String,
                "The unit for the difference (days, weeks, months, years).",
            )
            .with_allowed(&DateUnit::ALL),
        ),
        calculate,
    )?;

    Ok(registry)
}
