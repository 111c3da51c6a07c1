//! Time-bin resampling of the final frame.
//!
//! Fixed-width rules (`S`, `T`/`min`, `H`/`h`, `D`) anchor their bins at
//! midnight of the first timestamp's day and label each bin by its start.
//! Weekly bins end on Sunday and carry the Sunday's date. Monthly and
//! yearly bins are labelled by their last day (`M`, `ME`, `Y`, `A`, `YE`) or
//! their first day (`MS`, `YS`, `AS`). Every bin between the first and the
//! last observation is emitted, empty ones included.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use smio_common::{Column, Frame, SmioError, SmioResult};
use tracing::{debug, warn};
use ts_adapters::CombineFunc;

const DDOF: usize = 1;

/// A parsed resample rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleRule {
    /// Fixed-width bins.
    Fixed(Duration),
    /// `n` weeks ending Sunday.
    Weeks(u32),
    /// `n` months, labelled at the start (`true`) or end.
    Months { n: u32, start_label: bool },
    /// `n` years, labelled at the start (`true`) or end.
    Years { n: u32, start_label: bool },
}

impl ResampleRule {
    /// Parse `<n><unit>`, e.g. `"10D"`, `"6H"`, `"MS"`.
    pub fn parse(rule: &str) -> Result<Self, String> {
        let rule = rule.trim();
        let split = rule
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("resample rule '{}' has no unit", rule))?;
        let (count, unit) = rule.split_at(split);
        let n: u32 = if count.is_empty() {
            1
        } else {
            count
                .parse()
                .map_err(|_| format!("resample rule '{}' has an invalid count", rule))?
        };
        if n == 0 {
            return Err(format!("resample rule '{}' has a zero count", rule));
        }

        let fixed = |unit: Duration| {
            i32::try_from(n)
                .ok()
                .and_then(|n| unit.checked_mul(n))
                .map(ResampleRule::Fixed)
                .ok_or_else(|| format!("resample rule '{}' has a bin width out of range", rule))
        };
        match unit {
            "S" | "s" => fixed(Duration::seconds(1)),
            "T" | "min" => fixed(Duration::minutes(1)),
            "H" | "h" => fixed(Duration::hours(1)),
            "D" => fixed(Duration::days(1)),
            "W" | "W-SUN" => Ok(ResampleRule::Weeks(n)),
            "M" | "ME" => Ok(ResampleRule::Months { n, start_label: false }),
            "MS" => Ok(ResampleRule::Months { n, start_label: true }),
            "Y" | "A" | "YE" => Ok(ResampleRule::Years { n, start_label: false }),
            "YS" | "AS" => Ok(ResampleRule::Years { n, start_label: true }),
            _ => Err(format!("resample rule '{}' has an unknown unit '{}'", rule, unit)),
        }
    }
}

impl std::str::FromStr for ResampleRule {
    type Err = SmioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ResampleRule::parse(s).map_err(SmioError::configuration)
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_hms_opt(0, 0, 0).unwrap_or_default()
}

fn month_number(t: &NaiveDateTime) -> i64 {
    t.year() as i64 * 12 + t.month0() as i64
}

fn first_of_month(month: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(month.div_euclid(12) as i32, month.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or_default()
}

fn last_of_month(month: i64) -> NaiveDate {
    first_of_month(month + 1).pred_opt().unwrap_or_default()
}

/// Sunday on or after the day of `t`.
fn week_end(t: &NaiveDateTime) -> NaiveDate {
    let to_sunday = 6 - t.weekday().num_days_from_monday() as i64;
    t.date() + Duration::days(to_sunday)
}

/// Maps timestamps to bin numbers relative to the first observation and
/// bin numbers back to labels.
struct Binner {
    rule: ResampleRule,
    origin: NaiveDateTime,
}

impl Binner {
    fn new(rule: ResampleRule, first: &NaiveDateTime) -> Self {
        let origin = match rule {
            ResampleRule::Fixed(_) => midnight(first.date()),
            ResampleRule::Weeks(_) => midnight(week_end(first)),
            ResampleRule::Months { .. } => midnight(first_of_month(month_number(first))),
            ResampleRule::Years { .. } => midnight(first_of_month(first.year() as i64 * 12)),
        };
        Self { rule, origin }
    }

    fn bin(&self, t: &NaiveDateTime) -> i64 {
        match self.rule {
            ResampleRule::Fixed(step) => {
                let step = step.num_milliseconds().max(1);
                (*t - self.origin).num_milliseconds().div_euclid(step)
            }
            ResampleRule::Weeks(n) => {
                let weeks = (week_end(t) - self.origin.date()).num_days() / 7;
                weeks.div_euclid(n as i64)
            }
            ResampleRule::Months { n, .. } => {
                (month_number(t) - month_number(&self.origin)).div_euclid(n as i64)
            }
            ResampleRule::Years { n, .. } => {
                (t.year() as i64 - self.origin.year() as i64).div_euclid(n as i64)
            }
        }
    }

    fn label(&self, bin: i64) -> NaiveDateTime {
        match self.rule {
            ResampleRule::Fixed(step) => self.origin + step * bin as i32,
            ResampleRule::Weeks(n) => self.origin + Duration::days(7 * n as i64 * bin),
            ResampleRule::Months { n, start_label } => {
                let first = month_number(&self.origin) + bin * n as i64;
                if start_label {
                    midnight(first_of_month(first))
                } else {
                    midnight(last_of_month(first + n as i64 - 1))
                }
            }
            ResampleRule::Years { n, start_label } => {
                let first = (self.origin.year() as i64 + bin * n as i64) * 12;
                if start_label {
                    midnight(first_of_month(first))
                } else {
                    midnight(last_of_month(first + 12 * n as i64 - 1))
                }
            }
        }
    }
}

fn reduce(method: &CombineFunc, values: &[f64]) -> f64 {
    match method {
        CombineFunc::Named(reducer) => reducer.reduce(values, DDOF),
        CombineFunc::Custom(f) if !values.is_empty() => f(values),
        CombineFunc::Custom(_) => f64::NAN,
    }
}

/// Resample every numeric column of `frame`. Text columns are dropped.
pub fn resample(frame: &Frame, rule: &ResampleRule, method: &CombineFunc) -> SmioResult<Frame> {
    if let CombineFunc::Custom(_) = method {
        warn!("Resampling with a custom reducer, applied bin by bin");
    }
    let numeric: Vec<(&str, &[f64])> = frame
        .columns()
        .filter_map(|(name, column)| column.as_float().map(|values| (name, values)))
        .collect();
    if numeric.len() < frame.n_columns() {
        debug!(
            dropped = frame.n_columns() - numeric.len(),
            "Text columns dropped by resampling"
        );
    }

    let Some(first) = frame.index().iter().min() else {
        return Ok(Frame::empty_with_columns(
            &numeric.iter().map(|(n, _)| *n).collect::<Vec<_>>(),
        ));
    };
    let binner = Binner::new(*rule, first);
    let bins: Vec<i64> = frame.index().iter().map(|t| binner.bin(t)).collect();
    let lo = bins.iter().copied().min().unwrap_or(0);
    let hi = bins.iter().copied().max().unwrap_or(0);
    let n_bins = (hi - lo + 1) as usize;

    let mut members: Vec<Vec<usize>> = vec![Vec::new(); n_bins];
    for (row, bin) in bins.iter().enumerate() {
        members[(bin - lo) as usize].push(row);
    }

    let index: Vec<NaiveDateTime> = (lo..=hi).map(|b| binner.label(b)).collect();
    let mut columns = Vec::with_capacity(numeric.len());
    for (name, values) in numeric {
        let mut present = Vec::new();
        let reduced: Vec<f64> = members
            .iter()
            .map(|rows| {
                present.clear();
                present.extend(rows.iter().map(|r| values[*r]).filter(|v| !v.is_nan()));
                reduce(method, &present)
            })
            .collect();
        columns.push((name.to_string(), Column::Float(reduced)));
    }

    debug!(
        rows_in = frame.len(),
        bins = n_bins,
        method = method.name(),
        "Resampled frame"
    );
    Frame::from_columns(index, columns)
}
