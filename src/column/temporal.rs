//! Date and time columns.
//!
//! `Date` is u16 days and `Date32` i32 days since 1970-01-01. `DateTime` is
//! u32 seconds and `DateTime64(p)` i64 ticks of 10^-p seconds since the Unix
//! epoch. The timezone only affects how values are presented.

use std::io::Read;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use super::{corrupt, mismatch, reject_null, ColumnCodec};
use crate::error::{ChwireError, ConversionError};
use crate::types::{ScalarKind, TypeDescriptor};
use crate::utils::{read_typed_vec, typed_slice_to_bytes};
use crate::value::Value;

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

//==================================================================================
// 1. Date / Date32
//==================================================================================

#[derive(Debug)]
pub struct DateColumn {
    descriptor: TypeDescriptor,
    wide: bool,
    days: Vec<i32>,
}

impl DateColumn {
    pub fn new(wide: bool) -> Self {
        let kind = if wide { ScalarKind::Date32 } else { ScalarKind::Date };
        Self {
            descriptor: TypeDescriptor::Scalar(kind),
            wide,
            days: Vec::new(),
        }
    }
}

impl ColumnCodec for DateColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.days.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let date = match value {
            Value::Date(d) => *d,
            Value::DateTime(dt) => dt.date_naive(),
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected a date value")),
        };
        let days = date.signed_duration_since(epoch()).num_days();
        let in_range = if self.wide {
            i32::try_from(days).is_ok()
        } else {
            (0..=u16::MAX as i64).contains(&days)
        };
        if !in_range {
            return Err(mismatch(
                &self.descriptor,
                value,
                format!("{} is outside the supported date range", date),
            ));
        }
        self.days.push(days as i32);
        Ok(())
    }

    fn append_default(&mut self) {
        self.days.push(0);
    }

    fn value(&self, row: usize) -> Value {
        let date = epoch()
            .checked_add_signed(chrono::Duration::days(self.days[row] as i64))
            .unwrap_or_else(epoch);
        Value::Date(date)
    }

    fn truncate(&mut self, rows: usize) {
        self.days.truncate(rows);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        if self.wide {
            buf.extend_from_slice(typed_slice_to_bytes(&self.days));
        } else {
            for day in &self.days {
                buf.extend_from_slice(&(*day as u16).to_le_bytes());
            }
        }
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        if self.wide {
            let days = read_typed_vec::<i32>(reader, rows)?;
            let limit = NaiveDate::MAX.signed_duration_since(epoch()).num_days();
            if days.iter().any(|d| (*d as i64).abs() > limit) {
                return Err(corrupt("Date32 value outside the representable range"));
            }
            self.days.extend(days);
        } else {
            self.days
                .extend(read_typed_vec::<u16>(reader, rows)?.into_iter().map(i32::from));
        }
        Ok(())
    }
}

//==================================================================================
// 2. DateTime / DateTime64
//==================================================================================

#[derive(Debug)]
pub struct DateTimeColumn {
    descriptor: TypeDescriptor,
    /// `None` for second-resolution `DateTime`.
    precision: Option<u8>,
    tz: Tz,
    ticks: Vec<i64>,
}

impl DateTimeColumn {
    pub fn new(descriptor: TypeDescriptor, precision: Option<u8>, tz: Tz) -> Self {
        Self {
            descriptor,
            precision,
            tz,
            ticks: Vec::new(),
        }
    }

    fn ticks_per_second(&self) -> i64 {
        10i64.pow(self.precision.unwrap_or(0) as u32)
    }

    fn to_ticks(&self, dt: &DateTime<Tz>) -> Option<i64> {
        let seconds = dt.timestamp();
        match self.precision {
            None => u32::try_from(seconds).ok().map(i64::from),
            Some(p) => {
                let sub = dt.timestamp_subsec_nanos() as i64 / 10i64.pow(9 - p as u32);
                seconds.checked_mul(self.ticks_per_second())?.checked_add(sub)
            }
        }
    }

    fn from_ticks(&self, ticks: i64) -> Option<DateTime<Tz>> {
        let per_second = self.ticks_per_second();
        let seconds = ticks.div_euclid(per_second);
        let nanos = ticks.rem_euclid(per_second) * (1_000_000_000 / per_second);
        let utc: DateTime<Utc> = DateTime::from_timestamp(seconds, nanos as u32)?;
        Some(self.tz.from_utc_datetime(&utc.naive_utc()))
    }
}

impl ColumnCodec for DateTimeColumn {
    fn descriptor(&self) -> &TypeDescriptor {
        &self.descriptor
    }

    fn rows(&self) -> usize {
        self.ticks.len()
    }

    fn append(&mut self, value: &Value) -> Result<(), ConversionError> {
        let dt = match value {
            Value::DateTime(dt) => dt,
            Value::Null => return Err(reject_null(&self.descriptor)),
            other => return Err(mismatch(&self.descriptor, other, "expected a datetime value")),
        };
        let ticks = self.to_ticks(dt).ok_or_else(|| {
            mismatch(
                &self.descriptor,
                value,
                format!("{} is outside the supported range", dt),
            )
        })?;
        self.ticks.push(ticks);
        Ok(())
    }

    fn append_default(&mut self) {
        self.ticks.push(0);
    }

    /// Every stored tick passed `to_ticks` on append or the range check in
    /// `read_data`, so the epoch fallback is never taken.
    fn value(&self, row: usize) -> Value {
        let dt = self
            .from_ticks(self.ticks[row])
            .unwrap_or_else(|| self.tz.from_utc_datetime(&DateTime::<Utc>::default().naive_utc()));
        Value::DateTime(dt)
    }

    fn truncate(&mut self, rows: usize) {
        self.ticks.truncate(rows);
    }

    fn write_data(&self, buf: &mut Vec<u8>) {
        match self.precision {
            None => {
                for tick in &self.ticks {
                    buf.extend_from_slice(&(*tick as u32).to_le_bytes());
                }
            }
            Some(_) => buf.extend_from_slice(typed_slice_to_bytes(&self.ticks)),
        }
    }

    fn read_data(&mut self, reader: &mut dyn Read, rows: usize) -> Result<(), ChwireError> {
        match self.precision {
            None => {
                let seconds = read_typed_vec::<u32>(reader, rows)?;
                self.ticks.extend(seconds.into_iter().map(i64::from));
            }
            Some(_) => {
                let ticks = read_typed_vec::<i64>(reader, rows)?;
                if let Some(bad) = ticks.iter().find(|t| self.from_ticks(**t).is_none()) {
                    return Err(corrupt(format!("DateTime64 tick {} is out of range", bad)));
                }
                self.ticks.extend(ticks);
            }
        }
        Ok(())
    }
}
