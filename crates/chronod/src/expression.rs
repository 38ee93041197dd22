//! Compiles five-field cron-style time expressions into cheap per-minute
//! predicates.
//!
//! Each field predicate is a bit-set (a `u64` mask indexed by the field's
//! component value) rather than a boxed closure: evaluation is a single
//! shift-and-mask, the representation is `Copy`, and it falls out of
//! `serde`'s integer support for free.

use chrono::{Datelike, NaiveDateTime, Timelike};
use chronod_domain::Error;
use once_cell_like::OnceRegex;
use regex::Regex;

/// One of the five canonical fields, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    fn name(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    fn domain(self) -> (i64, i64) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 6),
        }
    }

    fn component(self, t: &NaiveDateTime) -> i64 {
        match self {
            Field::Minute => t.minute() as i64,
            Field::Hour => t.hour() as i64,
            Field::DayOfMonth => t.day() as i64,
            Field::Month => t.month() as i64,
            Field::DayOfWeek => t.weekday().num_days_from_sunday() as i64,
        }
    }

    const ORDER: [Field; 5] = [
        Field::Minute,
        Field::Hour,
        Field::DayOfMonth,
        Field::Month,
        Field::DayOfWeek,
    ];
}

/// A compiled predicate for one field: a 64-bit mask plus the interval
/// modulus folded in separately so `*/1` optimizes identically to `*`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FieldPredicate {
    /// Bit `n` set means value `n` is explicitly accepted.
    mask: u64,
    /// `m > 1` means "also accept any value where `value % m == 0`".
    interval: u32,
}

impl FieldPredicate {
    fn wildcard() -> Self {
        Self {
            mask: 0,
            interval: 0,
        }
    }

    fn accepts(&self, value: i64) -> bool {
        if self.mask == 0 && self.interval == 0 {
            return true;
        }
        let set_hit = value >= 0 && value < 64 && (self.mask >> value) & 1 == 1;
        let interval_hit = self.interval > 1 && value.rem_euclid(self.interval as i64) == 0;
        set_hit || interval_hit
    }
}

/// A compiled five-field time expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TimeExpression {
    minute: FieldPredicate,
    hour: FieldPredicate,
    day_of_month: FieldPredicate,
    month: FieldPredicate,
    day_of_week: FieldPredicate,
}

impl TimeExpression {
    /// Does this expression accept the given minute-granular timestamp?
    pub fn matches(&self, t: &NaiveDateTime) -> bool {
        self.minute.accepts(Field::Minute.component(t))
            && self.hour.accepts(Field::Hour.component(t))
            && self.day_of_month.accepts(Field::DayOfMonth.component(t))
            && self.month.accepts(Field::Month.component(t))
            && self.day_of_week.accepts(Field::DayOfWeek.component(t))
    }

    fn predicate_mut(&mut self, field: Field) -> &mut FieldPredicate {
        match field {
            Field::Minute => &mut self.minute,
            Field::Hour => &mut self.hour,
            Field::DayOfMonth => &mut self.day_of_month,
            Field::Month => &mut self.month,
            Field::DayOfWeek => &mut self.day_of_week,
        }
    }
}

static WILDCARD_RE: OnceRegex = OnceRegex::new(r"^\*$");
static INTERVAL_RE: OnceRegex = OnceRegex::new(r"^\*/(\d+)$");
static RANGE_RE: OnceRegex = OnceRegex::new(r"^(\d+)-(\d+)$");
static SINGLE_RE: OnceRegex = OnceRegex::new(r"^(\d+)$");

/// Compile a five-field expression string, e.g. `"*/15 * * * *"`.
pub fn compile(expr: &str) -> Result<TimeExpression, Error> {
    let fields: Vec<&str> = expr.split(' ').collect();
    if fields.len() != 5 {
        return Err(Error::MalformedExpression {
            field: "expression",
            detail: format!("expected 5 space-separated fields, got {}", fields.len()),
        });
    }

    let mut out = TimeExpression {
        minute: FieldPredicate::wildcard(),
        hour: FieldPredicate::wildcard(),
        day_of_month: FieldPredicate::wildcard(),
        month: FieldPredicate::wildcard(),
        day_of_week: FieldPredicate::wildcard(),
    };

    for (field, raw) in Field::ORDER.into_iter().zip(fields.into_iter()) {
        let predicate = compile_field(field, raw)?;
        *out.predicate_mut(field) = predicate;
    }

    Ok(out)
}

fn compile_field(field: Field, raw: &str) -> Result<FieldPredicate, Error> {
    let (min, max) = field.domain();
    let mut mask: u64 = 0;
    let mut interval: u32 = 0;

    for term in raw.split(',') {
        if WILDCARD_RE.get().is_match(term) {
            // A bare `*` as one of several comma terms is unusual but not
            // forbidden; it just makes the whole field always-true.
            return Ok(FieldPredicate::wildcard());
        }
        if let Some(caps) = INTERVAL_RE.get().captures(term) {
            let k: u32 = caps[1].parse().map_err(|_| Error::MalformedExpression {
                field: field.name(),
                detail: format!("invalid interval '{}'", term),
            })?;
            if k == 0 {
                return Err(Error::MalformedExpression {
                    field: field.name(),
                    detail: format!("interval step must be >= 1, got '{}'", term),
                });
            }
            if k == 1 {
                // `*/1` accepts every value, same as a bare `*`.
                return Ok(FieldPredicate::wildcard());
            }
            interval = k;
            continue;
        }
        if let Some(caps) = RANGE_RE.get().captures(term) {
            let a: i64 = caps[1].parse().map_err(|_| Error::MalformedExpression {
                field: field.name(),
                detail: format!("invalid range start in '{}'", term),
            })?;
            let b: i64 = caps[2].parse().map_err(|_| Error::MalformedExpression {
                field: field.name(),
                detail: format!("invalid range end in '{}'", term),
            })?;
            if a >= b {
                return Err(Error::MalformedExpression {
                    field: field.name(),
                    detail: format!("range start {} must be < end {}", a, b),
                });
            }
            for v in a..=b {
                check_range(field, v, min, max)?;
                mask |= 1 << v;
            }
            continue;
        }
        if let Some(caps) = SINGLE_RE.get().captures(term) {
            let v: i64 = caps[1].parse().map_err(|_| Error::MalformedExpression {
                field: field.name(),
                detail: format!("invalid value '{}'", term),
            })?;
            check_range(field, v, min, max)?;
            mask |= 1 << v;
            continue;
        }
        return Err(Error::MalformedExpression {
            field: field.name(),
            detail: format!("unrecognized term '{}'", term),
        });
    }

    Ok(FieldPredicate { mask, interval })
}

fn check_range(field: Field, value: i64, min: i64, max: i64) -> Result<(), Error> {
    if value < min || value > max {
        return Err(Error::OutOfRange {
            field: field.name(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Tiny lazily-compiled regex holder, avoiding a dependency on `once_cell`
/// for five small fixed patterns.
mod once_cell_like {
    use super::Regex;
    use std::sync::OnceLock;

    pub struct OnceRegex {
        pattern: &'static str,
        cell: OnceLock<Regex>,
    }

    impl OnceRegex {
        pub const fn new(pattern: &'static str) -> Self {
            Self {
                pattern,
                cell: OnceLock::new(),
            }
        }

        pub fn get(&self) -> &Regex {
            self.cell
                .get_or_init(|| Regex::new(self.pattern).expect("static regex is valid"))
        }
    }
}
