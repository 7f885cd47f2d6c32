//! Predicate - cron 風のフィールド式
//!
//! 1 フィールド（hour / day / month / weekDay）の式を述語に変換する。
//!
//! | 式        | 述語                         |
//! |-----------|------------------------------|
//! | `*`       | 常に真                       |
//! | `a,b,c`   | いずれかが真                 |
//! | `expr/n`  | `expr` が真 かつ n で割り切れる |
//! | `a-b`     | a 以上 b 以下                |
//! | `k`       | k と等しい                   |
//!
//! 分解はこの順で行う。`1-10/2,30` は `(1-10)/2` と `30` の or になる。

use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PredicateError {
    #[error("empty expression")]
    Empty,

    #[error("invalid number '{0}'")]
    InvalidNumber(String),

    #[error("invalid range '{0}'")]
    InvalidRange(String),

    #[error("modulus must be positive in '{0}'")]
    ZeroModulus(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    Nil,
    Eq(u32),
    Seq(u32, u32),
    Mod(Box<Predicate>, u32),
    Or(Vec<Predicate>),
}

impl Predicate {
    pub fn parse(template: &str) -> Result<Self, PredicateError> {
        let template = template.trim();
        if template.is_empty() {
            return Err(PredicateError::Empty);
        }
        if template == "*" {
            return Ok(Predicate::Nil);
        }
        if template.contains(',') {
            return template
                .split(',')
                .map(Predicate::parse)
                .collect::<Result<Vec<_>, _>>()
                .map(Predicate::Or);
        }
        if let Some((expr, n)) = template.rsplit_once('/') {
            let n = number(n)?;
            if n == 0 {
                return Err(PredicateError::ZeroModulus(template.to_string()));
            }
            return Ok(Predicate::Mod(Box::new(Predicate::parse(expr)?), n));
        }
        if let Some((from, to)) = template.split_once('-') {
            let (from, to) = (number(from)?, number(to)?);
            if from > to {
                return Err(PredicateError::InvalidRange(template.to_string()));
            }
            return Ok(Predicate::Seq(from, to));
        }
        number(template).map(Predicate::Eq)
    }

    /// Every literal value lies in `min..=max`. The modulus is not a value.
    pub fn within(&self, min: u32, max: u32) -> bool {
        let range = min..=max;
        match self {
            Predicate::Nil => true,
            Predicate::Eq(k) => range.contains(k),
            Predicate::Seq(from, to) => range.contains(from) && range.contains(to),
            Predicate::Mod(inner, _) => inner.within(min, max),
            Predicate::Or(items) => items.iter().all(|p| p.within(min, max)),
        }
    }

    pub fn test(&self, value: u32) -> bool {
        match self {
            Predicate::Nil => true,
            Predicate::Eq(k) => value == *k,
            Predicate::Seq(from, to) => (*from..=*to).contains(&value),
            Predicate::Mod(inner, n) => inner.test(value) && value % n == 0,
            Predicate::Or(items) => items.iter().any(|p| p.test(value)),
        }
    }
}

fn number(raw: &str) -> Result<u32, PredicateError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(PredicateError::Empty);
    }
    raw.parse()
        .map_err(|_| PredicateError::InvalidNumber(raw.to_string()))
}

impl FromStr for Predicate {
    type Err = PredicateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Predicate::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Nil => f.write_str("*"),
            Predicate::Eq(k) => write!(f, "{k}"),
            Predicate::Seq(from, to) => write!(f, "{from}-{to}"),
            Predicate::Mod(inner, n) => write!(f, "{inner}/{n}"),
            Predicate::Or(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}
