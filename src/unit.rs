use crate::error::{ErrorCode, ProtocolError, Result};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::ops::{Div, Mul};
use std::str::FromStr;

// A measured quantity, eg "20.0:microliter". Arithmetic and ordering only
// work between quantities of the same unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Unit {
    pub value: f64,
    pub unit: String,
}

impl Unit {
    pub fn new(value: f64, unit: &str) -> Self {
        Self {
            value,
            unit: unit.to_string(),
        }
    }

    pub fn microliters(value: f64) -> Self {
        Self::new(value, "microliter")
    }

    pub fn add(&self, other: &Unit) -> Result<Unit> {
        self.require_same_unit(other, "add")?;
        Ok(Unit::new(self.value + other.value, &self.unit))
    }

    pub fn sub(&self, other: &Unit) -> Result<Unit> {
        self.require_same_unit(other, "subtract")?;
        Ok(Unit::new(self.value - other.value, &self.unit))
    }

    pub fn cmp_checked(&self, other: &Unit) -> Result<Ordering> {
        self.require_same_unit(other, "compare")?;
        self.value
            .partial_cmp(&other.value)
            .ok_or_else(|| ProtocolError {
                code: ErrorCode::InvalidArgument,
                message: format!("Cannot order {self} against {other}"),
            })
    }

    pub fn to_microliters(&self) -> Result<f64> {
        let factor = match self.unit.as_str() {
            "microliter" => 1.0,
            "milliliter" => 1_000.0,
            "liter" => 1_000_000.0,
            "nanoliter" => 0.001,
            _ => {
                return Err(ProtocolError {
                    code: ErrorCode::UnitMismatch,
                    message: format!("'{}' is not a volume unit", self.unit),
                })
            }
        };
        Ok(self.value * factor)
    }

    fn require_same_unit(&self, other: &Unit, what: &str) -> Result<()> {
        if self.unit == other.unit {
            Ok(())
        } else {
            Err(ProtocolError {
                code: ErrorCode::UnitMismatch,
                message: format!("Cannot {what} '{}' and '{}'", self.unit, other.unit),
            })
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Whole values render with one decimal so "20" round-trips the wire
        // format as "20.0:microliter".
        if self.value.fract() == 0.0 && self.value.is_finite() {
            write!(f, "{:.1}:{}", self.value, self.unit)
        } else {
            write!(f, "{}:{}", self.value, self.unit)
        }
    }
}

impl FromStr for Unit {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Unit> {
        let (value, unit) = s.split_once(':').ok_or_else(|| ProtocolError {
            code: ErrorCode::InvalidFormat,
            message: format!("Expected '<value>:<unit>', got '{s}'"),
        })?;
        let value: f64 = value.trim().parse().map_err(|_| ProtocolError {
            code: ErrorCode::InvalidFormat,
            message: format!("'{value}' is not a numeric value"),
        })?;
        let unit = unit.trim();
        if unit.is_empty() {
            return Err(ProtocolError {
                code: ErrorCode::InvalidFormat,
                message: format!("Missing unit name in '{s}'"),
            });
        }
        Ok(Unit::new(value, unit))
    }
}

impl PartialOrd for Unit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.unit != other.unit {
            return None;
        }
        self.value.partial_cmp(&other.value)
    }
}

impl Mul<f64> for Unit {
    type Output = Unit;

    fn mul(self, rhs: f64) -> Unit {
        Unit::new(self.value * rhs, &self.unit)
    }
}

impl Div<f64> for Unit {
    type Output = Unit;

    fn div(self, rhs: f64) -> Unit {
        Unit::new(self.value / rhs, &self.unit)
    }
}

impl Mul<&Unit> for Unit {
    type Output = Unit;

    fn mul(self, rhs: &Unit) -> Unit {
        eprintln!("Unit arithmetic: treating {rhs} as a bare scalar");
        Unit::new(self.value * rhs.value, &self.unit)
    }
}

impl Div<&Unit> for Unit {
    type Output = Unit;

    fn div(self, rhs: &Unit) -> Unit {
        eprintln!("Unit arithmetic: treating {rhs} as a bare scalar");
        Unit::new(self.value / rhs.value, &self.unit)
    }
}

impl Serialize for Unit {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Unit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(D::Error::custom)
    }
}
