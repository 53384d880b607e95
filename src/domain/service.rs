//! Catalog view of a service, as far as distribution cares.

use super::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Active,
    Inactive,
}

impl ServiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceStatus::Active => "active",
            ServiceStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ServiceStatus::Active),
            "inactive" => Ok(ServiceStatus::Inactive),
            other => Err(format!("unknown service status: {}", other)),
        }
    }
}

/// BV as stored by the catalog. The raw value is validated at distribution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceBv {
    pub bv: String,
    pub status: ServiceStatus,
}

impl ServiceBv {
    pub fn new(bv: impl Into<String>, status: ServiceStatus) -> Self {
        Self {
            bv: bv.into(),
            status,
        }
    }

    /// Parse the stored BV, rejecting malformed and negative values.
    pub fn resolve_bv(&self) -> Result<Decimal, String> {
        let bv = Decimal::from_str_canonical(&self.bv)
            .map_err(|e| format!("'{}' is not a decimal: {}", self.bv, e))?;
        if bv.is_negative() {
            return Err(format!("'{}' is negative", self.bv));
        }
        Ok(bv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_bv() {
        let svc = ServiceBv::new("100.50", ServiceStatus::Active);
        assert_eq!(svc.resolve_bv().unwrap().to_canonical_string(), "100.5");
    }

    #[test]
    fn test_resolve_bv_rejects_negative_and_garbage() {
        assert!(ServiceBv::new("-1", ServiceStatus::Active).resolve_bv().is_err());
        assert!(ServiceBv::new("abc", ServiceStatus::Active).resolve_bv().is_err());
        assert!(ServiceBv::new("", ServiceStatus::Active).resolve_bv().is_err());
    }

    #[test]
    fn test_zero_bv_is_valid() {
        let bv = ServiceBv::new("0", ServiceStatus::Active).resolve_bv().unwrap();
        assert!(bv.is_zero());
    }

    #[test]
    fn test_status_roundtrip() {
        assert_eq!("inactive".parse::<ServiceStatus>().unwrap(), ServiceStatus::Inactive);
        assert!("paused".parse::<ServiceStatus>().is_err());
    }
}
