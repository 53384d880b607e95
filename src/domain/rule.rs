//! Versioned commission rules and the per-level payout schedule they produce.

use super::{Decimal, RuleId, TimeMs};
use rust_decimal::Decimal as RustDecimal;

/// How a rule turns a purchase's BV into per-level amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleVariant {
    /// Level 1 earns `bv * base_percentage`. With decay each further level earns
    /// half of the previous one; without decay only level 1 is paid.
    Decaying {
        base_percentage: Decimal,
        decay_enabled: bool,
    },
    /// Every level earns the flat `bv * payout_per_bv`, up to `max_levels` when set.
    Capped {
        payout_per_bv: Decimal,
        max_levels: Option<u32>,
    },
}

impl RuleVariant {
    pub fn tag(&self) -> &'static str {
        match self {
            RuleVariant::Decaying { .. } => "decaying",
            RuleVariant::Capped { .. } => "capped",
        }
    }

    /// Check the rule's parameters before it is stored.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            RuleVariant::Decaying {
                base_percentage, ..
            } => {
                if !base_percentage.is_fraction() {
                    return Err(format!(
                        "basePercentage must be within [0, 1], got {}",
                        base_percentage
                    ));
                }
            }
            RuleVariant::Capped {
                payout_per_bv,
                max_levels,
            } => {
                if !payout_per_bv.is_fraction() {
                    return Err(format!(
                        "payoutPerBv must be within [0, 1], got {}",
                        payout_per_bv
                    ));
                }
                if *max_levels == Some(0) {
                    return Err("maxLevels must be at least 1".to_string());
                }
            }
        }
        Ok(())
    }
}

/// One stored rule version. Rows are never mutated; activation is a separate event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributionRule {
    pub id: Option<RuleId>,
    pub variant: RuleVariant,
    pub is_active: bool,
    pub created_at: Option<TimeMs>,
}

impl DistributionRule {
    /// The rule used when no rule has ever been activated: 5% at level 1, halving.
    pub fn fallback() -> Self {
        Self {
            id: None,
            variant: RuleVariant::Decaying {
                base_percentage: Decimal::new(RustDecimal::new(5, 2)),
                decay_enabled: true,
            },
            is_active: true,
            created_at: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.id.is_none()
    }

    /// Build the per-level amount sequence for a purchase of `bv`.
    ///
    /// Returns `None` if `bv` times the rate overflows.
    pub fn schedule(&self, bv: Decimal) -> Option<PayoutSchedule> {
        let schedule = match self.variant {
            RuleVariant::Decaying {
                base_percentage,
                decay_enabled,
            } => PayoutSchedule {
                next_amount: bv.checked_mul(base_percentage)?,
                halving: decay_enabled,
                remaining: if decay_enabled { None } else { Some(1) },
            },
            RuleVariant::Capped {
                payout_per_bv,
                max_levels,
            } => PayoutSchedule {
                next_amount: bv.checked_mul(payout_per_bv)?,
                halving: false,
                remaining: max_levels,
            },
        };
        Some(schedule)
    }
}

/// Amounts for level 1, 2, 3, ... in order. Ends when the rule stops paying;
/// an unbounded schedule relies on the ancestor chain (or its depth bound) to end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayoutSchedule {
    next_amount: Decimal,
    halving: bool,
    remaining: Option<u32>,
}

impl Iterator for PayoutSchedule {
    type Item = Decimal;

    fn next(&mut self) -> Option<Decimal> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }
        let amount = self.next_amount;
        if self.halving {
            self.next_amount = amount.half();
        }
        Some(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str_canonical(s).unwrap()
    }

    fn decaying(pct: &str, decay_enabled: bool) -> DistributionRule {
        DistributionRule {
            id: Some(RuleId::new(1)),
            variant: RuleVariant::Decaying {
                base_percentage: dec(pct),
                decay_enabled,
            },
            is_active: true,
            created_at: None,
        }
    }

    #[test]
    fn test_decaying_schedule_halves_each_level() {
        let amounts: Vec<String> = decaying("0.05", true)
            .schedule(dec("100"))
            .unwrap()
            .take(4)
            .map(|d| d.to_canonical_string())
            .collect();
        assert_eq!(amounts, vec!["5", "2.5", "1.25", "0.625"]);
    }

    #[test]
    fn test_decay_disabled_pays_only_level_one() {
        let amounts: Vec<Decimal> = decaying("0.1", false)
            .schedule(dec("100"))
            .unwrap()
            .collect();
        assert_eq!(amounts, vec![dec("10")]);
    }

    #[test]
    fn test_capped_schedule_is_flat_and_bounded() {
        let rule = DistributionRule {
            id: Some(RuleId::new(2)),
            variant: RuleVariant::Capped {
                payout_per_bv: dec("0.02"),
                max_levels: Some(3),
            },
            is_active: true,
            created_at: None,
        };
        let amounts: Vec<Decimal> = rule.schedule(dec("50")).unwrap().collect();
        assert_eq!(amounts, vec![dec("1"), dec("1"), dec("1")]);
    }

    #[test]
    fn test_capped_without_limit_never_ends() {
        let rule = DistributionRule {
            id: None,
            variant: RuleVariant::Capped {
                payout_per_bv: dec("0.01"),
                max_levels: None,
            },
            is_active: true,
            created_at: None,
        };
        assert_eq!(rule.schedule(dec("100")).unwrap().take(1000).count(), 1000);
    }

    #[test]
    fn test_fallback_rule() {
        let rule = DistributionRule::fallback();
        assert!(rule.is_fallback());
        let first: Vec<Decimal> = rule.schedule(dec("200")).unwrap().take(2).collect();
        assert_eq!(first, vec![dec("10"), dec("5")]);
    }

    #[test]
    fn test_validate_rejects_out_of_range_percentage() {
        let variant = RuleVariant::Decaying {
            base_percentage: dec("1.5"),
            decay_enabled: true,
        };
        assert!(variant.validate().is_err());

        let variant = RuleVariant::Capped {
            payout_per_bv: dec("0.1"),
            max_levels: Some(0),
        };
        assert!(variant.validate().is_err());

        let variant = RuleVariant::Capped {
            payout_per_bv: dec("0.1"),
            max_levels: None,
        };
        assert!(variant.validate().is_ok());
    }

    #[test]
    fn test_schedule_accepts_largest_bv() {
        let huge = Decimal::new(RustDecimal::MAX);
        let first = decaying("1", true).schedule(huge).unwrap().next();
        assert_eq!(first, Some(huge));
    }
}
