//! Relationship safety gate.
//!
//! Admission is a function of risk class, evidence trust tier, and source
//! count only. The model's self-reported confidence is recorded upstream and
//! MUST NOT affect the decision here.

use crate::store::{RelationshipStatus, RelationshipType, TrustTier};

/// Risk classification of a relationship type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskClass {
    Low,
    Medium,
    High,
}

impl RiskClass {
    pub fn for_type(relationship_type: RelationshipType) -> Self {
        use RelationshipType::*;
        match relationship_type {
            Released | Announced | Published => Self::Low,
            Partnered | Integrated | Funded => Self::Medium,
            Acquired | Banned | Beats | Criticized => Self::High,
        }
    }
}

/// Evidence facts the gate decides on.
#[derive(Debug, Clone)]
pub struct GateEvidence {
    pub tiers: Vec<TrustTier>,
    pub source_count: i64,
}

impl GateEvidence {
    fn well_sourced(&self) -> bool {
        self.tiers.contains(&TrustTier::Authoritative) || self.source_count >= 2
    }
}

/// Admit or quarantine a proposed relationship. `_model_confidence` is
/// accepted so call sites pass the full proposal, and deliberately unused.
pub fn admit(
    relationship_type: RelationshipType,
    evidence: &GateEvidence,
    _model_confidence: f64,
) -> RelationshipStatus {
    match RiskClass::for_type(relationship_type) {
        RiskClass::Low => RelationshipStatus::Approved,
        RiskClass::Medium | RiskClass::High => {
            if evidence.well_sourced() {
                RelationshipStatus::Approved
            } else {
                RelationshipStatus::Quarantined
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use RelationshipType::*;

    fn single_low() -> GateEvidence {
        GateEvidence {
            tiers: vec![TrustTier::Low],
            source_count: 1,
        }
    }

    fn single_authoritative() -> GateEvidence {
        GateEvidence {
            tiers: vec![TrustTier::Authoritative],
            source_count: 1,
        }
    }

    #[test]
    fn test_risk_classes() {
        assert_eq!(RiskClass::for_type(Released), RiskClass::Low);
        assert_eq!(RiskClass::for_type(Announced), RiskClass::Low);
        assert_eq!(RiskClass::for_type(Published), RiskClass::Low);
        assert_eq!(RiskClass::for_type(Partnered), RiskClass::Medium);
        assert_eq!(RiskClass::for_type(Integrated), RiskClass::Medium);
        assert_eq!(RiskClass::for_type(Funded), RiskClass::Medium);
        assert_eq!(RiskClass::for_type(Acquired), RiskClass::High);
        assert_eq!(RiskClass::for_type(Banned), RiskClass::High);
        assert_eq!(RiskClass::for_type(Beats), RiskClass::High);
        assert_eq!(RiskClass::for_type(Criticized), RiskClass::High);
    }

    #[test]
    fn test_low_risk_always_approved() {
        assert_eq!(admit(Released, &single_low(), 0.01), RelationshipStatus::Approved);
    }

    #[test]
    fn test_high_risk_single_low_source_quarantined() {
        // modelConfidence=0.99 must not rescue a weakly sourced claim
        assert_eq!(admit(Acquired, &single_low(), 0.99), RelationshipStatus::Quarantined);
        assert_eq!(admit(Acquired, &single_authoritative(), 0.99), RelationshipStatus::Approved);
    }

    #[test]
    fn test_medium_risk_two_sources_approved() {
        let evidence = GateEvidence {
            tiers: vec![TrustTier::Low, TrustTier::Low],
            source_count: 2,
        };
        assert_eq!(admit(Partnered, &evidence, 0.2), RelationshipStatus::Approved);
    }

    proptest! {
        /// Sweeping modelConfidence over [0, 1] never changes the decision.
        #[test]
        fn prop_gate_invariant_under_confidence(
            confidence in 0.0f64..=1.0,
            type_idx in 0usize..10,
            source_count in 0i64..4,
            authoritative in proptest::bool::ANY,
        ) {
            let types = [Released, Announced, Published, Partnered, Integrated,
                         Funded, Acquired, Banned, Beats, Criticized];
            let relationship_type = types[type_idx];
            let evidence = GateEvidence {
                tiers: if authoritative {
                    vec![TrustTier::Authoritative]
                } else {
                    vec![TrustTier::Low]
                },
                source_count,
            };
            let baseline = admit(relationship_type, &evidence, 0.5);
            prop_assert_eq!(admit(relationship_type, &evidence, confidence), baseline);
        }
    }
}
