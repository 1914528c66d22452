use serde::{Deserialize, Serialize};

/// Closed catalog of premises/room/bed attributes used as matching criteria.
///
/// The serde tags are the wire identifiers existing clients send and receive;
/// they must not change. New attributes are added here, never at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Characteristic {
    #[serde(rename = "isArsonSuitable")]
    ArsonSuitable,
    #[serde(rename = "hasEnSuite")]
    EnSuite,
    #[serde(rename = "isSingle")]
    Single,
    #[serde(rename = "isStepFreeDesignated")]
    StepFreeDesignated,
    #[serde(rename = "isSuitedForSexOffenders")]
    SuitedForSexOffenders,
    #[serde(rename = "isWheelchairDesignated")]
    WheelchairDesignated,
    #[serde(rename = "acceptsSexOffenders")]
    AcceptsSexOffenders,
    #[serde(rename = "isCatered")]
    Catered,
    #[serde(rename = "isGroundFloor")]
    GroundFloor,
    #[serde(rename = "hasLift")]
    Lift,
}

impl Characteristic {
    /// The subset reported in per-day capacity breakdowns, in report order.
    pub const TRACKED_FOR_AVAILABILITY: [Characteristic; 6] = [
        Characteristic::ArsonSuitable,
        Characteristic::EnSuite,
        Characteristic::Single,
        Characteristic::StepFreeDesignated,
        Characteristic::SuitedForSexOffenders,
        Characteristic::WheelchairDesignated,
    ];

    pub fn is_tracked_for_availability(self) -> bool {
        Self::TRACKED_FOR_AVAILABILITY.contains(&self)
    }

    /// Wire identifier, identical to the serde tag.
    pub fn as_tag(self) -> &'static str {
        match self {
            Characteristic::ArsonSuitable => "isArsonSuitable",
            Characteristic::EnSuite => "hasEnSuite",
            Characteristic::Single => "isSingle",
            Characteristic::StepFreeDesignated => "isStepFreeDesignated",
            Characteristic::SuitedForSexOffenders => "isSuitedForSexOffenders",
            Characteristic::WheelchairDesignated => "isWheelchairDesignated",
            Characteristic::AcceptsSexOffenders => "acceptsSexOffenders",
            Characteristic::Catered => "isCatered",
            Characteristic::GroundFloor => "isGroundFloor",
            Characteristic::Lift => "hasLift",
        }
    }

    /// Traits that describe a whole premises.
    pub fn applies_to_premises(self) -> bool {
        matches!(
            self,
            Characteristic::ArsonSuitable
                | Characteristic::AcceptsSexOffenders
                | Characteristic::SuitedForSexOffenders
                | Characteristic::Catered
                | Characteristic::StepFreeDesignated
                | Characteristic::Lift
        )
    }

    /// Traits that describe an individual room or bed.
    pub fn applies_to_rooms(self) -> bool {
        matches!(
            self,
            Characteristic::ArsonSuitable
                | Characteristic::EnSuite
                | Characteristic::Single
                | Characteristic::StepFreeDesignated
                | Characteristic::WheelchairDesignated
                | Characteristic::GroundFloor
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_subset_is_exactly_six() {
        assert_eq!(Characteristic::TRACKED_FOR_AVAILABILITY.len(), 6);
        assert!(Characteristic::ArsonSuitable.is_tracked_for_availability());
        assert!(Characteristic::WheelchairDesignated.is_tracked_for_availability());
        assert!(!Characteristic::AcceptsSexOffenders.is_tracked_for_availability());
        assert!(!Characteristic::Catered.is_tracked_for_availability());
    }

    #[test]
    fn serde_tag_matches_as_tag() {
        for c in [
            Characteristic::ArsonSuitable,
            Characteristic::EnSuite,
            Characteristic::Single,
            Characteristic::StepFreeDesignated,
            Characteristic::SuitedForSexOffenders,
            Characteristic::WheelchairDesignated,
            Characteristic::AcceptsSexOffenders,
            Characteristic::Catered,
            Characteristic::GroundFloor,
            Characteristic::Lift,
        ] {
            let json = serde_json::to_string(&c).unwrap();
            assert_eq!(json, format!("\"{}\"", c.as_tag()));
            let back: Characteristic = serde_json::from_str(&json).unwrap();
            assert_eq!(back, c);
        }
    }

    #[test]
    fn every_trait_has_a_scope() {
        for c in [
            Characteristic::ArsonSuitable,
            Characteristic::EnSuite,
            Characteristic::Single,
            Characteristic::StepFreeDesignated,
            Characteristic::SuitedForSexOffenders,
            Characteristic::WheelchairDesignated,
            Characteristic::AcceptsSexOffenders,
            Characteristic::Catered,
            Characteristic::GroundFloor,
            Characteristic::Lift,
        ] {
            assert!(c.applies_to_premises() || c.applies_to_rooms(), "{c:?}");
        }
    }

    #[test]
    fn scopes_overlap() {
        // Some traits are meaningful at both levels.
        assert!(Characteristic::ArsonSuitable.applies_to_premises());
        assert!(Characteristic::ArsonSuitable.applies_to_rooms());
        // Others at exactly one.
        assert!(Characteristic::EnSuite.applies_to_rooms());
        assert!(!Characteristic::EnSuite.applies_to_premises());
        assert!(Characteristic::Catered.applies_to_premises());
        assert!(!Characteristic::Catered.applies_to_rooms());
    }
}
