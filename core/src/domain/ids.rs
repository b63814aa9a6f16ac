//! Uuid-backed id newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> anyhow::Result<Self> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Tenant boundary; every patient belongs to exactly one institution.
    InstitutionId
);
entity_id!(PatientId);
entity_id!(DiagnosisId);
entity_id!(TreatmentId);
entity_id!(QuestionnaireId);
entity_id!(ItemId);
entity_id!(LikertScaleId);
entity_id!(RangeScaleId);
entity_id!(ConstructScaleId);
entity_id!(CompositeScaleId);
entity_id!(PatientQuestionnaireId);
entity_id!(SubmissionId);
