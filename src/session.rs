//! Who is acting. Passed into every coordinator call instead of being read
//! from ambient state.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorType {
    Donor,
    Staff,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    pub actor_id: String,
    pub actor_type: ActorType,
}

impl SessionContext {
    /// A donor acting for themselves; `actor_id` is their donor hash id
    pub fn donor(donor_hash_id: &str) -> Self {
        Self {
            actor_id: donor_hash_id.to_string(),
            actor_type: ActorType::Donor,
        }
    }

    pub fn staff(staff_id: &str) -> Self {
        Self {
            actor_id: staff_id.to_string(),
            actor_type: ActorType::Staff,
        }
    }

    pub fn system() -> Self {
        Self {
            actor_id: "system".to_string(),
            actor_type: ActorType::System,
        }
    }
}
