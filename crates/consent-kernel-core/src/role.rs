//! Actor roles and data categories.
//!
//! Both are closed enumerations. Parsing an unknown name is the boundary
//! where `InvalidRole` and `InvalidDataType` originate.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// The fixed set of actor roles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Administrative actor: registers and verifies actors, approves requests.
    Admin,
    /// Emergency responder: may activate time-boxed overrides.
    Emergency,
    Doctor,
    Nurse,
    Technician,
    Researcher,
}

impl Role {
    /// Every role, in declaration order.
    pub const ALL: [Role; 6] = [
        Role::Admin,
        Role::Emergency,
        Role::Doctor,
        Role::Nurse,
        Role::Technician,
        Role::Researcher,
    ];

    /// The canonical name of this role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Emergency => "emergency",
            Role::Doctor => "doctor",
            Role::Nurse => "nurse",
            Role::Technician => "technician",
            Role::Researcher => "researcher",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CoreError::InvalidRole(s.to_string()))
    }
}

/// The closed set of data categories a grant or permission check refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataCategory {
    BasicInfo,
    MedicalHistory,
    LabResults,
    TreatmentPlan,
    Imaging,
    MentalHealth,
    GeneticInfo,
    Financial,
    EmergencyContact,
    /// Every category. A consent for `All` covers any specific category.
    All,
}

impl DataCategory {
    /// Every category, in declaration order.
    pub const ALL: [DataCategory; 10] = [
        DataCategory::BasicInfo,
        DataCategory::MedicalHistory,
        DataCategory::LabResults,
        DataCategory::TreatmentPlan,
        DataCategory::Imaging,
        DataCategory::MentalHealth,
        DataCategory::GeneticInfo,
        DataCategory::Financial,
        DataCategory::EmergencyContact,
        DataCategory::All,
    ];

    /// The canonical name of this category.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::BasicInfo => "basic-info",
            DataCategory::MedicalHistory => "medical-history",
            DataCategory::LabResults => "lab-results",
            DataCategory::TreatmentPlan => "treatment-plan",
            DataCategory::Imaging => "imaging",
            DataCategory::MentalHealth => "mental-health",
            DataCategory::GeneticInfo => "genetic-info",
            DataCategory::Financial => "financial",
            DataCategory::EmergencyContact => "emergency-contact",
            DataCategory::All => "all",
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('_', "-");
        DataCategory::ALL
            .into_iter()
            .find(|category| category.as_str().eq_ignore_ascii_case(&wanted))
            .ok_or_else(|| CoreError::InvalidDataType(s.to_string()))
    }
}
