//! The static role → category matrix.

use consent_kernel_core::{DataCategory, Role};

/// Whether `role` may ever touch `category`.
///
/// | Role | Categories |
/// |---|---|
/// | admin, emergency | everything |
/// | doctor | medical-history, lab-results, treatment-plan, imaging, all |
/// | nurse | medical-history, lab-results, treatment-plan |
/// | technician | lab-results, imaging |
/// | researcher | lab-results |
pub fn role_allows(role: Role, category: DataCategory) -> bool {
    use DataCategory::*;

    match role {
        Role::Admin | Role::Emergency => true,
        Role::Doctor => matches!(
            category,
            MedicalHistory | LabResults | TreatmentPlan | Imaging | All
        ),
        Role::Nurse => matches!(category, MedicalHistory | LabResults | TreatmentPlan),
        Role::Technician => matches!(category, LabResults | Imaging),
        Role::Researcher => matches!(category, LabResults),
    }
}

/// Every category `role` may touch, in declaration order.
pub fn allowed_categories(role: Role) -> Vec<DataCategory> {
    DataCategory::ALL
        .into_iter()
        .filter(|category| role_allows(role, *category))
        .collect()
}
