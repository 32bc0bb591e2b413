//! §4.4 applicability matrix: which `SubTestItem`s a module type can produce,
//! split into the hardpoint-class items (auto executors) and manual-class
//! items (alarm/display/trend/report/maintenance). Passive variants follow
//! their base type (§4.4).

use crate::models::{BaseModuleType, ModuleType, SubTestItem};

/// Hardpoint-class items applicable to `module_type`'s base type.
pub fn hardpoint_items(module_type: ModuleType) -> Vec<SubTestItem> {
    match module_type.base() {
        BaseModuleType::AI | BaseModuleType::AO | BaseModuleType::DI | BaseModuleType::DO => {
            vec![SubTestItem::HardPoint]
        }
        BaseModuleType::Communication => vec![SubTestItem::CommunicationTest],
    }
}

/// Manual/alarm-class items applicable to `module_type`'s base type.
pub fn manual_items(module_type: ModuleType) -> Vec<SubTestItem> {
    match module_type.base() {
        BaseModuleType::AI => vec![
            SubTestItem::LowLowAlarm,
            SubTestItem::LowAlarm,
            SubTestItem::HighAlarm,
            SubTestItem::HighHighAlarm,
            SubTestItem::Maintenance,
            SubTestItem::TrendCheck,
            SubTestItem::ReportCheck,
        ],
        BaseModuleType::AO => vec![SubTestItem::TrendCheck, SubTestItem::ReportCheck],
        BaseModuleType::DI | BaseModuleType::DO => vec![SubTestItem::StateDisplay],
        BaseModuleType::Communication => vec![],
    }
}

/// All items applicable to `module_type` (hardpoint ∪ manual). `Custom(_)`
/// items are never applicable through this matrix; they exist for
/// implementer extension outside the matrix's closed set.
pub fn all_applicable(module_type: ModuleType) -> Vec<SubTestItem> {
    let mut items = hardpoint_items(module_type);
    items.extend(manual_items(module_type));
    items
}

pub fn is_applicable(module_type: ModuleType, item: &SubTestItem) -> bool {
    all_applicable(module_type).contains(item)
}

pub fn is_hardpoint_item(item: &SubTestItem) -> bool {
    matches!(item, SubTestItem::HardPoint | SubTestItem::CommunicationTest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ai_matrix_matches_spec_table() {
        let items = all_applicable(ModuleType::AI);
        assert!(items.contains(&SubTestItem::HardPoint));
        assert!(items.contains(&SubTestItem::HighHighAlarm));
        assert!(!items.contains(&SubTestItem::StateDisplay));
    }

    #[test]
    fn passive_variants_follow_base_type() {
        assert_eq!(
            all_applicable(ModuleType::DIPassive),
            all_applicable(ModuleType::DI)
        );
    }

    #[test]
    fn communication_has_no_manual_items() {
        assert!(manual_items(ModuleType::Communication).is_empty());
    }
}
