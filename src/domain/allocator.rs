//! C4 — `ChannelAllocator`: partitions definitions by module type, pairs each
//! with a complementary test-rig channel, and groups them into batches sized
//! to the rig's parallel capacity (§4.1).

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    BatchStatistics, ChannelAllocation, ChannelPointDefinition, ModuleType, OverallBatchStatus,
    TestBatchInfo, TestPlcChannel,
};

/// Output of one allocation pass: new batches plus the per-definition
/// allocation rows (instances are created by the caller from these).
pub struct AllocationResult {
    pub batches: Vec<TestBatchInfo>,
    pub allocations: Vec<ChannelAllocation>,
}

/// The complementary rig-channel type for a given definition module type,
/// per the pairing table in §4.1. `Communication` definitions pair with no
/// rig channel: the communication test exercises the PLC link itself, not a
/// stimulated channel, so it is batched on its own without a capacity cap.
fn complementary_channel_type(module_type: ModuleType) -> Option<ModuleType> {
    use ModuleType::*;
    match module_type {
        AI => Some(AOPassive),
        AIPassive => Some(AO),
        AO => Some(AI),
        AOPassive => Some(AIPassive),
        DI => Some(DOPassive),
        DIPassive => Some(DO),
        DO => Some(DIPassive),
        DOPassive => Some(DI),
        Communication => None,
    }
}

/// Stable partition order so that global batch numbers are reproducible
/// across runs given the same input (no channel's batch number depends on
/// hash-map iteration order).
const PARTITION_ORDER: [ModuleType; 9] = [
    ModuleType::AI,
    ModuleType::AIPassive,
    ModuleType::AO,
    ModuleType::AOPassive,
    ModuleType::DI,
    ModuleType::DIPassive,
    ModuleType::DO,
    ModuleType::DOPassive,
    ModuleType::Communication,
];

pub struct ChannelAllocator;

impl ChannelAllocator {
    /// Validates, partitions, and batches `definitions` against `inventory`.
    /// Definitions are consumed in `sequence_number` order within each
    /// partition ("in order received").
    pub fn allocate(
        definitions: &[ChannelPointDefinition],
        inventory: &[TestPlcChannel],
    ) -> AppResult<AllocationResult> {
        for def in definitions {
            def.validate_required_fields()
                .map_err(|msg| AppError::invalid_definition(&def.tag, msg))?;
            if matches!(def.module_type, ModuleType::Communication) {
                continue;
            }
            if complementary_channel_type(def.module_type).is_none() {
                return Err(AppError::invalid_definition(
                    &def.tag,
                    format!("模块类型 {} 没有可配对的测试台架通道类型", def.module_type),
                ));
            }
        }

        let mut by_partition: HashMap<ModuleType, Vec<&ChannelPointDefinition>> = HashMap::new();
        for def in definitions {
            by_partition.entry(def.module_type).or_default().push(def);
        }

        let mut batches = Vec::new();
        let mut allocations = Vec::new();
        let mut batch_counter: u32 = 0;

        for &partition_type in PARTITION_ORDER.iter() {
            let Some(mut defs) = by_partition.remove(&partition_type) else {
                continue;
            };
            defs.sort_by_key(|d| d.sequence_number);

            let matching_channels: Vec<&TestPlcChannel> = if partition_type == ModuleType::Communication
            {
                Vec::new()
            } else {
                let wanted = complementary_channel_type(partition_type).expect("validated above");
                inventory
                    .iter()
                    .filter(|c| c.channel_type == wanted && c.enabled)
                    .collect()
            };

            let cap = if partition_type == ModuleType::Communication {
                // no rig-channel capacity constraint; one batch holds them all
                defs.len().max(1)
            } else {
                matching_channels.len()
            };

            if cap == 0 {
                // Inventory exhausted for this partition: still produce a
                // batch, but every allocation gets empty channel fields; the
                // scheduler fails such instances with `NoTestChannel`.
                batch_counter += 1;
                let batch = new_batch(batch_counter, defs.len() as u32);
                for def in &defs {
                    allocations.push(ChannelAllocation {
                        definition_id: def.id,
                        batch_id: batch.batch_id,
                        batch_name: batch.batch_name.clone(),
                        test_channel_id: None,
                        test_comm_address: None,
                    });
                }
                batches.push(batch);
                continue;
            }

            for chunk in defs.chunks(cap) {
                batch_counter += 1;
                let batch = new_batch(batch_counter, chunk.len() as u32);
                for (k, def) in chunk.iter().enumerate() {
                    let (channel_id, comm_addr) = if partition_type == ModuleType::Communication {
                        (None, None)
                    } else {
                        let channel = matching_channels[k];
                        (Some(channel.id), Some(channel.communication_address.clone()))
                    };
                    allocations.push(ChannelAllocation {
                        definition_id: def.id,
                        batch_id: batch.batch_id,
                        batch_name: batch.batch_name.clone(),
                        test_channel_id: channel_id,
                        test_comm_address: comm_addr,
                    });
                }
                batches.push(batch);
            }
        }

        Ok(AllocationResult {
            batches,
            allocations,
        })
    }

    /// Re-runs channel pairing for an already-existing batch's definitions
    /// against the current rig inventory, stamping every row with the same
    /// `batch_id`/`batch_name` rather than re-partitioning into new batches
    /// (§4.1 re-allocation). Caller clears the batch's prior allocations
    /// first and resets its instances through `StateManager` afterward.
    pub fn reallocate(
        batch_id: Uuid,
        batch_name: &str,
        definitions: &[ChannelPointDefinition],
        inventory: &[TestPlcChannel],
    ) -> AppResult<Vec<ChannelAllocation>> {
        let mut by_partition: HashMap<ModuleType, Vec<&ChannelPointDefinition>> = HashMap::new();
        for def in definitions {
            by_partition.entry(def.module_type).or_default().push(def);
        }

        let mut allocations = Vec::new();
        for &partition_type in PARTITION_ORDER.iter() {
            let Some(mut defs) = by_partition.remove(&partition_type) else {
                continue;
            };
            defs.sort_by_key(|d| d.sequence_number);

            if partition_type == ModuleType::Communication {
                for def in &defs {
                    allocations.push(ChannelAllocation {
                        definition_id: def.id,
                        batch_id,
                        batch_name: batch_name.to_string(),
                        test_channel_id: None,
                        test_comm_address: None,
                    });
                }
                continue;
            }

            let wanted = complementary_channel_type(partition_type).expect("validated by allocate");
            let matching_channels: Vec<&TestPlcChannel> = inventory
                .iter()
                .filter(|c| c.channel_type == wanted && c.enabled)
                .collect();

            for (k, def) in defs.iter().enumerate() {
                let (channel_id, comm_addr) = match matching_channels.get(k) {
                    Some(channel) => (Some(channel.id), Some(channel.communication_address.clone())),
                    None => (None, None),
                };
                allocations.push(ChannelAllocation {
                    definition_id: def.id,
                    batch_id,
                    batch_name: batch_name.to_string(),
                    test_channel_id: channel_id,
                    test_comm_address: comm_addr,
                });
            }
        }

        Ok(allocations)
    }
}

fn new_batch(number: u32, total: u32) -> TestBatchInfo {
    TestBatchInfo {
        batch_id: Uuid::new_v4(),
        batch_name: format!("批次{number}"),
        product_model: None,
        serial_number: None,
        station_name: None,
        created_at: Utc::now(),
        statistics: BatchStatistics {
            total,
            ..Default::default()
        },
        overall_status: OverallBatchStatus::NotStarted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AlarmSetpoints, PointDataType, PowerSupplyType, WireSystem};

    fn ai_def(seq: u32, tag: &str) -> ChannelPointDefinition {
        ChannelPointDefinition {
            id: Uuid::new_v4(),
            tag: tag.to_string(),
            variable_name: tag.to_string(),
            description: String::new(),
            station_name: "station-1".to_string(),
            module_name: "module-1".to_string(),
            module_type: ModuleType::AI,
            channel_number: "1".to_string(),
            data_type: PointDataType::Float,
            power_supply_type: PowerSupplyType::Sourced,
            wire_system: None,
            plc_absolute_address: "%MD0".to_string(),
            plc_communication_address: "40001".to_string(),
            range_lo: Some(0.0),
            range_hi: Some(100.0),
            eng_unit: Some("C".to_string()),
            alarm_setpoints: AlarmSetpoints::default(),
            maintenance: None,
            remarks: None,
            sequence_number: seq,
        }
    }

    fn rig_channel(addr: &str, channel_type: ModuleType) -> TestPlcChannel {
        TestPlcChannel {
            id: Uuid::new_v4(),
            channel_address: addr.to_string(),
            channel_type,
            communication_address: format!("{addr}-comm"),
            power_supply_type: PowerSupplyType::Passive,
            enabled: true,
        }
    }

    #[test]
    fn batches_respect_inventory_capacity() {
        let defs = vec![ai_def(1, "TI-1"), ai_def(2, "TI-2"), ai_def(3, "TI-3")];
        let inventory = vec![
            rig_channel("AO1_1", ModuleType::AOPassive),
            rig_channel("AO1_2", ModuleType::AOPassive),
        ];
        let result = ChannelAllocator::allocate(&defs, &inventory).unwrap();
        assert_eq!(result.batches.len(), 2);
        assert_eq!(result.batches[0].statistics.total, 2);
        assert_eq!(result.batches[1].statistics.total, 1);
        assert_eq!(result.allocations.len(), 3);
    }

    #[test]
    fn empty_inventory_still_batches_but_leaves_channel_fields_empty() {
        let defs = vec![ai_def(1, "TI-1")];
        let result = ChannelAllocator::allocate(&defs, &[]).unwrap();
        assert_eq!(result.batches.len(), 1);
        assert!(result.allocations[0].test_channel_id.is_none());
    }

    #[test]
    fn rejects_definition_missing_required_fields() {
        let mut def = ai_def(1, "TI-1");
        def.range_lo = None;
        let err = ChannelAllocator::allocate(&[def], &[]).unwrap_err();
        assert!(matches!(err, AppError::InvalidDefinition { .. }));
    }

    #[test]
    fn di_definitions_require_wire_system() {
        let mut def = ai_def(1, "DI-1");
        def.module_type = ModuleType::DI;
        def.wire_system = None;
        let err = ChannelAllocator::allocate(&[def], &[]).unwrap_err();
        assert!(matches!(err, AppError::InvalidDefinition { .. }));
    }

    #[test]
    fn reallocate_keeps_the_same_batch_id_and_picks_up_new_inventory() {
        let def = ai_def(1, "TI-1");
        let batch_id = Uuid::new_v4();
        let allocations = ChannelAllocator::reallocate(batch_id, "批次1", &[def], &[]).unwrap();
        assert_eq!(allocations.len(), 1);
        assert_eq!(allocations[0].batch_id, batch_id);
        assert!(allocations[0].test_channel_id.is_none());

        let def = ai_def(1, "TI-1");
        let inventory = vec![rig_channel("AO1_1", ModuleType::AOPassive)];
        let allocations = ChannelAllocator::reallocate(batch_id, "批次1", &[def], &inventory).unwrap();
        assert_eq!(allocations[0].batch_id, batch_id);
        assert_eq!(allocations[0].test_channel_id, Some(inventory[0].id));
    }

    #[test]
    fn di_pairs_with_passive_do_rig_channel() {
        let mut def = ai_def(1, "DI-1");
        def.module_type = ModuleType::DI;
        def.wire_system = Some(WireSystem::NO);
        let inventory = vec![rig_channel("DO1_1", ModuleType::DOPassive)];
        let result = ChannelAllocator::allocate(&[def], &inventory).unwrap();
        assert_eq!(result.allocations[0].test_channel_id, Some(inventory[0].id));
    }
}
