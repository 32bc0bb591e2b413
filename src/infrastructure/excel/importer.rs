//! Spreadsheet import: turns a point-table workbook into
//! `ChannelPointDefinition`s. Column layout follows the teacher's FAT point
//! table convention (sequence, module name, module type, power type, wire
//! system, channel number, tag, station, variable name, description, data
//! type, PLC absolute address, PLC communication address, then optional
//! range/alarm/maintenance/remarks columns).

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;

use calamine::{open_workbook, Data, Reader, Xlsx};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    AlarmSetpoint, AlarmSetpoints, ChannelPointDefinition, MaintenanceSetpoint, ModuleType,
    PointDataType, PowerSupplyType, WireSystem,
};

const MIN_COLUMNS: usize = 13;

pub struct ExcelImporter;

impl ExcelImporter {
    /// Parses `path`'s first worksheet into definitions. Row 1 is a header
    /// and is skipped. Rejects duplicate `tag`s across the whole sheet
    /// (`DuplicateTag`) and definitions missing module-type-required fields
    /// (`InvalidDefinition`), matching the allocator's own validation so
    /// failures surface at import time rather than at allocation time.
    pub fn import(path: &Path) -> AppResult<Vec<ChannelPointDefinition>> {
        let mut workbook: Xlsx<_> = open_workbook(path)
            .map_err(|e| AppError::validation(format!("无法打开Excel文件: {e}")))?;

        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| AppError::validation("Excel文件中没有工作表"))?;

        let range = workbook
            .worksheet_range(&sheet_name)
            .map_err(|e| AppError::validation(format!("无法读取工作表: {e}")))?;

        let mut definitions = Vec::new();
        let mut seen_tags = HashSet::new();

        for (row_idx, row) in range.rows().enumerate() {
            if row_idx == 0 {
                continue;
            }
            let row_number = row_idx + 1;
            if row.len() < MIN_COLUMNS {
                return Err(AppError::validation(format!(
                    "第{row_number}行列数不足，期望至少{MIN_COLUMNS}列，实际{}列",
                    row.len()
                )));
            }

            let definition = Self::parse_row(row, row_number)?;

            if !seen_tags.insert(definition.tag.clone()) {
                return Err(AppError::duplicate_tag(definition.tag));
            }

            definition
                .validate_required_fields()
                .map_err(|msg| AppError::invalid_definition(definition.tag.clone(), msg))?;

            definitions.push(definition);
        }

        if definitions.is_empty() {
            return Err(AppError::validation("Excel文件中没有有效的通道定义数据"));
        }

        Ok(definitions)
    }

    fn parse_row(row: &[Data], row_number: usize) -> AppResult<ChannelPointDefinition> {
        let sequence_number = row[0].as_i64().unwrap_or(row_number as i64 - 1) as u32;
        let module_name = required_string(row, 1, row_number, "模块名称")?;
        let module_type = ModuleType::from_str(&required_string(row, 2, row_number, "模块类型")?)
            .map_err(|msg| AppError::validation(format!("第{row_number}行: {msg}")))?;
        let power_supply_type =
            PowerSupplyType::from_str(&required_string(row, 3, row_number, "供电类型")?)
                .map_err(|msg| AppError::validation(format!("第{row_number}行: {msg}")))?;
        let wire_system = optional_string(row, 4)
            .map(|s| WireSystem::from_str(&s))
            .transpose()
            .map_err(|msg| AppError::validation(format!("第{row_number}行: {msg}")))?;
        let channel_number = required_string(row, 5, row_number, "通道位号")?;
        let tag = required_string(row, 6, row_number, "位号")?;
        let station_name = required_string(row, 7, row_number, "场站名")?;
        let variable_name = required_string(row, 8, row_number, "变量名称")?;
        let description = optional_string(row, 9).unwrap_or_default();
        let data_type = PointDataType::from_str(&required_string(row, 10, row_number, "数据类型")?)
            .map_err(|msg| AppError::validation(format!("第{row_number}行: {msg}")))?;
        let plc_absolute_address = required_string(row, 11, row_number, "PLC绝对地址")?;
        let plc_communication_address = required_string(row, 12, row_number, "上位机通讯地址")?;

        let range_lo = optional_f64(row, 13);
        let range_hi = optional_f64(row, 14);
        let eng_unit = optional_string(row, 15);

        let alarm_setpoints = AlarmSetpoints {
            low_low: optional_alarm_setpoint(row, 16),
            low: optional_alarm_setpoint(row, 19),
            high: optional_alarm_setpoint(row, 22),
            high_high: optional_alarm_setpoint(row, 25),
        };

        let maintenance = match (optional_string(row, 28), optional_string(row, 29)) {
            (Some(setpoint_addr), Some(enable_addr)) => Some(MaintenanceSetpoint {
                setpoint_addr,
                enable_addr,
            }),
            _ => None,
        };

        let remarks = optional_string(row, 30);

        Ok(ChannelPointDefinition {
            id: Uuid::new_v4(),
            tag,
            variable_name,
            description,
            station_name,
            module_name,
            module_type,
            channel_number,
            data_type,
            power_supply_type,
            wire_system,
            plc_absolute_address,
            plc_communication_address,
            range_lo,
            range_hi,
            eng_unit,
            alarm_setpoints,
            maintenance,
            remarks,
            sequence_number,
        })
    }
}

fn cell(row: &[Data], index: usize) -> Option<&Data> {
    row.get(index)
}

fn required_string(row: &[Data], index: usize, row_number: usize, column_name: &str) -> AppResult<String> {
    let value = cell(row, index)
        .map(|c| c.to_string())
        .unwrap_or_default();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::validation(format!(
            "第{row_number}行'{column_name}'列不能为空"
        )));
    }
    Ok(trimmed.to_string())
}

fn optional_string(row: &[Data], index: usize) -> Option<String> {
    let value = cell(row, index)?.to_string();
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn optional_f64(row: &[Data], index: usize) -> Option<f64> {
    cell(row, index).and_then(|c| c.as_f64())
}

fn optional_alarm_setpoint(row: &[Data], start: usize) -> Option<AlarmSetpoint> {
    let value = optional_f64(row, start)?;
    let setpoint_addr = optional_string(row, start + 1)?;
    let feedback_addr = optional_string(row, start + 2)?;
    Some(AlarmSetpoint {
        value,
        setpoint_addr,
        feedback_addr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::Data as D;

    fn sample_row() -> Vec<D> {
        vec![
            D::Float(1.0),
            D::String("AI_Module_1".into()),
            D::String("AI".into()),
            D::String("sourced".into()),
            D::Empty,
            D::String("CH1".into()),
            D::String("TAG001".into()),
            D::String("Station1".into()),
            D::String("Var1".into()),
            D::String("desc".into()),
            D::String("Float".into()),
            D::String("%MD100".into()),
            D::String("40001".into()),
            D::Float(0.0),
            D::Float(100.0),
        ]
    }

    #[test]
    fn parses_a_well_formed_row() {
        let row = sample_row();
        let def = ExcelImporter::parse_row(&row, 2).unwrap();
        assert_eq!(def.tag, "TAG001");
        assert_eq!(def.module_type, ModuleType::AI);
        assert_eq!(def.range_lo, Some(0.0));
        assert_eq!(def.range_hi, Some(100.0));
    }

    #[test]
    fn missing_required_column_is_rejected() {
        let mut row = sample_row();
        row[6] = D::Empty;
        assert!(ExcelImporter::parse_row(&row, 2).is_err());
    }

    #[test]
    fn rejects_unknown_module_type() {
        let mut row = sample_row();
        row[2] = D::String("XYZ".into());
        assert!(ExcelImporter::parse_row(&row, 2).is_err());
    }
}
