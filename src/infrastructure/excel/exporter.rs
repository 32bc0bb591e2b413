//! Spreadsheet export: channel allocation table and test-result report.
//! Takes already-loaded domain data (the facade is responsible for querying
//! `PersistenceStore`); this module only formats and writes workbooks.

use std::path::{Path, PathBuf};

use chrono::Local;
use rust_xlsxwriter::{Color, Format, FormatAlign, FormatBorder, Workbook};

use crate::error::{AppError, AppResult};
use crate::models::{ChannelAllocation, ChannelPointDefinition, ChannelTestInstance, ModuleType};

fn color_for_module(module_type: ModuleType) -> Color {
    match module_type.base() {
        crate::models::BaseModuleType::AI => Color::RGB(0xB0E0E6),
        crate::models::BaseModuleType::AO => Color::RGB(0xC5E1A5),
        crate::models::BaseModuleType::DI => Color::RGB(0xFFF59D),
        crate::models::BaseModuleType::DO => Color::RGB(0xE1BEE7),
        crate::models::BaseModuleType::Communication => Color::White,
    }
}

pub struct ExcelExporter;

impl ExcelExporter {
    /// Writes one row per definition, joined against its allocation (if
    /// any). `target_dir` receives a timestamped `<station>_<ts>_通道分配表.xlsx`.
    pub fn export_channel_allocation(
        definitions: &[ChannelPointDefinition],
        allocations: &[ChannelAllocation],
        target_dir: &Path,
    ) -> AppResult<PathBuf> {
        if definitions.is_empty() {
            return Err(AppError::validation("暂无通道数据可导出"));
        }

        std::fs::create_dir_all(target_dir)?;
        let station_name = &definitions[0].station_name;
        let timestamp = Local::now().format("%Y%m%d_%H%M").to_string();
        let file_path = target_dir.join(format!("{station_name}_{timestamp}_通道分配表.xlsx"));

        let alloc_by_def: std::collections::HashMap<_, _> =
            allocations.iter().map(|a| (a.definition_id, a)).collect();

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();

        let header_fmt = Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);
        let default_fmt = Format::new()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);

        let headers = [
            "站场名",
            "位号",
            "变量名称",
            "变量描述",
            "模块类型",
            "测试批次",
            "测试台架通道",
            "测试台架通讯地址",
        ];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &header_fmt)?;
        }

        let mut sorted: Vec<&ChannelPointDefinition> = definitions.iter().collect();
        sorted.sort_by_key(|d| d.sequence_number);

        for (row_idx, def) in sorted.iter().enumerate() {
            let row = (row_idx + 1) as u32;
            let alloc = alloc_by_def.get(&def.id);
            let fmt = default_fmt
                .clone()
                .set_background_color(color_for_module(def.module_type));

            sheet.write_string_with_format(row, 0, &def.station_name, &fmt)?;
            sheet.write_string_with_format(row, 1, &def.tag, &fmt)?;
            sheet.write_string_with_format(row, 2, &def.variable_name, &fmt)?;
            sheet.write_string_with_format(row, 3, &def.description, &fmt)?;
            sheet.write_string_with_format(row, 4, def.module_type.to_string(), &fmt)?;
            sheet.write_string_with_format(
                row,
                5,
                alloc.map(|a| a.batch_name.as_str()).unwrap_or(""),
                &fmt,
            )?;
            sheet.write_string_with_format(
                row,
                6,
                alloc
                    .and_then(|a| a.test_channel_id)
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
                &fmt,
            )?;
            sheet.write_string_with_format(
                row,
                7,
                alloc
                    .and_then(|a| a.test_comm_address.clone())
                    .unwrap_or_default(),
                &fmt,
            )?;
        }

        workbook
            .save(&file_path)
            .map_err(|e| AppError::internal(format!("写入Excel文件失败: {e}")))?;
        Ok(file_path)
    }

    /// Writes one row per instance, with each `SubTestItem` column showing its
    /// status. `target_dir` receives a timestamped `测试结果_<ts>.xlsx`.
    pub fn export_test_results(
        definitions: &[ChannelPointDefinition],
        instances: &[ChannelTestInstance],
        target_dir: &Path,
    ) -> AppResult<PathBuf> {
        if instances.is_empty() {
            return Err(AppError::validation("暂无测试结果可导出"));
        }

        std::fs::create_dir_all(target_dir)?;
        let timestamp = Local::now().format("%Y%m%d_%H%M").to_string();
        let file_path = target_dir.join(format!("测试结果_{timestamp}.xlsx"));

        let def_by_id: std::collections::HashMap<_, _> =
            definitions.iter().map(|d| (d.id, d)).collect();

        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();

        let header_fmt = Format::new()
            .set_bold()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);
        let default_fmt = Format::new()
            .set_align(FormatAlign::Center)
            .set_border(FormatBorder::Thin);

        let headers = [
            "位号", "变量名称", "模块类型", "整体状态", "开始时间", "结束时间", "耗时(ms)", "重测次数", "错误信息",
        ];
        for (col, header) in headers.iter().enumerate() {
            sheet.write_string_with_format(0, col as u16, *header, &header_fmt)?;
        }

        for (row_idx, inst) in instances.iter().enumerate() {
            let row = (row_idx + 1) as u32;
            let def = def_by_id.get(&inst.definition_id);

            sheet.write_string_with_format(
                row,
                0,
                def.map(|d| d.tag.as_str()).unwrap_or(""),
                &default_fmt,
            )?;
            sheet.write_string_with_format(
                row,
                1,
                def.map(|d| d.variable_name.as_str()).unwrap_or(""),
                &default_fmt,
            )?;
            sheet.write_string_with_format(
                row,
                2,
                def.map(|d| d.module_type.to_string()).unwrap_or_default(),
                &default_fmt,
            )?;
            sheet.write_string_with_format(row, 3, inst.overall_status.to_string(), &default_fmt)?;
            sheet.write_string_with_format(
                row,
                4,
                inst.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
                &default_fmt,
            )?;
            sheet.write_string_with_format(
                row,
                5,
                inst.final_test_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
                &default_fmt,
            )?;
            sheet.write_number_with_format(
                row,
                6,
                inst.duration_ms.unwrap_or_default() as f64,
                &default_fmt,
            )?;
            sheet.write_number_with_format(row, 7, inst.retries_count as f64, &default_fmt)?;
            sheet.write_string_with_format(
                row,
                8,
                inst.error_message.clone().unwrap_or_default(),
                &default_fmt,
            )?;
        }

        workbook
            .save(&file_path)
            .map_err(|e| AppError::internal(format!("写入Excel文件失败: {e}")))?;
        Ok(file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AlarmSetpoints, ChannelTestInstance, OverallTestStatus, PointDataType, PowerSupplyType,
    };
    use calamine::{open_workbook, Reader, Xlsx};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn sample_definition(seq: u32) -> ChannelPointDefinition {
        ChannelPointDefinition {
            id: Uuid::new_v4(),
            tag: format!("TAG{seq}"),
            variable_name: format!("VAR{seq}"),
            description: "示例点位".to_string(),
            station_name: "站场1".to_string(),
            module_name: "模块1".to_string(),
            module_type: ModuleType::AI,
            channel_number: seq.to_string(),
            data_type: PointDataType::Float,
            power_supply_type: PowerSupplyType::Sourced,
            wire_system: None,
            plc_absolute_address: format!("%MD{seq}"),
            plc_communication_address: format!("40{seq:03}"),
            range_lo: Some(0.0),
            range_hi: Some(100.0),
            eng_unit: Some("C".to_string()),
            alarm_setpoints: AlarmSetpoints::default(),
            maintenance: None,
            remarks: None,
            sequence_number: seq,
        }
    }

    #[test]
    fn export_channel_allocation_writes_one_row_per_definition() {
        let dir = tempdir().unwrap();
        let def = sample_definition(1);
        let allocation = ChannelAllocation {
            definition_id: def.id,
            batch_id: Uuid::new_v4(),
            batch_name: "批次1".to_string(),
            test_channel_id: Some(Uuid::new_v4()),
            test_comm_address: Some("40001".to_string()),
        };

        let path =
            ExcelExporter::export_channel_allocation(&[def.clone()], &[allocation], dir.path())
                .unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let sheet_name = workbook.sheet_names().first().cloned().unwrap();
        let range = workbook.worksheet_range(&sheet_name).unwrap();
        assert_eq!(range.rows().count(), 2);
        let data_row = range.rows().nth(1).unwrap();
        assert_eq!(data_row[1].to_string(), def.tag);
    }

    #[test]
    fn export_channel_allocation_rejects_empty_definitions() {
        let dir = tempdir().unwrap();
        assert!(ExcelExporter::export_channel_allocation(&[], &[], dir.path()).is_err());
    }

    #[test]
    fn export_test_results_writes_one_row_per_instance() {
        let dir = tempdir().unwrap();
        let def = sample_definition(2);
        let mut instance = ChannelTestInstance::new(Uuid::new_v4(), def.id, Uuid::new_v4());
        instance.overall_status = OverallTestStatus::TestCompletedPassed;

        let path =
            ExcelExporter::export_test_results(&[def.clone()], &[instance], dir.path()).unwrap();

        let mut workbook: Xlsx<_> = open_workbook(&path).unwrap();
        let sheet_name = workbook.sheet_names().first().cloned().unwrap();
        let range = workbook.worksheet_range(&sheet_name).unwrap();
        let data_row = range.rows().nth(1).unwrap();
        assert_eq!(data_row[0].to_string(), def.tag);
        assert_eq!(data_row[3].to_string(), "TestCompletedPassed");
    }

    #[test]
    fn export_test_results_rejects_empty_instances() {
        let dir = tempdir().unwrap();
        assert!(ExcelExporter::export_test_results(&[], &[], dir.path()).is_err());
    }
}
