//! `TestBatch`: 按测试台架并行容量分组的一批实例。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::instance::ChannelTestInstance;
use super::enums::OverallTestStatus;

/// 批次的整体状态；从成员实例的状态聚合得出（I4）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallBatchStatus {
    NotStarted,
    InProgress,
    Completed,
    CompletedWithFailures,
}

impl Default for OverallBatchStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

/// 批次计数器：由成员实例状态精确聚合而来，从不独立维护（I4，P3）。
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total: u32,
    pub tested: u32,
    pub passed: u32,
    pub failed: u32,
    pub skipped: u32,
    pub started: u32,
}

impl BatchStatistics {
    /// Exact aggregation of member instance statuses (I4, P3): never an
    /// independently maintained counter, always recomputed from the current
    /// instance set.
    pub fn from_instances(instances: &[ChannelTestInstance]) -> Self {
        let total = instances.len() as u32;
        let mut passed = 0u32;
        let mut failed = 0u32;
        let mut skipped = 0u32;
        let mut started = 0u32;
        for instance in instances {
            match instance.overall_status {
                OverallTestStatus::NotTested => {}
                OverallTestStatus::TestCompletedPassed => {
                    passed += 1;
                    started += 1;
                }
                OverallTestStatus::TestCompletedFailed => {
                    failed += 1;
                    started += 1;
                }
                OverallTestStatus::Skipped => {
                    skipped += 1;
                    started += 1;
                }
                _ => started += 1,
            }
        }
        Self {
            total,
            tested: passed + failed + skipped,
            passed,
            failed,
            skipped,
            started,
        }
    }

    pub fn all_terminal(&self) -> bool {
        self.total > 0 && self.tested == self.total
    }
}

impl OverallBatchStatus {
    /// Derives the batch-level status from its aggregated counters (I4).
    pub fn from_statistics(stats: &BatchStatistics) -> Self {
        if stats.started == 0 {
            Self::NotStarted
        } else if stats.tested < stats.total {
            Self::InProgress
        } else if stats.failed > 0 {
            Self::CompletedWithFailures
        } else {
            Self::Completed
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestBatchInfo {
    pub batch_id: Uuid,
    pub batch_name: String,
    pub product_model: Option<String>,
    pub serial_number: Option<String>,
    pub station_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub statistics: BatchStatistics,
    pub overall_status: OverallBatchStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_with(status: OverallTestStatus) -> ChannelTestInstance {
        let mut inst = ChannelTestInstance::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        inst.overall_status = status;
        inst
    }

    #[test]
    fn empty_instance_set_is_not_started() {
        let stats = BatchStatistics::from_instances(&[]);
        assert_eq!(stats.total, 0);
        assert_eq!(OverallBatchStatus::from_statistics(&stats), OverallBatchStatus::NotStarted);
    }

    #[test]
    fn mix_of_not_tested_and_in_progress_is_in_progress() {
        let instances = vec![
            instance_with(OverallTestStatus::NotTested),
            instance_with(OverallTestStatus::HardPointTesting),
        ];
        let stats = BatchStatistics::from_instances(&instances);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.started, 1);
        assert_eq!(
            OverallBatchStatus::from_statistics(&stats),
            OverallBatchStatus::InProgress
        );
    }

    #[test]
    fn all_passed_is_completed() {
        let instances = vec![
            instance_with(OverallTestStatus::TestCompletedPassed),
            instance_with(OverallTestStatus::TestCompletedPassed),
        ];
        let stats = BatchStatistics::from_instances(&instances);
        assert!(stats.all_terminal());
        assert_eq!(stats.passed, 2);
        assert_eq!(stats.failed, 0);
        assert_eq!(
            OverallBatchStatus::from_statistics(&stats),
            OverallBatchStatus::Completed
        );
    }

    #[test]
    fn any_failure_among_terminal_instances_is_completed_with_failures() {
        let instances = vec![
            instance_with(OverallTestStatus::TestCompletedPassed),
            instance_with(OverallTestStatus::TestCompletedFailed),
            instance_with(OverallTestStatus::Skipped),
        ];
        let stats = BatchStatistics::from_instances(&instances);
        assert!(stats.all_terminal());
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(
            OverallBatchStatus::from_statistics(&stats),
            OverallBatchStatus::CompletedWithFailures
        );
    }

    #[test]
    fn not_all_terminal_until_every_instance_is_tested() {
        let instances = vec![
            instance_with(OverallTestStatus::TestCompletedPassed),
            instance_with(OverallTestStatus::ManualTesting),
        ];
        let stats = BatchStatistics::from_instances(&instances);
        assert!(!stats.all_terminal());
    }
}
