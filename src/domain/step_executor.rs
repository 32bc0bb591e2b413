//! C6 — `StepExecutor` variants (§4.3): one atomic sub-test against both
//! PLCs, producing a `RawTestOutcome`. Executors are pure over the driver
//! handles passed in `ExecutionCtx`; they never touch instance state
//! directly (that is StateManager's job alone, per the single-writer
//! redesign in §9).
//!
//! Two executor shapes exist, matching §4.3's two test families:
//! - `StepExecutor`: the automatic hardpoint/communication family. Always
//!   produces a `RawTestOutcome`, which the scheduler feeds to
//!   `StateManager::apply_raw_outcome`.
//! - `StimulusExecutor`: the manual/alarm family. Applies a PLC-level
//!   stimulus and returns the raw readings; the pass/fail verdict comes
//!   from the operator via `ManualTestCoordinator::update_sub_item`, not
//!   from the executor (§4.3 "observer confirms... executor records the
//!   stimulus").

use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

use crate::config::TestConfig;
use crate::domain::ports::{IntWidth, PlcDriver};
use crate::error::AppResult;
use crate::models::{
    AlarmSetpoint, ChannelPointDefinition, FailureKind, RawTestOutcome, SubTestItem, WireSystem,
};

/// Everything an executor needs to run one sub-test. Borrowed for the
/// duration of the call; executors hold no state of their own.
pub struct ExecutionCtx<'a> {
    pub instance_id: uuid::Uuid,
    pub definition: &'a ChannelPointDefinition,
    /// The paired test-rig channel's communication address, if one was
    /// allocated (§4.1 "inventory exhausted" leaves this `None`).
    pub test_channel_address: Option<&'a str>,
    pub target: &'a dyn PlcDriver,
    pub test_rig: &'a dyn PlcDriver,
    pub config: &'a TestConfig,
    pub cancel: &'a CancellationToken,
}

fn within_tolerance(expected: f64, actual: f64, cfg: &TestConfig) -> bool {
    (actual - expected).abs() <= cfg.tolerance_abs + cfg.tolerance_rel * expected.abs()
}

fn outcome(
    ctx: &ExecutionCtx<'_>,
    item: SubTestItem,
    success: bool,
    message: Option<String>,
    start: chrono::DateTime<Utc>,
    readings: Option<serde_json::Value>,
) -> RawTestOutcome {
    RawTestOutcome::new(ctx.instance_id, item, success, message, start, Utc::now(), readings)
}

/// Waits `millis`, returning early (and leaving the caller to notice
/// cancellation via `ctx.cancel.is_cancelled()`) if the token fires first.
async fn sleep_cancellable(cancel: &CancellationToken, millis: u64) {
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_millis(millis)) => {}
        _ = cancel.cancelled() => {}
    }
}

#[async_trait]
pub trait StepExecutor: Send + Sync {
    fn sub_test_item(&self) -> SubTestItem;
    async fn execute(&self, ctx: &ExecutionCtx<'_>) -> RawTestOutcome;
}

/// AI hardpoint (§4.3): writes five engineering-value percentages to the
/// paired test-rig AO, reads the target AI back, checks tolerance.
pub struct AiHardpointExecutor;

#[async_trait]
impl StepExecutor for AiHardpointExecutor {
    fn sub_test_item(&self) -> SubTestItem {
        SubTestItem::HardPoint
    }

    async fn execute(&self, ctx: &ExecutionCtx<'_>) -> RawTestOutcome {
        let start = Utc::now();
        let Some(test_addr) = ctx.test_channel_address else {
            return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::NoTestChannel.to_string()), start, None);
        };
        let (Some(lo), Some(hi)) = (ctx.definition.range_lo, ctx.definition.range_hi) else {
            return outcome(
                ctx,
                self.sub_test_item(),
                false,
                Some("缺少量程 range_lo/range_hi".to_string()),
                start,
                None,
            );
        };

        let mut readings = Vec::new();
        for percent in [0.0, 25.0, 50.0, 75.0, 100.0_f64] {
            if ctx.cancel.is_cancelled() {
                return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::Cancelled.to_string()), start, Some(serde_json::json!(readings)));
            }
            let expected = lo + (percent / 100.0) * (hi - lo);
            if let Err(e) = ctx.test_rig.write_float(test_addr, expected as f32).await {
                return outcome(ctx, self.sub_test_item(), false, Some(format!("{}: {e}", FailureKind::WriteError)), start, Some(serde_json::json!(readings)));
            }
            sleep_cancellable(ctx.cancel, ctx.config.stabilization_ms).await;
            if ctx.cancel.is_cancelled() {
                return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::Cancelled.to_string()), start, Some(serde_json::json!(readings)));
            }
            let actual = match ctx.target.read_float(&ctx.definition.plc_communication_address).await {
                Ok(v) => v as f64,
                Err(e) => {
                    return outcome(ctx, self.sub_test_item(), false, Some(format!("{}: {e}", FailureKind::ReadError)), start, Some(serde_json::json!(readings)));
                }
            };
            let passed = within_tolerance(expected, actual, ctx.config);
            readings.push(serde_json::json!({"percent": percent, "expected": expected, "actual": actual, "passed": passed}));
            if !passed {
                return outcome(
                    ctx,
                    self.sub_test_item(),
                    false,
                    Some(
                        FailureKind::OutOfTolerance {
                            expected,
                            actual,
                            tolerance: ctx.config.tolerance_abs + ctx.config.tolerance_rel * expected.abs(),
                        }
                        .to_string(),
                    ),
                    start,
                    Some(serde_json::json!(readings)),
                );
            }
        }
        outcome(ctx, self.sub_test_item(), true, None, start, Some(serde_json::json!(readings)))
    }
}

/// AO hardpoint (§4.3): symmetric to AI — writes to target, reads the
/// paired test-rig AI back.
pub struct AoHardpointExecutor;

#[async_trait]
impl StepExecutor for AoHardpointExecutor {
    fn sub_test_item(&self) -> SubTestItem {
        SubTestItem::HardPoint
    }

    async fn execute(&self, ctx: &ExecutionCtx<'_>) -> RawTestOutcome {
        let start = Utc::now();
        let Some(test_addr) = ctx.test_channel_address else {
            return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::NoTestChannel.to_string()), start, None);
        };
        let (Some(lo), Some(hi)) = (ctx.definition.range_lo, ctx.definition.range_hi) else {
            return outcome(
                ctx,
                self.sub_test_item(),
                false,
                Some("缺少量程 range_lo/range_hi".to_string()),
                start,
                None,
            );
        };

        let mut readings = Vec::new();
        for percent in [0.0, 25.0, 50.0, 75.0, 100.0_f64] {
            if ctx.cancel.is_cancelled() {
                return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::Cancelled.to_string()), start, Some(serde_json::json!(readings)));
            }
            let expected = lo + (percent / 100.0) * (hi - lo);
            if let Err(e) = ctx.target.write_float(&ctx.definition.plc_communication_address, expected as f32).await {
                return outcome(ctx, self.sub_test_item(), false, Some(format!("{}: {e}", FailureKind::WriteError)), start, Some(serde_json::json!(readings)));
            }
            sleep_cancellable(ctx.cancel, ctx.config.stabilization_ms).await;
            if ctx.cancel.is_cancelled() {
                return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::Cancelled.to_string()), start, Some(serde_json::json!(readings)));
            }
            let actual = match ctx.test_rig.read_float(test_addr).await {
                Ok(v) => v as f64,
                Err(e) => {
                    return outcome(ctx, self.sub_test_item(), false, Some(format!("{}: {e}", FailureKind::ReadError)), start, Some(serde_json::json!(readings)));
                }
            };
            let passed = within_tolerance(expected, actual, ctx.config);
            readings.push(serde_json::json!({"percent": percent, "expected": expected, "actual": actual, "passed": passed}));
            if !passed {
                return outcome(
                    ctx,
                    self.sub_test_item(),
                    false,
                    Some(
                        FailureKind::OutOfTolerance {
                            expected,
                            actual,
                            tolerance: ctx.config.tolerance_abs + ctx.config.tolerance_rel * expected.abs(),
                        }
                        .to_string(),
                    ),
                    start,
                    Some(serde_json::json!(readings)),
                );
            }
        }
        outcome(ctx, self.sub_test_item(), true, None, start, Some(serde_json::json!(readings)))
    }
}

fn expected_digital_reading(driven: bool, wire_system: Option<WireSystem>) -> bool {
    match wire_system {
        Some(WireSystem::NC) => !driven,
        _ => driven,
    }
}

/// DI hardpoint (§4.3): drives the paired test-rig DO to `{true, false}`
/// and reads the target DI back, inverting expected logic for `NC` wiring.
/// Always resets the rig DO to `false` before returning, on every exit path.
pub struct DiHardpointExecutor;

#[async_trait]
impl StepExecutor for DiHardpointExecutor {
    fn sub_test_item(&self) -> SubTestItem {
        SubTestItem::HardPoint
    }

    async fn execute(&self, ctx: &ExecutionCtx<'_>) -> RawTestOutcome {
        let start = Utc::now();
        let Some(test_addr) = ctx.test_channel_address else {
            return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::NoTestChannel.to_string()), start, None);
        };

        let mut readings = Vec::new();
        let mut failure: Option<String> = None;

        for driven in [true, false] {
            if ctx.cancel.is_cancelled() {
                failure = Some(FailureKind::Cancelled.to_string());
                break;
            }
            if let Err(e) = ctx.test_rig.write_bool(test_addr, driven).await {
                failure = Some(format!("{}: {e}", FailureKind::WriteError));
                break;
            }
            sleep_cancellable(ctx.cancel, ctx.config.digital_settle_ms).await;
            if ctx.cancel.is_cancelled() {
                failure = Some(FailureKind::Cancelled.to_string());
                break;
            }
            let actual = match ctx.target.read_bool(&ctx.definition.plc_communication_address).await {
                Ok(v) => v,
                Err(e) => {
                    failure = Some(format!("{}: {e}", FailureKind::ReadError));
                    break;
                }
            };
            let expected = expected_digital_reading(driven, ctx.definition.wire_system);
            let passed = actual == expected;
            readings.push(serde_json::json!({"driven": driven, "expected": expected, "actual": actual, "passed": passed}));
            if !passed {
                failure = Some(FailureKind::WireSystemMismatch.to_string());
                break;
            }
        }

        // Guaranteed finalizer: reset the rig DO regardless of outcome.
        let _ = ctx.test_rig.write_bool(test_addr, false).await;

        match failure {
            Some(message) => outcome(ctx, self.sub_test_item(), false, Some(message), start, Some(serde_json::json!(readings))),
            None => outcome(ctx, self.sub_test_item(), true, None, start, Some(serde_json::json!(readings))),
        }
    }
}

/// DO hardpoint (§4.3): commands the target DO and reads the paired
/// test-rig DI back. Finalizer resets the target DO to `false`.
pub struct DoHardpointExecutor;

#[async_trait]
impl StepExecutor for DoHardpointExecutor {
    fn sub_test_item(&self) -> SubTestItem {
        SubTestItem::HardPoint
    }

    async fn execute(&self, ctx: &ExecutionCtx<'_>) -> RawTestOutcome {
        let start = Utc::now();
        let Some(test_addr) = ctx.test_channel_address else {
            return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::NoTestChannel.to_string()), start, None);
        };

        let mut readings = Vec::new();
        let mut failure: Option<String> = None;

        for driven in [true, false] {
            if ctx.cancel.is_cancelled() {
                failure = Some(FailureKind::Cancelled.to_string());
                break;
            }
            if let Err(e) = ctx.target.write_bool(&ctx.definition.plc_communication_address, driven).await {
                failure = Some(format!("{}: {e}", FailureKind::WriteError));
                break;
            }
            sleep_cancellable(ctx.cancel, ctx.config.digital_settle_ms).await;
            if ctx.cancel.is_cancelled() {
                failure = Some(FailureKind::Cancelled.to_string());
                break;
            }
            let actual = match ctx.test_rig.read_bool(test_addr).await {
                Ok(v) => v,
                Err(e) => {
                    failure = Some(format!("{}: {e}", FailureKind::ReadError));
                    break;
                }
            };
            let expected = expected_digital_reading(driven, ctx.definition.wire_system);
            let passed = actual == expected;
            readings.push(serde_json::json!({"driven": driven, "expected": expected, "actual": actual, "passed": passed}));
            if !passed {
                failure = Some(FailureKind::WireSystemMismatch.to_string());
                break;
            }
        }

        let _ = ctx.target.write_bool(&ctx.definition.plc_communication_address, false).await;

        match failure {
            Some(message) => outcome(ctx, self.sub_test_item(), false, Some(message), start, Some(serde_json::json!(readings))),
            None => outcome(ctx, self.sub_test_item(), true, None, start, Some(serde_json::json!(readings))),
        }
    }
}

/// Communication hardpoint (supplement, §4.4/4.3): confirms both PLC
/// connections are up and round-trips the definition's own address on the
/// target. No test-rig channel is involved (§4.1 notes `Communication`
/// pairs with none).
pub struct CommunicationTestExecutor;

#[async_trait]
impl StepExecutor for CommunicationTestExecutor {
    fn sub_test_item(&self) -> SubTestItem {
        SubTestItem::CommunicationTest
    }

    async fn execute(&self, ctx: &ExecutionCtx<'_>) -> RawTestOutcome {
        let start = Utc::now();
        if !ctx.target.is_connected().await || !ctx.test_rig.is_connected().await {
            return outcome(ctx, self.sub_test_item(), false, Some(FailureKind::ConnectError.to_string()), start, None);
        }
        match ctx
            .target
            .read_int(&ctx.definition.plc_communication_address, IntWidth::Bits16)
            .await
        {
            Ok(value) => outcome(ctx, self.sub_test_item(), true, None, start, Some(serde_json::json!({"value": value}))),
            Err(e) => outcome(ctx, self.sub_test_item(), false, Some(format!("{}: {e}", FailureKind::ReadError)), start, None),
        }
    }
}

/// Returns the hardpoint executor appropriate for `module_type`'s base
/// type (§4.4), or `None` for `Communication`-less cases that never reach
/// the scheduler's hardpoint phase.
pub fn hardpoint_executor_for(base: crate::models::BaseModuleType) -> Box<dyn StepExecutor> {
    use crate::models::BaseModuleType::*;
    match base {
        AI => Box::new(AiHardpointExecutor),
        AO => Box::new(AoHardpointExecutor),
        DI => Box::new(DiHardpointExecutor),
        DO => Box::new(DoHardpointExecutor),
        Communication => Box::new(CommunicationTestExecutor),
    }
}

/// The manual/alarm family (§4.3): applies a PLC stimulus and returns raw
/// readings. The operator's verdict — not this executor — decides
/// pass/fail; `ManualTestCoordinator` records it separately.
#[async_trait]
pub trait StimulusExecutor: Send + Sync {
    async fn stimulate(&self, ctx: &ExecutionCtx<'_>) -> AppResult<serde_json::Value>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlarmLevel {
    LowLow,
    Low,
    High,
    HighHigh,
}

impl AlarmLevel {
    fn sub_test_item(self) -> SubTestItem {
        match self {
            Self::LowLow => SubTestItem::LowLowAlarm,
            Self::Low => SubTestItem::LowAlarm,
            Self::High => SubTestItem::HighAlarm,
            Self::HighHigh => SubTestItem::HighHighAlarm,
        }
    }

    /// Alarm levels below the process range cross their setpoint from
    /// above; `High`/`HighHigh` cross it from below (§4.3 "a test value
    /// that crosses the configured setpoint").
    fn crosses_from_above(self) -> bool {
        matches!(self, Self::LowLow | Self::Low)
    }

    fn setpoint(self, def: &ChannelPointDefinition) -> Option<AlarmSetpoint> {
        let sp = &def.alarm_setpoints;
        match self {
            Self::LowLow => sp.low_low.clone(),
            Self::Low => sp.low.clone(),
            Self::High => sp.high.clone(),
            Self::HighHigh => sp.high_high.clone(),
        }
    }
}

/// Stimulates one alarm level by writing a value 5% of the engineering
/// range past the configured setpoint onto the paired test-rig channel.
pub struct AlarmStimulusExecutor {
    pub level: AlarmLevel,
}

#[async_trait]
impl StimulusExecutor for AlarmStimulusExecutor {
    async fn stimulate(&self, ctx: &ExecutionCtx<'_>) -> AppResult<serde_json::Value> {
        use crate::error::AppError;

        let test_addr = ctx
            .test_channel_address
            .ok_or_else(|| AppError::no_test_channel(ctx.definition.id.to_string()))?;
        let setpoint = self
            .level
            .setpoint(ctx.definition)
            .ok_or_else(|| AppError::validation(format!("未配置 {:?} 报警设定值", self.level)))?;

        let (lo, hi) = (
            ctx.definition.range_lo.unwrap_or(0.0),
            ctx.definition.range_hi.unwrap_or(100.0),
        );
        let margin = 0.05 * (hi - lo);
        let stimulus = if self.level.crosses_from_above() {
            setpoint.value - margin
        } else {
            setpoint.value + margin
        };

        ctx.test_rig.write_float(test_addr, stimulus as f32).await?;
        sleep_cancellable(ctx.cancel, ctx.config.stabilization_ms).await;

        Ok(serde_json::json!({
            "sub_test_item": self.level.sub_test_item().to_string(),
            "setpoint": setpoint.value,
            "stimulus": stimulus,
        }))
    }
}

/// Toggles a channel's maintenance-enable address and reports the value
/// that was written; the operator confirms the PLC's response.
pub struct MaintenanceStimulusExecutor;

#[async_trait]
impl StimulusExecutor for MaintenanceStimulusExecutor {
    async fn stimulate(&self, ctx: &ExecutionCtx<'_>) -> AppResult<serde_json::Value> {
        use crate::error::AppError;

        let maintenance = ctx
            .definition
            .maintenance
            .as_ref()
            .ok_or_else(|| AppError::validation("未配置维护功能地址"))?;

        ctx.target.write_bool(&maintenance.enable_addr, true).await?;
        sleep_cancellable(ctx.cancel, ctx.config.stabilization_ms).await;
        let enabled = ctx.target.read_bool(&maintenance.enable_addr).await?;
        ctx.target.write_bool(&maintenance.enable_addr, false).await?;

        Ok(serde_json::json!({ "enabled": enabled }))
    }
}
