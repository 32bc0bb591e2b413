//! Modbus-TCP `PlcDriver` adapter. Addresses follow the conventional
//! Modicon-style prefix notation (`0x`=coil, `1x`=discrete input,
//! `3x`=input register, `4x`=holding register), 1-indexed per point,
//! the same convention the teacher's modbus service parses.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_modbus::client::{tcp, Context as ModbusContext};
use tokio_modbus::prelude::*;

use crate::domain::ports::{IntWidth, PlcConnectParams, PlcDriver};
use crate::error::{AppError, AppResult};
use crate::models::ByteOrder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegisterKind {
    Coil,
    DiscreteInput,
    InputRegister,
    HoldingRegister,
}

fn parse_address(address: &str) -> AppResult<(RegisterKind, u16)> {
    let mut chars = address.chars();
    let prefix = chars
        .next()
        .ok_or_else(|| AppError::read_error(address, "地址为空"))?;
    let offset: u16 = chars
        .as_str()
        .parse()
        .map_err(|_| AppError::read_error(address, "地址偏移量无法解析"))?;
    if offset == 0 {
        return Err(AppError::read_error(address, "Modbus地址偏移量从1开始"));
    }
    let kind = match prefix {
        '0' => RegisterKind::Coil,
        '1' => RegisterKind::DiscreteInput,
        '3' => RegisterKind::InputRegister,
        '4' => RegisterKind::HoldingRegister,
        other => {
            return Err(AppError::read_error(
                address,
                format!("不支持的地址类型前缀 '{other}'"),
            ))
        }
    };
    Ok((kind, offset - 1))
}

fn registers_to_u32(regs: &[u16], order: ByteOrder) -> u32 {
    let (hi, lo) = match order {
        ByteOrder::ABCD => (regs[0], regs[1]),
        ByteOrder::CDAB => (regs[1], regs[0]),
        ByteOrder::BADC => (regs[0].swap_bytes(), regs[1].swap_bytes()),
        ByteOrder::DCBA => (regs[1].swap_bytes(), regs[0].swap_bytes()),
    };
    ((hi as u32) << 16) | lo as u32
}

fn u32_to_registers(value: u32, order: ByteOrder) -> [u16; 2] {
    let hi = (value >> 16) as u16;
    let lo = (value & 0xFFFF) as u16;
    match order {
        ByteOrder::ABCD => [hi, lo],
        ByteOrder::CDAB => [lo, hi],
        ByteOrder::BADC => [hi.swap_bytes(), lo.swap_bytes()],
        ByteOrder::DCBA => [lo.swap_bytes(), hi.swap_bytes()],
    }
}

fn registers_to_u64(regs: &[u16], order: ByteOrder) -> u64 {
    let hi = registers_to_u32(&regs[0..2], order) as u64;
    let lo = registers_to_u32(&regs[2..4], order) as u64;
    (hi << 32) | lo
}

fn u64_to_registers(value: u64, order: ByteOrder) -> [u16; 4] {
    let hi = u32_to_registers((value >> 32) as u32, order);
    let lo = u32_to_registers((value & 0xFFFF_FFFF) as u32, order);
    [hi[0], hi[1], lo[0], lo[1]]
}

/// Modbus-TCP driver. One session at a time; `connect` replaces whatever
/// was previously held.
pub struct ModbusPlcDriver {
    slave_id: u8,
    byte_order: Mutex<ByteOrder>,
    ctx: Mutex<Option<ModbusContext>>,
}

impl ModbusPlcDriver {
    pub fn new(slave_id: u8) -> Self {
        Self {
            slave_id,
            byte_order: Mutex::new(ByteOrder::default()),
            ctx: Mutex::new(None),
        }
    }

    async fn locked_ctx(&self) -> AppResult<tokio::sync::MappedMutexGuard<'_, ModbusContext>> {
        let guard = self.ctx.lock().await;
        if guard.is_none() {
            return Err(AppError::plc_disconnected("modbus"));
        }
        Ok(tokio::sync::MutexGuard::map(guard, |opt| {
            opt.as_mut().expect("checked Some above")
        }))
    }
}

#[async_trait]
impl PlcDriver for ModbusPlcDriver {
    async fn connect(&self, params: &PlcConnectParams) -> AppResult<()> {
        let addr: SocketAddr = format!("{}:{}", params.host, params.port)
            .parse()
            .map_err(|e| AppError::connect_error(format!("无效的地址: {e}")))?;
        let slave = Slave(self.slave_id);
        let new_ctx = tokio::time::timeout(
            Duration::from_millis(params.connect_timeout_ms),
            tcp::connect_slave(addr, slave),
        )
        .await
        .map_err(|_| AppError::timeout("connect", "PLC连接超时"))?
        .map_err(|e| AppError::connect_error(e.to_string()))?;

        *self.ctx.lock().await = Some(new_ctx);
        *self.byte_order.lock().await = params.byte_order;
        Ok(())
    }

    async fn read_bool(&self, address: &str) -> AppResult<bool> {
        let (kind, offset) = parse_address(address)?;
        let mut ctx = self.locked_ctx().await?;
        let values = match kind {
            RegisterKind::Coil => ctx.read_coils(offset, 1).await,
            RegisterKind::DiscreteInput => ctx.read_discrete_inputs(offset, 1).await,
            _ => return Err(AppError::read_error(address, "不是布尔型地址")),
        }
        .map_err(|e| AppError::read_error(address, e.to_string()))?
        .map_err(|e| AppError::read_error(address, format!("{e:?}")))?;
        values
            .first()
            .copied()
            .ok_or_else(|| AppError::read_error(address, "响应为空"))
    }

    async fn read_float(&self, address: &str) -> AppResult<f32> {
        let (kind, offset) = parse_address(address)?;
        let order = *self.byte_order.lock().await;
        let mut ctx = self.locked_ctx().await?;
        let regs = match kind {
            RegisterKind::HoldingRegister => ctx.read_holding_registers(offset, 2).await,
            RegisterKind::InputRegister => ctx.read_input_registers(offset, 2).await,
            _ => return Err(AppError::read_error(address, "不是32位寄存器地址")),
        }
        .map_err(|e| AppError::read_error(address, e.to_string()))?
        .map_err(|e| AppError::read_error(address, format!("{e:?}")))?;
        if regs.len() < 2 {
            return Err(AppError::read_error(address, "寄存器数量不足"));
        }
        Ok(f32::from_bits(registers_to_u32(&regs, order)))
    }

    async fn read_int(&self, address: &str, width: IntWidth) -> AppResult<i64> {
        let (kind, offset) = parse_address(address)?;
        let order = *self.byte_order.lock().await;
        let count = match width {
            IntWidth::Bits16 => 1,
            IntWidth::Bits32 => 2,
            IntWidth::Bits64 => 4,
        };
        let mut ctx = self.locked_ctx().await?;
        let regs = match kind {
            RegisterKind::HoldingRegister => ctx.read_holding_registers(offset, count).await,
            RegisterKind::InputRegister => ctx.read_input_registers(offset, count).await,
            _ => return Err(AppError::read_error(address, "不是整型寄存器地址")),
        }
        .map_err(|e| AppError::read_error(address, e.to_string()))?
        .map_err(|e| AppError::read_error(address, format!("{e:?}")))?;
        if regs.len() < count as usize {
            return Err(AppError::read_error(address, "寄存器数量不足"));
        }
        let value = match width {
            IntWidth::Bits16 => regs[0] as i64,
            IntWidth::Bits32 => registers_to_u32(&regs, order) as i64,
            IntWidth::Bits64 => registers_to_u64(&regs, order) as i64,
        };
        Ok(value)
    }

    async fn write_bool(&self, address: &str, value: bool) -> AppResult<()> {
        let (kind, offset) = parse_address(address)?;
        if kind != RegisterKind::Coil {
            return Err(AppError::write_error(address, "不是可写线圈地址"));
        }
        let mut ctx = self.locked_ctx().await?;
        ctx.write_single_coil(offset, value)
            .await
            .map_err(|e| AppError::write_error(address, e.to_string()))?
            .map_err(|e| AppError::write_error(address, format!("{e:?}")))
    }

    async fn write_float(&self, address: &str, value: f32) -> AppResult<()> {
        let (kind, offset) = parse_address(address)?;
        if kind != RegisterKind::HoldingRegister {
            return Err(AppError::write_error(address, "不是可写保持寄存器地址"));
        }
        let order = *self.byte_order.lock().await;
        let regs = u32_to_registers(value.to_bits(), order);
        let mut ctx = self.locked_ctx().await?;
        ctx.write_multiple_registers(offset, &regs)
            .await
            .map_err(|e| AppError::write_error(address, e.to_string()))?
            .map_err(|e| AppError::write_error(address, format!("{e:?}")))
    }

    async fn write_int(&self, address: &str, value: i64, width: IntWidth) -> AppResult<()> {
        let (kind, offset) = parse_address(address)?;
        if kind != RegisterKind::HoldingRegister {
            return Err(AppError::write_error(address, "不是可写保持寄存器地址"));
        }
        let order = *self.byte_order.lock().await;
        let regs: Vec<u16> = match width {
            IntWidth::Bits16 => vec![value as u16],
            IntWidth::Bits32 => u32_to_registers(value as u32, order).to_vec(),
            IntWidth::Bits64 => u64_to_registers(value as u64, order).to_vec(),
        };
        let mut ctx = self.locked_ctx().await?;
        ctx.write_multiple_registers(offset, &regs)
            .await
            .map_err(|e| AppError::write_error(address, e.to_string()))?
            .map_err(|e| AppError::write_error(address, format!("{e:?}")))
    }

    async fn disconnect(&self) -> AppResult<()> {
        self.ctx.lock().await.take();
        Ok(())
    }

    async fn is_connected(&self) -> bool {
        self.ctx.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_holding_register_address() {
        let (kind, offset) = parse_address("40001").unwrap();
        assert_eq!(kind, RegisterKind::HoldingRegister);
        assert_eq!(offset, 0);
    }

    #[test]
    fn rejects_zero_offset() {
        assert!(parse_address("40000").is_err());
    }

    #[test]
    fn cdab_round_trips_a_float() {
        let bits = 3.5f32.to_bits();
        let regs = u32_to_registers(bits, ByteOrder::CDAB);
        assert_eq!(registers_to_u32(&regs, ByteOrder::CDAB), bits);
    }

    #[test]
    fn abcd_round_trips_an_int32() {
        let regs = u32_to_registers(123_456, ByteOrder::ABCD);
        assert_eq!(registers_to_u32(&regs, ByteOrder::ABCD), 123_456);
    }
}
