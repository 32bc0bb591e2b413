pub mod modbus;

pub use modbus::ModbusPlcDriver;
