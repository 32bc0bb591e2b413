//! 日志初始化：`log` 门面 + `env_logger`，输出到一个按大小轮转、按数量保留的文件。
//!
//! 核心代码只调用 `log::{info,warn,error,trace}!`，从不依赖具体的日志后端，
//! 这里只是在进程启动时接好那根管线。

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use env_logger::Target;

use crate::config::LoggingConfig;
use crate::error::AppResult;

/// 按大小轮转、保留固定数量历史文件的日志写入器。
struct RotatingFileWriter {
    dir: PathBuf,
    prefix: String,
    max_bytes: u64,
    retention: u32,
    current: File,
    written: u64,
}

impl RotatingFileWriter {
    fn new(dir: PathBuf, prefix: String, max_bytes: u64, retention: u32) -> std::io::Result<Self> {
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{prefix}.log"));
        let current = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = current.metadata().map(|m| m.len()).unwrap_or(0);
        Ok(Self {
            dir,
            prefix,
            max_bytes,
            retention,
            current,
            written,
        })
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        let base = self.dir.join(format!("{}.log", self.prefix));
        for idx in (1..self.retention).rev() {
            let from = self.dir.join(format!("{}.log.{idx}", self.prefix));
            let to = self.dir.join(format!("{}.log.{}", self.prefix, idx + 1));
            if from.exists() {
                let _ = fs::rename(&from, &to);
            }
        }
        if base.exists() {
            let rotated = self.dir.join(format!("{}.log.1", self.prefix));
            fs::rename(&base, &rotated)?;
        }
        self.current = OpenOptions::new().create(true).append(true).open(&base)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RotatingFileWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.written >= self.max_bytes {
            self.rotate()?;
        }
        let n = self.current.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.current.flush()
    }
}

/// 包装成 `env_logger` 能接受的 `Target::Pipe`。
struct SharedWriter(Mutex<RotatingFileWriter>);

impl Write for SharedWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().expect("日志写入器锁中毒").write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().expect("日志写入器锁中毒").flush()
    }
}

/// 初始化全局日志记录器。只应在进程启动时调用一次。
pub fn init(config: &LoggingConfig) -> AppResult<()> {
    let writer = RotatingFileWriter::new(
        config.directory.clone(),
        "fat-core".to_string(),
        config.rotation_size_bytes,
        config.retention_count,
    )?;

    let target = Target::Pipe(Box::new(SharedWriter(Mutex::new(writer))));

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.level))
        .target(target)
        .format_timestamp_millis()
        .try_init()
        .map_err(|e| crate::error::AppError::internal(format!("日志初始化失败: {e}")))?;

    Ok(())
}

/// 便于测试/CLI 快速打印到 stderr 而不写文件的轻量初始化。
pub fn init_stderr(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .try_init();
}

pub fn log_dir_exists(dir: &Path) -> bool {
    dir.exists()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_accumulate_in_the_current_file_under_the_size_cap() {
        let dir = tempdir().unwrap();
        let mut writer =
            RotatingFileWriter::new(dir.path().to_path_buf(), "test".to_string(), 1024, 3).unwrap();
        writer.write_all(b"hello").unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.written, 5);
        assert!(dir.path().join("test.log").exists());
        assert!(!dir.path().join("test.log.1").exists());
    }

    #[test]
    fn exceeding_max_bytes_rotates_the_current_file_aside() {
        let dir = tempdir().unwrap();
        let mut writer =
            RotatingFileWriter::new(dir.path().to_path_buf(), "test".to_string(), 4, 3).unwrap();
        writer.write_all(b"abcd").unwrap();
        writer.write_all(b"e").unwrap();

        assert!(dir.path().join("test.log.1").exists());
        assert!(dir.path().join("test.log").exists());
        assert_eq!(writer.written, 1);
    }

    #[test]
    fn rotation_chains_beyond_the_first_backup() {
        let dir = tempdir().unwrap();
        let mut writer =
            RotatingFileWriter::new(dir.path().to_path_buf(), "test".to_string(), 2, 3).unwrap();
        writer.write_all(b"aa").unwrap();
        writer.write_all(b"bb").unwrap();
        writer.write_all(b"cc").unwrap();

        assert!(dir.path().join("test.log.1").exists());
        assert!(dir.path().join("test.log.2").exists());
    }
}
