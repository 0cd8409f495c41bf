//! File-backed calibration store.
//!
//! A flat TOML table of named scalars, read-through with caller-supplied
//! defaults and rewritten on every put. The firmware this replaces kept the
//! same fields in ESP32 NVS; a single small file keeps the same contract
//! (absent key -> default) without a schema.
use std::path::{Path, PathBuf};

use lift_traits::SettingsStore;

type BoxedError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    table: toml::Table,
}

impl FileStore {
    /// Open the store at `path`, creating an empty one in memory if the file
    /// does not exist yet. The file is only written on the first put.
    pub fn open(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let table = match std::fs::read_to_string(&path) {
            Ok(s) => s
                .parse::<toml::Table>()
                .map_err(|e| eyre::eyre!("parse settings store {:?}: {}", path, e))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => toml::Table::new(),
            Err(e) => return Err(eyre::eyre!("read settings store {:?}: {}", path, e)),
        };
        Ok(Self { path, table })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), BoxedError> {
        let rendered = toml::to_string(&self.table)?;
        std::fs::write(&self.path, rendered)?;
        Ok(())
    }
}

impl SettingsStore for FileStore {
    fn get_i64(&mut self, key: &str, default: i64) -> i64 {
        self.table
            .get(key)
            .and_then(toml::Value::as_integer)
            .unwrap_or(default)
    }

    fn get_f32(&mut self, key: &str, default: f32) -> f32 {
        match self.table.get(key) {
            Some(v) => v
                .as_float()
                // hand-edited files may carry a bare integer
                .or_else(|| v.as_integer().map(|i| i as f64))
                .map_or(default, |f| f as f32),
            None => default,
        }
    }

    fn get_bool(&mut self, key: &str, default: bool) -> bool {
        self.table
            .get(key)
            .and_then(toml::Value::as_bool)
            .unwrap_or(default)
    }

    fn put_i64(&mut self, key: &str, value: i64) -> Result<(), BoxedError> {
        self.table
            .insert(key.to_string(), toml::Value::Integer(value));
        self.flush()
    }

    fn put_f32(&mut self, key: &str, value: f32) -> Result<(), BoxedError> {
        self.table
            .insert(key.to_string(), toml::Value::Float(f64::from(value)));
        self.flush()
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), BoxedError> {
        self.table
            .insert(key.to_string(), toml::Value::Boolean(value));
        self.flush()
    }

    fn clear(&mut self) -> Result<(), BoxedError> {
        self.table.clear();
        self.flush()
    }
}
