use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

const HEADER: &str = "# goom_fx state v1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    Io(String),
    Parse { line: usize, message: String },
    Missing(String),
    Mismatch { key: String, message: String },
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Parse { line, message } => write!(f, "parse error at line {line}: {message}"),
            Self::Missing(key) => write!(f, "missing state key: {key}"),
            Self::Mismatch { key, message } => write!(f, "invalid value for {key}: {message}"),
        }
    }
}

impl std::error::Error for StateError {}

/// Something whose mutable fields can be dumped to and restored from a state file.
pub trait Persist {
    fn save(&self, w: &mut StateWriter);
    fn restore(&mut self, r: &StateReader) -> Result<(), StateError>;
}

/// Accumulates `section.key=value` lines.
///
/// Values are written with `Display`, which for `f32`/`f64` is the shortest text that parses
/// back to the identical bits, so a save/restore cycle is exact.
#[derive(Debug, Default)]
pub struct StateWriter {
    section: String,
    lines: Vec<String>,
}

impl StateWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn section(&mut self, name: &str) {
        self.section = name.to_string();
    }

    pub fn put<T: fmt::Display>(&mut self, key: &str, value: T) {
        let line = if self.section.is_empty() {
            format!("{key}={value}")
        } else {
            format!("{}.{key}={value}", self.section)
        };
        self.lines.push(line);
    }

    pub fn put_indexed<T: fmt::Display>(&mut self, key: &str, index: usize, value: T) {
        self.put(&format!("{key}[{index}]"), value);
    }

    pub fn to_text(&self) -> String {
        let mut body = String::with_capacity(self.lines.len() * 24 + HEADER.len() + 1);
        body.push_str(HEADER);
        body.push('\n');
        for line in &self.lines {
            body.push_str(line);
            body.push('\n');
        }
        body
    }

    pub fn write_to(&self, path: &Path) -> Result<(), StateError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StateError::Io(e.to_string()))?;
            }
        }
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, self.to_text()).map_err(|e| StateError::Io(e.to_string()))?;
        std::fs::rename(&tmp, path).map_err(|e| StateError::Io(e.to_string()))
    }
}

/// Parsed state file. Keys are fully qualified (`section.key`); use [`StateReader::scoped`]
/// to read back what a [`StateWriter`] wrote under a section.
#[derive(Debug, Default)]
pub struct StateReader {
    values: BTreeMap<String, String>,
}

impl StateReader {
    pub fn parse(text: &str) -> Result<Self, StateError> {
        let mut values = BTreeMap::new();
        for (line_idx, raw) in text.lines().enumerate() {
            let line_no = line_idx + 1;
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key_raw, value_raw)) = line.split_once('=') else {
                return Err(StateError::Parse {
                    line: line_no,
                    message: "expected <key>=<value>".to_string(),
                });
            };
            let key = key_raw.trim();
            if key.is_empty() {
                return Err(StateError::Parse {
                    line: line_no,
                    message: "empty key".to_string(),
                });
            }
            values.insert(key.to_string(), value_raw.trim().to_string());
        }
        Ok(Self { values })
    }

    pub fn load(path: &Path) -> Result<Self, StateError> {
        let text = std::fs::read_to_string(path).map_err(|e| StateError::Io(e.to_string()))?;
        Self::parse(&text)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn scoped<'a>(&'a self, section: &str) -> StateScope<'a> {
        StateScope {
            reader: self,
            section: section.to_string(),
        }
    }

    pub fn get<T>(&self, key: &str) -> Result<T, StateError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        let raw = self
            .values
            .get(key)
            .ok_or_else(|| StateError::Missing(key.to_string()))?;
        raw.parse::<T>().map_err(|e| StateError::Mismatch {
            key: key.to_string(),
            message: e.to_string(),
        })
    }
}

/// Read view of one section of a [`StateReader`].
#[derive(Debug)]
pub struct StateScope<'a> {
    reader: &'a StateReader,
    section: String,
}

impl StateScope<'_> {
    fn full_key(&self, key: &str) -> String {
        if self.section.is_empty() {
            key.to_string()
        } else {
            format!("{}.{key}", self.section)
        }
    }

    pub fn get<T>(&self, key: &str) -> Result<T, StateError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.reader.get(&self.full_key(key))
    }

    pub fn get_indexed<T>(&self, key: &str, index: usize) -> Result<T, StateError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.get(&format!("{key}[{index}]"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, StateError> {
        let raw: String = self.get(key)?;
        parse_bool(&raw).ok_or_else(|| StateError::Mismatch {
            key: self.full_key(key),
            message: "expected true/false".to_string(),
        })
    }
}

pub fn save_state<P: Persist + ?Sized>(item: &P, path: &Path) -> Result<(), StateError> {
    let mut w = StateWriter::new();
    item.save(&mut w);
    w.write_to(path)
}

pub fn restore_state<P: Persist + ?Sized>(item: &mut P, path: &Path) -> Result<(), StateError> {
    let r = StateReader::load(path)?;
    item.restore(&r)
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
