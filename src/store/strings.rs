//! Tag string dictionary
//!
//! Interns tag keys and values so records share one allocation per distinct
//! string. Optionally mirrors new strings to `string.dat` / `string.idx` so
//! ids are stable when the same directory is reopened.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const STRING_DATA_FILE: &str = "string.dat";
pub const STRING_INDEX_FILE: &str = "string.idx";

struct BackingFiles {
    data: File,
    index: File,
    data_len: u64,
}

#[derive(Default)]
struct Inner {
    ids: HashMap<Arc<str>, u32>,
    values: Vec<Arc<str>>,
    files: Option<BackingFiles>,
}

/// Thread-safe string interner
#[derive(Default)]
pub struct StringTable {
    inner: Mutex<Inner>,
    dir: Option<PathBuf>,
}

impl StringTable {
    /// In-memory table with no backing files
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Open (or create) a file-backed table in `dir`, reloading existing strings
    pub fn open(dir: &Path) -> io::Result<Self> {
        let data_path = dir.join(STRING_DATA_FILE);
        let index_path = dir.join(STRING_INDEX_FILE);

        let mut inner = Inner::default();
        if data_path.exists() && index_path.exists() {
            let mut data = Vec::new();
            File::open(&data_path)?.read_to_end(&mut data)?;
            let mut index = BufReader::new(File::open(&index_path)?);
            loop {
                let offset = match index.read_u32::<LittleEndian>() {
                    Ok(v) => v as usize,
                    Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                    Err(e) => return Err(e),
                };
                let len = index.read_u32::<LittleEndian>()? as usize;
                let bytes = data.get(offset..offset + len).ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "string index points past data file")
                })?;
                let value: Arc<str> = String::from_utf8_lossy(bytes).into();
                let id = inner.values.len() as u32;
                inner.ids.entry(value.clone()).or_insert(id);
                inner.values.push(value);
            }
        }

        let data = OpenOptions::new().create(true).append(true).open(&data_path)?;
        let index = OpenOptions::new().create(true).append(true).open(&index_path)?;
        let data_len = data.metadata()?.len();
        inner.files = Some(BackingFiles { data, index, data_len });

        tracing::debug!(path = %dir.display(), strings = inner.values.len(), "opened string table");
        Ok(Self { inner: Mutex::new(inner), dir: Some(dir.to_path_buf()) })
    }

    /// Return the id and shared copy of `value`, adding it if new
    pub fn intern(&self, value: &str) -> (u32, Arc<str>) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((shared, id)) = inner.ids.get_key_value(value) {
            return (*id, shared.clone());
        }

        let id = inner.values.len() as u32;
        let shared: Arc<str> = value.into();
        let write_error = match inner.files.as_mut() {
            Some(files) => files.append(value).err(),
            None => None,
        };
        if let Some(e) = write_error {
            // The in-memory table stays authoritative; stop mirroring.
            tracing::warn!(error = %e, "string table file write failed, continuing in memory");
            inner.files = None;
        }
        inner.ids.insert(shared.clone(), id);
        inner.values.push(shared.clone());
        (id, shared)
    }

    pub fn resolve(&self, id: u32) -> Option<Arc<str>> {
        let inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.values.get(id as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Directory of the backing files, if any
    pub fn directory(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Drop all strings from memory; backing files are left untouched
    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        inner.ids.clear();
        inner.values.clear();
        if let Some(mut files) = inner.files.take() {
            if let Err(e) = files.flush() {
                tracing::warn!(error = %e, "string table file flush failed");
            }
        }
    }
}

impl BackingFiles {
    fn append(&mut self, value: &str) -> io::Result<()> {
        let offset = u32::try_from(self.data_len)
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "string data file exceeds 4 GiB"))?;
        self.data.write_all(value.as_bytes())?;
        self.index.write_u32::<LittleEndian>(offset)?;
        self.index.write_u32::<LittleEndian>(value.len() as u32)?;
        self.data_len += value.len() as u64;
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.data.flush()?;
        self.index.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_allocation() {
        let table = StringTable::in_memory();
        let (id_a, a) = table.intern("highway");
        let (id_b, b) = table.intern("highway");
        assert_eq!(id_a, id_b);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(table.intern("water").0, id_a + 1);
        assert_eq!(table.resolve(id_a).as_deref(), Some("highway"));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_file_backed_table_reloads_ids() {
        let dir = tempfile::tempdir().unwrap();
        {
            let table = StringTable::open(dir.path()).unwrap();
            table.intern("name");
            table.intern("Berlin");
            table.intern("name");
        }
        assert!(dir.path().join(STRING_DATA_FILE).exists());

        let table = StringTable::open(dir.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve(1).as_deref(), Some("Berlin"));
        assert_eq!(table.intern("Berlin").0, 1);
        assert_eq!(table.intern("place").0, 2);
    }

    #[test]
    fn test_clear_empties_memory() {
        let table = StringTable::in_memory();
        table.intern("a");
        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_clear_keeps_backing_files_readable() {
        let dir = tempfile::tempdir().unwrap();
        let table = StringTable::open(dir.path()).unwrap();
        table.intern("waterway");
        table.intern("river");
        table.clear();
        assert!(table.is_empty());
        // no longer mirrored after clear
        table.intern("lake");

        let reopened = StringTable::open(dir.path()).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.resolve(1).as_deref(), Some("river"));
    }
}
