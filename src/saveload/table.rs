//! A typed wrapper around a `toml::Table`, plus the `BinaryBlob` pattern
//! for maps of integer-indexed primitives that don't belong in TOML text
//! (§4.11): a sidecar file of fixed-stride records, recorded in the table
//! as `(filename, element_size, element_type, num_elements)`.

use toml::Value;

use crate::error::{Error, Result};

/// A TOML table being assembled (save) or inspected (load) by one
/// `Saveable::save`/`load` call.
#[derive(Debug, Clone, Default)]
pub struct Table(toml::Table);

impl Table {
    pub fn new() -> Self {
        Self(toml::Table::new())
    }

    pub fn from_toml(value: toml::Table) -> Self {
        Self(value)
    }

    pub fn into_toml(self) -> toml::Table {
        self.0
    }

    pub fn insert_str(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.to_string(), Value::String(value.into()));
        self
    }

    pub fn insert_int(&mut self, key: &str, value: i64) -> &mut Self {
        self.0.insert(key.to_string(), Value::Integer(value));
        self
    }

    pub fn insert_float(&mut self, key: &str, value: f64) -> &mut Self {
        self.0.insert(key.to_string(), Value::Float(value));
        self
    }

    pub fn insert_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.0.insert(key.to_string(), Value::Boolean(value));
        self
    }

    pub fn insert_table(&mut self, key: &str, value: Table) -> &mut Self {
        self.0.insert(key.to_string(), Value::Table(value.0));
        self
    }

    /// Insert an array of sub-tables, used by composite artifacts that save
    /// a variable-length list of homogeneous parts (e.g. one table per IVF
    /// cluster under dense storage).
    pub fn insert_table_array(&mut self, key: &str, values: Vec<Table>) -> &mut Self {
        let arr = values.into_iter().map(|t| Value::Table(t.0)).collect();
        self.0.insert(key.to_string(), Value::Array(arr));
        self
    }

    pub fn insert_int_array(&mut self, key: &str, values: &[u64]) -> &mut Self {
        let arr = values.iter().map(|&v| Value::Integer(v as i64)).collect();
        self.0.insert(key.to_string(), Value::Array(arr));
        self
    }

    pub fn insert_float_array(&mut self, key: &str, values: &[f32]) -> &mut Self {
        let arr = values.iter().map(|&v| Value::Float(v as f64)).collect();
        self.0.insert(key.to_string(), Value::Array(arr));
        self
    }

    fn missing(key: &str) -> Error {
        Error::serialization(None, format!("missing required key '{key}'"))
    }

    fn wrong_type(key: &str, expected: &str) -> Error {
        Error::serialization(None, format!("key '{key}' is not a {expected}"))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.0.get(key).ok_or_else(|| Self::missing(key))?.as_str().ok_or_else(|| Self::wrong_type(key, "string"))
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        self.0.get(key).ok_or_else(|| Self::missing(key))?.as_integer().ok_or_else(|| Self::wrong_type(key, "integer"))
    }

    pub fn get_u64(&self, key: &str) -> Result<u64> {
        self.get_int(key).map(|v| v as u64)
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        self.get_int(key).map(|v| v as usize)
    }

    pub fn get_float(&self, key: &str) -> Result<f64> {
        self.0.get(key).ok_or_else(|| Self::missing(key))?.as_float().ok_or_else(|| Self::wrong_type(key, "float"))
    }

    pub fn get_f32(&self, key: &str) -> Result<f32> {
        self.get_float(key).map(|v| v as f32)
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.0.get(key).ok_or_else(|| Self::missing(key))?.as_bool().ok_or_else(|| Self::wrong_type(key, "bool"))
    }

    /// Like [`Self::get_usize`], but returns `None` rather than erroring
    /// when the key is absent (for fields a prior schema version omitted).
    pub fn get_usize_opt(&self, key: &str) -> Option<usize> {
        self.0.get(key).and_then(Value::as_integer).map(|v| v as usize)
    }

    pub fn get_table(&self, key: &str) -> Result<Table> {
        let v = self.0.get(key).ok_or_else(|| Self::missing(key))?;
        v.as_table().cloned().map(Table).ok_or_else(|| Self::wrong_type(key, "table"))
    }

    pub fn get_int_array(&self, key: &str) -> Result<Vec<u64>> {
        let arr = self.0.get(key).ok_or_else(|| Self::missing(key))?.as_array().ok_or_else(|| Self::wrong_type(key, "array"))?;
        arr.iter()
            .map(|v| v.as_integer().map(|i| i as u64).ok_or_else(|| Self::wrong_type(key, "integer array")))
            .collect()
    }

    pub fn get_table_array(&self, key: &str) -> Result<Vec<Table>> {
        let arr = self.0.get(key).ok_or_else(|| Self::missing(key))?.as_array().ok_or_else(|| Self::wrong_type(key, "array"))?;
        arr.iter()
            .map(|v| v.as_table().cloned().map(Table).ok_or_else(|| Self::wrong_type(key, "table array")))
            .collect()
    }

    pub fn get_float_array(&self, key: &str) -> Result<Vec<f32>> {
        let arr = self.0.get(key).ok_or_else(|| Self::missing(key))?.as_array().ok_or_else(|| Self::wrong_type(key, "array"))?;
        arr.iter()
            .map(|v| v.as_float().map(|f| f as f32).ok_or_else(|| Self::wrong_type(key, "float array")))
            .collect()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }
}

/// A reference to a binary sidecar file: `num_elements` fixed-stride
/// records of `element_size` bytes each, tagged with `element_type` so the
/// loader can sanity-check it against the expected representation.
#[derive(Debug, Clone)]
pub struct BinaryBlobRecord {
    pub filename: String,
    pub element_size: usize,
    pub element_type: String,
    pub num_elements: usize,
}

impl BinaryBlobRecord {
    pub fn to_table(&self) -> Table {
        let mut t = Table::new();
        t.insert_str("filename", self.filename.clone());
        t.insert_int("element_size", self.element_size as i64);
        t.insert_str("element_type", self.element_type.clone());
        t.insert_int("num_elements", self.num_elements as i64);
        t
    }

    pub fn from_table(t: &Table) -> Result<Self> {
        Ok(Self {
            filename: t.get_str("filename")?.to_string(),
            element_size: t.get_usize("element_size")?,
            element_type: t.get_str("element_type")?.to_string(),
            num_elements: t.get_usize("num_elements")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_fields() {
        let mut t = Table::new();
        t.insert_str("name", "vamana").insert_int("degree", 64).insert_bool("hierarchical", false);
        assert_eq!(t.get_str("name").unwrap(), "vamana");
        assert_eq!(t.get_int("degree").unwrap(), 64);
        assert!(!t.get_bool("hierarchical").unwrap());
    }

    #[test]
    fn missing_key_errors() {
        let t = Table::new();
        assert!(matches!(t.get_str("missing"), Err(Error::Serialization { .. })));
    }

    #[test]
    fn wrong_type_errors() {
        let mut t = Table::new();
        t.insert_str("x", "not a number");
        assert!(matches!(t.get_int("x"), Err(Error::Serialization { .. })));
    }

    #[test]
    fn int_array_round_trips() {
        let mut t = Table::new();
        t.insert_int_array("ids", &[1, 2, 3]);
        assert_eq!(t.get_int_array("ids").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn binary_blob_record_round_trips_through_table() {
        let record = BinaryBlobRecord {
            filename: "data_0.bin".to_string(),
            element_size: 4,
            element_type: "f32".to_string(),
            num_elements: 1000,
        };
        let table = record.to_table();
        let restored = BinaryBlobRecord::from_table(&table).unwrap();
        assert_eq!(restored.filename, record.filename);
        assert_eq!(restored.num_elements, record.num_elements);
    }
}
