//! Base implementation of records.
use crate::error::LrrError;
use std::collections::{
    btree_map::{IntoIter, Iter, Keys},
    BTreeMap,
};

/// Represents possible types of values that can be stored in a [`Record`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// A single floating-point value, typically used for rewards and metrics.
    Scalar(f32),

    /// An integer value, e.g., a step count.
    Integer(i64),

    /// A boolean value, e.g., a termination flag.
    Bool(bool),

    /// A 1-dimensional array of floating-point values.
    Array1(Vec<f32>),

    /// A text value.
    String(String),
}

impl RecordValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "Scalar",
            Self::Integer(_) => "Integer",
            Self::Bool(_) => "Bool",
            Self::Array1(_) => "Array1",
            Self::String(_) => "String",
        }
    }
}

/// A container for storing key-value pairs of various data types.
///
/// Keys are kept sorted, so iteration order is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(BTreeMap<String, RecordValue>);

impl Record {
    /// Creates an empty record.
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Creates a record containing a single scalar value.
    pub fn from_scalar(name: impl Into<String>, value: f32) -> Self {
        Self(BTreeMap::from([(name.into(), RecordValue::Scalar(value))]))
    }

    /// Creates a record from a slice of key-value pairs.
    pub fn from_slice<K: Into<String> + Clone>(s: &[(K, RecordValue)]) -> Self {
        Self(
            s.iter()
                .map(|(k, v)| (k.clone().into(), v.clone()))
                .collect(),
        )
    }

    /// Returns an iterator over the keys in the record.
    pub fn keys(&self) -> Keys<String, RecordValue> {
        self.0.keys()
    }

    /// Inserts a key-value pair into the record.
    pub fn insert(&mut self, k: impl Into<String>, v: RecordValue) {
        self.0.insert(k.into(), v);
    }

    /// Returns an iterator over the key-value pairs in the record.
    pub fn iter(&self) -> Iter<'_, String, RecordValue> {
        self.0.iter()
    }

    /// Returns an iterator that consumes the record.
    pub fn into_iter_in_record(self) -> IntoIter<String, RecordValue> {
        self.0.into_iter()
    }

    /// Gets a reference to the value associated with the given key.
    pub fn get(&self, k: &str) -> Option<&RecordValue> {
        self.0.get(k)
    }

    /// Merges two records, consuming both.
    ///
    /// If both records contain the same key, the value from the second record
    /// will overwrite the value from the first record.
    pub fn merge(self, record: Record) -> Self {
        Record(self.0.into_iter().chain(record.0).collect())
    }

    /// Merges another record into this one in place.
    ///
    /// If both records contain the same key, the value from the second record
    /// will overwrite the value from this record.
    pub fn merge_inplace(&mut self, record: Record) {
        self.0.extend(record.0);
    }

    fn get_value(&self, k: &str) -> Result<&RecordValue, LrrError> {
        self.0
            .get(k)
            .ok_or_else(|| LrrError::RecordKeyError(k.to_string()))
    }

    fn type_error(expected: &'static str, found: &RecordValue) -> LrrError {
        LrrError::RecordValueTypeError {
            expected,
            found: found.type_name(),
        }
    }

    /// Gets a scalar value from the record.
    ///
    /// # Errors
    ///
    /// Returns an error if the key does not exist or the value is not a scalar.
    pub fn get_scalar(&self, k: &str) -> Result<f32, LrrError> {
        match self.get_value(k)? {
            RecordValue::Scalar(v) => Ok(*v),
            v => Err(Self::type_error("Scalar", v)),
        }
    }

    /// Gets an integer value from the record.
    pub fn get_integer(&self, k: &str) -> Result<i64, LrrError> {
        match self.get_value(k)? {
            RecordValue::Integer(v) => Ok(*v),
            v => Err(Self::type_error("Integer", v)),
        }
    }

    /// Gets a boolean value from the record.
    pub fn get_bool(&self, k: &str) -> Result<bool, LrrError> {
        match self.get_value(k)? {
            RecordValue::Bool(v) => Ok(*v),
            v => Err(Self::type_error("Bool", v)),
        }
    }

    /// Gets a 1-dimensional array from the record.
    pub fn get_array1(&self, k: &str) -> Result<Vec<f32>, LrrError> {
        match self.get_value(k)? {
            RecordValue::Array1(v) => Ok(v.clone()),
            v => Err(Self::type_error("Array1", v)),
        }
    }

    /// Gets a string value from the record.
    pub fn get_string(&self, k: &str) -> Result<String, LrrError> {
        match self.get_value(k)? {
            RecordValue::String(s) => Ok(s.clone()),
            v => Err(Self::type_error("String", v)),
        }
    }

    /// Returns `true` if the record contains no key-value pairs.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of key-value pairs.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_merge_overwrites_with_second_record() {
        let r1 = Record::from_slice(&[
            ("a", RecordValue::Scalar(1.0)),
            ("b", RecordValue::Bool(true)),
        ]);
        let r2 = Record::from_slice(&[("b", RecordValue::Bool(false))]);
        let r = r1.merge(r2);

        assert_eq!(r.len(), 2);
        assert_eq!(r.get_scalar("a").unwrap(), 1.0);
        assert!(!r.get_bool("b").unwrap());
    }

    #[test]
    fn test_type_and_key_errors() {
        let mut r = Record::empty();
        r.insert("steps", RecordValue::Integer(3));

        assert_eq!(r.get_integer("steps").unwrap(), 3);
        match r.get_scalar("steps") {
            Err(LrrError::RecordValueTypeError { expected, found }) => {
                assert_eq!(expected, "Scalar");
                assert_eq!(found, "Integer");
            }
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(matches!(
            r.get_string("missing"),
            Err(LrrError::RecordKeyError(_))
        ));
    }

    #[test]
    fn test_keys_are_sorted() {
        let mut r = Record::empty();
        r.insert("reward_speed", RecordValue::Scalar(0.0));
        r.insert("done_dist_done", RecordValue::Bool(false));
        r.insert("reward", RecordValue::Scalar(0.0));

        let keys: Vec<_> = r.keys().cloned().collect();
        assert_eq!(keys, vec!["done_dist_done", "reward", "reward_speed"]);
    }
}
