use super::Path;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use indexmap::IndexMap;
use std::cmp::Ordering;

#[derive(Debug, Default, Clone, PartialEq)]
pub enum Value {
    /// Null value
    #[default]
    Null,

    /// Boolean value
    Bool(bool),

    /// Signed 64-bit integer
    I64(i64),

    /// Unsigned 64-bit integer
    U64(u64),

    /// Double-precision floating point
    F64(f64),

    /// String value
    String(String),

    /// An array of raw bytes
    Bytes(Vec<u8>),

    /// An instant in time, UTC
    Timestamp(DateTime<Utc>),

    /// A civil calendar date
    Date(NaiveDate),

    /// A civil "wall clock" time. The date component is normalized to the
    /// epoch when values round-trip through a driver.
    Time(NaiveTime),

    /// A list of values of the same type
    List(Vec<Value>),

    /// A name-keyed record; also the representation of json objects
    Record(ValueRecord),
}

/// A record value keyed by field name, preserving insertion order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ValueRecord {
    fields: IndexMap<String, Value>,
}

impl Value {
    pub const fn null() -> Self {
        Self::Null
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub const fn is_record(&self) -> bool {
        matches!(self, Self::Record(_))
    }

    pub const fn is_list(&self) -> bool {
        matches!(self, Self::List(_))
    }

    pub fn record() -> Self {
        Self::Record(ValueRecord::new())
    }

    pub fn record_from_entries(
        entries: impl IntoIterator<Item = (String, Value)>,
    ) -> Self {
        Self::Record(ValueRecord::from_entries(entries))
    }

    pub fn list_from_vec(items: Vec<Value>) -> Self {
        Self::List(items)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(&**v),
            _ => None,
        }
    }

    /// Integral view of the value. Booleans widen so bitmask operators can
    /// treat them uniformly.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::I64(v) => Some(*v),
            Self::U64(v) => i64::try_from(*v).ok(),
            Self::Bool(v) => Some(*v as i64),
            Self::F64(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&ValueRecord> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut ValueRecord> {
        match self {
            Self::Record(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[track_caller]
    pub fn expect_record(&self) -> &ValueRecord {
        match self {
            Self::Record(record) => record,
            _ => panic!("expected Value::Record; actual={self:#?}"),
        }
    }

    #[track_caller]
    pub fn expect_record_mut(&mut self) -> &mut ValueRecord {
        match self {
            Self::Record(record) => record,
            _ => panic!("expected Value::Record; actual={self:#?}"),
        }
    }

    #[track_caller]
    pub fn into_record(self) -> ValueRecord {
        match self {
            Self::Record(record) => record,
            _ => panic!("expected Value::Record; actual={self:#?}"),
        }
    }

    #[track_caller]
    pub fn unwrap_list(self) -> Vec<Value> {
        match self {
            Self::List(list) => list,
            _ => panic!("expected Value::List; actual={self:#?}"),
        }
    }

    /// Numeric view used by arithmetic and comparison coercion. Temporal
    /// values surface as epoch milliseconds.
    pub fn numeric(&self) -> Option<f64> {
        match self {
            Self::I64(v) => Some(*v as f64),
            Self::U64(v) => Some(*v as f64),
            Self::F64(v) => Some(*v),
            Self::Bool(v) => Some(*v as u8 as f64),
            _ => self.epoch_millis().map(|ms| ms as f64),
        }
    }

    /// Epoch milliseconds for temporal values.
    pub fn epoch_millis(&self) -> Option<i64> {
        match self {
            Self::Timestamp(ts) => Some(ts.timestamp_millis()),
            Self::Date(date) => Some(
                Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
                    .timestamp_millis(),
            ),
            Self::Time(time) => {
                let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
                Some(
                    Utc.from_utc_datetime(&NaiveDateTime::new(epoch, *time))
                        .timestamp_millis(),
                )
            }
            _ => None,
        }
    }

    /// Compares two values by value-of coercion: numerics compare across
    /// representations, temporal values compare by epoch milliseconds.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Null, _) | (_, Self::Null) => None,
            (Self::Bool(a), Self::Bool(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Bytes(a), Self::Bytes(b)) => Some(a.cmp(b)),
            (Self::I64(a), Self::I64(b)) => Some(a.cmp(b)),
            (Self::U64(a), Self::U64(b)) => Some(a.cmp(b)),
            (Self::List(a), Self::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    match x.compare(y)? {
                        Ordering::Equal => continue,
                        ord => return Some(ord),
                    }
                }
                Some(a.len().cmp(&b.len()))
            }
            (Self::Record(a), Self::Record(b)) => (a == b).then_some(Ordering::Equal),
            (a, b) => {
                let (a, b) = (a.numeric()?, b.numeric()?);
                a.partial_cmp(&b)
            }
        }
    }

    /// Equality under value-of coercion: `1 == 1.0`, dates equal when
    /// their epoch milliseconds coincide.
    pub fn compares_eq(&self, other: &Value) -> bool {
        if self == other {
            return true;
        }
        matches!(self.compare(other), Some(Ordering::Equal))
    }

    pub fn take(&mut self) -> Value {
        std::mem::take(self)
    }
}

impl ValueRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self {
            fields: entries.into_iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.fields.get_mut(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Looks up a value by dotted path, descending through nested records.
    /// A dotted key stored verbatim takes precedence over nesting.
    pub fn get_path(&self, path: &Path) -> Option<&Value> {
        if path.is_empty() {
            return None;
        }

        if path.len() > 1 {
            if let Some(value) = self.fields.get(&path.dotted()) {
                return Some(value);
            }
        }

        let mut current = self.fields.get(path.first()?)?;
        for segment in path.iter().skip(1) {
            current = current.as_record()?.get(segment)?;
        }
        Some(current)
    }

    /// Inserts a value at a dotted path, creating intermediate records.
    pub fn insert_path(&mut self, path: &Path, value: Value) {
        let Some(first) = path.first() else { return };

        if path.len() == 1 {
            self.fields.insert(first.to_string(), value);
            return;
        }

        let entry = self
            .fields
            .entry(first.to_string())
            .or_insert_with(Value::record);

        if !entry.is_record() {
            *entry = Value::record();
        }

        entry
            .expect_record_mut()
            .insert_path(&path.rest(), value);
    }
}

impl IntoIterator for ValueRecord {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

impl FromIterator<(String, Value)> for ValueRecord {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self::from_entries(iter)
    }
}

impl From<ValueRecord> for Value {
    fn from(value: ValueRecord) -> Self {
        Self::Record(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::I64(value as i64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::I64(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::U64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::F64(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveTime> for Value {
    fn from(value: NaiveTime) -> Self {
        Self::Time(value)
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => value.into(),
            None => Self::Null,
        }
    }
}

// Direct comparison against Rust primitives keeps test assertions readable.
macro_rules! impl_value_eq {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl PartialEq<$ty> for Value {
                fn eq(&self, other: &$ty) -> bool {
                    matches!(self, Value::$variant(val) if val == other)
                }
            }

            impl PartialEq<Value> for $ty {
                fn eq(&self, other: &Value) -> bool {
                    other.eq(self)
                }
            }
        )*
    };
}

impl_value_eq! {
    bool => Bool,
    i64 => I64,
    u64 => U64,
}

impl PartialEq<&str> for Value {
    fn eq(&self, other: &&str) -> bool {
        matches!(self, Value::String(val) if val == other)
    }
}

impl PartialEq<Value> for &str {
    fn eq(&self, other: &Value) -> bool {
        other.eq(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_coercion_eq() {
        assert!(Value::I64(1).compares_eq(&Value::F64(1.0)));
        assert!(Value::U64(7).compares_eq(&Value::I64(7)));
        assert!(!Value::I64(1).compares_eq(&Value::I64(2)));
    }

    #[test]
    fn null_compares_only_to_null() {
        assert!(Value::Null.compares_eq(&Value::Null));
        assert_eq!(Value::Null.compare(&Value::I64(0)), None);
    }

    #[test]
    fn dates_compare_by_epoch_millis() {
        let a = Value::Date(NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        let b = Value::Timestamp(Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap());
        assert!(a.compares_eq(&b));
    }

    #[test]
    fn insert_path_nests() {
        let mut record = ValueRecord::new();
        record.insert_path(&Path::from_dotted("profile.age"), Value::I64(3));
        let nested = record.get("profile").unwrap().expect_record();
        assert_eq!(nested.get("age"), Some(&Value::I64(3)));
        assert_eq!(
            record.get_path(&Path::from_dotted("profile.age")),
            Some(&Value::I64(3))
        );
    }
}
