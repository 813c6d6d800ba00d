//! Textual value coercion for bound fields.
//!
//! # Responsibilities
//! - Parse and format scalar values (`TextValue`)
//! - Give list, optional and map fields their binding shapes (`FieldValue`)
//! - Split the quoted, comma-separated textual form used by list fields
//!
//! # Design Decisions
//! - Lists replace on the first set and append on every later set, so a flag
//!   given once and a flag given several times are distinguishable
//! - A quoted element may contain commas: `"1,1","2,2",3` is three elements
//! - Errors are plain messages; the binder attaches binding name and origin

use std::collections::{BTreeMap, HashMap};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// A scalar that round-trips through text.
pub trait TextValue: Sized + Send {
    /// Switch-like values may be given as a bare flag.
    const IS_SWITCH: bool = false;

    fn parse_text(text: &str) -> Result<Self, String>;

    fn to_text(&self) -> String;

    fn type_name() -> &'static str;

    /// Closed set of accepted spellings, empty when unrestricted.
    fn allowed_values() -> Vec<String> {
        Vec::new()
    }

    /// Text shown in place of the value in dumps, when the value knows how to mask itself.
    fn security_text(&self) -> Option<String> {
        None
    }
}

/// A bindable field, in any supported shape.
pub trait FieldValue: Send {
    /// Apply `text`. `append` is true for every set after the first.
    fn set_text(&mut self, text: &str, append: bool) -> Result<(), String>;

    /// Apply one element verbatim (positional variadic arguments).
    fn push_item(&mut self, text: &str) -> Result<(), String> {
        self.set_text(text, false)
    }

    fn to_text(&self) -> String;

    fn type_name(&self) -> String;

    fn is_list(&self) -> bool {
        false
    }

    fn is_switch(&self) -> bool {
        false
    }

    fn allowed_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn security_text(&self) -> Option<String> {
        None
    }
}

impl<T: TextValue> FieldValue for T {
    fn set_text(&mut self, text: &str, _append: bool) -> Result<(), String> {
        *self = T::parse_text(text)?;
        Ok(())
    }

    fn to_text(&self) -> String {
        TextValue::to_text(self)
    }

    fn type_name(&self) -> String {
        T::type_name().to_string()
    }

    fn is_switch(&self) -> bool {
        T::IS_SWITCH
    }

    fn allowed_values(&self) -> Vec<String> {
        T::allowed_values()
    }

    fn security_text(&self) -> Option<String> {
        TextValue::security_text(self)
    }
}

impl<T: TextValue> FieldValue for Option<T> {
    fn set_text(&mut self, text: &str, _append: bool) -> Result<(), String> {
        *self = if text.is_empty() {
            None
        } else {
            Some(T::parse_text(text)?)
        };
        Ok(())
    }

    fn to_text(&self) -> String {
        self.as_ref().map(TextValue::to_text).unwrap_or_default()
    }

    fn type_name(&self) -> String {
        T::type_name().to_string()
    }

    fn is_switch(&self) -> bool {
        T::IS_SWITCH
    }

    fn allowed_values(&self) -> Vec<String> {
        T::allowed_values()
    }

    fn security_text(&self) -> Option<String> {
        self.as_ref().and_then(TextValue::security_text)
    }
}

impl<T: TextValue> FieldValue for Vec<T> {
    fn set_text(&mut self, text: &str, append: bool) -> Result<(), String> {
        let items = split_record(text)?
            .iter()
            .map(|item| T::parse_text(item))
            .collect::<Result<Vec<_>, _>>()?;
        if append {
            self.extend(items);
        } else {
            *self = items;
        }
        Ok(())
    }

    fn push_item(&mut self, text: &str) -> Result<(), String> {
        self.push(T::parse_text(text)?);
        Ok(())
    }

    fn to_text(&self) -> String {
        join_record(self.iter().map(TextValue::to_text))
    }

    fn type_name(&self) -> String {
        format!("{}Slice", T::type_name())
    }

    fn is_list(&self) -> bool {
        true
    }

    fn allowed_values(&self) -> Vec<String> {
        T::allowed_values()
    }
}

fn parse_entries<T: TextValue>(text: &str) -> Result<Vec<(String, T)>, String> {
    split_record(text)?
        .into_iter()
        .map(|entry| {
            let (key, value) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected key=value, got `{}`", entry))?;
            Ok((key.to_string(), T::parse_text(value)?))
        })
        .collect()
}

fn format_entries<'v, T>(entries: impl Iterator<Item = (&'v String, &'v T)>) -> String
where
    T: TextValue + 'v,
{
    join_record(entries.map(|(k, v)| format!("{}={}", k, TextValue::to_text(v))))
}

impl<T: TextValue> FieldValue for BTreeMap<String, T> {
    fn set_text(&mut self, text: &str, append: bool) -> Result<(), String> {
        let entries = parse_entries::<T>(text)?;
        if !append {
            self.clear();
        }
        self.extend(entries);
        Ok(())
    }

    fn to_text(&self) -> String {
        format_entries(self.iter())
    }

    fn type_name(&self) -> String {
        format!("stringTo{}", capitalize(T::type_name()))
    }

    fn is_list(&self) -> bool {
        true
    }
}

impl<T: TextValue> FieldValue for HashMap<String, T> {
    fn set_text(&mut self, text: &str, append: bool) -> Result<(), String> {
        let entries = parse_entries::<T>(text)?;
        if !append {
            self.clear();
        }
        self.extend(entries);
        Ok(())
    }

    fn to_text(&self) -> String {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        format_entries(entries.into_iter())
    }

    fn type_name(&self) -> String {
        format!("stringTo{}", capitalize(T::type_name()))
    }

    fn is_list(&self) -> bool {
        true
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Split one comma-separated record. Elements wrapped in double quotes may
/// contain commas; `""` inside a quoted element is a literal quote.
pub fn split_record(text: &str) -> Result<Vec<String>, String> {
    if text.is_empty() {
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(text.as_bytes());
    let mut record = csv::StringRecord::new();

    match reader.read_record(&mut record) {
        Ok(true) => Ok(record.iter().map(str::to_owned).collect()),
        Ok(false) => Ok(Vec::new()),
        Err(e) => Err(format!("invalid comma-separated value: {}", e)),
    }
}

/// Inverse of [`split_record`].
pub fn join_record(items: impl IntoIterator<Item = String>) -> String {
    let items: Vec<String> = items.into_iter().collect();
    if items.is_empty() {
        return String::new();
    }

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    let written = writer
        .write_record(&items)
        .ok()
        .and_then(|()| writer.into_inner().ok())
        .and_then(|bytes| String::from_utf8(bytes).ok());

    match written {
        Some(line) => line.trim_end_matches(['\r', '\n']).to_string(),
        None => items.join(","),
    }
}

macro_rules! from_str_text_value {
    ($($ty:ty => $name:literal),* $(,)?) => {
        $(
            impl TextValue for $ty {
                fn parse_text(text: &str) -> Result<Self, String> {
                    <$ty>::from_str(text.trim()).map_err(|e| e.to_string())
                }

                fn to_text(&self) -> String {
                    self.to_string()
                }

                fn type_name() -> &'static str {
                    $name
                }
            }
        )*
    };
}

from_str_text_value! {
    i8 => "int8", i16 => "int16", i32 => "int32", i64 => "int64", isize => "int",
    u8 => "uint8", u16 => "uint16", u32 => "uint32", u64 => "uint64", usize => "uint",
    f32 => "float32", f64 => "float64",
    char => "char",
    SocketAddr => "string", IpAddr => "string",
}

impl TextValue for String {
    fn parse_text(text: &str) -> Result<Self, String> {
        Ok(text.to_string())
    }

    fn to_text(&self) -> String {
        self.clone()
    }

    fn type_name() -> &'static str {
        "string"
    }
}

impl TextValue for PathBuf {
    fn parse_text(text: &str) -> Result<Self, String> {
        Ok(PathBuf::from(text))
    }

    fn to_text(&self) -> String {
        self.display().to_string()
    }

    fn type_name() -> &'static str {
        "string"
    }
}

impl TextValue for bool {
    const IS_SWITCH: bool = true;

    fn parse_text(text: &str) -> Result<Self, String> {
        match text.trim() {
            "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
            "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
            other => Err(format!("invalid boolean `{}`", other)),
        }
    }

    fn to_text(&self) -> String {
        self.to_string()
    }

    fn type_name() -> &'static str {
        "bool"
    }
}

impl TextValue for Duration {
    fn parse_text(text: &str) -> Result<Self, String> {
        parse_duration(text.trim())
    }

    fn to_text(&self) -> String {
        format_duration(*self)
    }

    fn type_name() -> &'static str {
        "duration"
    }
}

/// Parse `1h30m`, `10s`, `150ms`, `2us`, `5ns` or bare seconds.
pub fn parse_duration(text: &str) -> Result<Duration, String> {
    if let Ok(secs) = text.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(text).map_err(|e| format!("invalid duration `{}`: {}", text, e))
}

pub fn format_duration(d: Duration) -> String {
    humantime::format_duration(d).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Level {
        Debug,
        Info,
    }

    impl TextValue for Level {
        fn parse_text(text: &str) -> Result<Self, String> {
            match text {
                "debug" => Ok(Level::Debug),
                "info" => Ok(Level::Info),
                other => Err(format!("unknown level `{}`", other)),
            }
        }

        fn to_text(&self) -> String {
            match self {
                Level::Debug => "debug".into(),
                Level::Info => "info".into(),
            }
        }

        fn type_name() -> &'static str {
            "string"
        }

        fn allowed_values() -> Vec<String> {
            vec!["debug".into(), "info".into()]
        }
    }

    #[test]
    fn test_list_single_and_multiple_values() {
        let mut list: Vec<String> = Vec::new();
        list.set_text("1", false).unwrap();
        assert_eq!(list, vec!["1"]);

        let mut list: Vec<String> = Vec::new();
        list.set_text("1,2,3", false).unwrap();
        assert_eq!(list, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_list_quoted_elements_keep_commas() {
        let mut list: Vec<String> = Vec::new();
        list.set_text(r#""1,1","2,2",3"#, false).unwrap();
        assert_eq!(list, vec!["1,1", "2,2", "3"]);
    }

    #[test]
    fn test_list_replace_then_append() {
        let mut list = vec![9u16, 9];
        list.set_text("1", false).unwrap();
        list.set_text("2,3", true).unwrap();
        assert_eq!(list, vec![1, 2, 3]);
    }

    #[test]
    fn test_list_text_round_trips_quoting() {
        let list = vec!["a,b".to_string(), "c".to_string(), "say \"hi\"".to_string()];
        let text = FieldValue::to_text(&list);
        assert_eq!(split_record(&text).unwrap(), list);
    }

    #[test]
    fn test_split_record_quoting() {
        assert_eq!(split_record("").unwrap(), Vec::<String>::new());
        assert_eq!(split_record(r#""a""b""#).unwrap(), vec![r#"a"b"#]);
        assert_eq!(split_record(r#"a,,"""#).unwrap(), vec!["a", "", ""]);
        assert_eq!(join_record(Vec::new()), "");
        assert_eq!(join_record(vec!["x".to_string(), "y,z".to_string()]), r#"x,"y,z""#);
    }

    #[test]
    fn test_map_entries() {
        let mut labels: BTreeMap<String, String> = BTreeMap::new();
        labels.set_text("team=core,\"note=a,b\"", false).unwrap();
        assert_eq!(labels.get("team").map(String::as_str), Some("core"));
        assert_eq!(labels.get("note").map(String::as_str), Some("a,b"));

        labels.set_text("zone=eu", true).unwrap();
        assert_eq!(labels.len(), 3);

        assert!(labels.set_text("novalue", false).is_err());
    }

    #[test]
    fn test_scalars() {
        let mut port = 0u16;
        port.set_text("8080", false).unwrap();
        assert_eq!(port, 8080);
        assert!(port.set_text("http", false).is_err());

        let mut flag = false;
        assert!(FieldValue::is_switch(&flag));
        flag.set_text("T", false).unwrap();
        assert!(flag);

        let mut maybe: Option<u32> = Some(3);
        maybe.set_text("", false).unwrap();
        assert_eq!(maybe, None);
    }

    #[test]
    fn test_enum_allowed_values() {
        let mut level = Level::Info;
        assert_eq!(FieldValue::allowed_values(&level), vec!["debug", "info"]);
        level.set_text("debug", false).unwrap();
        assert_eq!(level, Level::Debug);
        assert!(level.set_text("trace", false).is_err());
    }

    #[test]
    fn test_durations() {
        assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_secs(7));
        assert!(parse_duration("10 parsecs").is_err());
        assert!(parse_duration("").is_err());

        assert_eq!(format_duration(Duration::from_secs(5400)), "1h 30m");
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(150)), "150ms");
    }
}
