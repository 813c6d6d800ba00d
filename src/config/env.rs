//! Environment variable lookup.
//!
//! Keys are normalized to uppercase alphanumerics, so `APP_SERVER_ADDR`,
//! `app_server_addr` and `APPSERVERADDR` name the same variable.

use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment.
    pub fn from_env() -> Self {
        Self::from_pairs(std::env::vars())
    }

    /// Build from `KEY=value` entries.
    pub fn from_environ<I, S>(environ: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_pairs(environ.into_iter().filter_map(|kv| {
            kv.as_ref()
                .split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
        }))
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut env = Self::new();
        for (k, v) in pairs {
            env.add(k.as_ref(), v);
        }
        env
    }

    pub fn add(&mut self, key: &str, value: impl Into<String>) {
        self.vars.insert(normalize(key), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(&normalize(key)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

fn normalize(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}
