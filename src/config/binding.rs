//! Binding records: the metadata surface consumed by the CLI front-end and
//! by deployment manifest generation.
//!
//! A binding never stores the literal text of a secret value; masking happens
//! when the record is built, so `Debug`, `Serialize` and the info dump are all
//! safe to print.

use serde::Serialize;

/// One leaf configuration field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Binding {
    /// Flag name (kebab-case, scoped by path).
    pub name: String,
    pub alias: Option<char>,
    pub env_var: String,
    pub default_text: String,
    pub required: bool,
    pub secret: bool,
    pub exposed_port_name: Option<String>,
    pub allowed_values: Vec<String>,
    pub description: String,
    pub type_name: String,
    pub list: bool,
    pub switch: bool,
    /// Current value as shown in dumps. Masked for secrets.
    pub value: String,
}

impl Binding {
    /// Help text: description, allowed values and environment variable.
    pub fn usage(&self) -> String {
        let mut s = self.description.clone();

        if !self.allowed_values.is_empty() {
            if !s.is_empty() {
                s.push(' ');
            }
            s.push_str("(ALLOW VALUES: ");
            s.push_str(&self.allowed_values.join(", "));
            s.push(')');
        }

        if !self.env_var.is_empty() {
            if !s.is_empty() {
                s.push(' ');
            }
            s.push_str("${");
            s.push_str(&self.env_var);
            s.push('}');
        }

        s
    }

    /// `ENV_VAR = value` line for configuration listings.
    pub fn info(&self) -> String {
        format!("{} = {}", self.env_var, self.value)
    }
}

/// Positional argument metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArgSpec {
    pub name: String,
    pub variadic: bool,
    pub type_name: String,
}

/// Every binding and argument found in one walk, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Bindings {
    pub bindings: Vec<Binding>,
    pub args: Vec<ArgSpec>,
}

impl Bindings {
    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.bindings.iter()
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn info_lines(&self) -> Vec<String> {
        self.bindings.iter().map(Binding::info).collect()
    }

    /// `INPUT OUTPUT...` usage fragment.
    pub fn args_usage(&self) -> String {
        self.args
            .iter()
            .map(|a| {
                if a.variadic {
                    format!("{}...", a.name)
                } else {
                    a.name.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Replace every character with `-`.
pub fn mask(text: &str) -> String {
    "-".repeat(text.chars().count())
}
