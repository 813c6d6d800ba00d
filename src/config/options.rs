//! Per-field binding options.

/// Options attached to one bound field.
///
/// A field is required unless it is marked [`optional`](Self::optional) or
/// given a declared [`default_value`](Self::default_value).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    pub(crate) rename: Option<String>,
    pub(crate) alias: Option<char>,
    pub(crate) optional: bool,
    pub(crate) default: Option<String>,
    pub(crate) secret: bool,
    pub(crate) expose: Option<String>,
    pub(crate) allowed: Vec<String>,
    pub(crate) description: Option<String>,
    pub(crate) skip: bool,
}

impl FieldOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind under `name` instead of the declared field name.
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.rename = Some(name.into());
        self
    }

    /// Single-character short flag.
    pub fn alias(mut self, alias: char) -> Self {
        self.alias = Some(alias);
        self
    }

    /// The field's current value (after `set_defaults`) is its default.
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Declared textual default, applied when neither flag nor environment supply a value.
    pub fn default_value(mut self, text: impl Into<String>) -> Self {
        self.default = Some(text.into());
        self
    }

    /// Never render the value in dumps.
    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    /// Port name used by deployment manifest generation.
    pub fn expose(mut self, port_name: impl Into<String>) -> Self {
        self.expose = Some(port_name.into());
        self
    }

    /// Restrict accepted values.
    pub fn allowed<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn describe(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }

    /// Do not bind this field at all.
    pub fn skip(mut self) -> Self {
        self.skip = true;
        self
    }

    pub fn is_required(&self) -> bool {
        !self.optional && self.default.is_none()
    }
}
