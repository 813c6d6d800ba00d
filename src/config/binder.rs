//! Field binder: walks a component tree and binds its leaf fields.
//!
//! # Responsibilities
//! - Invoke `set_defaults` on every `Defaulter` reached by the walk
//! - Derive flag and environment variable names from the field path
//! - Resolve each field: explicit flag → environment → declared default →
//!   error when required
//! - Record a [`Binding`] per field and an [`ArgSpec`] per positional argument
//!
//! # Design Decisions
//! - Two modes: `describe` only collects metadata (used to build the CLI),
//!   `apply` also resolves values from [`Sources`]
//! - Every error is collected; the walk never stops at the first one
//! - Embedded children share the parent's path, named children extend it

use std::collections::HashMap;

use crate::component::{Component, Walker};
use crate::config::binding::{mask, ArgSpec, Binding, Bindings};
use crate::config::env::EnvVars;
use crate::config::naming;
use crate::config::options::FieldOptions;
use crate::config::value::{split_record, FieldValue};
use crate::error::{BindingError, BindingErrors};

/// Externally supplied configuration text.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    flags: HashMap<String, Vec<String>>,
    env: EnvVars,
    args: Vec<String>,
}

impl Sources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of `--name value`. Repeated calls append occurrences.
    pub fn with_flag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.flags.entry(name.into()).or_default().push(value.into());
        self
    }

    pub fn with_env(mut self, env: EnvVars) -> Self {
        self.env = env;
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn flag(&self, name: &str) -> Option<&[String]> {
        self.flags.get(name).map(Vec::as_slice)
    }

    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

enum Mode<'s> {
    Describe,
    Apply(&'s Sources),
}

/// Walker that produces [`Bindings`].
pub struct Binder<'s> {
    app: String,
    mode: Mode<'s>,
    path: Vec<String>,
    docs: Vec<String>,
    out: Bindings,
    next_arg: usize,
    errors: Vec<BindingError>,
}

impl Binder<'static> {
    /// Collect metadata only.
    pub fn describe(app: impl Into<String>) -> Self {
        Binder::with_mode(app.into(), Mode::Describe)
    }
}

impl<'s> Binder<'s> {
    /// Collect metadata and resolve every field from `sources`.
    pub fn apply(app: impl Into<String>, sources: &'s Sources) -> Self {
        Binder::with_mode(app.into(), Mode::Apply(sources))
    }

    fn with_mode(app: String, mode: Mode<'s>) -> Self {
        Self {
            app,
            mode,
            path: Vec::new(),
            docs: Vec::new(),
            out: Bindings::default(),
            next_arg: 0,
            errors: Vec::new(),
        }
    }

    /// Walk `root` and return its bindings, or every error found.
    pub fn bind(mut self, root: &mut dyn Component) -> Result<Bindings, BindingErrors> {
        self.visit(root);

        if let Mode::Apply(sources) = self.mode {
            if let Some(extra) = sources.args().get(self.next_arg) {
                self.errors.push(BindingError::UnexpectedArgument {
                    value: extra.clone(),
                });
            }
        }

        if self.errors.is_empty() {
            tracing::debug!(
                app = %self.app,
                bindings = self.out.bindings.len(),
                args = self.out.args.len(),
                "Configuration bound"
            );
            Ok(self.out)
        } else {
            Err(BindingErrors(self.errors))
        }
    }

    fn visit(&mut self, component: &mut dyn Component) {
        if let Some(defaulter) = component.as_defaulter() {
            defaulter.set_defaults();
        }

        let doc = component.doc().map(str::to_owned);
        let pushed = doc.is_some();
        if let Some(doc) = doc {
            self.docs.push(doc);
        }

        component.walk(self);

        if pushed {
            self.docs.pop();
        }
    }

    fn description(&self, field: Option<&str>) -> String {
        self.docs
            .iter()
            .map(String::as_str)
            .chain(field)
            .filter(|d| !d.is_empty())
            .collect::<Vec<_>>()
            .join(": ")
    }

    fn invalid(&mut self, binding: &str, origin: &str, secret: bool, message: String) {
        let message = if secret {
            "invalid value (secret)".to_string()
        } else {
            message
        };
        self.errors.push(BindingError::InvalidValue {
            binding: binding.to_string(),
            origin: origin.to_string(),
            message,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn set(
        &mut self,
        value: &mut dyn FieldValue,
        binding: &str,
        origin: &str,
        text: &str,
        append: bool,
        secret: bool,
        allowed: &[String],
    ) {
        if !allowed.is_empty() {
            let items = if value.is_list() {
                split_record(text).unwrap_or_else(|_| vec![text.to_string()])
            } else {
                vec![text.to_string()]
            };
            if let Some(bad) = items.iter().find(|item| !allowed.contains(item)) {
                let message = format!("`{}` is not one of {}", bad, allowed.join(", "));
                self.invalid(binding, origin, secret, message);
                return;
            }
        }

        if let Err(message) = value.set_text(text, append) {
            self.invalid(binding, origin, secret, message);
        }
    }

    /// Flag, then env, then default. Empty text counts as absent unless the
    /// field is required.
    fn resolve(
        &mut self,
        sources: &Sources,
        value: &mut dyn FieldValue,
        flag: &str,
        env_var: &str,
        options: &FieldOptions,
        allowed: &[String],
    ) {
        let required = options.is_required();
        let secret = options.secret;
        let present = |text: &&String| required || !text.is_empty();

        let occurrences: Vec<&String> = sources
            .flag(flag)
            .unwrap_or_default()
            .iter()
            .filter(present)
            .collect();
        if !occurrences.is_empty() {
            let origin = format!("flag --{}", flag);
            for (i, text) in occurrences.into_iter().enumerate() {
                self.set(value, flag, &origin, text, i > 0, secret, allowed);
            }
            return;
        }

        if let Some(text) = sources.env().get(env_var) {
            if required || !text.is_empty() {
                let origin = format!("${}", env_var);
                self.set(value, flag, &origin, text, false, secret, allowed);
                return;
            }
        }

        if let Some(default) = &options.default {
            self.set(value, flag, "default", default, false, secret, allowed);
            return;
        }

        if required {
            self.errors.push(BindingError::MissingRequiredValue {
                binding: flag.to_string(),
                env_var: env_var.to_string(),
            });
        }
    }
}

impl<'a, 's> Walker<'a> for Binder<'s> {
    fn field(&mut self, name: &str, value: &'a mut dyn FieldValue, options: FieldOptions) {
        if options.skip {
            return;
        }

        let field_name = options.rename.clone().unwrap_or_else(|| name.to_string());
        let flag = naming::flag_name(&self.path, &field_name);
        let env_var = naming::env_var_name(&self.app, &self.path, &field_name);

        let allowed = if options.allowed.is_empty() {
            value.allowed_values()
        } else {
            options.allowed.clone()
        };

        let default_text = options
            .default
            .clone()
            .unwrap_or_else(|| value.to_text());

        if let Mode::Apply(sources) = self.mode {
            self.resolve(sources, value, &flag, &env_var, &options, &allowed);
        }

        let shown = |text: String| -> String {
            if options.secret {
                value.security_text().unwrap_or_else(|| mask(&text))
            } else {
                text
            }
        };

        let binding = Binding {
            alias: options.alias,
            env_var,
            default_text: shown(default_text),
            required: options.is_required(),
            secret: options.secret,
            exposed_port_name: options.expose.clone(),
            allowed_values: allowed,
            description: self.description(options.description.as_deref()),
            type_name: value.type_name(),
            list: value.is_list(),
            switch: value.is_switch(),
            value: shown(value.to_text()),
            name: flag,
        };

        self.out.bindings.push(binding);
    }

    fn arg(&mut self, name: &str, value: &'a mut dyn FieldValue) {
        let arg_name = naming::arg_name(&self.path, name);
        let variadic = value.is_list();

        if let Mode::Apply(sources) = self.mode {
            let rest = sources.args().get(self.next_arg..).unwrap_or_default();
            if variadic {
                for text in rest {
                    if let Err(message) = value.push_item(text) {
                        self.errors.push(BindingError::InvalidValue {
                            binding: arg_name.clone(),
                            origin: "argument".to_string(),
                            message,
                        });
                    }
                }
                self.next_arg += rest.len();
            } else if let Some(text) = rest.first() {
                if let Err(message) = value.set_text(text, false) {
                    self.errors.push(BindingError::InvalidValue {
                        binding: arg_name.clone(),
                        origin: "argument".to_string(),
                        message,
                    });
                }
                self.next_arg += 1;
            } else {
                self.errors.push(BindingError::MissingArgument {
                    name: arg_name.clone(),
                });
            }
        }

        self.out.args.push(ArgSpec {
            name: arg_name,
            variadic,
            type_name: value.type_name(),
        });
    }

    fn nested(&mut self, name: &str, child: &'a mut dyn Component) {
        self.path.push(name.to_string());
        self.visit(child);
        self.path.pop();
    }

    fn embed(&mut self, child: &'a mut dyn Component) {
        self.visit(child);
    }
}
