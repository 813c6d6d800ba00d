//! Flag, argument and environment variable naming.

use heck::{ToKebabCase, ToShoutySnakeCase};

fn joined(path: &[String], field: &str) -> String {
    path.iter()
        .map(String::as_str)
        .chain(std::iter::once(field))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// `server` + `enable_debug` → `server-enable-debug`.
pub fn flag_name(path: &[String], field: &str) -> String {
    joined(path, field).to_kebab_case()
}

/// `my-app` + `server` + `addr` → `MY_APP_SERVER_ADDR`.
pub fn env_var_name(app: &str, path: &[String], field: &str) -> String {
    let scoped = joined(path, field);
    if app.is_empty() {
        scoped.to_shouty_snake_case()
    } else {
        format!("{}_{}", app, scoped).to_shouty_snake_case()
    }
}

/// Positional argument placeholder, e.g. `INPUT`.
pub fn arg_name(path: &[String], name: &str) -> String {
    joined(path, name).to_shouty_snake_case()
}
