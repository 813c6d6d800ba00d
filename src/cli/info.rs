//! Application and command identity published into the context.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::component::Component;
use crate::context::{Context, ContextInjector};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

impl fmt::Display for AppInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// The command being executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Info {
    pub app: AppInfo,
    pub name: String,
    pub desc: String,
}

impl Info {
    pub fn from_context(ctx: &Context) -> Option<Arc<Info>> {
        ctx.value::<Info>()
    }
}

impl ContextInjector for Info {
    fn inject_context(&self, ctx: Context) -> Context {
        ctx.with_value(self.clone())
    }
}

impl Component for Info {
    fn as_injector(&self) -> Option<Arc<dyn ContextInjector>> {
        Some(Arc::new(self.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_round_trips_through_context() {
        let info = Info {
            app: AppInfo {
                name: "app".into(),
                version: "1.0.0".into(),
            },
            name: "serve".into(),
            desc: "Run the server".into(),
        };

        assert!(Info::from_context(&Context::background()).is_none());

        let ctx = info.inject_context(Context::background());
        let found = Info::from_context(&ctx).unwrap();
        assert_eq!(*found, info);
        assert_eq!(found.app.to_string(), "app@1.0.0");
    }
}
