//! Command-line front-end.
//!
//! # Responsibilities
//! - Build a `clap` command tree from describe-mode binding metadata
//! - Turn parsed flags and positional arguments into binder [`Sources`]
//! - Execute the chosen command: bind, init, then run or serve
//!
//! # Design Decisions
//! - clap only tokenizes; precedence, defaults and requiredness belong to the
//!   binder so environment variables can satisfy required fields
//! - Every command gets `-c/--list-configuration` and `--dump-bindings`
//! - The command's [`Info`] is registered ahead of the tree so every
//!   component can read it during init

use std::ffi::OsString;
use std::future::Future;
use std::time::Duration;

use clap::{Arg, ArgAction, ArgMatches};
use futures::future::BoxFuture;
use futures::FutureExt;

use crate::cli::info::{AppInfo, Info};
use crate::component::Component;
use crate::config::{Binder, Bindings, EnvVars, Sources};
use crate::context::Context;
use crate::error::Result;
use crate::lifecycle::{Startup, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::observability::Logger;

const LIST_CONFIGURATION: &str = "list-configuration";
const DUMP_BINDINGS: &str = "dump-bindings";

struct CommandEntry<'r> {
    name: String,
    about: String,
    root: &'r mut dyn Component,
}

/// An application made of subcommands, each backed by a component tree.
pub struct App<'r> {
    info: AppInfo,
    commands: Vec<CommandEntry<'r>>,
    logger: Logger,
    shutdown_timeout: Duration,
    termination: Option<BoxFuture<'r, ()>>,
}

impl<'r> App<'r> {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: AppInfo {
                name: name.into(),
                version: version.into(),
            },
            commands: Vec::new(),
            logger: Logger::current(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            termination: None,
        }
    }

    /// Add a subcommand whose configuration and lifecycle come from `root`.
    pub fn command(
        mut self,
        name: impl Into<String>,
        about: impl Into<String>,
        root: &'r mut dyn Component,
    ) -> Self {
        self.commands.push(CommandEntry {
            name: name.into(),
            about: about.into(),
            root,
        });
        self
    }

    pub fn with_logger(mut self, logger: Logger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Replace the OS signal trigger of serving commands.
    pub fn with_termination<F>(mut self, termination: F) -> Self
    where
        F: Future<Output = ()> + Send + 'r,
    {
        self.termination = Some(termination.boxed());
        self
    }

    pub fn info(&self) -> &AppInfo {
        &self.info
    }

    /// Parse `args` (without the program name) and run the selected command.
    pub async fn execute<I, T>(&mut self, args: I, env: EnvVars) -> Result<()>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let mut described = Vec::with_capacity(self.commands.len());
        for entry in self.commands.iter_mut() {
            described.push(Binder::describe(&self.info.name).bind(&mut *entry.root)?);
        }

        let matches = self
            .clap_command(&described)
            .try_get_matches_from(
                std::iter::once(OsString::from(&self.info.name))
                    .chain(args.into_iter().map(Into::into)),
            )?;

        let Some((name, sub_matches)) = matches.subcommand() else {
            return Ok(());
        };
        let Some(index) = self.commands.iter().position(|c| c.name == name) else {
            return Ok(());
        };
        let bindings = &described[index];

        if sub_matches.get_flag(DUMP_BINDINGS) {
            println!("{}", bindings.to_json().map_err(std::io::Error::other)?);
            return Ok(());
        }

        let list_configuration =
            sub_matches.get_flag(LIST_CONFIGURATION) || env.get("ENV") == Some("DEV");
        let sources = sources_from(bindings, sub_matches).with_env(env);

        let entry = &mut self.commands[index];
        let mut info = Info {
            app: self.info.clone(),
            name: entry.name.clone(),
            desc: entry.about.clone(),
        };

        tracing::debug!(app = %self.info, command = %info.name, "Executing command");

        let booted = Startup::new(Binder::apply(&self.info.name, &sources))
            .prepend("info", &mut info)
            .with_logger(self.logger.clone())
            .list_configuration(list_configuration)
            .bootstrap(&mut *entry.root, Context::background())
            .await?;

        let mut lifecycle = booted
            .lifecycle
            .with_shutdown_timeout(self.shutdown_timeout);
        if let Some(termination) = self.termination.take() {
            lifecycle = lifecycle.with_termination(termination);
        }

        lifecycle.run_or_serve(booted.ctx).await
    }

    fn clap_command(&self, described: &[Bindings]) -> clap::Command {
        let mut app = clap::Command::new(self.info.name.clone())
            .version(self.info.version.clone())
            .subcommand_required(true)
            .arg_required_else_help(true);

        for (entry, bindings) in self.commands.iter().zip(described) {
            app = app.subcommand(subcommand(entry, bindings));
        }

        app
    }
}

fn subcommand(entry: &CommandEntry<'_>, bindings: &Bindings) -> clap::Command {
    let mut cmd = clap::Command::new(entry.name.clone()).about(entry.about.clone());

    for binding in bindings.iter() {
        let mut arg = Arg::new(binding.name.clone())
            .long(binding.name.clone())
            .help(binding.usage())
            .action(ArgAction::Append);

        if let Some(alias) = binding.alias {
            arg = arg.short(alias);
        }

        arg = if binding.switch {
            arg.num_args(0..=1)
                .require_equals(true)
                .default_missing_value("true")
        } else {
            arg.num_args(1).value_name(binding.type_name.to_uppercase())
        };

        cmd = cmd.arg(arg);
    }

    for spec in &bindings.args {
        let arg = Arg::new(spec.name.clone())
            .value_name(spec.name.clone())
            .action(ArgAction::Append);
        cmd = cmd.arg(if spec.variadic { arg.num_args(1..) } else { arg });
    }

    cmd.arg(
        Arg::new(LIST_CONFIGURATION)
            .short('c')
            .long(LIST_CONFIGURATION)
            .help("show configuration")
            .action(ArgAction::SetTrue),
    )
    .arg(
        Arg::new(DUMP_BINDINGS)
            .long(DUMP_BINDINGS)
            .help("print binding metadata as JSON and exit")
            .action(ArgAction::SetTrue),
    )
}

fn sources_from(bindings: &Bindings, matches: &ArgMatches) -> Sources {
    let mut sources = Sources::new();

    for binding in bindings.iter() {
        if let Some(values) = matches.get_many::<String>(&binding.name) {
            for value in values {
                sources = sources.with_flag(binding.name.clone(), value.clone());
            }
        }
    }

    let args: Vec<String> = bindings
        .args
        .iter()
        .filter_map(|spec| matches.get_many::<String>(&spec.name))
        .flatten()
        .cloned()
        .collect();

    sources.with_args(args)
}
