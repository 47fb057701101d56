// src/exec/command.rs

//! Structured command lines.
//!
//! Commands are assembled as program + argument vector and only turned into
//! text when written to a DAG file or printed for `--dryrun`.

use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandLine {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(&mut self, arg: impl Into<String>) -> &mut Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(&mut self, args: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// `<name> <value>` as two words.
    pub fn opt(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.args.push(name.to_string());
        self.args.push(value.to_string());
        self
    }

    /// `<name>=<value>` as one word.
    pub fn opt_eq(&mut self, name: &str, value: impl fmt::Display) -> &mut Self {
        self.args.push(format!("{name}={value}"));
        self
    }

    pub fn opt_if(&mut self, name: &str, value: Option<impl fmt::Display>) -> &mut Self {
        if let Some(value) = value {
            self.opt(name, value);
        }
        self
    }

    pub fn current_dir(&mut self, dir: impl AsRef<Path>) -> &mut Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Remove every `<name> <value>` pair.
    pub fn remove_opt(&mut self, name: &str) -> &mut Self {
        let mut iter = std::mem::take(&mut self.args).into_iter();
        while let Some(arg) = iter.next() {
            if arg == name {
                iter.next();
                continue;
            }
            self.args.push(arg);
        }
        self
    }

    /// Remove every argument starting with `prefix`.
    pub fn remove_prefixed(&mut self, prefix: &str) -> &mut Self {
        self.args.retain(|a| !a.starts_with(prefix));
        self
    }

    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    /// Program followed by arguments.
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }

    /// Arguments only, shell-quoted where needed.
    pub fn render_args(&self) -> String {
        self.args
            .iter()
            .map(|a| quote(a))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&quote(&self.program))?;
        if !self.args.is_empty() {
            write!(f, " {}", self.render_args())?;
        }
        Ok(())
    }
}

fn quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@%+$".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}
