//! External Command Description
//!
//! An `ExternalCommand` is an executable path plus its ordered argument list.
//! It is a plain description - nothing is spawned until a `ProcessMonitor`
//! executes it. Once built it is not mutated; the step that constructed it
//! owns it exclusively.

use std::fmt;
use std::path::{Path, PathBuf};

/// An executable path with an ordered argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalCommand {
    /// Create a command for the given executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments in order.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The executable path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The argument list, in declaration order.
    pub fn arg_list(&self) -> &[String] {
        &self.args
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}
