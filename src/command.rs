use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A shell-like command line, tokenized once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    raw: String,
    argv: Vec<String>,
}

impl CommandSpec {
    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }
}

impl FromStr for CommandSpec {
    type Err = Error;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let parse_error = |reason: &'static str| Error::CommandParse {
            spec: spec.to_owned(),
            reason,
        };
        let argv = shlex::split(spec).ok_or_else(|| parse_error("unbalanced quotes or escape"))?;
        if argv.is_empty() {
            return Err(parse_error("no program given"));
        }
        Ok(Self {
            raw: spec.to_owned(),
            argv,
        })
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
