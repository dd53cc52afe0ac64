use std::io;

use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    /// The requested tiling cannot be laid out (only two panes are supported).
    #[error("{0}")]
    Configuration(String),

    #[error("cannot build command from {spec:?}: {reason}")]
    CommandParse { spec: String, reason: &'static str },

    #[error("could not acquire the terminal: {0}")]
    DisplayInit(#[source] io::Error),

    #[error("failed to start `{program}`: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Informational: the child ran to completion but reported failure.
    #[error("`{program}` exited with status {code}")]
    ProcessExit { program: String, code: i32 },

    /// The child was killed by a signal nobody here sent.
    #[error("`{program}` was killed by {}", describe_signal(.signal))]
    ProcessSignaled { program: String, signal: Option<i32> },
}

fn describe_signal(signal: &Option<i32>) -> String {
    match signal {
        Some(signal) => format!("signal {signal}"),
        None => "a signal".to_owned(),
    }
}
