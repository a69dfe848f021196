use std::fmt;

use crate::errors::types::Error;

/// Where an infrastructure error was raised: a stage and, optionally, what it acted on
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub stage: &'static str,
    pub subject: Option<String>,
}

impl ErrorContext {
    pub fn new(stage: &'static str) -> Self {
        Self { stage, subject: None }
    }

    pub fn subject(mut self, subject: impl fmt::Display) -> Self {
        self.subject = Some(subject.to_string());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Some(subject) => write!(f, "{} {}", self.stage, subject),
            None => f.write_str(self.stage),
        }
    }
}

/// Prefix an error with the stage it happened in, keeping its variant
pub trait ErrorExt<T> {
    fn in_context(self, ctx: ErrorContext) -> Result<T, Error>;

    fn in_stage(self, stage: &'static str) -> Result<T, Error>
    where
        Self: Sized,
    {
        self.in_context(ErrorContext::new(stage))
    }
}

impl<T, E: Into<Error>> ErrorExt<T> for Result<T, E> {
    fn in_context(self, ctx: ErrorContext) -> Result<T, Error> {
        self.map_err(|e| match e.into() {
            Error::Config(msg) => Error::Config(format!("{}: {}", ctx, msg)),
            Error::Internal(msg) => Error::Internal(format!("{}: {}", ctx, msg)),
            Error::Io(io) => Error::Io(std::io::Error::new(io.kind(), format!("{}: {}", ctx, io))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_keeps_config_fatal() {
        let result: Result<(), Error> =
            Err(Error::Config("instances must be greater than zero".into()));
        let err = result
            .in_context(ErrorContext::new("loading").subject("monitor.toml"))
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(
            err.to_string(),
            "configuration error: loading monitor.toml: instances must be greater than zero"
        );
    }

    #[test]
    fn test_io_kind_preserved() {
        let result: Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy"));
        match result.in_stage("binding").unwrap_err() {
            Error::Io(io) => assert_eq!(io.kind(), std::io::ErrorKind::AddrInUse),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ok_untouched() {
        let result: Result<u8, Error> = Ok(7);
        assert_eq!(result.in_stage("validating").unwrap(), 7);
    }
}
