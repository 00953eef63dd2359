use std::fmt::{Debug, Write};
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Serialize};
use strum_macros::IntoStaticStr;

/// Bad YAML, unknown `type`, unresolved id reference, contradictory fields.
/// Reported before any device is touched.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("failed to parse storage configuration")]
    Yaml,
    #[error("unsupported storage config version {0}, expected 1 or 2")]
    UnsupportedVersion(u32),
    #[error("unknown action type '{0}'")]
    UnknownType(String),
    #[error("duplicate entry id '{0}'")]
    DuplicateId(String),
    #[error("entry '{referrer}' references unknown id '{target}'")]
    UnresolvedReference { referrer: String, target: String },
    #[error("invalid size string '{0}'")]
    InvalidSize(String),
    #[error("entry '{id}' is missing required field '{field}'")]
    MissingField { id: String, field: &'static str },
    #[error("entry '{id}' has contradictory fields: {detail}")]
    ContradictoryFields { id: String, detail: String },
    #[error("action graph contains a cycle involving entry '{0}'")]
    CyclicGraph(String),
    #[error("entry '{id}' has unknown field '{field}' for type '{kind}'")]
    UnknownField {
        id: String,
        kind: &'static str,
        field: String,
    },
}

/// Disk identity could not be resolved, or an iSCSI connect attempt failed.
/// Fatal at the point of first reference.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no disk with serial '{0}' found")]
    SerialNotFound(String),
    #[error("no disk with wwn '{0}' found")]
    WwnNotFound(String),
    #[error("no disk at path '{0}' found")]
    PathNotFound(String),
    #[error("no disk for multipath member/wwid '{0}' found")]
    MultipathNotFound(String),
    #[error("no disk behind nvme controller '{0}' found")]
    NvmeControllerNotFound(String),
    #[error("failed to connect iSCSI target '{target}'")]
    IscsiConnectFailed { target: String },
    #[error("failed to probe block topology")]
    Tool,
}

/// A holder-teardown step failed: the external tool returned non-zero, or a
/// node failed to reach `Gone` after the retry budget.
#[derive(Debug, thiserror::Error)]
pub enum HoldersError {
    #[error("device '{0}' could not be quiesced after the retry budget was exhausted")]
    QuiesceRetriesExhausted(String),
    #[error("device '{0}' still has holders after teardown")]
    NotClear(String),
    #[error("failed to tear down holder '{0}'")]
    TeardownFailed(String),
    #[error("disk '{target}' partially overlaps the set of disks already in use")]
    PartialOverlap { target: String },
}

/// `parted`/`mkfs`/`mdadm`/etc. invocation failed while materializing an
/// action.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("failed to execute action '{id}' of type '{kind}'")]
    ActionFailed { id: String, kind: &'static str },
    #[error("partition layout for disk '{0}' does not fit on the device")]
    PartitionLayoutOverflow(String),
    #[error("resize of '{0}' is only valid with preserve: true and a resizable filesystem")]
    UnsupportedResize(String),
    #[error("dm_crypt entry '{0}' must specify exactly one of key or keyfile")]
    CryptKeyAmbiguous(String),
    #[error("timed out waiting for '{tool}' after {seconds}s")]
    ToolTimeout { tool: &'static str, seconds: u64 },
    #[error("failed to acquire host storage lock within the configured timeout")]
    LockTimeout,
}

/// A `preserve: true` entry did not match its declared properties.
#[derive(Debug, thiserror::Error)]
pub enum VerificationError {
    #[error("entry '{id}' field '{field}' mismatch: expected {expected}, found {found}")]
    FieldMismatch {
        id: String,
        field: &'static str,
        expected: String,
        found: String,
    },
    #[error("preserved entry '{0}' does not exist on disk")]
    TargetMissing(String),
}

/// The process environment was misconfigured: a required variable is
/// missing, or the host lock is contended.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("required environment variable '{0}' is not set")]
    MissingVariable(&'static str),
    #[error("failed to acquire storage lock at '{0}'")]
    LockContended(&'static str),
    #[error("target mount point '{0}' does not exist or is not a directory")]
    InvalidTargetMountPoint(String),
}

/// Each variant corresponds to one of the error-taxonomy categories; the
/// mapping to process exit codes is fixed by the category alone.
#[derive(Debug, thiserror::Error, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Holders(#[from] HoldersError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Environment(#[from] EnvironmentError),
}

impl ErrorKind {
    /// Process exit code for this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorKind::Schema(_) => 2,
            ErrorKind::Probe(_) => 3,
            ErrorKind::Holders(_) => 3,
            ErrorKind::Execution(_) => 3,
            ErrorKind::Verification(_) => 4,
            ErrorKind::Environment(_) => 2,
        }
    }
}

#[derive(Debug)]
struct CurtinErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct CurtinError(Box<CurtinErrorInner>);

impl CurtinError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        CurtinError(Box::new(CurtinErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    pub fn exit_code(&self) -> i32 {
        self.0.kind.exit_code()
    }

    #[track_caller]
    pub fn secondary_error_context(mut self, secondary: CurtinError) -> Self {
        self.0.context.push((
            format!(
                "while handling the error, an additional error was caught:\n\n{secondary:?}\n\nthe earlier error:"
            )
            .into(),
            Location::caller(),
        ));
        self
    }

    pub fn unstructured(self, context: impl Into<Cow<'static, str>>) -> anyhow::Error {
        match self.0.source {
            Some(source) => source.context(self.0.kind).context(context.into()),
            None => anyhow::Error::from(self.0.kind).context(context.into()),
        }
    }
}

/// Lifts an `Option`/fallible `Result` into a [`CurtinError`] carrying the
/// given [`ErrorKind`].
pub trait ReportError<T, K> {
    fn structured(self, kind: K) -> Result<T, CurtinError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, CurtinError> {
        match self {
            Some(t) => Ok(t),
            None => Err(CurtinError(Box::new(CurtinErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: None,
                context: Vec::new(),
            }))),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, CurtinError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(CurtinError(Box::new(CurtinErrorInner {
                kind: kind.into(),
                location: Location::caller(),
                source: Some(e.into()),
                context: Vec::new(),
            }))),
        }
    }
}

pub trait CurtinResultExt<T> {
    /// Attach a context message to the error, pushed onto its context stack.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, CurtinError>;

    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error>;
}

impl<T> CurtinResultExt<T> for Result<T, CurtinError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, CurtinError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }

    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error> {
        self.map_err(|e| e.unstructured(context))
    }
}

impl Serialize for CurtinError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("curtin-error", 4)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field("exit-code", &self.0.kind.exit_code())?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{:?}", e)))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Debug for CurtinError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{: >5}: ", i)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{: >5}: ", index)?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Context;

    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            ErrorKind::Schema(SchemaError::UnsupportedVersion(3)).exit_code(),
            2
        );
        assert_eq!(
            ErrorKind::Holders(HoldersError::NotClear("sda1".into())).exit_code(),
            3
        );
        assert_eq!(
            ErrorKind::Verification(VerificationError::TargetMissing("sda1".into())).exit_code(),
            4
        );
    }

    #[test]
    fn test_error_debug_chain() {
        let error = Err::<(), _>(anyhow::anyhow!("z"))
            .context("x\ny")
            .structured(ExecutionError::ActionFailed {
                id: "root-fs".into(),
                kind: "format",
            })
            .unwrap_err();
        assert_eq!(
            format!("{:?}", error),
            format!(
                "failed to execute action 'root-fs' of type 'format' at {}:{}\n\nCaused by:\n    0: x\n       y\n    1: z\n",
                error.0.location.file(),
                error.0.location.line(),
            ),
        );
    }

    #[test]
    fn test_error_serialize() {
        let error = CurtinError::new(HoldersError::NotClear("sda1".into()));
        let value = serde_json::to_value(&error).unwrap();
        assert_eq!(value["category"], "holders");
        assert_eq!(value["exit-code"], 3);
    }
}
