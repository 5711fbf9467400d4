//! Trace schema validation for contract tests and offline audits.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::{EventError, FileValidationError, LineError};
use crate::types::{
    AuthzEvent, EVENT_TYPE_AUTHZ_CHECK, EVENT_TYPE_AUTHZ_ERROR, Outcome, SCHEMA_V1_0,
};

/// Validates [`AuthzEvent`]s against the versioned schema.
#[derive(Debug, Clone)]
pub struct TraceValidator {
    supported_schema_versions: HashSet<String>,
}

impl Default for TraceValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceValidator {
    /// Validator accepting schema version `1.0` only.
    #[must_use]
    pub fn new() -> Self {
        Self {
            supported_schema_versions: HashSet::from([SCHEMA_V1_0.to_owned()]),
        }
    }

    /// Accept an additional schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.supported_schema_versions.insert(version.into());
        self
    }

    #[must_use]
    pub fn supports(&self, version: &str) -> bool {
        self.supported_schema_versions.contains(version)
    }

    /// Check one event.
    ///
    /// # Errors
    ///
    /// The first [`EventError`] found: envelope fields are checked before
    /// the fields required by the event type.
    pub fn validate_event(&self, event: &AuthzEvent) -> Result<(), EventError> {
        if event.schema_version.is_empty() {
            return Err(EventError::MissingSchemaVersion);
        }
        if !self.supports(&event.schema_version) {
            return Err(EventError::UnsupportedSchemaVersion(
                event.schema_version.clone(),
            ));
        }
        if event.event_type.is_empty() {
            return Err(EventError::MissingEventType);
        }
        if event.timestamp.is_empty() {
            return Err(EventError::MissingTimestamp);
        }

        match event.event_type.as_str() {
            EVENT_TYPE_AUTHZ_CHECK => validate_check(event),
            EVENT_TYPE_AUTHZ_ERROR => validate_error(event),
            other => Err(EventError::UnknownEventType(other.to_owned())),
        }
    }

    /// Validate a JSONL trace file, transparently decompressing `*.gz`.
    /// Every member of a multi-member gzip file is read.
    ///
    /// # Errors
    ///
    /// - [`FileValidationError::Open`] if the file cannot be opened
    /// - [`FileValidationError::Read`] if reading or decompression fails
    /// - [`FileValidationError::Line`] for the first invalid line
    pub fn validate_file(&self, path: impl AsRef<Path>) -> Result<(), FileValidationError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| FileValidationError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let reader: Box<dyn Read> = if is_gzip_path(path) {
            Box::new(MultiGzDecoder::new(file))
        } else {
            Box::new(file)
        };

        self.validate_reader(BufReader::new(reader))
    }

    /// Validate a JSONL stream line by line. Blank lines are skipped but
    /// still counted.
    ///
    /// # Errors
    ///
    /// - [`FileValidationError::Read`] if the stream cannot be read
    /// - [`FileValidationError::Line`] for the first invalid line, including
    ///   lines that are not valid UTF-8
    pub fn validate_reader(&self, mut reader: impl BufRead) -> Result<(), FileValidationError> {
        let mut line_num = 0;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let read = reader
                .read_until(b'\n', &mut buf)
                .map_err(|source| FileValidationError::Read {
                    line: line_num,
                    source,
                })?;
            if read == 0 {
                return Ok(());
            }
            line_num += 1;

            let line = buf.trim_ascii();
            if line.is_empty() {
                continue;
            }

            self.validate_line(line)
                .map_err(|source| FileValidationError::Line {
                    line: line_num,
                    source,
                })?;
        }
    }

    fn validate_line(&self, line: &[u8]) -> Result<(), LineError> {
        let event: AuthzEvent = serde_json::from_slice(line)?;
        self.validate_event(&event)?;
        Ok(())
    }
}

fn validate_check(event: &AuthzEvent) -> Result<(), EventError> {
    require(
        event.actor.as_ref().map(|a| a.principal.as_str()),
        "actor.principal",
    )?;
    require(
        event.target.as_ref().map(|t| t.resource.as_str()),
        "target.resource",
    )?;
    require(
        event.action.as_ref().map(|a| a.permission.as_str()),
        "action.permission",
    )?;
    let outcome = require(
        event.decision.as_ref().map(|d| d.outcome.as_str()),
        "decision.outcome",
    )?;

    if Outcome::parse(outcome).is_none() {
        return Err(EventError::InvalidOutcome(outcome.to_owned()));
    }
    Ok(())
}

fn validate_error(event: &AuthzEvent) -> Result<(), EventError> {
    let Some(error) = event.error.as_ref() else {
        return Err(EventError::MissingField("error"));
    };
    require(Some(error.kind.as_str()), "error.kind")?;
    require(Some(error.message.as_str()), "error.message")?;
    Ok(())
}

fn require<'a>(value: Option<&'a str>, field: &'static str) -> Result<&'a str, EventError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(EventError::MissingField(field)),
    }
}

fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "gz")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::types::{Action, Actor, AuthzError, Decision, Target};

    fn check_event() -> AuthzEvent {
        AuthzEvent {
            schema_version: SCHEMA_V1_0.to_owned(),
            event_type: EVENT_TYPE_AUTHZ_CHECK.to_owned(),
            timestamp: "2026-01-27T18:03:12.483Z".to_owned(),
            actor: Some(Actor::new(
                "serviceAccount:ci@test-project.iam.gserviceaccount.com",
            )),
            target: Some(Target::new("projects/test-project/secrets/prod-db-password")),
            action: Some(Action::new("secretmanager.versions.access")),
            decision: Some(Decision::new(Outcome::Allow)),
            ..AuthzEvent::default()
        }
    }

    fn error_event() -> AuthzEvent {
        AuthzEvent {
            schema_version: SCHEMA_V1_0.to_owned(),
            event_type: EVENT_TYPE_AUTHZ_ERROR.to_owned(),
            timestamp: "2026-01-27T18:03:12.490Z".to_owned(),
            error: Some(AuthzError::new("iam_unreachable", "connection refused", true)),
            ..AuthzEvent::default()
        }
    }

    #[test]
    fn accepts_minimal_check_event() {
        assert_eq!(TraceValidator::new().validate_event(&check_event()), Ok(()));
    }

    #[test]
    fn accepts_minimal_error_event() {
        assert_eq!(TraceValidator::new().validate_event(&error_event()), Ok(()));
    }

    #[test]
    fn rejects_missing_schema_version() {
        let mut ev = check_event();
        ev.schema_version.clear();
        assert_eq!(
            TraceValidator::new().validate_event(&ev),
            Err(EventError::MissingSchemaVersion)
        );
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        let mut ev = check_event();
        ev.schema_version = "2.0".to_owned();
        assert_eq!(
            TraceValidator::new().validate_event(&ev),
            Err(EventError::UnsupportedSchemaVersion("2.0".to_owned()))
        );
        assert_eq!(
            TraceValidator::new()
                .with_schema_version("2.0")
                .validate_event(&ev),
            Ok(())
        );
    }

    #[test]
    fn rejects_invalid_outcome() {
        let mut ev = check_event();
        ev.decision = Some(Decision {
            outcome: "INVALID".to_owned(),
            ..Decision::default()
        });
        assert_eq!(
            TraceValidator::new().validate_event(&ev),
            Err(EventError::InvalidOutcome("INVALID".to_owned()))
        );
    }

    #[test]
    fn rejects_unknown_event_type() {
        let mut ev = check_event();
        ev.event_type = "authz_audit".to_owned();
        assert_eq!(
            TraceValidator::new().validate_event(&ev),
            Err(EventError::UnknownEventType("authz_audit".to_owned()))
        );
    }

    #[test]
    fn rejects_missing_envelope_fields() {
        let validator = TraceValidator::new();

        let mut ev = check_event();
        ev.event_type.clear();
        assert_eq!(validator.validate_event(&ev), Err(EventError::MissingEventType));

        let mut ev = check_event();
        ev.timestamp.clear();
        assert_eq!(validator.validate_event(&ev), Err(EventError::MissingTimestamp));
    }

    #[test]
    fn check_event_requires_each_field() {
        let validator = TraceValidator::new();

        let mut ev = check_event();
        ev.actor = Some(Actor::new("   "));
        assert_eq!(
            validator.validate_event(&ev),
            Err(EventError::MissingField("actor.principal"))
        );

        let mut ev = check_event();
        ev.target = None;
        assert_eq!(
            validator.validate_event(&ev),
            Err(EventError::MissingField("target.resource"))
        );

        let mut ev = check_event();
        ev.action = Some(Action::default());
        assert_eq!(
            validator.validate_event(&ev),
            Err(EventError::MissingField("action.permission"))
        );

        let mut ev = check_event();
        ev.decision = None;
        assert_eq!(
            validator.validate_event(&ev),
            Err(EventError::MissingField("decision.outcome"))
        );
    }

    #[test]
    fn error_event_requires_kind_and_message() {
        let validator = TraceValidator::new();

        let mut ev = error_event();
        ev.error = None;
        assert_eq!(
            validator.validate_event(&ev),
            Err(EventError::MissingField("error"))
        );

        let mut ev = error_event();
        ev.error = Some(AuthzError::new("", "boom", false));
        assert_eq!(
            validator.validate_event(&ev),
            Err(EventError::MissingField("error.kind"))
        );

        let mut ev = error_event();
        ev.error = Some(AuthzError::new("policy_error", " ", false));
        assert_eq!(
            validator.validate_event(&ev),
            Err(EventError::MissingField("error.message"))
        );
    }

    #[test]
    fn error_event_does_not_need_decision() {
        let mut ev = error_event();
        ev.decision = None;
        ev.actor = None;
        assert_eq!(TraceValidator::new().validate_event(&ev), Ok(()));
    }

    #[test]
    fn reader_skips_blank_lines_and_reports_line_numbers() {
        let valid = serde_json::to_string(&check_event()).unwrap();
        let stream = format!("{valid}\n\n   \n{valid}\n{{\"schema_version\":\"1.0\"}}\n");

        let err = TraceValidator::new()
            .validate_reader(stream.as_bytes())
            .unwrap_err();
        assert_eq!(err.line(), Some(5));
        assert!(matches!(
            err,
            FileValidationError::Line {
                source: LineError::Invalid(EventError::MissingEventType),
                ..
            }
        ));
    }

    #[test]
    fn reader_reports_invalid_json() {
        let err = TraceValidator::new()
            .validate_reader("not json\n".as_bytes())
            .unwrap_err();
        assert!(matches!(
            err,
            FileValidationError::Line {
                line: 1,
                source: LineError::InvalidJson(_),
            }
        ));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn reader_reports_invalid_utf8_at_its_own_line() {
        let valid = serde_json::to_string(&check_event()).unwrap();
        let mut stream = format!("{valid}\n").into_bytes();
        stream.extend_from_slice(b"{\"schema_version\":\"1.0\xff\"}\n");
        stream.extend_from_slice(format!("{valid}\n").as_bytes());

        let err = TraceValidator::new()
            .validate_reader(stream.as_slice())
            .unwrap_err();
        assert!(
            matches!(
                err,
                FileValidationError::Line {
                    line: 2,
                    source: LineError::InvalidJson(_),
                }
            ),
            "got {err}"
        );
    }

    #[test]
    fn reader_accepts_crlf_and_missing_final_newline() {
        let valid = serde_json::to_string(&check_event()).unwrap();
        let stream = format!("{valid}\r\n{valid}");
        assert!(TraceValidator::new().validate_reader(stream.as_bytes()).is_ok());
    }

    #[test]
    fn supported_versions_can_be_extended() {
        let validator = TraceValidator::new();
        assert!(validator.supports("1.0"));
        assert!(!validator.supports("1.1"));

        let validator = validator.with_schema_version("1.1");
        assert!(validator.supports("1.0"));
        assert!(validator.supports("1.1"));
    }

    #[test]
    fn empty_stream_is_valid() {
        assert!(TraceValidator::new().validate_reader("".as_bytes()).is_ok());
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = TraceValidator::new()
            .validate_file(dir.path().join("absent.jsonl"))
            .unwrap_err();
        assert!(matches!(err, FileValidationError::Open { .. }));
        assert_eq!(err.line(), None);
    }

    #[test]
    fn corrupt_gzip_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.jsonl.gz");
        std::fs::write(&path, b"definitely not gzip").unwrap();

        let err = TraceValidator::new().validate_file(&path).unwrap_err();
        assert!(matches!(err, FileValidationError::Read { .. }), "got {err}");
    }
}
