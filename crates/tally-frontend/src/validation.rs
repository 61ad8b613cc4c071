// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pluggable validation of incoming job requests.
//!
//! Every validator runs and their messages are concatenated, so one rule
//! cannot mask another.

use tally_core::RequestInfo;

/// A single validation rule over an incoming request.
pub trait RequestInfoValidator: Send + Sync {
    /// Returns a human-readable error message when the request is invalid.
    fn validate(&self, request: &RequestInfo) -> Option<String>;
}

/// Run every validator and join the failures into one message.
pub fn run_validators(
    validators: &[Box<dyn RequestInfoValidator>],
    request: &RequestInfo,
) -> Option<String> {
    let messages: Vec<String> = validators
        .iter()
        .filter_map(|validator| validator.validate(request))
        .collect();
    if messages.is_empty() {
        None
    } else {
        Some(messages.join("\n"))
    }
}

// ASCII punctuation except |, which is reserved as a key separator.
const ALLOWED_PUNCTUATION: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{}~";

/// Validates that the job_request_id only contains allowed characters:
/// ascii letters, ascii digits, and ascii punctuation except `|`.
pub struct JobRequestIdCharactersValidator;

impl RequestInfoValidator for JobRequestIdCharactersValidator {
    fn validate(&self, request: &RequestInfo) -> Option<String> {
        let illegal: String = request
            .job_request_id
            .chars()
            .filter(|c| !c.is_ascii_alphanumeric() && !ALLOWED_PUNCTUATION.contains(*c))
            .collect();
        if illegal.is_empty() {
            return None;
        }
        Some(format!(
            "job_request_id contained illegal characters. Can only contain ascii letters, \
             ascii digits, or the following punctuation characters: {ALLOWED_PUNCTUATION}. \
             Illegal characters were: {illegal}"
        ))
    }
}

/// Longest accepted job_request_id.
pub const MAX_JOB_REQUEST_ID_LENGTH: usize = 128;

/// Validates that the job_request_id is at most
/// [`MAX_JOB_REQUEST_ID_LENGTH`] characters.
pub struct JobRequestIdLengthValidator;

impl RequestInfoValidator for JobRequestIdLengthValidator {
    fn validate(&self, request: &RequestInfo) -> Option<String> {
        let length = request.job_request_id.chars().count();
        if length <= MAX_JOB_REQUEST_ID_LENGTH {
            return None;
        }
        Some(format!(
            "job_request_id must be at most {MAX_JOB_REQUEST_ID_LENGTH} characters, got {length}"
        ))
    }
}

/// The validator set applied by default to every deployment.
pub fn default_validators() -> Vec<Box<dyn RequestInfoValidator>> {
    vec![
        Box::new(JobRequestIdCharactersValidator),
        Box::new(JobRequestIdLengthValidator),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(id: &str) -> RequestInfo {
        RequestInfo {
            job_request_id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn alphanumeric_and_punctuation_ids_pass() {
        let validator = JobRequestIdCharactersValidator;
        assert!(validator.validate(&request("job-123_ABC.xyz")).is_none());
        assert!(validator.validate(&request("a!b@c#d$e")).is_none());
    }

    #[test]
    fn pipe_and_non_ascii_are_rejected() {
        let validator = JobRequestIdCharactersValidator;
        let message = validator.validate(&request("job|1")).unwrap();
        assert!(message.contains('|'));
        assert!(validator.validate(&request("jöb")).is_some());
    }

    #[test]
    fn length_limit_is_128() {
        let validator = JobRequestIdLengthValidator;
        assert!(validator.validate(&request(&"a".repeat(128))).is_none());
        assert!(validator.validate(&request(&"a".repeat(129))).is_some());
    }

    #[test]
    fn all_failures_are_concatenated() {
        let validators = default_validators();
        let bad_id = format!("{}|", "a".repeat(129));
        let message = run_validators(&validators, &request(&bad_id)).unwrap();
        assert!(message.contains("illegal characters"));
        assert!(message.contains("at most 128"));
        assert_eq!(message.lines().count(), 2);
    }

    #[test]
    fn valid_request_produces_no_message() {
        let validators = default_validators();
        assert!(run_validators(&validators, &request("job-1")).is_none());
    }
}
