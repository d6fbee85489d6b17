//! Mount validation.
//!
//! # Responsibilities
//! - Check every descriptor on its own (names, module path, prefix syntax)
//! - Check descriptors against each other (duplicate names, overlapping prefixes)
//! - Keep gateway-owned prefixes free
//!
//! All errors are collected so one run reports every broken mount.

use std::collections::BTreeSet;

use thiserror::Error;

use crate::config::schema::MountConfig;
use crate::routing::descriptor::ServiceDescriptor;

/// Prefixes served by the gateway itself.
pub const RESERVED_PREFIXES: &[&str] = &["/gateway", "/health"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("a mount has an empty service_name")]
    EmptyServiceName,

    #[error("service '{service}' has an empty module_path")]
    EmptyModulePath { service: String },

    #[error("service '{service}' sets both include_endpoints and exclude_endpoints")]
    ConflictingSelection { service: String },

    #[error("service '{service}' is declared more than once")]
    DuplicateService { service: String },

    #[error("service '{service}' has invalid url_prefix '{prefix}': {reason}")]
    InvalidPrefix {
        service: String,
        prefix: String,
        reason: &'static str,
    },

    #[error("service '{service}' uses reserved url_prefix '{prefix}'")]
    ReservedPrefix { service: String, prefix: String },

    #[error("services '{first}' and '{second}' have overlapping prefixes '{first_prefix}' and '{second_prefix}'")]
    OverlappingPrefix {
        first: String,
        first_prefix: String,
        second: String,
        second_prefix: String,
    },
}

/// Turn `[[mounts]]` entries into validated descriptors.
pub fn descriptors_from_mounts(mounts: &[MountConfig]) -> Result<Vec<ServiceDescriptor>, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut descriptors = Vec::with_capacity(mounts.len());

    for mount in mounts {
        match ServiceDescriptor::try_from(mount.clone()) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(e) => errors.push(e),
        }
    }

    if let Err(more) = validate_descriptors(&descriptors) {
        errors.extend(more);
    }

    if errors.is_empty() {
        Ok(descriptors)
    } else {
        Err(errors)
    }
}

/// Validate a descriptor list.
pub fn validate_descriptors(descriptors: &[ServiceDescriptor]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen: BTreeSet<&str> = BTreeSet::new();
    let mut prefixes: Vec<(&str, &str)> = Vec::new();

    for descriptor in descriptors {
        let service = descriptor.service_name();

        if service.trim().is_empty() {
            errors.push(ValidationError::EmptyServiceName);
        } else if !seen.insert(service) {
            errors.push(ValidationError::DuplicateService {
                service: service.to_string(),
            });
        }

        if descriptor.module_path().trim().is_empty() {
            errors.push(ValidationError::EmptyModulePath {
                service: service.to_string(),
            });
        }

        let prefix = descriptor.url_prefix();
        if let Err(reason) = check_prefix_syntax(prefix) {
            errors.push(ValidationError::InvalidPrefix {
                service: service.to_string(),
                prefix: prefix.to_string(),
                reason,
            });
            continue;
        }

        if RESERVED_PREFIXES.iter().any(|reserved| overlaps(prefix, reserved)) {
            errors.push(ValidationError::ReservedPrefix {
                service: service.to_string(),
                prefix: prefix.to_string(),
            });
            continue;
        }

        if let Some((first, first_prefix)) = prefixes.iter().find(|(_, other)| overlaps(prefix, other)) {
            errors.push(ValidationError::OverlappingPrefix {
                first: first.to_string(),
                first_prefix: first_prefix.to_string(),
                second: service.to_string(),
                second_prefix: prefix.to_string(),
            });
            continue;
        }
        prefixes.push((service, prefix));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_prefix_syntax(prefix: &str) -> Result<(), &'static str> {
    if !prefix.starts_with('/') {
        return Err("must start with '/'");
    }
    if prefix == "/" {
        return Err("cannot mount at the root");
    }
    if prefix.ends_with('/') {
        return Err("must not end with '/'");
    }
    for segment in prefix[1..].split('/') {
        if segment.is_empty() {
            return Err("contains an empty segment");
        }
        if segment.starts_with(':') || segment.contains(['{', '}', '*']) {
            return Err("must be a static path");
        }
    }
    Ok(())
}

/// True when one prefix equals the other or sits below it.
fn overlaps(a: &str, b: &str) -> bool {
    let below = |inner: &str, outer: &str| inner.strip_prefix(outer).is_some_and(|rest| rest.starts_with('/'));
    a == b || below(a, b) || below(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::filter::EndpointSelection;

    fn descriptor(name: &str, prefix: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, format!("{name}.toml")).with_prefix(prefix)
    }

    #[test]
    fn test_valid_descriptors() {
        let descriptors = vec![
            descriptor("users", "/users"),
            descriptor("products", "/products"),
            descriptor("auth", "/auth").with_selection(EndpointSelection::include(["/login"])),
        ];
        assert!(validate_descriptors(&descriptors).is_ok());
    }

    #[test]
    fn test_duplicate_names_and_prefixes() {
        let descriptors = vec![
            descriptor("users", "/users"),
            descriptor("users", "/people"),
            descriptor("clients", "/users"),
        ];
        let errors = validate_descriptors(&descriptors).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(matches!(&errors[0], ValidationError::DuplicateService { service } if service == "users"));
        assert!(matches!(&errors[1], ValidationError::OverlappingPrefix { second, .. } if second == "clients"));
    }

    #[test]
    fn test_nested_prefixes_overlap() {
        let errors = validate_descriptors(&[descriptor("api", "/api"), descriptor("v1", "/api/v1")]).unwrap_err();
        assert!(matches!(errors[0], ValidationError::OverlappingPrefix { .. }));
        // Shared leading characters are not nesting.
        assert!(validate_descriptors(&[descriptor("api", "/api"), descriptor("apis", "/apis")]).is_ok());
    }

    #[test]
    fn test_reserved_prefixes() {
        for prefix in ["/gateway", "/gateway/extra", "/health"] {
            let errors = validate_descriptors(&[descriptor("svc", prefix)]).unwrap_err();
            assert!(matches!(errors[0], ValidationError::ReservedPrefix { .. }), "{prefix}");
        }
        assert!(validate_descriptors(&[descriptor("svc", "/healthcare")]).is_ok());
    }

    #[test]
    fn test_prefix_syntax() {
        for prefix in ["users", "/", "/users/", "/a//b", "/{id}", "/:id", "/files/*"] {
            let errors = validate_descriptors(&[descriptor("svc", prefix)]).unwrap_err();
            assert!(matches!(errors[0], ValidationError::InvalidPrefix { .. }), "{prefix}");
        }
    }

    #[test]
    fn test_all_errors_reported() {
        let mut conflicting = MountConfig::new("a", "a.toml");
        conflicting.include_endpoints = Some(["/x".to_string()].into());
        conflicting.exclude_endpoints = Some(["/y".to_string()].into());
        let empty_path = MountConfig::new("b", "");
        let mut reserved = MountConfig::new("c", "c.toml");
        reserved.url_prefix = Some("/health".into());

        let errors = descriptors_from_mounts(&[conflicting, empty_path, reserved]).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[0], ValidationError::ConflictingSelection { .. }));
        assert!(matches!(errors[1], ValidationError::EmptyModulePath { .. }));
        assert!(matches!(errors[2], ValidationError::ReservedPrefix { .. }));
    }

    #[test]
    fn test_descriptors_from_mounts() {
        let descriptors = descriptors_from_mounts(&[MountConfig::new("users", "users.toml")]).unwrap();
        assert_eq!(descriptors[0].url_prefix(), "/users");
    }
}
