//! Availability resolution and cluster/route key derivation.
//!
//! A databag and each of its backends carry independent availability tag
//! sets. Both reduce to one of the suffixes `in`, `ex`, `ie`; the final
//! key encodes the more specific of the two, and two different specific
//! suffixes are a hard conflict.

use super::Availability;
use crate::errors::{Error, Result};

/// Reduce a tag set to a single availability value.
///
/// Empty means unrestricted; the union of both tags is likewise `Both`.
fn reduce_tags(tags: &[String]) -> Result<Availability> {
    if tags.is_empty() {
        return Ok(Availability::Both);
    }
    if tags.len() > 2 {
        return Err(Error::validation("invalid element in availability array"));
    }

    let mut mask = 0u8;
    for tag in tags {
        match tag.as_str() {
            "internal" => mask |= Availability::Internal as u8,
            "external" => mask |= Availability::External as u8,
            _ => return Err(Error::validation("invalid element in availability array")),
        }
    }

    match mask {
        0b01 => Ok(Availability::Internal),
        0b10 => Ok(Availability::External),
        _ => Ok(Availability::Both),
    }
}

/// Resolve the availability the combination of bag and backend permits.
///
/// Equal reductions win outright; an unrestricted side yields to the
/// specific one; two different specific sides cannot be satisfied.
pub(super) fn resolve_availability(
    bag_tags: &[String],
    backend_tags: &[String],
) -> Result<Availability> {
    let bag = reduce_tags(bag_tags)?;
    let backend = reduce_tags(backend_tags)?;

    if bag == backend {
        Ok(bag)
    } else if bag == Availability::Both {
        Ok(backend)
    } else if backend == Availability::Both {
        Ok(bag)
    } else {
        Err(Error::validation("bag and backend have conflicting availabilities"))
    }
}

/// Derive the cluster/route key for a backend.
///
/// The key is `base-suffix`, or the bare suffix when the base name is
/// empty. The suffix is the single encoding of availability on the key;
/// [`Availability::from_key`] recovers it at registration time.
pub fn resolve_name(bag_tags: &[String], backend_tags: &[String], base: &str) -> Result<String> {
    let availability = resolve_availability(bag_tags, backend_tags)?;
    let suffix = availability.suffix();
    if base.is_empty() {
        Ok(suffix.to_string())
    } else {
        Ok(format!("{base}-{suffix}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_empty_tags_reduce_to_both() {
        assert_eq!(resolve_name(&[], &[], "svc").unwrap(), "svc-ie");
    }

    #[test]
    fn test_both_tags_reduce_to_both() {
        let both = tags(&["internal", "external"]);
        assert_eq!(resolve_name(&both, &[], "svc").unwrap(), "svc-ie");
    }

    #[test]
    fn test_specific_side_wins_over_unrestricted() {
        let internal = tags(&["internal"]);
        assert_eq!(resolve_name(&internal, &[], "svc").unwrap(), "svc-in");
        assert_eq!(resolve_name(&[], &internal, "svc").unwrap(), "svc-in");

        let external = tags(&["external"]);
        assert_eq!(resolve_name(&[], &external, "svc").unwrap(), "svc-ex");
    }

    #[test]
    fn test_resolution_is_symmetric() {
        let internal = tags(&["internal"]);
        let both = tags(&["internal", "external"]);
        assert_eq!(
            resolve_name(&internal, &both, "svc").unwrap(),
            resolve_name(&both, &internal, "svc").unwrap(),
        );
    }

    #[test]
    fn test_conflicting_specific_sides_error() {
        let internal = tags(&["internal"]);
        let external = tags(&["external"]);
        let err = resolve_name(&internal, &external, "svc").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: bag and backend have conflicting availabilities");
    }

    #[test]
    fn test_invalid_tag_errors() {
        let bad = tags(&["gcp-external"]);
        let err = resolve_name(&bad, &[], "svc").unwrap_err();
        assert_eq!(err.to_string(), "Validation error: invalid element in availability array");
    }

    #[test]
    fn test_more_than_two_tags_errors() {
        let bad = tags(&["internal", "external", "internal"]);
        assert!(resolve_name(&bad, &[], "svc").is_err());
    }

    #[test]
    fn test_empty_base_yields_bare_suffix() {
        assert_eq!(resolve_name(&tags(&["internal"]), &[], "").unwrap(), "in");
    }

    #[test]
    fn test_duplicate_single_tag_stays_specific() {
        let doubled = tags(&["internal", "internal"]);
        assert_eq!(resolve_name(&doubled, &[], "svc").unwrap(), "svc-in");
    }
}
