//! Risk-id header validation (spec.md §4.1, §4.3): `X-RISK-SESSION` is
//! required, `X-RISK-TRACE` is optional; both must be an accepted UUID
//! version.
//!
//! The source accepts "UUID v1 or v4"; per SPEC_FULL.md's Open Question
//! resolution this gateway also accepts v7, since its own internally-minted
//! ids (request ids, session/trace ids) use `Uuid::now_v7()`.

use uuid::Uuid;

use crate::headers::HeaderError;

const ACCEPTED_VERSIONS: [usize; 3] = [1, 4, 7];

fn parse_accepted(raw: &str) -> Result<Uuid, HeaderError> {
    let id = Uuid::parse_str(raw).map_err(|e| HeaderError::RiskId(format!("invalid UUID: {e}")))?;
    let version = id.get_version_num();
    if !ACCEPTED_VERSIONS.contains(&version) {
        return Err(HeaderError::RiskId(format!(
            "UUID version {version} is not accepted (must be one of {ACCEPTED_VERSIONS:?})"
        )));
    }
    Ok(id)
}

pub fn parse_sid(raw: Option<&str>) -> Result<Uuid, HeaderError> {
    let raw = raw.ok_or_else(|| HeaderError::RiskId("X-RISK-SESSION is required".to_string()))?;
    parse_accepted(raw)
}

pub fn parse_tid(raw: Option<&str>) -> Result<Option<Uuid>, HeaderError> {
    raw.map(parse_accepted).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_v4() {
        let id = Uuid::new_v4();
        assert!(parse_accepted(&id.to_string()).is_ok());
    }

    #[test]
    fn accepts_v7() {
        let id = Uuid::now_v7();
        assert!(parse_accepted(&id.to_string()).is_ok());
    }

    #[test]
    fn rejects_v3() {
        // A known version-3 (namespace+MD5) UUID; the `v3` uuid feature is
        // not enabled so this is asserted via a fixed literal instead.
        assert!(parse_accepted("6fa459ea-ee8a-3ca4-894e-db77e160355e").is_err());
    }

    #[test]
    fn sid_required() {
        assert!(parse_sid(None).is_err());
    }

    #[test]
    fn tid_optional() {
        assert_eq!(parse_tid(None).unwrap(), None);
    }
}
