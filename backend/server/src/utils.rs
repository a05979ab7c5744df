use std::{
    convert::Infallible,
    net::{IpAddr, SocketAddr},
};

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};
use bson::oid::ObjectId;

use crate::{
    error::AppError,
    models::{IdPayload, SubmitPayload, Submission},
};

pub const X_REAL_IP: &str = "x-real-ip";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";

pub const MISSING_FIELDS: &str = "Missing required fields";
pub const INVALID_ID: &str = "Invalid id";

/// Caller address resolved from proxy headers or the socket peer.
/// `None` when nothing usable was found.
pub struct ClientIp(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());

        Ok(ClientIp(resolve_client_ip(&parts.headers, peer)))
    }
}

/// Picks the first present, non-empty candidate out of `x-real-ip`,
/// `x-forwarded-for` and the peer address, then keeps its first
/// comma-separated token.
pub fn resolve_client_ip(headers: &HeaderMap, peer: Option<IpAddr>) -> Option<String> {
    let candidate = [X_REAL_IP, X_FORWARDED_FOR]
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|value| value.to_str().ok()))
        .map(str::to_string)
        .chain(peer.map(|ip| ip.to_canonical().to_string()))
        .find(|value| !value.is_empty())?;

    let ip = candidate.split(',').next().unwrap_or_default().trim();

    (!ip.is_empty()).then(|| ip.to_string())
}

pub fn validate_submission(payload: SubmitPayload) -> Result<Submission, AppError> {
    let SubmitPayload {
        fullname,
        department,
        semester,
        attendance_time,
        food_interest,
        top_feature,
        suggestions,
    } = payload;

    match (
        present(department),
        present(semester),
        present(attendance_time),
        present(food_interest),
        present(top_feature),
    ) {
        (
            Some(department),
            Some(semester),
            Some(attendance_time),
            Some(food_interest),
            Some(top_feature),
        ) => Ok(Submission {
            fullname: present(fullname),
            department,
            semester,
            attendance_time,
            food_interest,
            top_feature,
            suggestions: present(suggestions),
        }),
        _ => Err(AppError::Validation(MISSING_FIELDS)),
    }
}

pub fn parse_id(payload: IdPayload) -> Result<ObjectId, AppError> {
    payload
        .id
        .as_deref()
        .and_then(|id| ObjectId::parse_str(id).ok())
        .ok_or(AppError::Validation(INVALID_ID))
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};

    use axum::http::HeaderValue;

    use super::*;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    fn payload() -> SubmitPayload {
        SubmitPayload {
            fullname: Some("Asha".to_string()),
            department: Some("BCA".to_string()),
            semester: Some("2".to_string()),
            attendance_time: Some("< 5 mins".to_string()),
            food_interest: Some("Yes".to_string()),
            top_feature: Some("Food Ordering".to_string()),
            suggestions: Some(String::new()),
        }
    }

    #[test]
    fn test_real_ip_wins() {
        let map = headers(&[(X_REAL_IP, "9.9.9.9"), (X_FORWARDED_FOR, "1.1.1.1")]);
        let peer = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));

        assert_eq!(resolve_client_ip(&map, peer), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn test_forwarded_first_token() {
        let map = headers(&[(X_FORWARDED_FOR, " 1.2.3.4 , 10.0.0.1, 10.0.0.2")]);

        assert_eq!(resolve_client_ip(&map, None), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn test_empty_header_falls_through() {
        let map = headers(&[(X_REAL_IP, ""), (X_FORWARDED_FOR, "5.6.7.8")]);

        assert_eq!(resolve_client_ip(&map, None), Some("5.6.7.8".to_string()));
    }

    #[test]
    fn test_peer_fallback() {
        let peer = Some(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20)));

        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), peer),
            Some("192.168.1.20".to_string())
        );
    }

    #[test]
    fn test_mapped_peer_is_canonical() {
        let peer = Some(IpAddr::V6(Ipv4Addr::new(1, 2, 3, 4).to_ipv6_mapped()));

        assert_eq!(
            resolve_client_ip(&HeaderMap::new(), peer),
            Some("1.2.3.4".to_string())
        );

        let peer = Some(IpAddr::V6(Ipv6Addr::LOCALHOST));
        assert_eq!(resolve_client_ip(&HeaderMap::new(), peer), Some("::1".to_string()));
    }

    #[test]
    fn test_unresolvable() {
        assert_eq!(resolve_client_ip(&HeaderMap::new(), None), None);

        // a chosen header that trims to nothing does not fall through
        let map = headers(&[(X_REAL_IP, " , 1.1.1.1")]);
        let peer = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(resolve_client_ip(&map, peer), None);
    }

    #[test]
    fn test_valid_submission() {
        let submission = validate_submission(payload()).unwrap();

        assert_eq!(submission.fullname.as_deref(), Some("Asha"));
        assert_eq!(submission.department, "BCA");
        assert_eq!(submission.suggestions, None);
    }

    #[test]
    fn test_optional_fields_may_be_absent() {
        let submission = validate_submission(SubmitPayload {
            fullname: None,
            suggestions: None,
            ..payload()
        })
        .unwrap();

        assert_eq!(submission.fullname, None);
    }

    #[test]
    fn test_required_fields() {
        let blanks: [fn(&mut SubmitPayload); 5] = [
            |p| p.department = None,
            |p| p.semester = Some(String::new()),
            |p| p.attendance_time = None,
            |p| p.food_interest = Some(String::new()),
            |p| p.top_feature = None,
        ];

        for blank in blanks {
            let mut p = payload();
            blank(&mut p);

            assert!(matches!(
                validate_submission(p),
                Err(AppError::Validation(MISSING_FIELDS))
            ));
        }
    }

    #[test]
    fn test_parse_id() {
        let id = ObjectId::new();

        assert_eq!(
            parse_id(IdPayload {
                id: Some(id.to_hex())
            })
            .unwrap(),
            id
        );
        assert!(parse_id(IdPayload { id: None }).is_err());
        assert!(
            parse_id(IdPayload {
                id: Some("not-an-id".to_string())
            })
            .is_err()
        );
        assert!(
            parse_id(IdPayload {
                id: Some(String::new())
            })
            .is_err()
        );
    }
}
