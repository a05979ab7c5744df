use std::collections::BTreeMap;

use bson::oid::ObjectId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de::Error as _};
use serde_json::Value;

pub const NOT_AVAILABLE: &str = "N/A";

/// A stored survey response, as persisted in the `responses` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub fullname: Option<String>,
    pub department: String,
    pub semester: String,
    pub attendance_time: String,
    pub food_interest: String,
    pub top_feature: String,
    pub suggestions: Option<String>,
    #[serde(
        rename = "createdAt",
        with = "bson::serde_helpers::chrono_datetime_as_bson_datetime"
    )]
    pub created_at: DateTime<Utc>,
    pub ip: Option<String>,
}

/// Body of `POST /api/submit`. Every key is optional at the wire level so that
/// missing fields surface as a validation error rather than a decode failure.
/// Numbers and booleans are kept as their string form (`"semester": 2` is
/// stored as `"2"`); only objects and arrays fail to decode.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SubmitPayload {
    #[serde(deserialize_with = "scalar")]
    pub fullname: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub department: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub semester: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub attendance_time: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub food_interest: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub top_feature: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub suggestions: Option<String>,
}

fn scalar<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::Bool(b) => Ok(Some(b.to_string())),
        other => Err(D::Error::custom(format!("expected a scalar, found {other}"))),
    }
}

/// A submission that passed presence checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub fullname: Option<String>,
    pub department: String,
    pub semester: String,
    pub attendance_time: String,
    pub food_interest: String,
    pub top_feature: String,
    pub suggestions: Option<String>,
}

impl Submission {
    pub fn into_document(self, created_at: DateTime<Utc>, ip: Option<String>) -> ResponseDocument {
        ResponseDocument {
            id: None,
            fullname: self.fullname,
            department: self.department,
            semester: self.semester,
            attendance_time: self.attendance_time,
            food_interest: self.food_interest,
            top_feature: self.top_feature,
            suggestions: self.suggestions,
            created_at,
            ip,
        }
    }
}

/// Body of the record mutation endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct IdPayload {
    pub id: Option<String>,
}

/// Listing projection of a stored response. The stored `ip` is never exposed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseView {
    pub id: String,
    pub fullname: Option<String>,
    pub department: String,
    pub semester: String,
    pub attendance_time: String,
    pub food_interest: String,
    pub top_feature: String,
    pub suggestions: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl From<ResponseDocument> for ResponseView {
    fn from(doc: ResponseDocument) -> Self {
        Self {
            id: doc.id.map(|id| id.to_hex()).unwrap_or_default(),
            fullname: doc.fullname.filter(|s| !s.is_empty()),
            department: doc.department,
            semester: doc.semester,
            attendance_time: doc.attendance_time,
            food_interest: doc.food_interest,
            top_feature: doc.top_feature,
            suggestions: doc.suggestions.filter(|s| !s.is_empty()),
            created_at: doc.created_at,
        }
    }
}

/// Per-field answer counts, as drawn by the chart dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: u64,
    pub department: BTreeMap<String, u64>,
    pub attendance_time: BTreeMap<String, u64>,
    pub food_interest: BTreeMap<String, u64>,
    pub top_feature: BTreeMap<String, u64>,
}

impl Summary {
    pub fn tally<'a, I>(docs: I) -> Self
    where
        I: IntoIterator<Item = &'a ResponseDocument>,
    {
        let mut summary = Self::default();

        for doc in docs {
            summary.total += 1;
            bump(&mut summary.department, &doc.department);
            bump(&mut summary.attendance_time, &doc.attendance_time);
            bump(&mut summary.food_interest, &doc.food_interest);
            bump(&mut summary.top_feature, &doc.top_feature);
        }

        summary
    }
}

fn bump(counts: &mut BTreeMap<String, u64>, value: &str) {
    let key = if value.is_empty() { NOT_AVAILABLE } else { value };
    *counts.entry(key.to_string()).or_insert(0) += 1;
}

#[derive(Serialize)]
pub struct Acknowledged {
    pub success: bool,
    pub id: String,
}

#[derive(Serialize)]
pub struct Listing<T> {
    pub success: bool,
    pub data: T,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(department: &str, top_feature: &str) -> ResponseDocument {
        ResponseDocument {
            id: Some(ObjectId::new()),
            fullname: Some(String::new()),
            department: department.to_string(),
            semester: "2".to_string(),
            attendance_time: "< 5 mins".to_string(),
            food_interest: "Yes".to_string(),
            top_feature: top_feature.to_string(),
            suggestions: None,
            created_at: Utc::now(),
            ip: Some("1.2.3.4".to_string()),
        }
    }

    #[test]
    fn test_view_hides_ip_and_blanks() {
        let stored = doc("BCA", "Food Ordering");
        let id = stored.id.unwrap().to_hex();

        let view = ResponseView::from(stored);
        assert_eq!(view.id, id);
        assert_eq!(view.fullname, None);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("ip").is_none());
        assert!(json.get("createdAt").is_some());
        assert!(json["fullname"].is_null());
        assert!(json["suggestions"].is_null());
    }

    #[test]
    fn test_summary_counts() {
        let docs = vec![
            doc("BCA", "Food Ordering"),
            doc("BCA", "Attendance"),
            doc("MCA", "Food Ordering"),
            doc("", "Food Ordering"),
        ];

        let summary = Summary::tally(&docs);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.department["BCA"], 2);
        assert_eq!(summary.department["MCA"], 1);
        assert_eq!(summary.department[NOT_AVAILABLE], 1);
        assert_eq!(summary.top_feature["Food Ordering"], 3);
        assert_eq!(summary.food_interest["Yes"], 4);
    }

    #[test]
    fn test_scalar_answers_become_strings() {
        let payload: SubmitPayload = serde_json::from_value(serde_json::json!({
            "department": "BCA",
            "semester": 2,
            "food_interest": true,
            "suggestions": null,
        }))
        .unwrap();

        assert_eq!(payload.department.as_deref(), Some("BCA"));
        assert_eq!(payload.semester.as_deref(), Some("2"));
        assert_eq!(payload.food_interest.as_deref(), Some("true"));
        assert_eq!(payload.suggestions, None);
        assert_eq!(payload.top_feature, None);
    }

    #[test]
    fn test_nested_answers_are_rejected() {
        let nested = serde_json::from_value::<SubmitPayload>(serde_json::json!({
            "department": ["BCA"],
        }));
        assert!(nested.is_err());

        let object = serde_json::from_value::<SubmitPayload>(serde_json::json!({
            "semester": { "value": 2 },
        }));
        assert!(object.is_err());
    }

    #[test]
    fn test_document_stores_nulls() {
        let submission = Submission {
            fullname: None,
            department: "BCA".to_string(),
            semester: "2".to_string(),
            attendance_time: "< 5 mins".to_string(),
            food_interest: "Yes".to_string(),
            top_feature: "Food Ordering".to_string(),
            suggestions: None,
        };

        let document = submission.into_document(Utc::now(), None);
        let stored = bson::to_document(&document).unwrap();

        assert!(!stored.contains_key("_id"));
        assert_eq!(stored.get("fullname"), Some(&bson::Bson::Null));
        assert_eq!(stored.get("ip"), Some(&bson::Bson::Null));
        assert!(matches!(stored.get("createdAt"), Some(bson::Bson::DateTime(_))));
    }
}
