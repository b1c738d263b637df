use serde::{Deserialize, Serialize};

/// Structured fields pulled from a referral document. Every field is
/// optional; the provider leaves out what it cannot find.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedInfo {
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub date_of_birth: Option<DateOfBirth>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub referring_physician_name: Option<String>,
    #[serde(default)]
    pub reason_for_referral: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateOfBirth {
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub day: Option<u32>,
}

impl ExtractedInfo {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// JSON schema sent to the provider to constrain its answer.
pub(crate) fn response_schema() -> serde_json::Value {
    let nullable_string = serde_json::json!({ "type": ["string", "null"] });
    let nullable_int = serde_json::json!({ "type": ["integer", "null"] });
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "patient_name",
            "date_of_birth",
            "phone_number",
            "referring_physician_name",
            "reason_for_referral"
        ],
        "properties": {
            "patient_name": nullable_string,
            "date_of_birth": {
                "type": ["object", "null"],
                "additionalProperties": false,
                "required": ["year", "month", "day"],
                "properties": {
                    "year": nullable_int,
                    "month": nullable_int,
                    "day": nullable_int
                }
            },
            "phone_number": nullable_string,
            "referring_physician_name": nullable_string,
            "reason_for_referral": nullable_string
        }
    })
}
