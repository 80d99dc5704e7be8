use serde::{Deserialize, Deserializer, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    #[serde(deserialize_with = "nullable_f64")]
    pub lat: f64,
    #[serde(deserialize_with = "nullable_f64")]
    pub lng: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

/// Persisted incident report. Written once to `report-<id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "crimeType", skip_serializing_if = "Option::is_none")]
    pub crime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub location: Location,
    pub timestamp: String,
    #[serde(rename = "photoURLs")]
    pub photo_urls: Vec<String>,
    #[serde(rename = "videoURL")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SosLocation {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosAlert {
    pub location: SosLocation,
    pub timestamp: String,
}

/// Text fields of an `/upload` form, as submitted.
#[derive(Debug, Clone, Default)]
pub struct ReportForm {
    pub crime_type: Option<String>,
    pub description: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
    pub location: Option<String>,
    pub timestamp: Option<String>,
}

impl ReportForm {
    /// Records a text field; returns false for names the form doesn't know.
    pub fn set(&mut self, name: &str, value: String) -> bool {
        let slot = match name {
            "crime-type" => &mut self.crime_type,
            "description" => &mut self.description,
            "latitude" => &mut self.latitude,
            "longitude" => &mut self.longitude,
            "location" => &mut self.location,
            "timestamp" => &mut self.timestamp,
            _ => return false,
        };
        *slot = Some(value);
        true
    }

    pub fn into_report(
        self,
        photo_urls: Vec<String>,
        video_url: Option<String>,
        received_at: &str,
    ) -> Report {
        let lat = self
            .latitude
            .as_deref()
            .map(parse_coordinate)
            .unwrap_or(f64::NAN);
        let lng = self
            .longitude
            .as_deref()
            .map(parse_coordinate)
            .unwrap_or(f64::NAN);

        Report {
            crime_type: self.crime_type,
            description: self.description,
            location: Location {
                lat,
                lng,
                display: self.location,
            },
            timestamp: self.timestamp.unwrap_or_else(|| received_at.to_string()),
            photo_urls,
            video_url,
        }
    }
}

/// Parses the leading decimal number of `input`, ignoring trailing garbage
/// (`"12.5abc"` is 12.5). Returns NaN when no number prefix exists; JSON
/// output writes NaN as `null`.
pub fn parse_coordinate(input: &str) -> f64 {
    let s = input.trim_start();
    let bytes = s.as_bytes();
    let len = bytes.len();

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    if s[end..].starts_with("Infinity") {
        return if bytes[0] == b'-' {
            f64::NEG_INFINITY
        } else {
            f64::INFINITY
        };
    }

    let int_start = end;
    while end < len && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if end < len && bytes[end] == b'.' {
        let mut j = end + 1;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        mantissa_digits += j - (end + 1);
        if mantissa_digits > 0 {
            end = j;
        }
    }
    if mantissa_digits == 0 {
        return f64::NAN;
    }

    if end < len && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut j = end + 1;
        if j < len && (bytes[j] == b'+' || bytes[j] == b'-') {
            j += 1;
        }
        let exp_start = j;
        while j < len && bytes[j].is_ascii_digit() {
            j += 1;
        }
        if j > exp_start {
            end = j;
        }
    }

    s[..end].parse().unwrap_or(f64::NAN)
}

fn nullable_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

// Response envelopes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub success: bool,
    #[serde(rename = "photoURLs")]
    pub photo_urls: Vec<String>,
    #[serde(rename = "videoURL")]
    pub video_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SosResponse {
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}
