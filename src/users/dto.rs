use serde::Deserialize;

/// Partial profile update; at least one field must be supplied.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}
