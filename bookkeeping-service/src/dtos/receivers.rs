use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateReceiverRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: String,

    #[serde(default)]
    pub is_organization: bool,

    #[serde(default)]
    pub alternate_names: Vec<String>,
}

/// Body of `POST /api/receivers/merge`.
///
/// Both fields default so that an omitted target surfaces as "not found"
/// and an omitted source list as a bad request, rather than a body
/// deserialization failure.
#[derive(Debug, Deserialize)]
pub struct MergeReceiversRequest {
    #[serde(default)]
    pub target_id: Uuid,

    #[serde(default)]
    pub source_ids: Vec<Uuid>,
}
