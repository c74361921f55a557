use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct SearchTitlesRequest {
    /// Case-insensitive substring; blank matches nothing.
    #[serde(default)]
    pub q: String,
}
