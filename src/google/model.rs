use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

#[derive(Deserialize, Debug, Default)]
pub struct ValueRange {
    #[serde(default)]
    pub values: Vec<Vec<Value>>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub created_time: Option<DateTime<Utc>>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileList {
    #[serde(default)]
    pub files: Vec<DriveFile>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct Created {
    pub id: String,
}

#[derive(Deserialize, Debug)]
pub struct ItemList<T> {
    #[serde(default = "Vec::new")]
    pub items: Vec<T>,
}

#[derive(Deserialize, Debug)]
pub struct VideoItem {
    pub id: String,
    #[serde(default)]
    pub snippet: Option<VideoSnippet>,
    #[serde(default)]
    pub status: Option<VideoStatus>,
}

#[derive(Deserialize, Debug)]
pub struct VideoSnippet {
    #[serde(default)]
    pub title: String,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VideoStatus {
    #[serde(default)]
    pub privacy_status: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct CaptionItem {
    pub snippet: CaptionSnippet,
}

#[derive(Deserialize, Debug)]
pub struct CaptionSnippet {
    #[serde(default)]
    pub language: String,
}

/// Cells come back as strings, but numbers and booleans are tolerated.
pub fn cell_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
