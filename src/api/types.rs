use std::path::Path;

use reqwest::multipart::{Form, Part};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::Story;

/// Every endpoint answers with `{ error, message, ... }`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ApiResponse {
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub message: String,
    pub list_story: Option<Vec<Story>>,
    pub story: Option<Story>,
    pub login_result: Option<LoginResult>,
}

impl ApiResponse {
    pub fn into_result(self) -> Result<Self> {
        if self.error {
            let message = if self.message.is_empty() {
                "request failed".to_string()
            } else {
                self.message
            };
            return Err(AppError::Api(message));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub user_id: String,
    pub name: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct Credentials<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'a str>,
    pub email: &'a str,
    pub password: &'a str,
}

/// A story about to be posted, photo included.
#[derive(Debug, Clone)]
pub struct NewStory {
    pub description: String,
    pub photo: Vec<u8>,
    pub file_name: String,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
}

impl NewStory {
    pub async fn from_file(path: &Path, description: &str) -> Result<Self> {
        let photo = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "photo.jpg".to_string());

        Ok(Self {
            description: description.to_string(),
            photo,
            file_name,
            lat: None,
            lon: None,
        })
    }

    pub fn at(mut self, lat: f64, lon: f64) -> Self {
        self.lat = Some(lat);
        self.lon = Some(lon);
        self
    }

    pub(crate) fn form(&self) -> Result<Form> {
        let photo = Part::bytes(self.photo.clone())
            .file_name(self.file_name.clone())
            .mime_str(mime_for(&self.file_name))?;

        let mut form = Form::new()
            .text("description", self.description.clone())
            .part("photo", photo);
        if let (Some(lat), Some(lon)) = (self.lat, self.lon) {
            form = form.text("lat", lat.to_string()).text("lon", lon.to_string());
        }
        Ok(form)
    }
}

fn mime_for(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

/// A browser push subscription as handed over by the push service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct Unsubscribe<'a> {
    pub endpoint: &'a str,
}
