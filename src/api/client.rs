use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};

use crate::auth::Session;
use crate::error::{AppError, Result};
use crate::models::Story;

use super::types::{ApiResponse, Credentials, LoginResult, NewStory, PushSubscription, Unsubscribe};
use super::RemoteStories;

pub struct ApiClient {
    client: Client,
    base_url: String,
    session: Arc<Session>,
}

impl ApiClient {
    pub fn new(base_url: &str, timeout: Duration, session: Arc<Session>) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent("story-reader/1.0")
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResult> {
        let body = Credentials {
            name: None,
            email,
            password,
        };
        let response = self
            .client
            .post(self.endpoint("login"))
            .json(&body)
            .send()
            .await?;

        decode(response)
            .await?
            .login_result
            .ok_or_else(|| AppError::Api("login response did not include a token".to_string()))
    }

    pub async fn register(&self, name: &str, email: &str, password: &str) -> Result<String> {
        let body = Credentials {
            name: Some(name),
            email,
            password,
        };
        let response = self
            .client
            .post(self.endpoint("register"))
            .json(&body)
            .send()
            .await?;

        Ok(decode(response).await?.message)
    }

    pub async fn get_all_stories(&self) -> Result<Vec<Story>> {
        let response = self
            .authorized(self.client.get(self.endpoint("stories")))
            .send()
            .await?;

        Ok(decode(response).await?.list_story.unwrap_or_default())
    }

    pub async fn get_story_detail(&self, id: &str) -> Result<Story> {
        let path = format!("stories/{}", urlencoding::encode(id));
        let response = self
            .authorized(self.client.get(self.endpoint(&path)))
            .send()
            .await?;

        decode(response)
            .await?
            .story
            .ok_or_else(|| anyhow::anyhow!("Story {} missing from response", id).into())
    }

    pub async fn add_story(&self, story: &NewStory) -> Result<String> {
        let response = self
            .authorized(self.client.post(self.endpoint("stories")))
            .multipart(story.form()?)
            .send()
            .await?;

        Ok(decode(response).await?.message)
    }

    pub async fn add_guest_story(&self, story: &NewStory) -> Result<String> {
        let response = self
            .client
            .post(self.endpoint("stories/guest"))
            .multipart(story.form()?)
            .send()
            .await?;

        Ok(decode(response).await?.message)
    }

    pub async fn subscribe(&self, subscription: &PushSubscription) -> Result<String> {
        let response = self
            .authorized(self.client.post(self.endpoint("notifications/subscribe")))
            .json(subscription)
            .send()
            .await?;

        Ok(decode(response).await?.message)
    }

    pub async fn unsubscribe(&self, endpoint: &str) -> Result<String> {
        let response = self
            .authorized(self.client.delete(self.endpoint("notifications/subscribe")))
            .json(&Unsubscribe { endpoint })
            .send()
            .await?;

        Ok(decode(response).await?.message)
    }
}

#[async_trait]
impl RemoteStories for ApiClient {
    async fn fetch_stories(&self) -> Result<Vec<Story>> {
        self.get_all_stories().await
    }

    async fn fetch_story(&self, id: &str) -> Result<Story> {
        self.get_story_detail(id).await
    }
}

/// The API reports failures in the body, often alongside a 4xx status, so
/// the body is read before the status is considered.
async fn decode(response: Response) -> Result<ApiResponse> {
    let status = response.status();
    let body = response.text().await?;

    match serde_json::from_str::<ApiResponse>(&body) {
        Ok(parsed) => parsed.into_result(),
        Err(_) if !status.is_success() => Err(AppError::Api(format!("HTTP {}", status))),
        Err(e) => Err(e.into()),
    }
}
