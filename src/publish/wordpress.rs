use super::{Post, PublishReceipt, PublishTarget};
use crate::types::{AppError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Deserialize)]
struct CreatedPost {
    id: u64,
    #[serde(default)]
    link: String,
    #[serde(default)]
    status: Option<String>,
}

/// WordPress REST API target using application-password basic auth.
pub struct WordPressPublisher {
    client: reqwest::Client,
    site_url: String,
    username: String,
    app_password: String,
}

impl WordPressPublisher {
    pub fn new(
        site_url: impl Into<String>,
        username: impl Into<String>,
        app_password: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            site_url: site_url.into().trim_end_matches('/').to_string(),
            username: username.into(),
            app_password: app_password.into(),
        })
    }

    pub fn posts_endpoint(&self) -> String {
        format!("{}/wp-json/wp/v2/posts", self.site_url)
    }

    fn edit_url(&self, id: u64) -> String {
        format!("{}/wp-admin/post.php?post={}&action=edit", self.site_url, id)
    }
}

#[async_trait]
impl PublishTarget for WordPressPublisher {
    async fn publish(&self, post: &Post) -> Result<PublishReceipt> {
        let body = json!({
            "title": post.title,
            "content": post.html,
            "status": post.status.to_string(),
        });

        let response = self
            .client
            .post(self.posts_endpoint())
            .basic_auth(&self.username, Some(&self.app_password))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Publish(format!("WordPress request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            warn!(site = %self.site_url, %status, "WordPress rejected post");
            return Err(AppError::Publish(format!(
                "WordPress returned {}: {}",
                status, detail
            )));
        }

        let created: CreatedPost = response
            .json()
            .await
            .map_err(|e| AppError::Publish(format!("Unexpected WordPress response: {}", e)))?;

        info!(site = %self.site_url, post_id = created.id, "Post created");
        Ok(PublishReceipt {
            id: created.id,
            url: created.link,
            edit_url: self.edit_url(created.id),
            status: created
                .status
                .unwrap_or_else(|| post.status.to_string()),
        })
    }

    fn name(&self) -> &str {
        "wordpress"
    }
}
