//! HTTP generation-proxy channel.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::channel::GenerationChannel;
use crate::config::ChannelConfig;
use crate::error::{ProviderError, ProviderResult};
use crate::types::{ActionRequest, GenerateRequest, SubmitResult, TaskStatus};

const BOT_TYPE: &str = "MID_JOURNEY";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImagineBody<'a> {
    bot_type: &'static str,
    prompt: &'a str,
    base64_array: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActionBody {
    custom_id: String,
    task_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BlendBody {
    bot_type: &'static str,
    dimensions: &'static str,
    base64_array: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FaceSwapBody {
    source_base64: String,
    target_base64: String,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    code: i32,
    #[serde(default)]
    description: String,
    #[serde(default)]
    result: Option<serde_json::Value>,
}

impl From<SubmitResponse> for SubmitResult {
    fn from(res: SubmitResponse) -> Self {
        let task_id = match res.result {
            Some(serde_json::Value::String(s)) => s,
            Some(serde_json::Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };
        SubmitResult {
            code: res.code,
            description: res.description,
            task_id,
        }
    }
}

/// Channel backed by a generation-proxy REST API.
pub struct HttpChannel {
    name: String,
    api_url: String,
    api_key: String,
    client: Client,
}

impl HttpChannel {
    /// Create a channel with a per-request timeout.
    pub fn new(config: &ChannelConfig, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            name: config.name.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            client,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    async fn post_submit<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<SubmitResult> {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, body });
        }

        let res: SubmitResponse = response.json().await?;
        let result = SubmitResult::from(res);
        info!(
            channel = %self.name,
            path,
            code = result.code,
            task_id = %result.task_id,
            "Submitted task"
        );
        Ok(result)
    }

    async fn action(&self, verb: &str, request: &ActionRequest) -> ProviderResult<SubmitResult> {
        let body = ActionBody {
            custom_id: format!(
                "MJ::JOB::{}::{}::{}",
                verb, request.index, request.message_hash
            ),
            task_id: request.message_id.clone(),
        };
        self.post_submit("/mj/submit/action", &body).await
    }

    /// Download an image and encode it as a data URI.
    async fn image_data_uri(&self, url: &str) -> ProviderResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProviderError::image(format!("{}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(ProviderError::image(format!(
                "{}: status {}",
                url,
                response.status()
            )));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("image/png")
            .to_string();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::image(format!("{}: {}", url, e)))?;

        debug!(url, size = bytes.len(), "Fetched reference image");
        Ok(format!("data:{};base64,{}", content_type, STANDARD.encode(&bytes)))
    }

    async fn images_data_uris(&self, urls: &[String]) -> ProviderResult<Vec<String>> {
        let mut out = Vec::with_capacity(urls.len());
        for url in urls {
            out.push(self.image_data_uri(url).await?);
        }
        Ok(out)
    }
}

#[async_trait]
impl GenerationChannel for HttpChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn submit_generate(&self, request: &GenerateRequest) -> ProviderResult<SubmitResult> {
        let prompt = request.full_prompt();
        let body = ImagineBody {
            bot_type: BOT_TYPE,
            prompt: &prompt,
            base64_array: self.images_data_uris(&request.image_urls).await?,
        };
        self.post_submit("/mj/submit/imagine", &body).await
    }

    async fn submit_upscale(&self, request: &ActionRequest) -> ProviderResult<SubmitResult> {
        self.action("upsample", request).await
    }

    async fn submit_variation(&self, request: &ActionRequest) -> ProviderResult<SubmitResult> {
        self.action("variation", request).await
    }

    async fn submit_blend(&self, image_urls: &[String]) -> ProviderResult<SubmitResult> {
        if image_urls.len() < 2 {
            return Err(ProviderError::invalid_request(
                "blend needs at least two images",
            ));
        }
        let body = BlendBody {
            bot_type: BOT_TYPE,
            dimensions: "SQUARE",
            base64_array: self.images_data_uris(image_urls).await?,
        };
        self.post_submit("/mj/submit/blend", &body).await
    }

    async fn submit_face_swap(&self, image_urls: &[String]) -> ProviderResult<SubmitResult> {
        let [source, target] = image_urls else {
            return Err(ProviderError::invalid_request(format!(
                "face swap needs exactly two images, got {}",
                image_urls.len()
            )));
        };
        let body = FaceSwapBody {
            source_base64: self.image_data_uri(source).await?,
            target_base64: self.image_data_uri(target).await?,
        };
        self.post_submit("/mj/insight-face/swap", &body).await
    }

    async fn query_task(&self, task_id: &str) -> ProviderResult<TaskStatus> {
        let response = self
            .client
            .get(self.url(&format!("/mj/task/{}/fetch", task_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Http { status, body });
        }

        Ok(response.json().await?)
    }

    async fn image_preview(&self, url: &str) -> ProviderResult<String> {
        self.image_data_uri(url).await
    }
}
