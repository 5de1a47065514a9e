//! In-process fakes for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{Notify, Semaphore};

use pixpool_provider::{
    ActionRequest, GenerateRequest, GenerationChannel, PromptRewriter, ProviderError,
    ProviderResult, SubmitResult, TaskStatus,
};

/// Channel with canned answers that records every call.
#[derive(Clone)]
pub struct FakeChannel {
    inner: Arc<FakeInner>,
}

struct FakeInner {
    name: String,
    submit: Mutex<Result<SubmitResult, String>>,
    statuses: Mutex<HashMap<String, Result<TaskStatus, String>>>,
    calls: Mutex<Vec<String>>,
    prompts: Mutex<Vec<String>>,
    gate: Mutex<Option<QueryGate>>,
}

/// Holds `query_task` calls until released.
#[derive(Clone)]
pub struct QueryGate {
    entered: Arc<Notify>,
    release: Arc<Semaphore>,
}

impl QueryGate {
    /// Wait until a query is parked at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.add_permits(1);
    }
}

impl FakeChannel {
    fn with_submit(name: &str, submit: Result<SubmitResult, String>) -> Self {
        Self {
            inner: Arc::new(FakeInner {
                name: name.to_string(),
                submit: Mutex::new(submit),
                statuses: Mutex::new(HashMap::new()),
                calls: Mutex::new(Vec::new()),
                prompts: Mutex::new(Vec::new()),
                gate: Mutex::new(None),
            }),
        }
    }

    pub fn accepting(name: &str, code: i32, task_id: &str) -> Self {
        Self::with_submit(
            name,
            Ok(SubmitResult {
                code,
                description: String::new(),
                task_id: task_id.to_string(),
            }),
        )
    }

    pub fn failing(name: &str) -> Self {
        Self::with_submit(name, Err("connection refused".to_string()))
    }

    pub fn with_description(self, description: &str) -> Self {
        if let Ok(res) = self.inner.submit.lock().unwrap().as_mut() {
            res.description = description.to_string();
        }
        self
    }

    pub fn set_status(&self, task_id: &str, status: TaskStatus) {
        self.inner
            .statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), Ok(status));
    }

    pub fn set_query_error(&self, task_id: &str) {
        self.inner
            .statuses
            .lock()
            .unwrap()
            .insert(task_id.to_string(), Err("timed out".to_string()));
    }

    /// Park every following `query_task` until the gate is released.
    pub fn gate_queries(&self) -> QueryGate {
        let gate = QueryGate {
            entered: Arc::new(Notify::new()),
            release: Arc::new(Semaphore::new(0)),
        };
        *self.inner.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn calls(&self) -> Vec<String> {
        self.inner.calls.lock().unwrap().clone()
    }

    /// Full prompts of generate submissions.
    pub fn prompts(&self) -> Vec<String> {
        self.inner.prompts.lock().unwrap().clone()
    }

    fn record(&self, call: &str) -> ProviderResult<SubmitResult> {
        self.inner.calls.lock().unwrap().push(call.to_string());
        self.inner
            .submit
            .lock()
            .unwrap()
            .clone()
            .map_err(ProviderError::request)
    }
}

#[async_trait]
impl GenerationChannel for FakeChannel {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn submit_generate(&self, request: &GenerateRequest) -> ProviderResult<SubmitResult> {
        self.inner.prompts.lock().unwrap().push(request.full_prompt());
        self.record("generate")
    }

    async fn submit_upscale(&self, _request: &ActionRequest) -> ProviderResult<SubmitResult> {
        self.record("upscale")
    }

    async fn submit_variation(&self, _request: &ActionRequest) -> ProviderResult<SubmitResult> {
        self.record("variation")
    }

    async fn submit_blend(&self, _image_urls: &[String]) -> ProviderResult<SubmitResult> {
        self.record("blend")
    }

    async fn submit_face_swap(&self, _image_urls: &[String]) -> ProviderResult<SubmitResult> {
        self.record("face_swap")
    }

    async fn query_task(&self, task_id: &str) -> ProviderResult<TaskStatus> {
        self.inner.calls.lock().unwrap().push(format!("query:{}", task_id));
        let gate = self.inner.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            let _permit = gate.release.acquire().await;
        }
        match self.inner.statuses.lock().unwrap().get(task_id) {
            Some(Ok(status)) => Ok(status.clone()),
            Some(Err(e)) => Err(ProviderError::request(e.clone())),
            None => Ok(TaskStatus::default()),
        }
    }
}

/// Rewriter that returns its input.
pub struct NoopRewriter;

#[async_trait]
impl PromptRewriter for NoopRewriter {
    async fn rewrite(&self, text: &str, _model: &str) -> ProviderResult<String> {
        Ok(text.to_string())
    }
}
