//! In-memory upload engine and HTTP client for driving the link deterministically

#![allow(dead_code)]

use bytes::Bytes;
use graphql_bg_upload::{
    EngineCapabilities, Error, EventEmitter, FileInfo, HttpClient, HttpRequest, HttpResponse,
    Result, UploadDescriptor, UploadEngine, UploadId,
};
use http::{HeaderMap, StatusCode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One thing the engine does for an upload
#[derive(Debug, Clone)]
pub enum Step {
    Wait(Duration),
    Progress(f64),
    Complete(u16, String),
    Fail(String),
    /// Emit nothing more; the upload only ends when cancelled
    Hang,
}

#[derive(Default)]
struct EngineState {
    next_id: u64,
    scripts: HashMap<String, Vec<Step>>,
    rejections: HashMap<String, String>,
    started: Vec<(UploadId, UploadDescriptor)>,
    active: HashMap<UploadId, EventEmitter>,
    cancel_calls: Vec<UploadId>,
}

/// Upload engine that plays back a script per file path.
///
/// Paths without a script complete immediately with `{"data":{"ok":true}}`.
#[derive(Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<EngineState>>,
    background: bool,
    suspend_calls: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_background_extension() -> Self {
        Self {
            background: true,
            ..Self::default()
        }
    }

    pub fn script(&self, path: &str, steps: Vec<Step>) {
        self.state
            .lock()
            .unwrap()
            .scripts
            .insert(path.to_string(), steps);
    }

    /// Make `start_upload` fail for `path`
    pub fn reject(&self, path: &str, message: &str) {
        self.state
            .lock()
            .unwrap()
            .rejections
            .insert(path.to_string(), message.to_string());
    }

    pub fn started(&self) -> Vec<(UploadId, UploadDescriptor)> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn id_for(&self, path: &str) -> Option<UploadId> {
        self.started()
            .into_iter()
            .find(|(_, descriptor)| descriptor.path() == path)
            .map(|(id, _)| id)
    }

    pub fn is_active(&self, id: &UploadId) -> bool {
        self.state.lock().unwrap().active.contains_key(id)
    }

    pub fn cancel_calls(&self) -> Vec<UploadId> {
        self.state.lock().unwrap().cancel_calls.clone()
    }

    pub fn suspend_calls(&self) -> usize {
        self.suspend_calls.load(Ordering::SeqCst)
    }

    fn finish(&self, id: &UploadId) -> Option<EventEmitter> {
        self.state.lock().unwrap().active.remove(id)
    }
}

impl UploadEngine for ScriptedEngine {
    async fn start_upload(
        &self,
        descriptor: UploadDescriptor,
        events: EventEmitter,
    ) -> Result<UploadId> {
        let (id, steps) = {
            let mut state = self.state.lock().unwrap();
            if let Some(message) = state.rejections.get(descriptor.path()) {
                return Err(Error::Connection {
                    message: message.clone(),
                });
            }

            state.next_id += 1;
            let id = match descriptor.custom_upload_id() {
                Some(custom) => UploadId::new(custom),
                None => UploadId::new(format!("scripted-{}", state.next_id)),
            };
            let steps = state
                .scripts
                .get(descriptor.path())
                .cloned()
                .unwrap_or_else(|| vec![Step::Complete(200, r#"{"data":{"ok":true}}"#.to_string())]);

            state.started.push((id.clone(), descriptor));
            state.active.insert(id.clone(), events.clone());
            (id, steps)
        };

        let engine = self.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            for step in steps {
                match step {
                    Step::Wait(duration) => tokio::time::sleep(duration).await,
                    Step::Progress(progress) => {
                        if !engine.is_active(&task_id) {
                            return;
                        }
                        events.progress(&task_id, progress);
                    }
                    Step::Complete(code, body) => {
                        if engine.finish(&task_id).is_some() {
                            events.completed(&task_id, code, body);
                        }
                        return;
                    }
                    Step::Fail(message) => {
                        if engine.finish(&task_id).is_some() {
                            events.error(&task_id, message);
                        }
                        return;
                    }
                    Step::Hang => return,
                }
            }
        });

        Ok(id)
    }

    async fn cancel_upload(&self, id: &UploadId) -> Result<bool> {
        self.state.lock().unwrap().cancel_calls.push(id.clone());
        match self.finish(id) {
            Some(events) => {
                events.cancelled(id, "Upload cancelled");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn file_info(&self, path: &str) -> FileInfo {
        FileInfo::probe(path).await
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_background_extension: self.background,
        }
    }

    fn can_suspend_if_background(&self) {
        self.suspend_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn remaining_background_time(&self) -> Duration {
        Duration::from_secs(30)
    }

    async fn begin_background_task(&self) -> Option<u64> {
        Some(7)
    }
}

/// HTTP client returning a fixed response and recording every request
#[derive(Clone)]
pub struct MockHttp {
    status: StatusCode,
    body: Bytes,
    requests: Arc<Mutex<Vec<HttpRequest>>>,
}

impl MockHttp {
    pub fn new(status: u16, body: &str) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: Bytes::from(body.to_string()),
            requests: Arc::default(),
        }
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl HttpClient for MockHttp {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request);
        Ok(HttpResponse {
            status: self.status,
            headers: HeaderMap::new(),
            body: self.body.clone(),
        })
    }
}
