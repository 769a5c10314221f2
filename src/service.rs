use crate::classifier::{parse_sample_groups, parse_samples, ClassifierSession, InMemoryModelStore};
use crate::config::ServiceConfig;
use crate::error::{AnalysisError, Result};
use crate::models::ProcessRequest;
use crate::orchestrator::Orchestrator;
use crate::slide::SlideFileSource;
use crate::tiling::{DeepZoomTiler, VipsTiler};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// One operation the service understands, selected by the `op` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Health,
    ProcessRois(ProcessRequest),
    Train {
        #[serde(alias = "rgb")]
        color_sample_groups: Vec<Vec<Vec<i64>>>,
        labels: Vec<i64>,
        #[serde(default)]
        epochs: Option<usize>,
    },
    Predict {
        model_id: String,
        #[serde(alias = "rgb")]
        color_samples: Vec<Vec<i64>>,
    },
    Tile {
        #[serde(alias = "wsi_path")]
        image_path: PathBuf,
        out_dir: PathBuf,
    },
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Health => "health",
            Request::ProcessRois(_) => "process_rois",
            Request::Train { .. } => "train",
            Request::Predict { .. } => "predict",
            Request::Tile { .. } => "tile",
        }
    }
}

/// A request plus the caller's correlation id, echoed back in the response.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

impl From<&AnalysisError> for ErrorBody {
    fn from(err: &AnalysisError) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Result(Value),
    Error(ErrorBody),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl Response {
    fn from_result(id: Option<Value>, result: Result<Value>) -> Self {
        let outcome = match result {
            Ok(value) => Outcome::Result(value),
            Err(err) => Outcome::Error(ErrorBody::from(&err)),
        };
        Self { id, outcome }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }
}

/// Owns the orchestrator, the classifier session and the tiler.
pub struct Service {
    orchestrator: Orchestrator,
    classifier: ClassifierSession,
    tiler: Box<dyn DeepZoomTiler>,
}

impl Service {
    pub fn new(config: &ServiceConfig) -> Self {
        let mut orchestrator = Orchestrator::new(SlideFileSource, config.unknown_op_policy);
        if let Some(dir) = &config.debug_dir {
            orchestrator = orchestrator.with_debug_dir(dir.clone());
        }
        Self {
            orchestrator,
            classifier: ClassifierSession::new(InMemoryModelStore::new(config.eviction), config.training),
            tiler: Box::new(VipsTiler::default()),
        }
    }

    pub fn with_tiler(mut self, tiler: Box<dyn DeepZoomTiler>) -> Self {
        self.tiler = tiler;
        self
    }

    pub fn classifier(&self) -> &ClassifierSession {
        &self.classifier
    }

    pub fn handle(&self, envelope: Envelope) -> Response {
        let op = envelope.request.name();
        tracing::info!("Handling {} request (id={:?})", op, envelope.id);
        let result = self.dispatch(envelope.request);
        if let Err(e) = &result {
            tracing::error!("{} failed: {}", op, e);
        }
        Response::from_result(envelope.id, result)
    }

    /// Decode one JSON line and handle it. Malformed input is an InvalidArgument.
    pub fn handle_line(&self, line: &str) -> Response {
        let raw: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                return Response::from_result(None, Err(AnalysisError::invalid(format!("malformed request: {}", e))));
            }
        };
        let id = raw.get("id").cloned();
        match serde_json::from_value::<Envelope>(raw) {
            Ok(envelope) => self.handle(envelope),
            Err(e) => Response::from_result(id, Err(AnalysisError::invalid(format!("malformed request: {}", e)))),
        }
    }

    fn dispatch(&self, request: Request) -> Result<Value> {
        match request {
            Request::Health => Ok(json!({ "status": "ok" })),
            Request::ProcessRois(req) => {
                let results = self.orchestrator.process_rois(&req)?;
                Ok(json!({ "results": to_value(&results)? }))
            }
            Request::Train {
                color_sample_groups,
                labels,
                epochs,
            } => {
                let groups = parse_sample_groups(&color_sample_groups)?;
                let outcome = match epochs {
                    Some(n) => self.classifier.train_with_epochs(&groups, &labels, n)?,
                    None => self.classifier.train(&groups, &labels)?,
                };
                to_value(&outcome)
            }
            Request::Predict { model_id, color_samples } => {
                let samples = parse_samples(&color_samples)?;
                let predictions = self.classifier.predict(&model_id, &samples)?;
                Ok(json!({ "predictions": predictions }))
            }
            Request::Tile { image_path, out_dir } => {
                let dzi = self.tiler.tile(&image_path, &out_dir)?;
                Ok(json!({ "dzi_path": dzi.to_string_lossy() }))
            }
        }
    }
}

/// The `id` of a raw request line, if it parses far enough to have one.
fn request_id(line: &str) -> Option<Value> {
    serde_json::from_str::<Value>(line).ok()?.get("id").cloned()
}

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| AnalysisError::processing(format!("failed to encode response: {}", e)))
}

/// Read JSON-lines requests until EOF, answering each on the blocking pool.
///
/// Responses are written as they complete, so their order may differ from the
/// request order; callers correlate by `id`. Returns the writer after every
/// response has been flushed.
pub async fn serve<R, W>(service: Arc<Service>, reader: R, mut writer: W) -> anyhow::Result<W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer_task = tokio::spawn(async move {
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(writer)
    });

    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let service = Arc::clone(&service);
        let tx = tx.clone();
        tokio::spawn(async move {
            let request_line = line.clone();
            let response = match tokio::task::spawn_blocking(move || service.handle_line(&line)).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Worker failed: {}", e);
                    Response::from_result(
                        request_id(&request_line),
                        Err(AnalysisError::processing(format!("worker failed: {}", e))),
                    )
                }
            };
            match serde_json::to_string(&response) {
                Ok(encoded) => {
                    if tx.send(encoded).is_err() {
                        tracing::warn!("Response dropped, writer closed");
                    }
                }
                Err(e) => tracing::error!("Failed to encode response: {}", e),
            }
        });
    }
    drop(tx);

    tracing::debug!("Input closed, waiting for pending responses");
    let writer = writer_task.await??;
    Ok(writer)
}
