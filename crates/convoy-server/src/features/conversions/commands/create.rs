use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use crate::conversion::{
    ConversionRequest, DispatchError, DispatchOutcome, InputMode, JobDispatcher, JobResult,
    SourceRef,
};
use crate::remote::JobOptions;
use crate::storage::{Artifact, ArtifactStore, OwnerRef};

/// Request a conversion.
///
/// Either names a tracked artifact (`owner` + `filename`) or a bare `path`;
/// a bare path only reports whether `output_path` already exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateConversionCommand {
    pub owner: Option<String>,
    pub filename: Option<String>,
    pub path: Option<PathBuf>,
    pub format_out: Option<String>,
    pub format_in: Option<String>,
    pub output_path: Option<PathBuf>,
    #[serde(rename = "async")]
    pub run_async: Option<bool>,
    pub input: Option<InputMode>,
    #[serde(default)]
    pub options: JobOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CreateConversionResponse {
    Cached { artifact: Artifact },
    Completed { artifact: Artifact },
    Pending { job_id: String },
    Failed { reason: String },
    Untracked { path: PathBuf, exists: bool },
}

impl From<DispatchOutcome> for CreateConversionResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome {
            DispatchOutcome::Cached(artifact) => Self::Cached { artifact },
            DispatchOutcome::Dispatched(JobResult::Completed { artifact }) => {
                Self::Completed { artifact }
            },
            DispatchOutcome::Dispatched(JobResult::Pending { job_id }) => Self::Pending { job_id },
            DispatchOutcome::Dispatched(JobResult::Failed { reason }) => Self::Failed { reason },
            DispatchOutcome::Untracked { path, exists } => Self::Untracked { path, exists },
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CreateConversionError {
    #[error("Either 'path' or both 'owner' and 'filename' are required")]
    SourceRequired,
    #[error("'path' cannot be combined with 'owner' or 'filename'")]
    AmbiguousSource,
    #[error("Output format is required and cannot be empty")]
    FormatRequired,
    #[error("'output_path' is required when converting a bare path")]
    OutputPathRequired,
    #[error("Owner '{0}' not found")]
    OwnerNotFound(String),
    #[error("Artifact '{0}' not found")]
    SourceNotFound(String),
    #[error("Conversion service is not configured")]
    NotConfigured,
    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl CreateConversionCommand {
    pub fn validate(&self) -> Result<(), CreateConversionError> {
        let tracked = non_empty(&self.owner).is_some() || non_empty(&self.filename).is_some();
        match (&self.path, tracked) {
            (Some(_), true) => return Err(CreateConversionError::AmbiguousSource),
            (Some(_), false) => {
                if self.output_path.is_none() {
                    return Err(CreateConversionError::OutputPathRequired);
                }
            },
            (None, _) => {
                if non_empty(&self.owner).is_none() || non_empty(&self.filename).is_none() {
                    return Err(CreateConversionError::SourceRequired);
                }
                if non_empty(&self.format_out).is_none() {
                    return Err(CreateConversionError::FormatRequired);
                }
            },
        }
        Ok(())
    }

    fn into_request(
        self,
        dispatcher: &JobDispatcher,
        source: Option<&Artifact>,
    ) -> ConversionRequest {
        let input = self.input.unwrap_or_else(|| dispatcher.default_input());
        let format_out = non_empty(&self.format_out).unwrap_or_default().to_string();

        let mut request = match (source, self.path) {
            (Some(artifact), _) => ConversionRequest::for_artifact(artifact, format_out, input),
            (None, path) => {
                let path = path.unwrap_or_default();
                ConversionRequest {
                    format_in: extension_of(&path),
                    source: SourceRef::Opaque { path },
                    input,
                    output_path: None,
                    format_out,
                    owner: None,
                    extra: JobOptions::new(),
                }
            },
        };
        if let Some(format_in) = non_empty(&self.format_in) {
            request.format_in = format_in.to_string();
        }
        request.extra = self.options;
        request
    }
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

#[tracing::instrument(skip(dispatcher, store, command))]
pub async fn handle(
    dispatcher: &JobDispatcher,
    store: &dyn ArtifactStore,
    command: CreateConversionCommand,
    origin: IpAddr,
) -> Result<CreateConversionResponse, CreateConversionError> {
    command.validate()?;

    let source = match (non_empty(&command.owner), non_empty(&command.filename)) {
        (Some(owner_id), Some(filename)) => {
            let owner_ref = OwnerRef::new(owner_id);
            let owner = store
                .resolve_owner(&owner_ref)
                .await?
                .ok_or_else(|| CreateConversionError::OwnerNotFound(owner_id.to_string()))?;
            let artifact = store.find_artifact(&owner, filename).await?.ok_or_else(|| {
                CreateConversionError::SourceNotFound(format!("{}/{}", owner_id, filename))
            })?;
            Some(artifact)
        },
        _ => None,
    };

    let explicit_output = command.output_path.clone();
    let force_async = command.run_async;
    let request = command.into_request(dispatcher, source.as_ref());

    let outcome = dispatcher
        .convert(request, explicit_output, force_async, origin)
        .await?
        .ok_or(CreateConversionError::NotConfigured)?;

    Ok(outcome.into())
}
