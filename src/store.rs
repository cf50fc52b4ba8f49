//! Project persistence: a keyed collection of saved projects serialized as
//! one JSON list at a well-known path. Read/write failures are logged and
//! the operation becomes a no-op; there is no retry.

use crate::language::Language;
use crate::session::{ProductionStatus, Session, SessionAction};
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputMode {
    #[default]
    #[serde(rename = "source_text")]
    SourceText,
    #[serde(rename = "idea")]
    Idea,
}

/// Persisted aggregate for one saved working session. Older records may
/// lack newer fields; those default on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub input_mode: InputMode,
    #[serde(default)]
    pub source_text: String,
    #[serde(default)]
    pub language: Language,
    #[serde(default)]
    pub script: String,
    #[serde(default)]
    pub titles: Vec<String>,
    #[serde(default)]
    pub chosen_title: Option<String>,
    #[serde(default)]
    pub thumbnail_prompt: String,
    /// Base64 JPEG, when a thumbnail was rendered.
    #[serde(default)]
    pub thumbnail_image: Option<String>,
    #[serde(default)]
    pub scene_prompts: Vec<String>,
    #[serde(default)]
    pub video_prompts: Vec<String>,
    #[serde(default)]
    pub video_done: Vec<bool>,
    #[serde(default)]
    pub status: ProductionStatus,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read project store: {0}")]
    Read(std::io::Error),
    #[error("failed to write project store: {0}")]
    Write(std::io::Error),
    #[error("project store is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("no project with id '{0}'")]
    NotFound(String),
}

fn new_project_id() -> String {
    format!(
        "proj-{}-{:04x}",
        Utc::now().timestamp_millis(),
        rand::random::<u16>()
    )
}

fn placeholder_title(now: DateTime<Utc>) -> String {
    format!("Project {}", now.format("%Y-%m-%d %H:%M"))
}

pub struct ProjectStore {
    path: PathBuf,
}

impl ProjectStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<Vec<Project>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(StoreError::Read(e)),
        }
    }

    fn write_all(&self, projects: &[Project]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(StoreError::Write)?;
            }
        }
        let raw = serde_json::to_string_pretty(projects)?;
        fs::write(&self.path, raw).map_err(StoreError::Write)
    }

    /// All stored projects. Failures are logged and yield an empty list.
    pub fn list(&self) -> Vec<Project> {
        match self.read_all() {
            Ok(projects) => projects,
            Err(e) => {
                warn!("project store list failed: {e}");
                Vec::new()
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Project> {
        self.list().into_iter().find(|p| p.id == id)
    }

    /// Snapshot the working session. First save of a session creates a new
    /// entry and binds its identity; later saves update that entry in
    /// place and refresh the updated timestamp.
    pub fn save(&self, session: &mut Session) -> Result<Project, StoreError> {
        let mut projects = self.read_all().inspect_err(|e| warn!("project store save failed: {e}"))?;
        let now = Utc::now();

        let title = session
            .titles
            .chosen_title()
            .map(str::to_string)
            .unwrap_or_else(|| placeholder_title(now));

        let existing = session
            .project_id
            .as_deref()
            .and_then(|id| projects.iter().position(|p| p.id == id));

        let (id, created_at, status) = match existing {
            Some(i) => (
                projects[i].id.clone(),
                projects[i].created_at,
                projects[i].status.clone(),
            ),
            None => (new_project_id(), now, session.status.clone()),
        };

        let project = Project {
            id: id.clone(),
            title,
            created_at,
            updated_at: now,
            input_mode: session.input_mode,
            source_text: session.source_text.clone(),
            language: session.language,
            script: session.script.clone().unwrap_or_default(),
            titles: session.titles.titles.clone(),
            chosen_title: session.titles.chosen_title().map(str::to_string),
            thumbnail_prompt: session.thumbnail_prompt.clone().unwrap_or_default(),
            thumbnail_image: session
                .thumbnail_image
                .as_deref()
                .map(|b| base64::engine::general_purpose::STANDARD.encode(b)),
            scene_prompts: session.scene_prompts.clone(),
            video_prompts: session.video_prompts.clone(),
            video_done: session.video_done.clone(),
            status,
        };

        match existing {
            Some(i) => projects[i] = project.clone(),
            None => projects.push(project.clone()),
        }
        self.write_all(&projects)
            .inspect_err(|e| warn!("project store save failed: {e}"))?;

        session.project_id = Some(id);
        info!(id = %project.id, title = %project.title, "project saved");
        Ok(project)
    }

    /// Replace the working session with a stored entry and bind its
    /// identity so subsequent saves update it.
    pub fn load_into(&self, id: &str, session: &mut Session) -> Result<(), StoreError> {
        let project = self
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        session.apply(SessionAction::LoadProject(project));
        Ok(())
    }

    /// Remove an entry. A session bound to the deleted entry is reset to a
    /// blank state.
    pub fn delete(&self, id: &str, session: &mut Session) -> Result<(), StoreError> {
        let mut projects = self
            .read_all()
            .inspect_err(|e| warn!("project store delete failed: {e}"))?;
        let before = projects.len();
        projects.retain(|p| p.id != id);
        if projects.len() == before {
            return Err(StoreError::NotFound(id.to_string()));
        }
        self.write_all(&projects)
            .inspect_err(|e| warn!("project store delete failed: {e}"))?;

        if session.project_id.as_deref() == Some(id) {
            session.apply(SessionAction::Reset);
        }
        Ok(())
    }

    /// Flip a stored entry's pending/completed flag directly, without
    /// loading it into the working session.
    pub fn toggle_status(&self, id: &str) -> Result<ProductionStatus, StoreError> {
        let mut projects = self
            .read_all()
            .inspect_err(|e| warn!("project store toggle failed: {e}"))?;
        let project = projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        project.status = match project.status {
            ProductionStatus::Pending => ProductionStatus::Completed,
            ProductionStatus::Completed => ProductionStatus::Pending,
        };
        project.updated_at = Utc::now();
        let status = project.status.clone();
        self.write_all(&projects)
            .inspect_err(|e| warn!("project store toggle failed: {e}"))?;
        Ok(status)
    }
}
