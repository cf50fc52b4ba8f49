//! The working session: one in-memory aggregate holding the script and every
//! derived-asset stage. All mutation flows through [`Session::apply`], so the
//! cross-stage invalidation invariant lives in exactly one place.

use crate::language::Language;
use crate::store::{InputMode, Project};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Ordered title candidates plus the user's curation state. Selection steers
/// regeneration prompts; the chosen title feeds the final export.
#[derive(Debug, Clone, Default)]
pub struct TitleSet {
    pub titles: Vec<String>,
    pub selected: BTreeSet<usize>,
    pub chosen: Option<usize>,
}

impl TitleSet {
    pub fn selected_titles(&self) -> Vec<String> {
        self.selected
            .iter()
            .filter_map(|&i| self.titles.get(i).cloned())
            .collect()
    }

    pub fn chosen_title(&self) -> Option<&str> {
        self.chosen.and_then(|i| self.titles.get(i)).map(String::as_str)
    }
}

/// Per-scene image generation progress, keyed by stable scene index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneImageState {
    Loading,
    Ready(Vec<u8>),
    Failed(String),
}

/// A named piece of derived state that one generation call populates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    Titles,
    ThumbnailPrompt,
    ThumbnailImage,
    ScenePrompts,
    VideoPrompts,
    SceneImage(usize),
}

/// Monotonic stamp handed out per slot; only a response carrying the slot's
/// current token may be applied, so superseded in-flight requests are
/// discarded instead of racing last-write-wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestToken(u64);

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub enum ProductionStatus {
    #[default]
    #[serde(rename = "pending")]
    Pending,
    #[serde(rename = "completed")]
    Completed,
}

#[derive(Debug, Clone)]
pub enum SessionAction {
    /// A script was accepted. Invalidates every derived stage.
    InstallScript(String),
    SetTitles(Vec<String>),
    /// In-place replacement after translation: order and count preserved,
    /// curation state survives.
    SetTranslatedTitles(Vec<String>),
    ToggleTitleSelection(usize),
    ChooseTitle(Option<usize>),
    SetThumbnailPrompt(String),
    /// Free-form user edit; not re-validated against any contract.
    EditThumbnailPrompt(String),
    SetThumbnailImage(Vec<u8>),
    SetScenePrompts(Vec<String>),
    SetSceneImage(usize, SceneImageState),
    SetVideoPrompts(Vec<String>),
    ToggleVideoDone(usize),
    LoadProject(Project),
    Reset,
}

/// The project currently being edited, as opposed to the persisted
/// collection. Owns exactly one Project-shaped state at a time.
#[derive(Debug, Default)]
pub struct Session {
    pub project_id: Option<String>,
    pub input_mode: InputMode,
    pub source_text: String,
    pub language: Language,
    pub script: Option<String>,
    pub titles: TitleSet,
    pub include_keywords: String,
    pub exclude_keywords: String,
    pub thumbnail_prompt: Option<String>,
    pub thumbnail_image: Option<Vec<u8>>,
    pub scene_prompts: Vec<String>,
    pub scene_images: HashMap<usize, SceneImageState>,
    pub video_prompts: Vec<String>,
    pub video_done: Vec<bool>,
    pub status: ProductionStatus,
    tokens: HashMap<Slot, u64>,
    next_token: u64,
}

impl Session {
    pub fn new(input_mode: InputMode, source_text: String, language: Language) -> Self {
        Self {
            input_mode,
            source_text,
            language,
            ..Self::default()
        }
    }

    /// Stamp a new in-flight request for `slot`, superseding any pending one.
    pub fn begin_request(&mut self, slot: Slot) -> RequestToken {
        self.next_token += 1;
        self.tokens.insert(slot, self.next_token);
        RequestToken(self.next_token)
    }

    pub fn is_current(&self, slot: Slot, token: RequestToken) -> bool {
        self.tokens.get(&slot) == Some(&token.0)
    }

    fn clear_derived(&mut self) {
        self.titles = TitleSet::default();
        self.include_keywords.clear();
        self.exclude_keywords.clear();
        self.thumbnail_prompt = None;
        self.thumbnail_image = None;
        self.scene_prompts.clear();
        self.scene_images.clear();
        self.video_prompts.clear();
        self.video_done.clear();
    }

    pub fn apply(&mut self, action: SessionAction) {
        match action {
            SessionAction::InstallScript(text) => {
                self.clear_derived();
                self.script = Some(text);
            }
            SessionAction::SetTitles(titles) => {
                self.titles = TitleSet {
                    titles,
                    selected: BTreeSet::new(),
                    chosen: None,
                };
            }
            SessionAction::SetTranslatedTitles(titles) => {
                debug_assert_eq!(titles.len(), self.titles.titles.len());
                self.titles.titles = titles;
            }
            SessionAction::ToggleTitleSelection(i) => {
                if i < self.titles.titles.len() && !self.titles.selected.remove(&i) {
                    self.titles.selected.insert(i);
                }
            }
            SessionAction::ChooseTitle(choice) => {
                self.titles.chosen = choice.filter(|&i| i < self.titles.titles.len());
            }
            SessionAction::SetThumbnailPrompt(prompt)
            | SessionAction::EditThumbnailPrompt(prompt) => {
                self.thumbnail_prompt = Some(prompt);
            }
            SessionAction::SetThumbnailImage(bytes) => {
                self.thumbnail_image = Some(bytes);
            }
            SessionAction::SetScenePrompts(prompts) => {
                self.scene_prompts = prompts;
                self.scene_images.clear();
                self.video_prompts.clear();
                self.video_done.clear();
            }
            SessionAction::SetSceneImage(i, state) => {
                if i < self.scene_prompts.len() {
                    self.scene_images.insert(i, state);
                }
            }
            SessionAction::SetVideoPrompts(prompts) => {
                self.video_done = vec![false; prompts.len()];
                self.video_prompts = prompts;
            }
            SessionAction::ToggleVideoDone(i) => {
                if let Some(flag) = self.video_done.get_mut(i) {
                    *flag = !*flag;
                }
            }
            SessionAction::LoadProject(project) => {
                *self = Self::from_project(project);
            }
            SessionAction::Reset => {
                *self = Self::default();
            }
        }
    }

    /// Replace the whole working state with a stored project's fields and
    /// bind the session identity to it.
    fn from_project(project: Project) -> Self {
        let chosen = project
            .chosen_title
            .as_deref()
            .and_then(|t| project.titles.iter().position(|c| c == t));
        let mut video_done = project.video_done;
        video_done.resize(project.video_prompts.len(), false);

        Self {
            project_id: Some(project.id),
            input_mode: project.input_mode,
            source_text: project.source_text,
            language: project.language,
            script: if project.script.is_empty() {
                None
            } else {
                Some(project.script)
            },
            titles: TitleSet {
                titles: project.titles,
                selected: BTreeSet::new(),
                chosen,
            },
            thumbnail_prompt: if project.thumbnail_prompt.is_empty() {
                None
            } else {
                Some(project.thumbnail_prompt)
            },
            thumbnail_image: project.thumbnail_image.as_deref().and_then(|b64| {
                base64::engine::general_purpose::STANDARD.decode(b64).ok()
            }),
            scene_prompts: project.scene_prompts,
            video_prompts: project.video_prompts,
            video_done,
            status: project.status,
            ..Self::default()
        }
    }

    /// The single composed export blob: chosen title, thumbnail prompt and
    /// full script, delimited by a fixed separator. All three parts are
    /// required.
    pub fn export_document(&self) -> Option<String> {
        let title = self.titles.chosen_title()?;
        let thumbnail = self.thumbnail_prompt.as_deref().filter(|p| !p.is_empty())?;
        let script = self.script.as_deref().filter(|s| !s.is_empty())?;
        Some(format!(
            "Title: {title}\n\n---\n\nThumbnail prompt suggestion:\n{thumbnail}\n\n---\n\n\
             Generated script:\n\n{script}"
        ))
    }
}
