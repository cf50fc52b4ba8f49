//! Derived-asset pipeline: the four stage operations (titles, thumbnail,
//! scene images, scene videos) plus logline generation and title
//! translation. Every stage is independently re-triggerable once a script
//! is accepted; failures are stage-local and leave the stage's prior state
//! untouched.

use crate::api::{
    GenerationError, Generator, SCENE_PROMPTS_SHAPE, TITLES_SHAPE, TRANSLATED_TITLES_SHAPE,
    VIDEO_PROMPTS_SHAPE,
};
use crate::language::Language;
use crate::prompt;
use crate::session::{SceneImageState, Session, SessionAction, Slot};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum StageError {
    #[error("the idea text is empty; nothing to generate from")]
    EmptyInput,
    #[error("no accepted script; generate a script first")]
    ScriptMissing,
    #[error("no titles to translate; generate titles first")]
    TitlesMissing,
    #[error("no thumbnail prompt; generate one first")]
    ThumbnailPromptMissing,
    #[error("no scene image prompts; generate scene prompts before video prompts")]
    ScenePromptsMissing,
    #[error("generation service returned {got} entries, expected {expected}")]
    LengthMismatch { expected: usize, got: usize },
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// One-sentence logline from a raw idea. The response is collapsed to a
/// single trimmed line.
pub async fn generate_logline(
    generator: &dyn Generator,
    idea: &str,
    language: Language,
) -> Result<String, StageError> {
    if idea.trim().is_empty() {
        return Err(StageError::EmptyInput);
    }
    let text = generator
        .generate_text(&prompt::logline_prompt(idea, language))
        .await?;
    Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn script_of(session: &Session) -> Result<String, StageError> {
    session
        .script
        .clone()
        .filter(|s| !s.trim().is_empty())
        .ok_or(StageError::ScriptMissing)
}

/// Titles stage, first batch.
pub async fn generate_titles(
    generator: &dyn Generator,
    session: &mut Session,
) -> Result<(), StageError> {
    let script = script_of(session)?;
    let token = session.begin_request(Slot::Titles);
    let titles = generator
        .generate_string_list(&prompt::titles_prompt(&script, session.language), &TITLES_SHAPE)
        .await?;
    info!(count = titles.len(), "titles generated");
    if session.is_current(Slot::Titles, token) {
        session.apply(SessionAction::SetTitles(titles));
    }
    Ok(())
}

/// Titles stage, regeneration steered by the current selection and the
/// session's include/exclude keyword filters. A fresh batch replaces the
/// old one and starts unselected.
pub async fn regenerate_titles(
    generator: &dyn Generator,
    session: &mut Session,
) -> Result<(), StageError> {
    let script = script_of(session)?;
    let selected = session.titles.selected_titles();
    let regen_prompt = prompt::titles_regen_prompt(
        &script,
        session.language,
        &selected,
        &session.include_keywords,
        &session.exclude_keywords,
    );
    let token = session.begin_request(Slot::Titles);
    let titles = generator
        .generate_string_list(&regen_prompt, &TITLES_SHAPE)
        .await?;
    info!(count = titles.len(), steered_by = selected.len(), "titles regenerated");
    if session.is_current(Slot::Titles, token) {
        session.apply(SessionAction::SetTitles(titles));
    }
    Ok(())
}

/// Translate the existing title set in place. A transform, not a new
/// generation: order and count must survive, and a count mismatch from the
/// service is rejected without touching the set.
pub async fn translate_titles(
    generator: &dyn Generator,
    session: &mut Session,
    target: Language,
) -> Result<(), StageError> {
    if session.titles.titles.is_empty() {
        return Err(StageError::TitlesMissing);
    }
    let token = session.begin_request(Slot::Titles);
    let translated = generator
        .generate_string_list(
            &prompt::translate_titles_prompt(&session.titles.titles, target),
            &TRANSLATED_TITLES_SHAPE,
        )
        .await?;
    if translated.len() != session.titles.titles.len() {
        return Err(StageError::LengthMismatch {
            expected: session.titles.titles.len(),
            got: translated.len(),
        });
    }
    if session.is_current(Slot::Titles, token) {
        session.apply(SessionAction::SetTranslatedTitles(translated));
        session.language = target;
    }
    Ok(())
}

/// Thumbnail stage: one editable image-generation instruction.
pub async fn generate_thumbnail_prompt(
    generator: &dyn Generator,
    session: &mut Session,
) -> Result<(), StageError> {
    let script = script_of(session)?;
    let token = session.begin_request(Slot::ThumbnailPrompt);
    let text = generator
        .generate_text(&prompt::thumbnail_prompt_prompt(&script, session.language))
        .await?;
    if session.is_current(Slot::ThumbnailPrompt, token) {
        session.apply(SessionAction::SetThumbnailPrompt(text.trim().to_string()));
    }
    Ok(())
}

/// Render the thumbnail image from the (possibly hand-edited) prompt.
/// Explicitly decoupled from prompt generation.
pub async fn generate_thumbnail_image(
    generator: &dyn Generator,
    session: &mut Session,
) -> Result<(), StageError> {
    let scene = session
        .thumbnail_prompt
        .clone()
        .filter(|p| !p.trim().is_empty())
        .ok_or(StageError::ThumbnailPromptMissing)?;
    let token = session.begin_request(Slot::ThumbnailImage);
    let bytes = generator.generate_image(&prompt::image_prompt(&scene)).await?;
    info!(bytes = bytes.len(), "thumbnail image generated");
    if session.is_current(Slot::ThumbnailImage, token) {
        session.apply(SessionAction::SetThumbnailImage(bytes));
    }
    Ok(())
}

/// Scene-images stage: one chronological pass over the script producing the
/// configured number of image prompts. The count is a target; a short or
/// long return is logged and kept.
pub async fn generate_scene_prompts(
    generator: &dyn Generator,
    session: &mut Session,
    count: usize,
) -> Result<(), StageError> {
    let script = script_of(session)?;
    let token = session.begin_request(Slot::ScenePrompts);
    let prompts = generator
        .generate_string_list(
            &prompt::scene_prompts_prompt(&script, session.language, count),
            &SCENE_PROMPTS_SHAPE,
        )
        .await?;
    if prompts.len() != count {
        warn!(requested = count, got = prompts.len(), "scene prompt count differs from target");
    }
    if session.is_current(Slot::ScenePrompts, token) {
        session.apply(SessionAction::SetScenePrompts(prompts));
    }
    Ok(())
}

/// Scene-videos stage. Precondition: a non-empty scene-prompt set, checked
/// before any client call. The returned set must align 1:1 by index with
/// the input; a mismatch is a service-contract violation and nothing is
/// applied.
pub async fn generate_video_prompts(
    generator: &dyn Generator,
    session: &mut Session,
) -> Result<(), StageError> {
    if session.scene_prompts.is_empty() {
        return Err(StageError::ScenePromptsMissing);
    }
    let expected = session.scene_prompts.len();
    let token = session.begin_request(Slot::VideoPrompts);
    let videos = generator
        .generate_string_list(
            &prompt::video_prompts_prompt(&session.scene_prompts, session.language),
            &VIDEO_PROMPTS_SHAPE,
        )
        .await?;
    if videos.len() != expected {
        return Err(StageError::LengthMismatch {
            expected,
            got: videos.len(),
        });
    }
    info!(count = videos.len(), "video prompts generated");
    if session.is_current(Slot::VideoPrompts, token) {
        session.apply(SessionAction::SetVideoPrompts(videos));
    }
    Ok(())
}

/// Generate the image for one scene index. The session records Loading up
/// front; the result is applied only if the request is still current.
pub async fn generate_scene_image(
    generator: &dyn Generator,
    session: &mut Session,
    index: usize,
) -> Result<(), StageError> {
    let scene = session
        .scene_prompts
        .get(index)
        .cloned()
        .ok_or(StageError::ScenePromptsMissing)?;
    let token = session.begin_request(Slot::SceneImage(index));
    session.apply(SessionAction::SetSceneImage(index, SceneImageState::Loading));

    let outcome = generator.generate_image(&prompt::image_prompt(&scene)).await;
    if session.is_current(Slot::SceneImage(index), token) {
        let state = match &outcome {
            Ok(bytes) => SceneImageState::Ready(bytes.clone()),
            Err(e) => SceneImageState::Failed(e.to_string()),
        };
        session.apply(SessionAction::SetSceneImage(index, state));
    }
    outcome.map(|_| ()).map_err(StageError::from)
}

/// Unbounded fan-out: one independent task per requested scene index, no
/// ordering guarantee between them. Returns each index with its outcome.
pub async fn fan_out_scene_images(
    generator: Arc<dyn Generator>,
    scenes: Vec<(usize, String)>,
) -> Vec<(usize, Result<Vec<u8>, GenerationError>)> {
    let mut set = JoinSet::new();
    for (index, scene) in scenes {
        let generator = Arc::clone(&generator);
        set.spawn(async move {
            let result = generator.generate_image(&prompt::image_prompt(&scene)).await;
            (index, result)
        });
    }

    let mut out = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok(pair) => out.push(pair),
            Err(e) => warn!("scene image task panicked: {e}"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::test_support::{words, MockGenerator, MockReply};
    use crate::store::InputMode;

    fn session_with_script() -> Session {
        let mut s = Session::new(InputMode::SourceText, "source".to_string(), Language::En);
        s.apply(SessionAction::InstallScript(words(5200)));
        s
    }

    #[tokio::test]
    async fn titles_stage_requires_a_script() {
        let generator = MockGenerator::new(vec![]);
        let mut s = Session::default();
        let err = generate_titles(&generator, &mut s).await.unwrap_err();
        assert!(matches!(err, StageError::ScriptMissing));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn titles_stage_installs_fresh_unselected_batch() {
        let generator = MockGenerator::new(vec![MockReply::List(vec![
            "One".to_string(),
            "Two".to_string(),
        ])]);
        let mut s = session_with_script();
        generate_titles(&generator, &mut s).await.unwrap();
        assert_eq!(s.titles.titles, vec!["One", "Two"]);
        assert!(s.titles.selected.is_empty());
    }

    #[tokio::test]
    async fn regeneration_steers_with_selection_and_keywords() {
        let generator = MockGenerator::new(vec![
            MockReply::List(vec![
                "Alpha".to_string(),
                "Beta".to_string(),
                "Gamma".to_string(),
            ]),
            MockReply::List(vec!["Fresh One".to_string(), "Fresh Two".to_string()]),
        ]);
        let mut s = session_with_script();
        generate_titles(&generator, &mut s).await.unwrap();
        s.apply(SessionAction::ToggleTitleSelection(0));
        s.apply(SessionAction::ToggleTitleSelection(2));
        s.include_keywords = "mystery".to_string();
        s.exclude_keywords = "shocking".to_string();

        regenerate_titles(&generator, &mut s).await.unwrap();

        let regen_prompt = &generator.prompts()[1];
        assert!(regen_prompt.contains("Alpha"));
        assert!(regen_prompt.contains("Gamma"));
        assert!(!regen_prompt.contains("Beta\n"));
        assert!(regen_prompt.contains("\"mystery\""));
        assert!(regen_prompt.contains("\"shocking\""));

        assert_eq!(s.titles.titles, vec!["Fresh One", "Fresh Two"]);
        assert!(s.titles.selected.is_empty());
    }

    #[tokio::test]
    async fn translation_preserves_count_and_order() {
        let generator = MockGenerator::new(vec![MockReply::List(vec![
            "Uno".to_string(),
            "Dos".to_string(),
            "Tres".to_string(),
        ])]);
        let mut s = session_with_script();
        s.apply(SessionAction::SetTitles(vec![
            "One".to_string(),
            "Two".to_string(),
            "Three".to_string(),
        ]));
        translate_titles(&generator, &mut s, Language::Es).await.unwrap();
        assert_eq!(s.titles.titles, vec!["Uno", "Dos", "Tres"]);
        assert_eq!(s.language, Language::Es);
    }

    #[tokio::test]
    async fn translated_titles_survive_a_failed_save() {
        let generator = MockGenerator::new(vec![MockReply::List(vec![
            "Uno".to_string(),
            "Dos".to_string(),
        ])]);
        let mut s = session_with_script();
        s.apply(SessionAction::SetTitles(vec![
            "One".to_string(),
            "Two".to_string(),
        ]));
        translate_titles(&generator, &mut s, Language::Es).await.unwrap();

        // A store rooted under a plain file cannot be read or written.
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let store = crate::store::ProjectStore::new(blocker.join("projects.json"));
        assert!(store.save(&mut s).is_err());

        assert_eq!(s.titles.titles, vec!["Uno", "Dos"]);
        assert_eq!(s.language, Language::Es);
        assert!(s.project_id.is_none());
    }

    #[tokio::test]
    async fn translation_count_mismatch_is_rejected() {
        let generator =
            MockGenerator::new(vec![MockReply::List(vec!["Solo Uno".to_string()])]);
        let mut s = session_with_script();
        s.apply(SessionAction::SetTitles(vec![
            "One".to_string(),
            "Two".to_string(),
        ]));
        let err = translate_titles(&generator, &mut s, Language::Es).await.unwrap_err();
        assert!(matches!(
            err,
            StageError::LengthMismatch { expected: 2, got: 1 }
        ));
        assert_eq!(s.titles.titles, vec!["One", "Two"]);
    }

    #[tokio::test]
    async fn video_stage_requires_scene_prompts_before_any_call() {
        let generator = MockGenerator::new(vec![]);
        let mut s = session_with_script();
        let err = generate_video_prompts(&generator, &mut s).await.unwrap_err();
        assert!(matches!(err, StageError::ScenePromptsMissing));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn video_stage_aligns_one_to_one_by_index() {
        let scenes: Vec<String> = (0..100).map(|i| format!("scene {i}")).collect();
        let videos: Vec<String> = (0..100).map(|i| format!("motion for scene {i}")).collect();
        let generator = MockGenerator::new(vec![MockReply::List(videos)]);

        let mut s = session_with_script();
        s.apply(SessionAction::SetScenePrompts(scenes));
        generate_video_prompts(&generator, &mut s).await.unwrap();

        assert_eq!(s.video_prompts.len(), 100);
        for (i, v) in s.video_prompts.iter().enumerate() {
            assert_eq!(v, &format!("motion for scene {i}"));
        }
        assert_eq!(s.video_done.len(), 100);
        assert!(s.video_done.iter().all(|&done| !done));
    }

    #[tokio::test]
    async fn video_stage_rejects_misaligned_result() {
        let generator = MockGenerator::new(vec![MockReply::List(vec![
            "only one motion".to_string(),
        ])]);
        let mut s = session_with_script();
        s.apply(SessionAction::SetScenePrompts(vec![
            "scene a".to_string(),
            "scene b".to_string(),
        ]));
        let err = generate_video_prompts(&generator, &mut s).await.unwrap_err();
        assert!(matches!(err, StageError::LengthMismatch { expected: 2, got: 1 }));
        assert!(s.video_prompts.is_empty());
    }

    #[tokio::test]
    async fn failed_stage_leaves_prior_output_in_place() {
        let generator = MockGenerator::new(vec![
            MockReply::List(vec!["Keep Me".to_string()]),
            MockReply::Fail("service down".to_string()),
        ]);
        let mut s = session_with_script();
        generate_titles(&generator, &mut s).await.unwrap();
        let err = regenerate_titles(&generator, &mut s).await.unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));
        assert_eq!(s.titles.titles, vec!["Keep Me"]);
    }

    #[tokio::test]
    async fn thumbnail_image_uses_edited_prompt() {
        let generator = MockGenerator::new(vec![MockReply::Image(vec![0xFF, 0xD8])]);
        let mut s = session_with_script();
        s.apply(SessionAction::EditThumbnailPrompt("hand-written scene".to_string()));
        generate_thumbnail_image(&generator, &mut s).await.unwrap();
        assert!(generator.prompts()[0].contains("hand-written scene"));
        assert_eq!(s.thumbnail_image, Some(vec![0xFF, 0xD8]));
    }

    #[tokio::test]
    async fn thumbnail_image_requires_a_prompt() {
        let generator = MockGenerator::new(vec![]);
        let mut s = session_with_script();
        let err = generate_thumbnail_image(&generator, &mut s).await.unwrap_err();
        assert!(matches!(err, StageError::ThumbnailPromptMissing));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn logline_collapses_to_one_line() {
        let generator = MockGenerator::new(vec![MockReply::Text(
            "A detective\nhunts the truth\r\n  across decades.".to_string(),
        )]);
        let logline = generate_logline(&generator, "an idea", Language::En).await.unwrap();
        assert_eq!(logline, "A detective hunts the truth across decades.");
    }

    #[tokio::test]
    async fn logline_rejects_empty_idea() {
        let generator = MockGenerator::new(vec![]);
        let err = generate_logline(&generator, "  ", Language::En).await.unwrap_err();
        assert!(matches!(err, StageError::EmptyInput));
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn scene_image_failure_is_recorded_per_index() {
        let generator = MockGenerator::new(vec![
            MockReply::Image(vec![1]),
            MockReply::Fail("no image".to_string()),
        ]);
        let mut s = session_with_script();
        s.apply(SessionAction::SetScenePrompts(vec![
            "scene a".to_string(),
            "scene b".to_string(),
        ]));

        generate_scene_image(&generator, &mut s, 0).await.unwrap();
        let err = generate_scene_image(&generator, &mut s, 1).await.unwrap_err();
        assert!(matches!(err, StageError::Generation(_)));

        assert_eq!(s.scene_images[&0], SceneImageState::Ready(vec![1]));
        assert!(matches!(s.scene_images[&1], SceneImageState::Failed(_)));
    }

    #[tokio::test]
    async fn fan_out_covers_every_requested_index() {
        let generator = Arc::new(MockGenerator::new(vec![
            MockReply::Image(vec![1]),
            MockReply::Image(vec![2]),
            MockReply::Image(vec![3]),
        ]));
        let scenes = vec![
            (0, "a".to_string()),
            (4, "b".to_string()),
            (9, "c".to_string()),
        ];
        let mut results = fan_out_scene_images(generator, scenes).await;
        results.sort_by_key(|(i, _)| *i);
        let indices: Vec<usize> = results.iter().map(|(i, _)| *i).collect();
        assert_eq!(indices, vec![0, 4, 9]);
        assert!(results.iter().all(|(_, r)| r.is_ok()));
    }

    #[tokio::test]
    async fn end_to_end_scenario_from_input_to_saved_project() {
        use crate::store::ProjectStore;

        let dir = tempfile::tempdir().unwrap();
        let store = ProjectStore::new(dir.path().join("projects.json"));

        let source = words(200);
        let generator = MockGenerator::new(vec![
            MockReply::Text(words(5200)),
            MockReply::List(vec![
                "T1".to_string(),
                "T2".to_string(),
                "T3".to_string(),
                "T4".to_string(),
                "T5".to_string(),
                "T6".to_string(),
            ]),
            MockReply::List(vec![
                "Mystery One".to_string(),
                "Mystery Two".to_string(),
                "Mystery Three".to_string(),
                "Mystery Four".to_string(),
                "Mystery Five".to_string(),
            ]),
        ]);

        let mut s = Session::new(InputMode::SourceText, source.clone(), Language::En);
        let mut ctl = crate::script::ScriptController::new(crate::script::WordBand::new(5000, 6500));
        let outcome = ctl.generate(&generator, &source, Language::En).await.unwrap();
        let crate::script::GenerateOutcome::Accepted(attempt) = outcome else {
            panic!("expected direct acceptance");
        };
        s.apply(SessionAction::InstallScript(attempt.text));

        generate_titles(&generator, &mut s).await.unwrap();
        assert_eq!(s.titles.titles.len(), 6);
        s.apply(SessionAction::ToggleTitleSelection(1));
        s.apply(SessionAction::ToggleTitleSelection(3));

        s.include_keywords = "mystery".to_string();
        regenerate_titles(&generator, &mut s).await.unwrap();
        assert!(generator.prompts()[2].contains("\"mystery\""));
        assert_eq!(s.titles.titles.len(), 5);
        assert!(s.titles.selected.is_empty());

        s.apply(SessionAction::ChooseTitle(Some(0)));
        store.save(&mut s).unwrap();

        let stored = store.list();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].title, "Mystery One");
        assert_eq!(crate::script::word_count(&stored[0].script), 5200);
    }
}
