//! Script generation: word-count measurement, band classification and the
//! accept/retry state machine over one working script.

use crate::api::{GenerationError, Generator};
use crate::language::Language;
use crate::prompt;
use thiserror::Error;
use tracing::info;

/// Whitespace-delimited token count of the trimmed text. Empty text is 0.
pub fn word_count(text: &str) -> usize {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        0
    } else {
        trimmed.split_whitespace().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    WithinBand,
    BelowBand,
    AboveBand,
}

/// Inclusive acceptable word-count range for a generated script. A
/// configuration value, not a hardcoded literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WordBand {
    pub min: usize,
    pub max: usize,
}

impl WordBand {
    pub fn new(min: usize, max: usize) -> Self {
        Self { min, max }
    }

    pub fn classify(&self, count: usize) -> Verdict {
        if count < self.min {
            Verdict::BelowBand
        } else if count > self.max {
            Verdict::AboveBand
        } else {
            Verdict::WithinBand
        }
    }
}

/// One measured generation result. Never mutated; a retry supersedes it
/// with a fresh attempt.
#[derive(Debug, Clone)]
pub struct ScriptAttempt {
    pub text: String,
    pub word_count: usize,
    pub verdict: Verdict,
}

impl ScriptAttempt {
    pub fn measure(text: String, band: &WordBand) -> Self {
        let count = word_count(&text);
        Self {
            verdict: band.classify(count),
            word_count: count,
            text,
        }
    }
}

/// Carries the prior attempt into a corrective regeneration prompt.
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub previous_text: String,
    pub previous_word_count: usize,
    pub verdict: Verdict,
}

impl RetryContext {
    pub fn new(previous_text: String, previous_word_count: usize, band: &WordBand) -> Self {
        Self {
            verdict: band.classify(previous_word_count),
            previous_text,
            previous_word_count,
        }
    }

    fn from_attempt(attempt: &ScriptAttempt) -> Self {
        Self {
            previous_text: attempt.text.clone(),
            previous_word_count: attempt.word_count,
            verdict: attempt.verdict,
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("source text is empty; nothing to transform")]
    EmptyInput,
    #[error("no out-of-band attempt is pending a decision")]
    NoPendingAttempt,
    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[derive(Debug, Clone)]
enum State {
    Idle,
    Accepted(ScriptAttempt),
    NeedsDecision(ScriptAttempt),
}

/// What a (re)generation call resolved to. Out-of-band results are a
/// decision point, never an error.
#[derive(Debug, Clone)]
pub enum GenerateOutcome {
    Accepted(ScriptAttempt),
    NeedsDecision {
        attempt: ScriptAttempt,
        message: String,
    },
}

/// State machine over one working script. Out-of-band drafts get one
/// automatic corrective pass; beyond that every retry is user-initiated,
/// each using the most recent attempt as its correction baseline. Service
/// failures abort the in-flight transition and leave prior state untouched.
pub struct ScriptController {
    band: WordBand,
    state: State,
}

impl ScriptController {
    pub fn new(band: WordBand) -> Self {
        Self {
            band,
            state: State::Idle,
        }
    }

    pub fn band(&self) -> WordBand {
        self.band
    }

    pub fn accepted(&self) -> Option<&ScriptAttempt> {
        match &self.state {
            State::Accepted(attempt) => Some(attempt),
            _ => None,
        }
    }

    pub fn pending(&self) -> Option<&ScriptAttempt> {
        match &self.state {
            State::NeedsDecision(attempt) => Some(attempt),
            _ => None,
        }
    }

    fn decision_message(&self, attempt: &ScriptAttempt) -> String {
        match attempt.verdict {
            Verdict::BelowBand => format!(
                "The script came in at {} words, below the {}-{} target. Retry with an expansion \
                 instruction or accept it as-is.",
                attempt.word_count, self.band.min, self.band.max
            ),
            Verdict::AboveBand => format!(
                "The script came in at {} words, above the {}-{} target. Retry with a compression \
                 instruction or accept it as-is.",
                attempt.word_count, self.band.min, self.band.max
            ),
            Verdict::WithinBand => unreachable!("in-band attempts never need a decision"),
        }
    }

    fn settle(&mut self, attempt: ScriptAttempt) -> GenerateOutcome {
        if attempt.verdict == Verdict::WithinBand {
            info!(words = attempt.word_count, "script accepted in band");
            self.state = State::Accepted(attempt.clone());
            GenerateOutcome::Accepted(attempt)
        } else {
            let message = self.decision_message(&attempt);
            info!(words = attempt.word_count, "script out of band, awaiting decision");
            self.state = State::NeedsDecision(attempt.clone());
            GenerateOutcome::NeedsDecision { attempt, message }
        }
    }

    /// Generate a fresh script from `source`. In-band results are accepted
    /// directly; an out-of-band first draft gets exactly one automatic
    /// corrective regeneration before a decision is surfaced.
    pub async fn generate(
        &mut self,
        generator: &dyn Generator,
        source: &str,
        language: Language,
    ) -> Result<GenerateOutcome, ScriptError> {
        if source.trim().is_empty() {
            return Err(ScriptError::EmptyInput);
        }

        let first_prompt = prompt::script_prompt(source, language, &self.band, None);
        let text = generator.generate_text(&first_prompt).await?;
        let attempt = ScriptAttempt::measure(text, &self.band);

        if attempt.verdict == Verdict::WithinBand {
            return Ok(self.settle(attempt));
        }

        info!(
            words = attempt.word_count,
            "first draft out of band, running one corrective pass"
        );
        let ctx = RetryContext::from_attempt(&attempt);
        let retry_prompt = prompt::script_prompt(source, language, &self.band, Some(&ctx));
        let text = generator.generate_text(&retry_prompt).await?;
        Ok(self.settle(ScriptAttempt::measure(text, &self.band)))
    }

    /// User-initiated corrective retry from a pending decision. The
    /// corrective branch (expand vs compress) follows the most recent
    /// attempt's verdict.
    pub async fn retry_with_correction(
        &mut self,
        generator: &dyn Generator,
        source: &str,
        language: Language,
    ) -> Result<GenerateOutcome, ScriptError> {
        let ctx = match &self.state {
            State::NeedsDecision(attempt) => RetryContext::from_attempt(attempt),
            _ => return Err(ScriptError::NoPendingAttempt),
        };

        let retry_prompt = prompt::script_prompt(source, language, &self.band, Some(&ctx));
        let text = generator.generate_text(&retry_prompt).await?;
        Ok(self.settle(ScriptAttempt::measure(text, &self.band)))
    }

    /// Escape hatch: keep the pending out-of-band text as final. The band
    /// is a soft target, not a hard constraint.
    pub fn accept_current(&mut self) -> Option<&ScriptAttempt> {
        if let State::NeedsDecision(attempt) = &self.state {
            let attempt = attempt.clone();
            info!(words = attempt.word_count, "out-of-band script accepted as-is");
            self.state = State::Accepted(attempt);
        }
        self.accepted()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::api::{GenerationError, Generator, StringListShape};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug)]
    pub enum MockReply {
        Text(String),
        List(Vec<String>),
        Image(Vec<u8>),
        Fail(String),
    }

    /// Scripted generator: plays back queued replies in order and records
    /// every prompt it was handed.
    #[derive(Default)]
    pub struct MockGenerator {
        replies: Mutex<VecDeque<MockReply>>,
        prompts: Mutex<Vec<String>>,
    }

    impl MockGenerator {
        pub fn new(replies: Vec<MockReply>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }

        pub fn calls(&self) -> usize {
            self.prompts.lock().unwrap().len()
        }

        fn next(&self, prompt: &str) -> Result<MockReply, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.replies.lock().unwrap().pop_front() {
                Some(MockReply::Fail(msg)) => Err(GenerationError::Service {
                    status: 500,
                    message: msg,
                }),
                Some(reply) => Ok(reply),
                None => Err(GenerationError::EmptyResponse),
            }
        }
    }

    #[async_trait]
    impl Generator for MockGenerator {
        async fn generate_text(&self, prompt: &str) -> Result<String, GenerationError> {
            match self.next(prompt)? {
                MockReply::Text(t) => Ok(t),
                other => panic!("expected text reply, got {other:?}"),
            }
        }

        async fn generate_string_list(
            &self,
            prompt: &str,
            _shape: &StringListShape,
        ) -> Result<Vec<String>, GenerationError> {
            match self.next(prompt)? {
                MockReply::List(l) => Ok(l),
                other => panic!("expected list reply, got {other:?}"),
            }
        }

        async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, GenerationError> {
            match self.next(prompt)? {
                MockReply::Image(bytes) => Ok(bytes),
                other => panic!("expected image reply, got {other:?}"),
            }
        }
    }

    pub fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }
}
