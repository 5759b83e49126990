//! Turning a cast hexagram into text.
//!
//! [`Interpreter`] wraps an [`InterpretationService`] with a hard timeout,
//! splits the returned text into interpretation and advice, and replaces every
//! failure with deterministic fallback text. It never returns an error.
//!
//! - [`prompt`] - Prompt construction.
//! - [`dashscope`] - The production service client.
//! - [`retry`] - Backoff policy used by the client.

pub mod dashscope;
pub mod prompt;
pub mod retry;

use crate::{Error, Result, telemetry};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use yijing::Reading;

pub const DEFAULT_ADVICE_MARKER: &str = "建议：";

/// Advice used when the generated text has no advice marker.
pub const DEFAULT_ADVICE: &str = "根据卦象，建议谨慎行事，顺应自然。";

/// Advice used when the interpretation could not be generated.
pub const FALLBACK_ADVICE: &str = "建议顺应自然，谨慎行事。";

/// A text-generation backend.
///
/// Implementations perform their own retries; the caller bounds the whole
/// call with a timeout.
pub trait InterpretationService: Send + Sync + 'static {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String>>;
}

/// What to interpret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpretRequest {
    pub matter: String,
    pub hexagram: String,
    pub lines: Reading,
}

/// Interpretation and advice; both non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interpretation {
    pub interpretation: String,
    pub advice: String,
}

impl Interpretation {
    /// The fixed text used whenever generation fails.
    pub fn fallback(hexagram: &str) -> Self {
        Self {
            interpretation: format!("卦象{hexagram}表示...(API调用失败，使用默认解读)"),
            advice: FALLBACK_ADVICE.to_string(),
        }
    }

    /// Splits generated text at the first `marker`.
    ///
    /// Text before the marker is the interpretation; the marker and
    /// everything after it is the advice. Without a marker, or with nothing
    /// before it, the whole text is the interpretation. Without a marker the
    /// advice is [`DEFAULT_ADVICE`].
    pub fn split(text: &str, marker: &str) -> Self {
        let text = text.trim();
        match text.split_once(marker) {
            Some((before, after)) => {
                let before = before.trim();
                let interpretation = if before.is_empty() { text } else { before };
                Self {
                    interpretation: interpretation.to_string(),
                    advice: format!("{marker}{}", after.trim()),
                }
            }
            None => Self {
                interpretation: text.to_string(),
                advice: DEFAULT_ADVICE.to_string(),
            },
        }
    }
}

/// Bounded, infallible interpretation.
#[derive(Clone)]
pub struct Interpreter {
    service: Arc<dyn InterpretationService>,
    timeout: Duration,
    advice_marker: Arc<str>,
}

impl core::fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Interpreter")
            .field("timeout", &self.timeout)
            .field("advice_marker", &self.advice_marker)
            .finish_non_exhaustive()
    }
}

impl Interpreter {
    pub fn new(
        service: Arc<dyn InterpretationService>,
        timeout: Duration,
        advice_marker: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            service,
            timeout,
            advice_marker: advice_marker.into(),
        }
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Calls the service once, within the timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] if the service has no credential.
    /// - [`Error::ServiceUnavailable`] on service failure, timeout, or empty
    ///   text.
    pub async fn try_interpret(&self, request: &InterpretRequest) -> Result<Interpretation> {
        let prompt = prompt::build_prompt(request);
        let text = tokio::time::timeout(self.timeout, self.service.generate(&prompt))
            .await
            .map_err(|_| Error::ServiceUnavailable {
                reason: format!("timed out after {:?}", self.timeout),
            })??;

        if text.trim().is_empty() {
            return Err(Error::ServiceUnavailable {
                reason: "empty response text".to_string(),
            });
        }
        Ok(Interpretation::split(&text, &self.advice_marker))
    }

    /// Like [`try_interpret`](Self::try_interpret) but never fails: errors
    /// become [`Interpretation::fallback`].
    #[tracing::instrument(skip_all, fields(hexagram = %request.hexagram))]
    pub async fn interpret(&self, request: &InterpretRequest) -> Interpretation {
        let started = Instant::now();
        let result = self.try_interpret(request).await;
        telemetry::record_interpret_duration(started.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(interpretation) => interpretation,
            Err(e) => {
                let reason = match &e {
                    Error::Configuration { .. } => "configuration",
                    _ => "unavailable",
                };
                tracing::warn!(error = %e, "Interpretation failed, using fallback");
                telemetry::increment_fallbacks(reason);
                Interpretation::fallback(&request.hexagram)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::{testing::*, *};
    use yijing::Line;

    fn request() -> InterpretRequest {
        InterpretRequest {
            matter: "出行".into(),
            hexagram: "乾为天".into(),
            lines: Reading::new([Line::YoungYang; 6]),
        }
    }

    #[test]
    fn split_at_marker() {
        let got = Interpretation::split("  乾卦刚健。\n建议：自强不息。 ", "建议：");
        assert_eq!(got.interpretation, "乾卦刚健。");
        assert_eq!(got.advice, "建议：自强不息。");
    }

    #[test]
    fn split_uses_first_marker_and_keeps_the_rest() {
        let got = Interpretation::split("A建议：B建议：C", "建议：");
        assert_eq!(got.interpretation, "A");
        assert_eq!(got.advice, "建议：B建议：C");
    }

    #[test]
    fn split_without_marker_uses_default_advice() {
        let got = Interpretation::split("只有解读", "建议：");
        assert_eq!(got.interpretation, "只有解读");
        assert_eq!(got.advice, DEFAULT_ADVICE);
    }

    #[test]
    fn split_with_leading_marker_keeps_text_as_interpretation() {
        let got = Interpretation::split("建议：静待时机。", "建议：");
        assert_eq!(got.interpretation, "建议：静待时机。");
        assert_eq!(got.advice, "建议：静待时机。");
    }

    #[test]
    fn split_with_custom_marker() {
        let got = Interpretation::split("Calm seas. Advice: wait.", "Advice:");
        assert_eq!(got.interpretation, "Calm seas.");
        assert_eq!(got.advice, "Advice:wait.");
    }

    #[test]
    fn fallback_names_the_hexagram() {
        let got = Interpretation::fallback("地天泰");
        assert_eq!(got.interpretation, "卦象地天泰表示...(API调用失败，使用默认解读)");
        assert_eq!(got.advice, FALLBACK_ADVICE);
    }

    #[tokio::test]
    async fn success_is_split() {
        let service = Scripted::reply("元亨利贞。建议：守正。");
        let got = interpreter(service.clone()).interpret(&request()).await;
        assert_eq!(got.interpretation, "元亨利贞。");
        assert_eq!(got.advice, "建议：守正。");
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn failure_falls_back() {
        let got = interpreter(Scripted::new(Behavior::Fail))
            .interpret(&request())
            .await;
        assert_eq!(got, Interpretation::fallback("乾为天"));
    }

    #[tokio::test]
    async fn empty_text_falls_back() {
        let got = interpreter(Scripted::reply("   ")).interpret(&request()).await;
        assert_eq!(got, Interpretation::fallback("乾为天"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back() {
        let interpreter = interpreter(Scripted::new(Behavior::Hang));
        assert!(matches!(
            interpreter.try_interpret(&request()).await,
            Err(Error::ServiceUnavailable { .. })
        ));
        let got = interpreter.interpret(&request()).await;
        assert_eq!(got, Interpretation::fallback("乾为天"));
    }
}
