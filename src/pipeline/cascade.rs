//! Detection cascade — ordered stages, stop at first success.
//!
//! The cascade itself is deliberately dumb: a loop over trait objects.
//! All matching intelligence lives in the stages; adding a tier means
//! pushing another stage, not touching this loop.

use std::sync::Arc;

use tracing::debug;

use crate::detect::index::AliasIndex;
use crate::detect::{DetectionStage, StageInput, StageMatch, StageOutcome};
use crate::pipeline::types::DetectionResult;

/// Ordered list of detection stages.
pub struct Cascade {
    stages: Vec<Arc<dyn DetectionStage>>,
}

impl Cascade {
    pub fn new(stages: Vec<Arc<dyn DetectionStage>>) -> Self {
        Self { stages }
    }

    /// Run stages in order until one matches.
    ///
    /// A near-miss from an earlier stage is carried into later stages as
    /// a hint, and the cascade keeps going. Each stage name is pushed onto
    /// `trace` as it runs.
    pub async fn run(
        &self,
        text: &str,
        index: &AliasIndex,
        trace: &mut Vec<String>,
    ) -> DetectionResult {
        let mut near_miss: Option<StageMatch> = None;

        for stage in &self.stages {
            let method = stage.method();
            trace.push(format!("stage:{method:?}"));
            let outcome = stage
                .detect(StageInput {
                    text,
                    index,
                    near_miss: near_miss.as_ref(),
                })
                .await;

            match outcome {
                StageOutcome::Match(m) => {
                    debug!(handle = %m.handle, ?method, confidence = m.confidence, "Cascade matched");
                    trace.push(format!("match:{}", m.handle));
                    return DetectionResult {
                        creator: Some(m.handle),
                        method,
                        confidence: m.confidence.clamp(0.0, 1.0),
                    };
                }
                StageOutcome::NearMiss(m) => {
                    debug!(handle = %m.handle, ?method, confidence = m.confidence, "Cascade near-miss");
                    trace.push(format!("near_miss:{}", m.handle));
                    near_miss = Some(m);
                }
                StageOutcome::Pass => {}
            }
        }

        trace.push("unresolved".to_string());
        DetectionResult::unresolved()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::config::CampaignConfig;
    use crate::pipeline::types::DetectionMethod;

    /// Stage double that records its call order and plays back a fixed
    /// outcome.
    struct Scripted {
        method: DetectionMethod,
        outcome: StageOutcome,
        order: Arc<AtomicUsize>,
        seen_at: AtomicUsize,
        saw_near_miss: AtomicUsize,
    }

    impl Scripted {
        fn new(method: DetectionMethod, outcome: StageOutcome, order: Arc<AtomicUsize>) -> Self {
            Self {
                method,
                outcome,
                order,
                seen_at: AtomicUsize::new(usize::MAX),
                saw_near_miss: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DetectionStage for Scripted {
        fn method(&self) -> DetectionMethod {
            self.method
        }

        async fn detect(&self, input: StageInput<'_>) -> StageOutcome {
            let n = self.order.fetch_add(1, Ordering::SeqCst);
            self.seen_at.store(n, Ordering::SeqCst);
            if input.near_miss.is_some() {
                self.saw_near_miss.fetch_add(1, Ordering::SeqCst);
            }
            self.outcome.clone()
        }
    }

    fn index() -> AliasIndex {
        AliasIndex::from_config(&CampaignConfig::demo()).unwrap()
    }

    fn matched(handle: &str, confidence: f64) -> StageOutcome {
        StageOutcome::Match(StageMatch {
            handle: handle.into(),
            confidence,
        })
    }

    #[tokio::test]
    async fn stops_at_first_match() {
        let order = Arc::new(AtomicUsize::new(0));
        let first = Arc::new(Scripted::new(
            DetectionMethod::Exact,
            matched("mkbhd", 1.0),
            order.clone(),
        ));
        let second = Arc::new(Scripted::new(
            DetectionMethod::Fuzzy,
            matched("casey_neistat", 0.9),
            order.clone(),
        ));
        let cascade = Cascade::new(vec![first.clone(), second.clone()]);

        let mut trace = Vec::new();
        let result = cascade.run("whatever", &index(), &mut trace).await;

        assert_eq!(result.creator.as_deref(), Some("mkbhd"));
        assert_eq!(result.method, DetectionMethod::Exact);
        assert_eq!(first.seen_at.load(Ordering::SeqCst), 0);
        // Second stage never ran.
        assert_eq!(second.seen_at.load(Ordering::SeqCst), usize::MAX);
    }

    #[tokio::test]
    async fn runs_stages_in_declared_order() {
        let order = Arc::new(AtomicUsize::new(0));
        let stages: Vec<Arc<Scripted>> = [
            DetectionMethod::Exact,
            DetectionMethod::Fuzzy,
            DetectionMethod::Llm,
        ]
        .into_iter()
        .map(|m| Arc::new(Scripted::new(m, StageOutcome::Pass, order.clone())))
        .collect();
        let cascade = Cascade::new(
            stages
                .iter()
                .map(|s| s.clone() as Arc<dyn DetectionStage>)
                .collect(),
        );

        let mut trace = Vec::new();
        let result = cascade.run("whatever", &index(), &mut trace).await;

        assert!(result.creator.is_none());
        assert_eq!(result.method, DetectionMethod::None);
        for (i, stage) in stages.iter().enumerate() {
            assert_eq!(stage.seen_at.load(Ordering::SeqCst), i);
        }
        assert_eq!(trace.last().map(String::as_str), Some("unresolved"));
    }

    #[tokio::test]
    async fn near_miss_is_forwarded_to_later_stages() {
        let order = Arc::new(AtomicUsize::new(0));
        let near = Arc::new(Scripted::new(
            DetectionMethod::Fuzzy,
            StageOutcome::NearMiss(StageMatch {
                handle: "mkbhd".into(),
                confidence: 0.7,
            }),
            order.clone(),
        ));
        let last = Arc::new(Scripted::new(
            DetectionMethod::Llm,
            StageOutcome::Pass,
            order.clone(),
        ));
        let cascade = Cascade::new(vec![near.clone(), last.clone()]);

        let mut trace = Vec::new();
        let result = cascade.run("whatever", &index(), &mut trace).await;

        assert!(result.creator.is_none());
        assert_eq!(last.saw_near_miss.load(Ordering::SeqCst), 1);
        assert!(trace.iter().any(|t| t == "near_miss:mkbhd"));
    }

    #[tokio::test]
    async fn match_confidence_is_clamped() {
        let order = Arc::new(AtomicUsize::new(0));
        let stage = Arc::new(Scripted::new(
            DetectionMethod::Llm,
            matched("mkbhd", 3.5),
            order,
        ));
        let cascade = Cascade::new(vec![stage]);
        let mut trace = Vec::new();
        let result = cascade.run("x", &index(), &mut trace).await;
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn empty_cascade_is_unresolved() {
        let cascade = Cascade::new(Vec::new());
        let mut trace = Vec::new();
        let result = cascade.run("x", &index(), &mut trace).await;
        assert_eq!(result, DetectionResult::unresolved());
    }
}
