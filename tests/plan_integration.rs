//! Integration tests for plan assembly and generation through the pipeline

use fitplan::config::Config;
use fitplan::embeddings::HashedEmbedder;
use fitplan::error::{PipelineError, Result};
use fitplan::pipeline::{PlanOptions, Pipeline};
use fitplan::plan::{Experience, Generator, Goal, PlanAssembler, PlanContext, UserProfile};
use fitplan::retrieval::RetrievalResult;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

/// Records prompts and replies with a fixed text
struct Recording {
    prompts: Mutex<Vec<String>>,
    reply: &'static str,
}

impl Generator for Recording {
    fn generate(&self, context: &PlanContext) -> Result<String> {
        self.prompts.lock().push(context.prompt.clone());
        Ok(self.reply.to_string())
    }
    fn name(&self) -> &str {
        "recording"
    }
}

/// Fails transiently a fixed number of times
struct Flaky {
    failures: AtomicUsize,
}

impl Generator for Flaky {
    fn generate(&self, _context: &PlanContext) -> Result<String> {
        if self.failures.load(Ordering::SeqCst) > 0 {
            self.failures.fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::generation_transient("503"));
        }
        Ok("plan".into())
    }
    fn name(&self) -> &str {
        "flaky"
    }
}

fn profile() -> UserProfile {
    UserProfile {
        age: 26,
        weight_kg: 68.0,
        height_cm: Some(170.0),
        goal: Goal::Hypertrophy,
        experience: Experience::Beginner,
        sessions_per_week: 4,
        restrictions: None,
        notes: None,
    }
}

fn config(dir: &TempDir) -> Config {
    let doc = dir.path().join("guide.txt");
    std::fs::write(
        &doc,
        "Hypertrophy training uses eight to twelve reps per set. \
         Rest sixty to ninety seconds between sets for muscle growth.",
    )
    .unwrap();

    let mut config = Config::default();
    config.document.path = Some(doc.display().to_string());
    config.index.path = dir.path().join("index.db").display().to_string();
    config.chunking.size = 12;
    config.chunking.overlap = 3;
    config.retry.base_delay_ms = 1;
    config.retry.max_delay_ms = 2;
    config
}

#[test]
fn test_empty_context_when_nothing_to_ground_on() {
    let err = PlanAssembler::new()
        .assemble(&profile(), None, &RetrievalResult::default())
        .unwrap_err();
    assert!(matches!(err, PipelineError::EmptyContext));
}

#[test]
fn test_generator_output_returned_unmodified() {
    let dir = TempDir::new().unwrap();
    let reply = "  ## Week 1\n\n* Squat   4x8\n\n";
    let generator = Arc::new(Recording {
        prompts: Mutex::new(Vec::new()),
        reply,
    });
    let pipeline = Pipeline::with_parts(
        config(&dir),
        Arc::new(HashedEmbedder::new()),
        generator.clone(),
    )
    .unwrap();

    let outcome = pipeline.plan(&profile(), &PlanOptions::default()).unwrap();
    assert_eq!(outcome.plan, reply);

    let prompts = generator.prompts.lock();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("## Athlete profile"));
    assert!(prompts[0].contains("## Derived metrics"));
    assert!(prompts[0].contains("## Reference material"));
    assert!(prompts[0].contains("eight to twelve reps"));
}

#[test]
fn test_prepare_stops_before_generation() {
    let dir = TempDir::new().unwrap();
    let generator = Arc::new(Recording {
        prompts: Mutex::new(Vec::new()),
        reply: "unused",
    });
    let pipeline = Pipeline::with_parts(
        config(&dir),
        Arc::new(HashedEmbedder::new()),
        generator.clone(),
    )
    .unwrap();

    let mut athlete = profile();
    athlete.restrictions = Some("shoulder pain".into());
    athlete.notes = Some("prefers dumbbells".into());
    let context = pipeline.prepare(&athlete, &PlanOptions::default()).unwrap();

    assert!(generator.prompts.lock().is_empty());
    assert!(context.prompt.contains("- Restrictions: shoulder pain"));
    assert!(context.prompt.contains("- Notes: prefers dumbbells"));

    let outcome = pipeline.generate(context).unwrap();
    assert_eq!(outcome.plan, "unused");
    assert_eq!(generator.prompts.lock().len(), 1);
}

#[test]
fn test_transient_generation_failures_retried() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::with_parts(
        config(&dir),
        Arc::new(HashedEmbedder::new()),
        Arc::new(Flaky {
            failures: AtomicUsize::new(2),
        }),
    )
    .unwrap();
    assert_eq!(pipeline.plan(&profile(), &PlanOptions::default()).unwrap().plan, "plan");
}

#[test]
fn test_generation_gives_up_after_max_attempts() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::with_parts(
        config(&dir),
        Arc::new(HashedEmbedder::new()),
        Arc::new(Flaky {
            failures: AtomicUsize::new(10),
        }),
    )
    .unwrap();
    let err = pipeline.plan(&profile(), &PlanOptions::default()).unwrap_err();
    assert!(matches!(err, PipelineError::GenerationService { .. }));
}

#[test]
fn test_default_pipeline_writes_template_plan() {
    let dir = TempDir::new().unwrap();
    let pipeline = Pipeline::from_config(config(&dir)).unwrap();
    let outcome = pipeline.plan(&profile(), &PlanOptions::default()).unwrap();

    assert_eq!(outcome.generator, "template");
    assert!(outcome.plan.starts_with("# 12-session hypertrophy plan"));
    assert!(outcome.plan.contains("Approximate BMI: 23.53"));
    assert_eq!(outcome.plan.matches("#### Day").count(), 12);
}
