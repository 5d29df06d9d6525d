//! Generation service port and adapters
//!
//! - [`HttpGenerator`]: OpenAI-compatible `/chat/completions`
//! - [`TemplateGenerator`]: offline, deterministic 12-session plan built from
//!   the profile, derived facts and the top reference passages

use super::{Goal, PlanContext};
use crate::config::{GenerationBackend, GenerationSection};
use crate::error::{PipelineError, Result};
use reqwest::blocking::Client as HttpClient;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Text generation backend
pub trait Generator: Send + Sync {
    /// Produce plan text for an assembled context
    fn generate(&self, context: &PlanContext) -> Result<String>;

    fn name(&self) -> &str;
}

/// Build the configured generator
pub fn create_generator(section: &GenerationSection) -> Result<Arc<dyn Generator>> {
    let generator: Arc<dyn Generator> = match section.backend {
        GenerationBackend::Template => Arc::new(TemplateGenerator::new()),
        GenerationBackend::Http => {
            let endpoint = section.endpoint.as_deref().ok_or_else(|| {
                PipelineError::InvalidConfig("generation.endpoint is required".into())
            })?;
            let model = section.model.as_deref().ok_or_else(|| {
                PipelineError::InvalidConfig("generation.model is required".into())
            })?;
            Arc::new(HttpGenerator::new(
                endpoint,
                model,
                section.api_key(),
                section.timeout(),
            )?)
        }
    };
    info!(backend = generator.name(), "generator ready");
    Ok(generator)
}

// =============================================================================
// HTTP
// =============================================================================

const SYSTEM_PROMPT: &str = "You write safe, specific resistance training plans in Markdown.";

pub struct HttpGenerator {
    http: HttpClient,
    endpoint: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

impl HttpGenerator {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", key.trim()))
                    .map_err(|_| PipelineError::InvalidConfig("invalid generation API key".into()))?,
            );
        }

        let http = HttpClient::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.to_string(),
        })
    }
}

impl Generator for HttpGenerator {
    fn generate(&self, context: &PlanContext) -> Result<String> {
        debug!(endpoint = %self.endpoint, prompt_chars = context.prompt.len(), "generation request");
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &context.prompt,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&request)
            .send()
            .map_err(|e| {
                let message = format!("generation request failed: {}", e);
                if e.is_timeout() || e.is_connect() || e.is_request() {
                    PipelineError::generation_transient(message)
                } else {
                    PipelineError::generation(message)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("generation request failed ({}): {}", status, body);
            return Err(
                if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                    PipelineError::generation_transient(message)
                } else {
                    PipelineError::generation(message)
                },
            );
        }

        let parsed: ChatResponse = response
            .json()
            .map_err(|e| PipelineError::generation(format!("failed to parse completion: {}", e)))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| PipelineError::generation("completion contained no text"))
    }

    fn name(&self) -> &str {
        "http"
    }
}

// =============================================================================
// Template
// =============================================================================

const TOTAL_SESSIONS: u32 = 12;
const MAX_EXERCISES: usize = 6;
const PER_MUSCLE: usize = 2;
const CIRCUIT_SIZE: usize = 5;
const HIGHLIGHTS: usize = 3;

#[derive(Clone, Copy)]
enum Muscle {
    Chest,
    Triceps,
    Back,
    Biceps,
    Legs,
    Shoulders,
    Glutes,
}

impl Muscle {
    fn exercises(self) -> &'static [&'static str] {
        match self {
            Muscle::Chest => &[
                "Barbell bench press",
                "Incline dumbbell press",
                "Machine chest fly",
                "Pec deck",
                "Push-ups",
            ],
            Muscle::Triceps => &[
                "Cable triceps pushdown",
                "Skull crushers",
                "Bench dips",
                "Rope pushdown",
                "Triceps kickback",
            ],
            Muscle::Back => &[
                "Lat pulldown",
                "Barbell bent-over row",
                "One-arm dumbbell row",
                "Straight-arm pulldown",
                "Deadlift",
            ],
            Muscle::Biceps => &[
                "Barbell curl",
                "Alternating dumbbell curl",
                "Hammer curl",
                "Concentration curl",
                "Preacher curl",
            ],
            Muscle::Legs => &[
                "Back squat",
                "Leg press",
                "Leg extension",
                "Lying leg curl",
                "Dumbbell lunge",
                "Standing calf raise",
            ],
            Muscle::Shoulders => &[
                "Barbell overhead press",
                "Dumbbell shoulder press",
                "Lateral raise",
                "Front raise",
                "Upright row",
            ],
            Muscle::Glutes => &[
                "Sumo squat",
                "Stiff-leg deadlift",
                "Glute bridge",
                "Hip abduction machine",
                "Hip thrust",
            ],
        }
    }
}

const CARDIO: [&str; 10] = [
    "Burpees",
    "Mountain climbers",
    "Jump squats",
    "Jumping jacks",
    "High knees",
    "Jump rope",
    "Kettlebell swing",
    "Light dumbbell clean and press",
    "Push-ups",
    "Bicycle crunch",
];

struct Split {
    name: &'static str,
    focus: &'static str,
    muscles: &'static [Muscle],
}

const HYPERTROPHY_SPLITS: [Split; 6] = [
    Split { name: "Session A", focus: "Chest and triceps", muscles: &[Muscle::Chest, Muscle::Triceps] },
    Split { name: "Session B", focus: "Back and biceps", muscles: &[Muscle::Back, Muscle::Biceps] },
    Split { name: "Session C", focus: "Legs and shoulders", muscles: &[Muscle::Legs, Muscle::Shoulders] },
    Split { name: "Session D", focus: "Chest and back", muscles: &[Muscle::Chest, Muscle::Back] },
    Split { name: "Session E", focus: "Legs and glutes", muscles: &[Muscle::Legs, Muscle::Glutes] },
    Split {
        name: "Session F",
        focus: "Shoulders and arms",
        muscles: &[Muscle::Shoulders, Muscle::Biceps, Muscle::Triceps],
    },
];

const STRENGTH_SPLITS: [Split; 4] = [
    Split { name: "Squat day", focus: "Squat strength", muscles: &[Muscle::Legs, Muscle::Glutes, Muscle::Back] },
    Split {
        name: "Bench and press day",
        focus: "Pressing strength",
        muscles: &[Muscle::Chest, Muscle::Shoulders, Muscle::Triceps],
    },
    Split { name: "Deadlift day", focus: "Pulling strength", muscles: &[Muscle::Legs, Muscle::Back] },
    Split {
        name: "Full body",
        focus: "Total strength",
        muscles: &[Muscle::Legs, Muscle::Back, Muscle::Chest, Muscle::Shoulders],
    },
];

const ENDURANCE_SPLITS: [Split; 4] = [
    Split { name: "HIIT circuit", focus: "High intensity", muscles: &[] },
    Split { name: "Muscular endurance circuit", focus: "Muscular endurance", muscles: &[] },
    Split { name: "Cardio and strength circuit", focus: "Cardio and strength", muscles: &[] },
    Split { name: "Functional circuit", focus: "Functional fitness", muscles: &[] },
];

const WEIGHT_LOSS_SPLITS: [Split; 4] = [
    Split { name: "Circuit A", focus: "Full-body circuit", muscles: &[] },
    Split { name: "Circuit B", focus: "Full-body circuit", muscles: &[] },
    Split { name: "Circuit C", focus: "Full-body circuit", muscles: &[] },
    Split { name: "Circuit D", focus: "Full-body circuit", muscles: &[] },
];

struct Scheme {
    sets: u32,
    reps: &'static str,
    rest: &'static str,
}

fn scheme(goal: Goal) -> Scheme {
    match goal {
        Goal::Hypertrophy => Scheme { sets: 4, reps: "8-12", rest: "60-90s" },
        Goal::Strength => Scheme { sets: 4, reps: "4-6", rest: "2-3min" },
        Goal::WeightLoss => Scheme { sets: 3, reps: "12-15", rest: "30s" },
        Goal::Endurance => Scheme { sets: 3, reps: "10-15", rest: "30-60s" },
    }
}

fn splits(goal: Goal) -> &'static [Split] {
    match goal {
        Goal::Hypertrophy => &HYPERTROPHY_SPLITS,
        Goal::Strength => &STRENGTH_SPLITS,
        Goal::Endurance => &ENDURANCE_SPLITS,
        Goal::WeightLoss => &WEIGHT_LOSS_SPLITS,
    }
}

/// Exercises for session number `session`, rotating through each list so
/// repeated splits vary without randomness
fn pick_exercises(split: &Split, session: usize) -> Vec<&'static str> {
    if split.muscles.is_empty() {
        let start = (session * 3) % CARDIO.len();
        return (0..CIRCUIT_SIZE)
            .map(|i| CARDIO[(start + i) % CARDIO.len()])
            .collect();
    }

    let mut picked: Vec<&'static str> = Vec::new();
    for muscle in split.muscles {
        let choices = muscle.exercises();
        let start = (session * PER_MUSCLE) % choices.len();
        for i in 0..PER_MUSCLE.min(choices.len()) {
            let exercise = choices[(start + i) % choices.len()];
            if !picked.contains(&exercise) {
                picked.push(exercise);
            }
        }
    }
    picked.truncate(MAX_EXERCISES);
    picked
}

/// Offline plan writer
#[derive(Debug, Default, Clone)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub fn new() -> Self {
        Self
    }

    fn weeks(sessions_per_week: u32) -> u32 {
        TOTAL_SESSIONS.div_ceil(sessions_per_week.max(1))
    }
}

impl Generator for TemplateGenerator {
    fn generate(&self, context: &PlanContext) -> Result<String> {
        let profile = &context.profile;
        profile.validate()?;

        let per_week = profile.sessions_per_week;
        let weeks = Self::weeks(per_week);
        let scheme = scheme(profile.goal);
        let splits = splits(profile.goal);

        let mut out = String::new();
        out.push_str(&format!("# {}-session {} plan\n\n", TOTAL_SESSIONS, profile.goal));

        out.push_str("## Overview\n");
        out.push_str(&format!("- Primary goal: {}\n", profile.goal));
        out.push_str(&format!("- Experience: {}\n", profile.experience));
        out.push_str(&format!(
            "- Macrocycle length: {} weeks ({} sessions per week)\n\n",
            weeks, per_week
        ));

        if let Some(facts) = &context.facts {
            out.push_str("## Derived metrics\n");
            for line in facts.lines() {
                out.push_str(&format!("- {}\n", line));
            }
            out.push('\n');
        }

        out.push_str("## Guidelines\n");
        out.push_str("- Warm up for 5-10 minutes before every session\n");
        out.push_str("- Stay hydrated throughout training\n");
        out.push_str("- Prioritise correct technique over load\n");
        if let Some(restrictions) = profile.restrictions() {
            out.push_str(&format!(
                "- Restrictions: {} (adapt or skip exercises that aggravate them)\n",
                restrictions
            ));
        }
        if let Some(notes) = profile.notes() {
            out.push_str(&format!("- Notes: {}\n", notes));
        }
        out.push('\n');

        out.push_str("## Training weeks\n");
        let mut session = 0usize;
        for week in 1..=weeks {
            out.push_str(&format!("### Week {}\n", week));
            for day in 1..=per_week {
                if session >= TOTAL_SESSIONS as usize {
                    break;
                }
                let split = &splits[session % splits.len()];
                out.push_str(&format!("#### Day {}: {} - {}\n", day, split.name, split.focus));
                for exercise in pick_exercises(split, session) {
                    out.push_str(&format!(
                        "- {} {}x {}, rest {}\n",
                        exercise, scheme.sets, scheme.reps, scheme.rest
                    ));
                }
                out.push('\n');
                session += 1;
            }
        }

        out.push_str("## Recovery\n");
        out.push_str("- Sleep at least 7-8 hours per night\n");
        out.push_str("- Stretch after training\n");
        out.push_str("- Take active rest days as needed\n\n");

        out.push_str("## Nutrition tips\n");
        out.push_str("- Match your intake to your goal\n");
        out.push_str("- Include lean protein and complex carbohydrates\n");
        out.push_str("- Drink plenty of water\n\n");

        out.push_str("## Progression strategy\n");
        out.push_str(
            "Increase load or repetitions gradually each week while technique stays solid.\n",
        );

        if !context.references.is_empty() {
            out.push_str("\n## Reference highlights\n");
            for (rank, hit) in context.references.iter().take(HIGHLIGHTS).enumerate() {
                out.push_str(&format!(
                    "- [{}] page {}: {}\n",
                    rank + 1,
                    hit.chunk.page + 1,
                    headline(&hit.chunk.text)
                ));
            }
        }

        Ok(out)
    }

    fn name(&self) -> &str {
        "template"
    }
}

/// First sentence of a passage, capped at 120 chars
fn headline(text: &str) -> String {
    let text = text.trim();
    let end = text
        .find(&['.', '!', '?'][..])
        .map(|i| i + 1)
        .unwrap_or(text.len());
    let sentence = &text[..end];
    if sentence.chars().count() > 120 {
        let cut: String = sentence.chars().take(117).collect();
        format!("{}...", cut.trim_end())
    } else {
        sentence.to_string()
    }
}
