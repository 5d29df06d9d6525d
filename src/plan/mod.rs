//! Plan module - turn a profile plus retrieved passages into a plan
//!
//! Flow: [`UserProfile`] → [`TrainingFacts::derive`] → retrieval →
//! [`PlanAssembler::assemble`] → [`Generator::generate`] →
//! [`PlanAssembler::render`].
//!
//! The assembler only builds the prompt; it never calls a service. The
//! generated text is returned exactly as the generator produced it.

pub mod analytics;
pub mod generator;

pub use analytics::TrainingFacts;
pub use generator::{create_generator, Generator, HttpGenerator, TemplateGenerator};

use crate::error::{PipelineError, Result};
use crate::index::ScoredChunk;
use crate::retrieval::RetrievalResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Goal {
    Hypertrophy,
    Strength,
    Endurance,
    WeightLoss,
}

impl Goal {
    pub const ALL: [Goal; 4] = [
        Goal::Hypertrophy,
        Goal::Strength,
        Goal::Endurance,
        Goal::WeightLoss,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::Hypertrophy => "hypertrophy",
            Goal::Strength => "strength",
            Goal::Endurance => "endurance",
            Goal::WeightLoss => "weight-loss",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace('_', "-").as_str() {
            "hypertrophy" | "muscle" => Some(Goal::Hypertrophy),
            "strength" => Some(Goal::Strength),
            "endurance" | "conditioning" => Some(Goal::Endurance),
            "weight-loss" | "weightloss" | "fat-loss" => Some(Goal::WeightLoss),
            _ => None,
        }
    }
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Experience {
    Beginner,
    Intermediate,
    Advanced,
}

impl Experience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Experience::Beginner => "beginner",
            Experience::Intermediate => "intermediate",
            Experience::Advanced => "advanced",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "beginner" | "novice" => Some(Experience::Beginner),
            "intermediate" => Some(Experience::Intermediate),
            "advanced" => Some(Experience::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for Experience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who the plan is for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub age: u32,
    pub weight_kg: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height_cm: Option<f32>,
    pub goal: Goal,
    pub experience: Experience,
    pub sessions_per_week: u32,
    /// Injuries or limitations, free text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restrictions: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl UserProfile {
    pub fn validate(&self) -> Result<()> {
        if self.age == 0 {
            return Err(PipelineError::InvalidProfile("age must be positive".into()));
        }
        if !(self.weight_kg.is_finite() && self.weight_kg > 0.0) {
            return Err(PipelineError::InvalidProfile(format!(
                "weight must be a positive number of kg, got {}",
                self.weight_kg
            )));
        }
        if let Some(height) = self.height_cm {
            if !(height.is_finite() && height > 0.0) {
                return Err(PipelineError::InvalidProfile(format!(
                    "height must be a positive number of cm, got {}",
                    height
                )));
            }
        }
        if self.sessions_per_week == 0 {
            return Err(PipelineError::InvalidProfile(
                "sessions per week must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Restrictions, if any non-blank text was given
    pub fn restrictions(&self) -> Option<&str> {
        non_blank(self.restrictions.as_deref())
    }

    pub fn notes(&self) -> Option<&str> {
        non_blank(self.notes.as_deref())
    }

    /// Search text used to pull reference passages for this profile
    pub fn retrieval_query(&self) -> String {
        format!(
            "{} training program for {} lifters, {} sessions per week: exercises, sets, reps, rest",
            self.goal, self.experience, self.sessions_per_week
        )
    }
}

/// Everything a generator needs: the prompt text plus the structured parts
/// it was built from
#[derive(Debug, Clone, Serialize)]
pub struct PlanContext {
    pub prompt: String,
    pub profile: UserProfile,
    pub facts: Option<TrainingFacts>,
    pub references: Vec<ScoredChunk>,
    /// Built without retrieved material
    pub degraded: bool,
}

/// Builds the generation prompt
#[derive(Debug, Clone)]
pub struct PlanAssembler {
    max_passages: usize,
}

impl Default for PlanAssembler {
    fn default() -> Self {
        Self { max_passages: 8 }
    }
}

const INSTRUCTIONS: &str = "You are an experienced strength and conditioning coach. \
Write a 12-session training plan for the athlete below. Ground exercise choices, \
set and rep schemes in the reference material and cite passages by their [n] label.";

const DEGRADED_INSTRUCTIONS: &str = "You are an experienced strength and conditioning coach. \
Write a 12-session training plan for the athlete below. No reference material is \
available; rely on general training principles.";

impl PlanAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap on reference passages included in the prompt
    pub fn with_max_passages(mut self, max_passages: usize) -> Self {
        self.max_passages = max_passages.max(1);
        self
    }

    /// Prompt with profile, derived metrics and reference passages in rank order
    ///
    /// Fails with `EmptyContext` when there are neither facts nor passages.
    pub fn assemble(
        &self,
        profile: &UserProfile,
        facts: Option<&TrainingFacts>,
        retrieval: &RetrievalResult,
    ) -> Result<PlanContext> {
        profile.validate()?;
        if retrieval.is_empty() && facts.is_none() {
            return Err(PipelineError::EmptyContext);
        }

        let references: Vec<ScoredChunk> = retrieval
            .iter()
            .take(self.max_passages)
            .cloned()
            .collect();

        let mut prompt = String::new();
        prompt.push_str(INSTRUCTIONS);
        prompt.push_str("\n\n");
        push_profile(&mut prompt, profile);
        if let Some(facts) = facts {
            push_facts(&mut prompt, facts);
        }
        if !references.is_empty() {
            prompt.push_str("## Reference material\n");
            for (rank, hit) in references.iter().enumerate() {
                prompt.push_str(&format!(
                    "[{}] (page {}, score {:.3})\n{}\n\n",
                    rank + 1,
                    hit.chunk.page + 1,
                    hit.score,
                    hit.chunk.text.trim()
                ));
            }
        }

        Ok(PlanContext {
            prompt: prompt.trim_end().to_string(),
            profile: profile.clone(),
            facts: facts.cloned(),
            references,
            degraded: false,
        })
    }

    /// Profile-only prompt for callers that proceed without retrieval
    pub fn assemble_degraded(
        &self,
        profile: &UserProfile,
        facts: Option<&TrainingFacts>,
    ) -> Result<PlanContext> {
        profile.validate()?;
        warn!("assembling plan prompt without reference material");

        let mut prompt = String::new();
        prompt.push_str(DEGRADED_INSTRUCTIONS);
        prompt.push_str("\n\n");
        push_profile(&mut prompt, profile);
        if let Some(facts) = facts {
            push_facts(&mut prompt, facts);
        }

        Ok(PlanContext {
            prompt: prompt.trim_end().to_string(),
            profile: profile.clone(),
            facts: facts.cloned(),
            references: Vec::new(),
            degraded: true,
        })
    }

    /// Final plan text; generated output passes through untouched
    pub fn render(&self, generated: String) -> String {
        generated
    }
}

fn push_profile(prompt: &mut String, profile: &UserProfile) {
    prompt.push_str("## Athlete profile\n");
    prompt.push_str(&format!("- Age: {}\n", profile.age));
    prompt.push_str(&format!("- Weight: {:.1} kg\n", profile.weight_kg));
    if let Some(height) = profile.height_cm {
        prompt.push_str(&format!("- Height: {:.0} cm\n", height));
    }
    prompt.push_str(&format!("- Goal: {}\n", profile.goal));
    prompt.push_str(&format!("- Experience: {}\n", profile.experience));
    prompt.push_str(&format!("- Sessions per week: {}\n", profile.sessions_per_week));
    if let Some(restrictions) = profile.restrictions() {
        prompt.push_str(&format!("- Restrictions: {}\n", restrictions));
    }
    if let Some(notes) = profile.notes() {
        prompt.push_str(&format!("- Notes: {}\n", notes));
    }
    prompt.push('\n');
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn push_facts(prompt: &mut String, facts: &TrainingFacts) {
    prompt.push_str("## Derived metrics\n");
    for line in facts.lines() {
        prompt.push_str("- ");
        prompt.push_str(&line);
        prompt.push('\n');
    }
    prompt.push('\n');
}
