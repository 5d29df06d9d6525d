//! Plan command - profile in, training plan out

use super::ConfigSource;
use anyhow::{Context, Result};
use clap::Args;
use colored::*;
use fitplan::pipeline::PlanOptions;
use fitplan::plan::{Experience, Goal, UserProfile};

#[derive(Debug, Clone, Args)]
pub struct PlanArgs {
    /// Age in years
    #[arg(long)]
    pub age: u32,

    /// Body weight in kg
    #[arg(long)]
    pub weight: f32,

    /// Height in cm (enables BMI)
    #[arg(long)]
    pub height: Option<f32>,

    /// hypertrophy, strength, endurance or weight-loss
    #[arg(long, value_parser = parse_goal)]
    pub goal: Goal,

    /// beginner, intermediate or advanced
    #[arg(long, value_parser = parse_experience, default_value = "beginner")]
    pub experience: Experience,

    /// Training sessions per week
    #[arg(long, default_value_t = 3)]
    pub frequency: u32,

    /// Injuries or limitations, e.g. "shoulder pain"
    #[arg(long)]
    pub restrictions: Option<String>,

    /// Additional notes for the coach
    #[arg(long)]
    pub notes: Option<String>,

    /// Retrieval query (default: derived from the profile)
    #[arg(long)]
    pub query: Option<String>,

    /// Continue without reference material if retrieval fails
    #[arg(long)]
    pub allow_degraded: bool,

    /// Print the assembled prompt and stop before generating
    #[arg(long)]
    pub show_prompt: bool,

    /// Output plan, prompt and references as JSON
    #[arg(short, long)]
    pub json: bool,
}

fn parse_goal(value: &str) -> std::result::Result<Goal, String> {
    Goal::parse(value).ok_or_else(|| {
        let known: Vec<&str> = Goal::ALL.iter().map(|g| g.as_str()).collect();
        format!("unknown goal '{}' (expected one of: {})", value, known.join(", "))
    })
}

fn parse_experience(value: &str) -> std::result::Result<Experience, String> {
    Experience::parse(value)
        .ok_or_else(|| format!("unknown experience '{}' (beginner, intermediate, advanced)", value))
}

impl PlanArgs {
    fn profile(&self) -> UserProfile {
        UserProfile {
            age: self.age,
            weight_kg: self.weight,
            height_cm: self.height,
            goal: self.goal,
            experience: self.experience,
            sessions_per_week: self.frequency,
            restrictions: self.restrictions.clone(),
            notes: self.notes.clone(),
        }
    }
}

pub fn execute(source: &ConfigSource, args: PlanArgs) -> Result<()> {
    let pipeline = source.pipeline()?;
    let profile = args.profile();
    profile.validate().context("Invalid profile")?;

    let options = PlanOptions {
        allow_degraded: args.allow_degraded,
        query: args.query.clone(),
    };
    let context = pipeline
        .prepare(&profile, &options)
        .with_context(|| failure_message(args.allow_degraded))?;

    if context.degraded && !args.json {
        eprintln!(
            "{}",
            "⚠ No reference material was used for this plan".yellow()
        );
    }

    if args.show_prompt {
        if args.json {
            println!("{}", serde_json::to_string_pretty(&context)?);
        } else {
            println!("{}", context.prompt);
        }
        return Ok(());
    }

    let outcome = pipeline
        .generate(context)
        .context("Failed to generate plan")?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", outcome.plan);
    }
    Ok(())
}

fn failure_message(allow_degraded: bool) -> &'static str {
    if allow_degraded {
        "Failed to prepare plan"
    } else {
        "Failed to prepare plan (pass --allow-degraded to continue without reference material)"
    }
}
