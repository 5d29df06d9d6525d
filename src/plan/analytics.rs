//! Numeric training facts derived from a profile
//!
//! Energy estimates use MET × body weight × session length. Presets per goal:
//!
//! | goal        | MET | hours | reps  | intensity                    |
//! |-------------|-----|-------|-------|------------------------------|
//! | hypertrophy | 6.0 | 1.20  | 6-12  | 70-80% 1RM                   |
//! | weight loss | 5.5 | 1.15  | 12-15 | circuits with short rest     |
//! | strength    | 6.8 | 1.25  | 3-6   | 80-90% 1RM                   |
//! | endurance   | 7.2 | 1.05  | 10-15 | moderate intervals           |

use super::{Experience, Goal, UserProfile};
use serde::Serialize;

struct GoalPreset {
    met: f64,
    hours: f64,
    rep_range: &'static str,
    intensity: &'static str,
}

fn preset(goal: Goal) -> GoalPreset {
    match goal {
        Goal::Hypertrophy => GoalPreset {
            met: 6.0,
            hours: 1.2,
            rep_range: "6-12",
            intensity: "70-80% 1RM",
        },
        Goal::WeightLoss => GoalPreset {
            met: 5.5,
            hours: 1.15,
            rep_range: "12-15",
            intensity: "circuits with short rest",
        },
        Goal::Strength => GoalPreset {
            met: 6.8,
            hours: 1.25,
            rep_range: "3-6",
            intensity: "80-90% 1RM",
        },
        Goal::Endurance => GoalPreset {
            met: 7.2,
            hours: 1.05,
            rep_range: "10-15",
            intensity: "moderate intervals",
        },
    }
}

fn weekly_sets(experience: Experience) -> &'static str {
    match experience {
        Experience::Beginner => "14-18 sets per muscle group",
        Experience::Intermediate => "18-22 sets per muscle group",
        Experience::Advanced => "22-26 sets per muscle group",
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingFacts {
    pub goal: Goal,
    pub experience: Experience,
    pub sessions_per_week: u32,
    /// kcal, one decimal
    pub session_calories: f64,
    /// kcal, one decimal
    pub weekly_calories: f64,
    /// Two decimals; only when height is known
    pub bmi: Option<f64>,
    pub rep_range: String,
    pub intensity: String,
    pub weekly_volume: String,
}

impl TrainingFacts {
    pub fn derive(profile: &UserProfile) -> Self {
        let preset = preset(profile.goal);
        let weight = f64::from(profile.weight_kg);

        let session_calories = round_to(weight * preset.met * preset.hours, 1);
        let weekly_calories = round_to(session_calories * f64::from(profile.sessions_per_week), 1);
        let bmi = profile.height_cm.filter(|h| *h > 0.0).map(|height| {
            let metres = f64::from(height) / 100.0;
            round_to(weight / (metres * metres), 2)
        });

        Self {
            goal: profile.goal,
            experience: profile.experience,
            sessions_per_week: profile.sessions_per_week,
            session_calories,
            weekly_calories,
            bmi,
            rep_range: preset.rep_range.to_string(),
            intensity: preset.intensity.to_string(),
            weekly_volume: weekly_sets(profile.experience).to_string(),
        }
    }

    /// Human-readable lines for prompts and CLI output
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Estimated calories per session: {:.1} kcal", self.session_calories),
            format!("Estimated calories per week: {:.1} kcal", self.weekly_calories),
            format!("Recommended rep range: {}", self.rep_range),
            format!("Recommended intensity: {}", self.intensity),
            format!("Weekly volume: {}", self.weekly_volume),
        ];
        if let Some(bmi) = self.bmi {
            lines.push(format!("Approximate BMI: {:.2}", bmi));
        }
        lines
    }
}
