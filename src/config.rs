use crate::angle::FilterSettings;
use crate::error::ProfileError;
use crate::form::{FormSettings, ThrottleSettings};
use crate::profile::{ExerciseKind, ExerciseProfile};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Smallest rolling window that still gives a meaningful median
pub const MIN_WINDOW_SIZE: usize = 5;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FormtrackConfig {
    pub engine: EngineConfig,
    pub feedback: FeedbackConfig,
    pub session: SessionConfig,
    /// Replacements for built-in profiles, matched by `kind`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub profiles: Vec<ExerciseProfile>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Landmark confidence at or below which an angle is unavailable
    #[serde(default = "default_angle_confidence_threshold")]
    pub angle_confidence_threshold: f32,

    /// Rolling window size for the angle median and moving average
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Deviation from the window median (degrees) treated as an outlier
    #[serde(default = "default_outlier_threshold_deg")]
    pub outlier_threshold_deg: f64,

    /// Consecutive outliers before a step change is accepted (0 disables)
    #[serde(default = "default_max_consecutive_outliers")]
    pub max_consecutive_outliers: u32,

    /// Consecutive unusable frames tolerated before tracking is reset
    #[serde(default = "default_max_invalid_frames")]
    pub max_invalid_frames: u32,

    /// Number of phase transitions kept in session history
    #[serde(default = "default_phase_history_len")]
    pub phase_history_len: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeedbackConfig {
    /// Window in which an identical message is not repeated
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: f64,

    /// Corrective cues surfaced per frame (safety warnings are never capped)
    #[serde(default = "default_max_messages_per_frame")]
    pub max_messages_per_frame: usize,

    /// Number of recent form scores kept for the sustained-form check
    #[serde(default = "default_score_window")]
    pub score_window: usize,

    /// Mean score below which form is reported as slipping
    #[serde(default = "default_poor_form_floor")]
    pub poor_form_floor: f64,

    /// Penalty points per degree outside a target's tolerance
    #[serde(default = "default_penalty_multiplier")]
    pub penalty_multiplier: f64,

    /// Cap on a single target's penalty
    #[serde(default = "default_max_joint_penalty")]
    pub max_joint_penalty: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SessionConfig {
    /// Exercise tracked when none is given on the command line
    #[serde(default = "default_exercise")]
    pub exercise: ExerciseKind,

    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

impl FormtrackConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("formtrack.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default(
                "engine.angle_confidence_threshold",
                default_angle_confidence_threshold() as f64,
            )?
            .set_default("engine.window_size", default_window_size() as i64)?
            .set_default("engine.outlier_threshold_deg", default_outlier_threshold_deg())?
            .set_default(
                "engine.max_consecutive_outliers",
                default_max_consecutive_outliers(),
            )?
            .set_default("engine.max_invalid_frames", default_max_invalid_frames())?
            .set_default("engine.phase_history_len", default_phase_history_len() as i64)?
            .set_default("feedback.cooldown_seconds", default_cooldown_seconds())?
            .set_default(
                "feedback.max_messages_per_frame",
                default_max_messages_per_frame() as i64,
            )?
            .set_default("feedback.score_window", default_score_window() as i64)?
            .set_default("feedback.poor_form_floor", default_poor_form_floor())?
            .set_default("feedback.penalty_multiplier", default_penalty_multiplier())?
            .set_default("feedback.max_joint_penalty", default_max_joint_penalty())?
            .set_default("session.exercise", default_exercise().as_str())?
            .set_default(
                "session.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables, e.g. FORMTRACK_ENGINE__WINDOW_SIZE
            .add_source(
                Environment::with_prefix("FORMTRACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: FormtrackConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let engine = &self.engine;
        let threshold = engine.angle_confidence_threshold;
        if !(threshold.is_finite() && (0.0..1.0).contains(&threshold)) {
            return Err(ConfigError::Message(format!(
                "Angle confidence threshold must be in [0, 1), got {}",
                threshold
            )));
        }

        if engine.window_size < MIN_WINDOW_SIZE {
            return Err(ConfigError::Message(format!(
                "Window size must be at least {}",
                MIN_WINDOW_SIZE
            )));
        }

        if !(engine.outlier_threshold_deg.is_finite() && engine.outlier_threshold_deg > 0.0) {
            return Err(ConfigError::Message(
                "Outlier threshold must be greater than 0".to_string(),
            ));
        }

        if engine.max_invalid_frames == 0 {
            return Err(ConfigError::Message(
                "Max invalid frames must be greater than 0".to_string(),
            ));
        }

        if engine.phase_history_len == 0 {
            return Err(ConfigError::Message(
                "Phase history length must be greater than 0".to_string(),
            ));
        }

        let feedback = &self.feedback;
        if !(feedback.cooldown_seconds.is_finite() && feedback.cooldown_seconds >= 0.0) {
            return Err(ConfigError::Message(
                "Feedback cooldown must not be negative".to_string(),
            ));
        }

        if feedback.max_messages_per_frame == 0 {
            return Err(ConfigError::Message(
                "Max messages per frame must be greater than 0".to_string(),
            ));
        }

        if feedback.score_window == 0 {
            return Err(ConfigError::Message(
                "Score window must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=100.0).contains(&feedback.poor_form_floor) {
            return Err(ConfigError::Message(
                "Poor form floor must be between 0 and 100".to_string(),
            ));
        }

        if !(feedback.penalty_multiplier.is_finite() && feedback.penalty_multiplier > 0.0) {
            return Err(ConfigError::Message(
                "Penalty multiplier must be greater than 0".to_string(),
            ));
        }

        if !(feedback.max_joint_penalty.is_finite() && feedback.max_joint_penalty > 0.0) {
            return Err(ConfigError::Message(
                "Max joint penalty must be greater than 0".to_string(),
            ));
        }

        if self.session.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.kind) {
                return Err(ConfigError::Message(format!(
                    "Profile for '{}' defined more than once",
                    profile.kind
                )));
            }
            profile
                .validate()
                .map_err(|e| ConfigError::Message(e.to_string()))?;
        }

        Ok(())
    }

    /// Configured override for `kind`, or the built-in profile, validated
    pub fn resolve_profile(&self, kind: ExerciseKind) -> Result<ExerciseProfile, ProfileError> {
        let profile = self
            .profiles
            .iter()
            .find(|profile| profile.kind == kind)
            .cloned()
            .unwrap_or_else(|| ExerciseProfile::builtin(kind));

        profile.validate()?;
        Ok(profile)
    }

    /// Validate the whole configuration, then resolve the profile for `kind`.
    /// Everything a run needs before the first frame is read.
    pub fn checked_profile(&self, kind: ExerciseKind) -> crate::error::Result<ExerciseProfile> {
        self.validate()?;
        Ok(self.resolve_profile(kind)?)
    }

    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            window_size: self.engine.window_size,
            outlier_threshold: self.engine.outlier_threshold_deg,
            max_consecutive_outliers: self.engine.max_consecutive_outliers,
        }
    }

    pub fn form_settings(&self) -> FormSettings {
        FormSettings {
            penalty_multiplier: self.feedback.penalty_multiplier,
            max_joint_penalty: self.feedback.max_joint_penalty,
            score_window: self.feedback.score_window,
            poor_form_floor: self.feedback.poor_form_floor,
        }
    }

    /// Render as TOML, in the form read back by [`Self::load_from_file`]
    pub fn to_toml(&self) -> crate::error::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn throttle_settings(&self) -> ThrottleSettings {
        ThrottleSettings {
            cooldown_seconds: self.feedback.cooldown_seconds,
            max_messages_per_frame: self.feedback.max_messages_per_frame,
        }
    }
}

impl Default for FormtrackConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                angle_confidence_threshold: default_angle_confidence_threshold(),
                window_size: default_window_size(),
                outlier_threshold_deg: default_outlier_threshold_deg(),
                max_consecutive_outliers: default_max_consecutive_outliers(),
                max_invalid_frames: default_max_invalid_frames(),
                phase_history_len: default_phase_history_len(),
            },
            feedback: FeedbackConfig {
                cooldown_seconds: default_cooldown_seconds(),
                max_messages_per_frame: default_max_messages_per_frame(),
                score_window: default_score_window(),
                poor_form_floor: default_poor_form_floor(),
                penalty_multiplier: default_penalty_multiplier(),
                max_joint_penalty: default_max_joint_penalty(),
            },
            session: SessionConfig {
                exercise: default_exercise(),
                event_bus_capacity: default_event_bus_capacity(),
            },
            profiles: Vec::new(),
        }
    }
}

// Default value functions
fn default_angle_confidence_threshold() -> f32 {
    0.5
}
fn default_window_size() -> usize {
    5
}
fn default_outlier_threshold_deg() -> f64 {
    30.0
}
fn default_max_consecutive_outliers() -> u32 {
    3
}
fn default_max_invalid_frames() -> u32 {
    10
}
fn default_phase_history_len() -> usize {
    10
}

fn default_cooldown_seconds() -> f64 {
    3.0
}
fn default_max_messages_per_frame() -> usize {
    2
}
fn default_score_window() -> usize {
    30
}
fn default_poor_form_floor() -> f64 {
    60.0
}
fn default_penalty_multiplier() -> f64 {
    2.0
}
fn default_max_joint_penalty() -> f64 {
    30.0
}

fn default_exercise() -> ExerciseKind {
    ExerciseKind::BicepCurl
}
fn default_event_bus_capacity() -> usize {
    256
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[derive(Serialize)]
    struct ProfileFile {
        profiles: Vec<ExerciseProfile>,
    }

    #[test]
    fn test_default_config() {
        let config = FormtrackConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.session.exercise, ExerciseKind::BicepCurl);
        assert_eq!(config.filter_settings(), FilterSettings::default());
        assert_eq!(config.form_settings(), FormSettings::default());
        assert_eq!(config.throttle_settings(), ThrottleSettings::default());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = FormtrackConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.engine, FormtrackConfig::default().engine);
        assert_eq!(config.feedback, FormtrackConfig::default().feedback);
        assert!(config.profiles.is_empty());
    }

    #[test]
    fn test_file_overrides_and_profile_replacement() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formtrack.toml");

        let mut squat = ExerciseProfile::builtin(ExerciseKind::Squat);
        squat.thresholds.enter = 110.0;
        let mut text = toml::to_string(&ProfileFile {
            profiles: vec![squat.clone()],
        })
        .unwrap();
        text.push_str("\n[engine]\nwindow_size = 7\n\n[feedback]\ncooldown_seconds = 1.5\n");
        text.push_str("\n[session]\nexercise = \"squat\"\n");
        fs::write(&path, text).unwrap();

        let config = FormtrackConfig::load_from_file(&path).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.window_size, 7);
        assert_eq!(config.engine.outlier_threshold_deg, 30.0);
        assert_eq!(config.feedback.cooldown_seconds, 1.5);
        assert_eq!(config.session.exercise, ExerciseKind::Squat);

        assert_eq!(config.resolve_profile(ExerciseKind::Squat).unwrap(), squat);
        assert_eq!(
            config.resolve_profile(ExerciseKind::PushUp).unwrap(),
            ExerciseProfile::builtin(ExerciseKind::PushUp)
        );
    }

    #[test]
    fn test_unknown_exercise_name_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formtrack.toml");
        fs::write(&path, "[session]\nexercise = \"lunge\"\n").unwrap();

        assert!(FormtrackConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("FORMTRACK_SESSION__EVENT_BUS_CAPACITY", "512");

        let dir = tempfile::tempdir().unwrap();
        let config = FormtrackConfig::load_from_file(dir.path().join("absent.toml"));

        env::remove_var("FORMTRACK_SESSION__EVENT_BUS_CAPACITY");
        assert_eq!(config.unwrap().session.event_bus_capacity, 512);
    }

    #[test]
    fn test_config_validation() {
        let mut config = FormtrackConfig::default();
        config.engine.window_size = 3;
        assert!(config.validate().is_err());

        config.engine.window_size = 5;
        config.engine.angle_confidence_threshold = 1.0;
        assert!(config.validate().is_err());

        config.engine.angle_confidence_threshold = 0.4;
        config.feedback.poor_form_floor = 120.0;
        assert!(config.validate().is_err());

        config.feedback.poor_form_floor = 60.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_checked_profile_rejects_invalid_engine_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("formtrack.toml");
        fs::write(&path, "[engine]\nwindow_size = 2\n").unwrap();

        let config = FormtrackConfig::load_from_file(&path).unwrap();
        // The built-in profile alone is fine
        assert!(config.resolve_profile(ExerciseKind::Squat).is_ok());
        assert!(matches!(
            config.checked_profile(ExerciseKind::Squat),
            Err(crate::error::FormtrackError::Config(_))
        ));

        let mut config = FormtrackConfig::default();
        config.session.event_bus_capacity = 0;
        assert!(config.checked_profile(ExerciseKind::BicepCurl).is_err());

        let mut config = FormtrackConfig::default();
        let mut broken = ExerciseProfile::builtin(ExerciseKind::PushUp);
        broken.thresholds.exit = broken.thresholds.enter;
        config.profiles.push(broken);
        assert!(config.checked_profile(ExerciseKind::BicepCurl).is_err());

        let profile = FormtrackConfig::default()
            .checked_profile(ExerciseKind::WallSit)
            .unwrap();
        assert_eq!(profile, ExerciseProfile::builtin(ExerciseKind::WallSit));
    }

    #[test]
    fn test_invalid_or_duplicate_profiles_fail_validation() {
        let mut config = FormtrackConfig::default();
        let mut broken = ExerciseProfile::builtin(ExerciseKind::Squat);
        broken.primary.clear();
        config.profiles.push(broken);
        assert!(config.validate().is_err());
        assert!(matches!(
            config.resolve_profile(ExerciseKind::Squat),
            Err(ProfileError::MissingPrimaryTriple { .. })
        ));

        config.profiles = vec![
            ExerciseProfile::builtin(ExerciseKind::Squat),
            ExerciseProfile::builtin(ExerciseKind::Squat),
        ];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_defaults_serialize_to_toml() {
        let text = FormtrackConfig::default().to_toml().unwrap();
        assert!(text.contains("[engine]"));
        assert!(text.contains("exercise = \"bicep_curl\""));
        assert!(!text.contains("profiles"));

        let parsed: FormtrackConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, FormtrackConfig::default());
    }
}
