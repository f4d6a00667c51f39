use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Dimensions
// ============================================================================

/// One of the seven bounded affect dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Curiosity,
    Satisfaction,
    Frustration,
    Excitement,
    Focus,
    Empathy,
    Confidence,
}

impl Dimension {
    pub const ALL: [Dimension; 7] = [
        Dimension::Curiosity,
        Dimension::Satisfaction,
        Dimension::Frustration,
        Dimension::Excitement,
        Dimension::Focus,
        Dimension::Empathy,
        Dimension::Confidence,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Dimension::Curiosity => "curiosity",
            Dimension::Satisfaction => "satisfaction",
            Dimension::Frustration => "frustration",
            Dimension::Excitement => "excitement",
            Dimension::Focus => "focus",
            Dimension::Empathy => "empathy",
            Dimension::Confidence => "confidence",
        }
    }

    /// Resting value used on first boot and as the decay target.
    pub fn default_baseline(self) -> f32 {
        match self {
            Dimension::Curiosity => 0.6,
            Dimension::Frustration => 0.0,
            _ => 0.5,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Events
// ============================================================================

/// A classified occurrence that nudges the emotional state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionEvent {
    CodeSuccess,
    CodeFailure,
    NewConversation,
    UserPraise,
    UserFrustration,
    LongSilence,
    DeepThought,
    SelfImprovement,
    NewDiscovery,
    Boot,
}

impl EmotionEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            EmotionEvent::CodeSuccess => "code_success",
            EmotionEvent::CodeFailure => "code_failure",
            EmotionEvent::NewConversation => "new_conversation",
            EmotionEvent::UserPraise => "user_praise",
            EmotionEvent::UserFrustration => "user_frustration",
            EmotionEvent::LongSilence => "long_silence",
            EmotionEvent::DeepThought => "deep_thought",
            EmotionEvent::SelfImprovement => "self_improvement",
            EmotionEvent::NewDiscovery => "new_discovery",
            EmotionEvent::Boot => "boot",
        }
    }
}

impl fmt::Display for EmotionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one event moves the state: absolute `set` values first, then `add` deltas.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventRule {
    pub add: BTreeMap<Dimension, f32>,
    pub set: BTreeMap<Dimension, f32>,
}

impl EventRule {
    fn adds(pairs: &[(Dimension, f32)]) -> Self {
        Self {
            add: pairs.iter().copied().collect(),
            set: BTreeMap::new(),
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecayConfig {
    /// Fraction of the distance to baseline recovered per hour of silence.
    pub rate_per_hour: f32,
    /// Upper bound on the fraction applied by a single update.
    pub max_step: f32,
    /// Per-dimension weight; dimensions without an entry do not decay.
    pub weights: BTreeMap<Dimension, f32>,
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self {
            rate_per_hour: 1.0,
            max_step: 0.1,
            weights: [
                (Dimension::Frustration, 0.3),
                (Dimension::Excitement, 0.2),
                (Dimension::Focus, 0.1),
            ]
            .into_iter()
            .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionConfig {
    pub baseline: BTreeMap<Dimension, f32>,
    pub decay: DecayConfig,
    pub rules: BTreeMap<EmotionEvent, EventRule>,
    /// Values at or above this read as "high" in summaries.
    pub high_threshold: f32,
    /// Values at or below this read as "low" in summaries.
    pub low_threshold: f32,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            baseline: Dimension::ALL
                .iter()
                .map(|d| (*d, d.default_baseline()))
                .collect(),
            decay: DecayConfig::default(),
            rules: default_rules(),
            high_threshold: 0.7,
            low_threshold: 0.2,
        }
    }
}

impl EmotionConfig {
    pub fn baseline_of(&self, dim: Dimension) -> f32 {
        self.baseline
            .get(&dim)
            .copied()
            .unwrap_or_else(|| dim.default_baseline())
    }

    pub fn rule(&self, event: EmotionEvent) -> Option<&EventRule> {
        self.rules.get(&event)
    }
}

fn default_rules() -> BTreeMap<EmotionEvent, EventRule> {
    use Dimension::*;
    let mut rules = BTreeMap::new();
    rules.insert(
        EmotionEvent::CodeSuccess,
        EventRule::adds(&[
            (Satisfaction, 0.1),
            (Confidence, 0.05),
            (Frustration, -0.1),
            (Excitement, 0.05),
        ]),
    );
    rules.insert(
        EmotionEvent::CodeFailure,
        EventRule::adds(&[(Frustration, 0.1), (Curiosity, 0.05), (Confidence, -0.05)]),
    );
    rules.insert(
        EmotionEvent::NewConversation,
        EventRule::adds(&[
            (Curiosity, 0.1),
            (Excitement, 0.1),
            (Focus, 0.15),
            (Empathy, 0.05),
        ]),
    );
    rules.insert(
        EmotionEvent::UserPraise,
        EventRule::adds(&[(Satisfaction, 0.15), (Confidence, 0.1), (Excitement, 0.05)]),
    );
    rules.insert(
        EmotionEvent::UserFrustration,
        EventRule::adds(&[(Empathy, 0.2), (Focus, 0.1), (Frustration, 0.05)]),
    );
    rules.insert(
        EmotionEvent::LongSilence,
        EventRule::adds(&[(Focus, -0.1), (Curiosity, 0.05), (Excitement, -0.05)]),
    );
    rules.insert(
        EmotionEvent::DeepThought,
        EventRule::adds(&[(Focus, 0.1), (Curiosity, 0.05)]),
    );
    rules.insert(
        EmotionEvent::SelfImprovement,
        EventRule::adds(&[(Excitement, 0.15), (Satisfaction, 0.1), (Confidence, 0.05)]),
    );
    rules.insert(
        EmotionEvent::NewDiscovery,
        EventRule::adds(&[(Curiosity, 0.15), (Excitement, 0.2), (Satisfaction, 0.05)]),
    );
    rules.insert(
        EmotionEvent::Boot,
        EventRule {
            add: BTreeMap::new(),
            set: [(Curiosity, 0.8), (Excitement, 0.7), (Confidence, 0.4)]
                .into_iter()
                .collect(),
        },
    );
    rules
}

// ============================================================================
// EmotionalState
// ============================================================================

/// Seven bounded scalars in `[0, 1]` plus the time of the last committed update.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionalState {
    pub curiosity: f32,
    pub satisfaction: f32,
    pub frustration: f32,
    pub excitement: f32,
    pub focus: f32,
    pub empathy: f32,
    pub confidence: f32,
    pub updated_at: DateTime<Utc>,
}

impl Default for EmotionalState {
    fn default() -> Self {
        Self::baseline(&EmotionConfig::default(), Utc::now())
    }
}

impl EmotionalState {
    pub fn baseline(config: &EmotionConfig, at: DateTime<Utc>) -> Self {
        let mut state = Self {
            curiosity: 0.0,
            satisfaction: 0.0,
            frustration: 0.0,
            excitement: 0.0,
            focus: 0.0,
            empathy: 0.0,
            confidence: 0.0,
            updated_at: at,
        };
        for dim in Dimension::ALL {
            state.set(dim, config.baseline_of(dim));
        }
        state
    }

    pub fn get(&self, dim: Dimension) -> f32 {
        match dim {
            Dimension::Curiosity => self.curiosity,
            Dimension::Satisfaction => self.satisfaction,
            Dimension::Frustration => self.frustration,
            Dimension::Excitement => self.excitement,
            Dimension::Focus => self.focus,
            Dimension::Empathy => self.empathy,
            Dimension::Confidence => self.confidence,
        }
    }

    fn slot(&mut self, dim: Dimension) -> &mut f32 {
        match dim {
            Dimension::Curiosity => &mut self.curiosity,
            Dimension::Satisfaction => &mut self.satisfaction,
            Dimension::Frustration => &mut self.frustration,
            Dimension::Excitement => &mut self.excitement,
            Dimension::Focus => &mut self.focus,
            Dimension::Empathy => &mut self.empathy,
            Dimension::Confidence => &mut self.confidence,
        }
    }

    /// Set one dimension, clamped into range.
    pub fn set(&mut self, dim: Dimension, value: f32) {
        *self.slot(dim) = sanitize(value, dim.default_baseline());
    }

    pub fn add(&mut self, dim: Dimension, delta: f32) {
        let current = self.get(dim);
        self.set(dim, current + delta);
    }

    /// Force every dimension back into `[0, 1]`; non-finite values reset to baseline.
    pub fn clamp(&mut self, config: &EmotionConfig) {
        for dim in Dimension::ALL {
            let v = self.get(dim);
            *self.slot(dim) = sanitize(v, config.baseline_of(dim));
        }
    }

    /// Pull weighted dimensions toward baseline in proportion to elapsed time.
    ///
    /// `multiplier` comes from the time engine: longer silences pull harder.
    pub fn decay(&mut self, elapsed_hours: f64, multiplier: f32, config: &EmotionConfig) {
        if !elapsed_hours.is_finite() || elapsed_hours <= 0.0 {
            return;
        }
        let raw = (config.decay.rate_per_hour as f64 * elapsed_hours) as f32 * multiplier;
        let step = raw.min(config.decay.max_step).max(0.0);
        for (dim, weight) in &config.decay.weights {
            let fraction = (step * weight).clamp(0.0, 1.0);
            let v = self.get(*dim);
            let target = config.baseline_of(*dim);
            self.set(*dim, v + (target - v) * fraction);
        }
    }

    pub fn apply(&mut self, rule: &EventRule) {
        for (dim, value) in &rule.set {
            self.set(*dim, *value);
        }
        for (dim, delta) in &rule.add {
            self.add(*dim, *delta);
        }
    }

    pub fn as_map(&self) -> BTreeMap<Dimension, f32> {
        Dimension::ALL.iter().map(|d| (*d, self.get(*d))).collect()
    }

    /// The strongest dimension. Ties resolve to the earlier dimension.
    pub fn dominant(&self) -> (Dimension, f32) {
        let mut best = (Dimension::Curiosity, self.curiosity);
        for dim in Dimension::ALL {
            let v = self.get(dim);
            if v > best.1 {
                best = (dim, v);
            }
        }
        best
    }

    /// Short phrase naming the notably high and low dimensions.
    pub fn summary(&self, config: &EmotionConfig) -> String {
        let high: Vec<&str> = Dimension::ALL
            .iter()
            .filter(|d| self.get(**d) >= config.high_threshold)
            .map(|d| d.name())
            .collect();
        let low: Vec<&str> = Dimension::ALL
            .iter()
            .filter(|d| self.get(**d) <= config.low_threshold)
            .map(|d| d.name())
            .collect();

        let mut parts = Vec::new();
        if !high.is_empty() {
            let named: Vec<String> = high.iter().map(|n| format!("high {}", n)).collect();
            parts.push(format!("feeling {}", named.join(", ")));
        }
        if !low.is_empty() {
            parts.push(format!("low {}", low.join(", ")));
        }
        if parts.is_empty() {
            return "emotionally balanced".to_string();
        }
        parts.join("; ")
    }

    /// Guidance for how the next thought should lean.
    pub fn thought_style(&self) -> String {
        let mut styles = Vec::new();
        if self.curiosity > 0.7 {
            styles.push("Explore new ideas and ask questions");
        }
        if self.frustration > 0.5 && self.confidence > 0.5 {
            styles.push("Try a completely different approach");
        }
        if self.frustration > 0.5 && self.confidence < 0.4 {
            styles.push("Consider asking for guidance");
        }
        if self.excitement > 0.7 {
            styles.push("Dive deep into the current topic");
        }
        if self.focus < 0.3 {
            styles.push("Let your mind wander to new topics");
        }
        if self.satisfaction > 0.7 {
            styles.push("Build on recent successes");
        }
        if self.empathy > 0.7 {
            styles.push("Think about how to help others");
        }
        if styles.is_empty() {
            return "Think naturally and follow your interests".to_string();
        }
        styles.join("; ")
    }

    /// Thinking speed in `[0, 1]`: excited, curious minds think faster.
    pub fn tempo(&self) -> f32 {
        ((self.excitement + self.curiosity) / 2.0).clamp(0.0, 1.0)
    }

    pub fn in_bounds(&self) -> bool {
        Dimension::ALL
            .iter()
            .all(|d| (0.0..=1.0).contains(&self.get(*d)))
    }
}

fn sanitize(value: f32, fallback: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> EmotionalState {
        EmotionalState::baseline(&EmotionConfig::default(), Utc::now())
    }

    #[test]
    fn test_defaults_match_resting_values() {
        let s = state();
        assert!((s.curiosity - 0.6).abs() < 1e-6);
        assert_eq!(s.frustration, 0.0);
        assert!((s.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_apply_code_success() {
        let cfg = EmotionConfig::default();
        let mut s = state();
        s.apply(cfg.rule(EmotionEvent::CodeSuccess).unwrap());
        assert!((s.satisfaction - 0.6).abs() < 1e-6);
        assert!((s.confidence - 0.55).abs() < 1e-6);
        // frustration floor holds
        assert_eq!(s.frustration, 0.0);
    }

    #[test]
    fn test_boot_sets_absolute_values() {
        let cfg = EmotionConfig::default();
        let mut s = state();
        s.curiosity = 0.1;
        s.apply(cfg.rule(EmotionEvent::Boot).unwrap());
        assert!((s.curiosity - 0.8).abs() < 1e-6);
        assert!((s.excitement - 0.7).abs() < 1e-6);
        assert!((s.confidence - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_decay_pulls_toward_baseline() {
        let cfg = EmotionConfig::default();
        let mut s = state();
        s.frustration = 0.9;
        s.excitement = 1.0;
        s.decay(2.0, 1.0, &cfg);
        assert!(s.frustration < 0.9);
        assert!(s.excitement < 1.0 && s.excitement > 0.5);
        // unweighted dimensions hold still
        assert!((s.curiosity - 0.6).abs() < 1e-6);
    }

    #[test]
    fn test_decay_multiplier_strengthens_pull() {
        let cfg = EmotionConfig::default();
        let mut weak = state();
        weak.frustration = 0.9;
        let mut strong = weak;
        weak.decay(0.01, 1.0, &cfg);
        strong.decay(0.01, 2.0, &cfg);
        assert!(strong.frustration < weak.frustration);
    }

    #[test]
    fn test_decay_ignores_negative_elapsed() {
        let cfg = EmotionConfig::default();
        let mut s = state();
        s.frustration = 0.9;
        s.decay(-5.0, 1.0, &cfg);
        assert!((s.frustration - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_nan_is_sanitized() {
        let mut s = state();
        s.set(Dimension::Focus, f32::NAN);
        assert!((s.focus - 0.5).abs() < 1e-6);
        s.set(Dimension::Focus, 7.0);
        assert_eq!(s.focus, 1.0);
    }

    #[test]
    fn test_summary_and_dominant() {
        let cfg = EmotionConfig::default();
        let mut s = state();
        assert_eq!(s.summary(&cfg), "low frustration");
        s.curiosity = 0.9;
        s.frustration = 0.3;
        assert_eq!(s.summary(&cfg), "feeling high curiosity");
        assert_eq!(s.dominant().0, Dimension::Curiosity);
        s.frustration = 0.5;
        s.curiosity = 0.5;
        s.satisfaction = 0.5;
        s.excitement = 0.5;
        s.focus = 0.5;
        s.empathy = 0.5;
        s.confidence = 0.5;
        assert_eq!(s.summary(&cfg), "emotionally balanced");
    }

    #[test]
    fn test_thought_style() {
        let mut s = state();
        assert_eq!(s.thought_style(), "Think naturally and follow your interests");
        s.curiosity = 0.9;
        s.focus = 0.1;
        assert_eq!(
            s.thought_style(),
            "Explore new ideas and ask questions; Let your mind wander to new topics"
        );
    }

    #[test]
    fn test_rules_parse_from_toml() {
        let toml_str = r#"
[rules.code_failure]
add = { frustration = 0.3 }

[decay.weights]
confidence = 0.5
"#;
        let cfg: EmotionConfig = toml::from_str(toml_str).unwrap();
        let rule = cfg.rule(EmotionEvent::CodeFailure).unwrap();
        assert_eq!(rule.add.get(&Dimension::Frustration), Some(&0.3));
        assert_eq!(cfg.decay.weights.len(), 1);
        // unnamed events fall away when rules are overridden wholesale
        assert!(cfg.rule(EmotionEvent::Boot).is_none());
    }
}
