//! Normalisation of loosely-shaped analysis payloads.
//!
//! The conversational pipeline has emitted several payload shapes over time.
//! [`Analysis::from_value`] reads any of them without failing, and
//! [`resolve`] applies the single precedence chain that turns them into the
//! fields of an [`Interaction`](crate::schema::Interaction).  Wrongly-typed
//! fields are treated as absent, never as errors.

use serde_json::{Map, Value};

use crate::schema::{DEFAULT_INTENSITY, NEUTRAL_EMOTION, clamp_intensity};

/// Emotion fields carried by one nested block of the payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmotionBlock {
    pub main_emotion: Option<String>,
    pub emotion: Option<String>,
    pub intensity: Option<f64>,
}

impl EmotionBlock {
    fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        Some(Self {
            main_emotion: obj.get("mainEmotion").and_then(label),
            emotion: obj.get("emotion").and_then(label),
            intensity: obj.get("intensity").and_then(number),
        })
    }

    fn label(&self) -> Option<&str> {
        self.main_emotion.as_deref().or(self.emotion.as_deref())
    }
}

/// Where an emotion block was found.  Variant order is precedence order.
#[derive(Debug, Clone, PartialEq)]
pub enum EmotionalSignal {
    /// `analysis.emotional`
    Emotional(EmotionBlock),
    /// `analysis.emotionalContext`
    EmotionalContext(EmotionBlock),
}

impl EmotionalSignal {
    pub fn block(&self) -> &EmotionBlock {
        match self {
            Self::Emotional(block) | Self::EmotionalContext(block) => block,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    /// Present blocks, highest precedence first.
    pub signals: Vec<EmotionalSignal>,
    /// Top-level `analysis.intensity`.
    pub intensity: Option<f64>,
    pub patterns: Option<Map<String, Value>>,
    /// `analysis.contextual.patterns`.
    pub contextual_patterns: Option<Map<String, Value>>,
    pub goals: Option<Map<String, Value>>,
}

impl Analysis {
    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };

        let mut signals = Vec::new();
        if let Some(block) = obj.get("emotional").and_then(EmotionBlock::from_value) {
            signals.push(EmotionalSignal::Emotional(block));
        }
        if let Some(block) = obj
            .get("emotionalContext")
            .and_then(EmotionBlock::from_value)
        {
            signals.push(EmotionalSignal::EmotionalContext(block));
        }

        Self {
            signals,
            intensity: obj.get("intensity").and_then(number),
            patterns: obj.get("patterns").and_then(object),
            contextual_patterns: obj
                .get("contextual")
                .and_then(|c| c.get("patterns"))
                .and_then(object),
            goals: obj.get("goals").and_then(object),
        }
    }
}

/// Canonical fields extracted from an [`Analysis`].
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSignal {
    pub emotion: String,
    pub intensity: u8,
    pub patterns: Map<String, Value>,
    pub goals: Map<String, Value>,
}

/// Apply the precedence chain; the first present value wins at every step.
///
/// * emotion: `emotional.mainEmotion`, `emotional.emotion`,
///   `emotionalContext.mainEmotion`, `emotionalContext.emotion`, neutral.
/// * intensity: `emotional.intensity`, `emotionalContext.intensity`,
///   top-level `intensity`, 5; then clamped to `[1, 10]`.
/// * patterns: `patterns`, `contextual.patterns`, empty.
/// * goals: `goals`, empty.
pub fn resolve(analysis: &Analysis) -> ResolvedSignal {
    let emotion = analysis
        .signals
        .iter()
        .find_map(|s| s.block().label())
        .unwrap_or(NEUTRAL_EMOTION)
        .to_string();

    let intensity = analysis
        .signals
        .iter()
        .find_map(|s| s.block().intensity)
        .or(analysis.intensity)
        .map(clamp_intensity)
        .unwrap_or(DEFAULT_INTENSITY);

    let patterns = analysis
        .patterns
        .clone()
        .or_else(|| analysis.contextual_patterns.clone())
        .unwrap_or_default();

    ResolvedSignal {
        emotion,
        intensity,
        patterns,
        goals: analysis.goals.clone().unwrap_or_default(),
    }
}

fn label(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn object(value: &Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}
