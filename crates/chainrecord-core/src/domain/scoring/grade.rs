//! Letter grades derived from risk scores

use serde::{Deserialize, Serialize};

/// Risk grade, from A (lowest risk) to F (highest)
///
/// Ordering follows risk: `Grade::A < Grade::F`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    /// Map a score to its grade. Lower bounds are inclusive:
    /// below 20 is A, 20-39 B, 40-59 C, 60-79 D, 80 and above F.
    pub fn from_score(score: i64) -> Self {
        match score {
            i64::MIN..=19 => Self::A,
            20..=39 => Self::B,
            40..=59 => Self::C,
            60..=79 => Self::D,
            _ => Self::F,
        }
    }

    /// Smallest score that maps to this grade (A has no lower bound)
    pub fn min_score(&self) -> Option<i64> {
        match self {
            Self::A => None,
            Self::B => Some(20),
            Self::C => Some(40),
            Self::D => Some(60),
            Self::F => Some(80),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Some(Self::A),
            "B" => Some(Self::B),
            "C" => Some(Self::C),
            "D" => Some(Self::D),
            "F" => Some(Self::F),
            _ => None,
        }
    }

    pub fn all() -> &'static [Grade] {
        &[Self::A, Self::B, Self::C, Self::D, Self::F]
    }
}

impl std::fmt::Display for Grade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
