//! State snapshot parsing for the `STATE` response line

use crate::error::{Result, ScapeRLError};
use serde::{Deserialize, Serialize};

/// One snapshot of the simulation's observable state.
///
/// `loop_cycle` is the simulation's own tick counter and is non-decreasing
/// for the lifetime of a session. `total_xp` and `total_levels` are
/// non-decreasing within an episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Cumulative experience across all skills
    pub total_xp: u64,
    /// Cumulative level count across all skills
    pub total_levels: u64,
    /// Current hitpoints
    pub hp: i64,
    /// Maximum hitpoints
    pub max_hp: i64,
    /// Current animation id (-1 when idle)
    pub anim: i64,
    /// Interaction target indicator (-1 when none)
    pub interacting: i64,
    /// Simulation tick counter
    pub loop_cycle: u64,
    /// Index of the skill that last changed, -1 when none
    pub skill_index: i64,
    /// Delta applied to that skill
    pub skill_delta: i64,
}

impl StateSnapshot {
    /// Parse a `STATE` response line.
    ///
    /// The line must begin with the `STATE` token followed by at least nine
    /// integer fields, parsed positionally. Anything else is a protocol
    /// error; nothing is partially consumed on failure.
    pub fn parse(line: &str) -> Result<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 10 || parts[0] != "STATE" {
            return Err(ScapeRLError::Protocol(format!("bad state header: {line}")));
        }

        fn field<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T> {
            raw.parse()
                .map_err(|_| ScapeRLError::Protocol(format!("bad state field {name}: {raw}")))
        }

        Ok(Self {
            total_xp: field(parts[1], "total_xp")?,
            total_levels: field(parts[2], "total_levels")?,
            hp: field(parts[3], "hp")?,
            max_hp: field(parts[4], "max_hp")?,
            anim: field(parts[5], "anim")?,
            interacting: field(parts[6], "interacting")?,
            loop_cycle: field(parts[7], "loop_cycle")?,
            skill_index: field(parts[8], "skill_index")?,
            skill_delta: field(parts[9], "skill_delta")?,
        })
    }

    /// The last-changed skill, when the simulation reported one.
    pub fn last_skill_change(&self) -> Option<(i64, i64)> {
        (self.skill_index >= 0).then_some((self.skill_index, self.skill_delta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roundtrips_fields() {
        let snap = StateSnapshot::parse("STATE 1154 32 10 10 -1 -1 8841 6 25").unwrap();

        assert_eq!(snap.total_xp, 1154);
        assert_eq!(snap.total_levels, 32);
        assert_eq!(snap.hp, 10);
        assert_eq!(snap.max_hp, 10);
        assert_eq!(snap.anim, -1);
        assert_eq!(snap.interacting, -1);
        assert_eq!(snap.loop_cycle, 8841);
        assert_eq!(snap.skill_index, 6);
        assert_eq!(snap.skill_delta, 25);
        assert_eq!(snap.last_skill_change(), Some((6, 25)));
    }

    #[test]
    fn test_parse_accepts_extra_fields() {
        // Forward-compatible: trailing fields from a newer server are ignored
        let snap = StateSnapshot::parse("STATE 0 32 10 10 -1 -1 100 -1 0 7 7").unwrap();
        assert_eq!(snap.loop_cycle, 100);
        assert_eq!(snap.last_skill_change(), None);
    }

    #[test]
    fn test_parse_rejects_wrong_token() {
        let err = StateSnapshot::parse("FRAME 0 32 10 10 -1 -1 100 -1 0").unwrap_err();
        assert!(matches!(err, ScapeRLError::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_short_line() {
        let err = StateSnapshot::parse("STATE 0 32 10").unwrap_err();
        assert!(matches!(err, ScapeRLError::Protocol(_)));
    }

    #[test]
    fn test_parse_rejects_non_integer_field() {
        let err = StateSnapshot::parse("STATE 0 32 ten 10 -1 -1 100 -1 0").unwrap_err();
        assert!(matches!(err, ScapeRLError::Protocol(_)));
    }
}
