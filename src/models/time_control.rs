use std::fmt;

/// Time control for a single game: a clocked `"M+S"` spec (minutes plus
/// Fischer increment in seconds) or untimed.
///
/// The matchmaking wildcard tag `"any"` never reaches this type; it is
/// normalised to a concrete spec before a room is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeControl {
    Timed { minutes: u64, increment_secs: u64 },
    Untimed,
}

impl TimeControl {
    pub const ANY_TAG: &'static str = "any";
    pub const NONE_TAG: &'static str = "none";

    /// Parse a time-control spec (`"M+S"` or `"none"`). Returns `None` for
    /// anything else, including the matchmaking-only wildcard `"any"`.
    pub fn parse(tag: &str) -> Option<TimeControl> {
        if tag == Self::NONE_TAG {
            return Some(TimeControl::Untimed);
        }
        let (minutes, secs) = tag.split_once('+')?;
        if minutes.is_empty() || secs.is_empty() {
            return None;
        }
        if !minutes.bytes().all(|b| b.is_ascii_digit()) || !secs.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        Some(TimeControl::Timed {
            minutes: minutes.parse().ok()?,
            increment_secs: secs.parse().ok()?,
        })
    }

    /// Whether `tag` names a matchmaking queue: a concrete spec, `"none"`,
    /// or the wildcard `"any"`.
    pub fn is_valid_tag(tag: &str) -> bool {
        tag == Self::ANY_TAG || TimeControl::parse(tag).is_some()
    }

    pub fn is_timed(&self) -> bool {
        matches!(self, TimeControl::Timed { .. })
    }

    pub fn initial_ms(&self) -> Option<i64> {
        match self {
            TimeControl::Timed { minutes, .. } => Some(*minutes as i64 * 60_000),
            TimeControl::Untimed => None,
        }
    }

    pub fn increment_ms(&self) -> Option<i64> {
        match self {
            TimeControl::Timed { increment_secs, .. } => Some(*increment_secs as i64 * 1_000),
            TimeControl::Untimed => None,
        }
    }

    /// The canonical tag for this spec, as sent on the wire.
    pub fn tag(&self) -> String {
        match self {
            TimeControl::Timed {
                minutes,
                increment_secs,
            } => format!("{}+{}", minutes, increment_secs),
            TimeControl::Untimed => Self::NONE_TAG.to_string(),
        }
    }
}

impl fmt::Display for TimeControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}
