use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LevelCodeError {
    #[error("Unknown credit level code: {0}")]
    UnknownLevel(i32),
    #[error("Unknown valid state: {0}")]
    UnknownValid(i32),
    #[error("Unknown rule family: {0}")]
    UnknownWhos(i32),
}

/// Level of a credit row. Codes are the persisted values and grow strictly
/// from a parent level to any of its child levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum LevelType {
    /// Per-call (or per-call-group) root holding the total score.
    Call,
    RuleGroup,
    Rule,
    SilenceRule,
    SpeedRule,
    InterposalRule,
    ConversationFlow,
    SentenceGroup,
    Sentence,
    /// Silence exception said by staff before the silence.
    BeforeStaffSentence,
    /// Customer exception: before a silence, or "under" for the speed rule.
    BeforeCustomerSentence,
    /// Silence exception said by staff after the silence.
    AfterStaffSentence,
    /// Customer "over" exception of the speed rule.
    AfterCustomerSentence,
    Segment,
    SilenceSegment,
    InterposalSegment,
    /// Sensitive-word family, codes 60..=64.
    SensitiveWord(SensitiveKind),
}

/// Slot of a sensitive-word level; only `0..SensitiveKind::COUNT` exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SensitiveKind(u8);

impl SensitiveKind {
    pub const COUNT: u8 = 5;

    pub const fn new(slot: u8) -> Option<Self> {
        if slot < Self::COUNT {
            Some(Self(slot))
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl LevelType {
    /// Sensitive-word level of `slot`, rejecting slots past the code range.
    pub fn sensitive_word(slot: u8) -> Result<Self, LevelCodeError> {
        SensitiveKind::new(slot)
            .map(LevelType::SensitiveWord)
            .ok_or(LevelCodeError::UnknownLevel(60 + i32::from(slot)))
    }

    pub fn code(self) -> i32 {
        match self {
            LevelType::Call => 0,
            LevelType::RuleGroup => 1,
            LevelType::Rule => 10,
            LevelType::SilenceRule => 11,
            LevelType::SpeedRule => 12,
            LevelType::InterposalRule => 13,
            LevelType::ConversationFlow => 20,
            LevelType::SentenceGroup => 30,
            LevelType::Sentence => 40,
            LevelType::BeforeStaffSentence => 41,
            LevelType::BeforeCustomerSentence => 42,
            LevelType::AfterStaffSentence => 43,
            LevelType::AfterCustomerSentence => 44,
            LevelType::Segment => 50,
            LevelType::SilenceSegment => 51,
            LevelType::InterposalSegment => 53,
            LevelType::SensitiveWord(kind) => 60 + i32::from(kind.get()),
        }
    }

    /// Levels a row of this level may hang under. Empty for the call root.
    pub fn parent_levels(self) -> &'static [LevelType] {
        use LevelType::*;
        match self {
            Call => &[],
            RuleGroup | SensitiveWord(_) => &[Call],
            Rule | SilenceRule | SpeedRule | InterposalRule => &[RuleGroup],
            ConversationFlow => &[Rule],
            SentenceGroup => &[ConversationFlow],
            Sentence => &[SentenceGroup],
            BeforeStaffSentence | AfterStaffSentence => &[SilenceRule],
            BeforeCustomerSentence => &[SilenceRule, SpeedRule],
            AfterCustomerSentence => &[SpeedRule],
            Segment => &[
                Sentence,
                BeforeStaffSentence,
                BeforeCustomerSentence,
                AfterStaffSentence,
                AfterCustomerSentence,
            ],
            SilenceSegment => &[SilenceRule],
            InterposalSegment => &[InterposalRule],
        }
    }

    /// Whether a row of this level may be stored with `parent_id == 0`.
    pub fn can_be_root(self) -> bool {
        matches!(
            self,
            LevelType::Call | LevelType::RuleGroup | LevelType::SensitiveWord(_)
        )
    }

    pub fn accepts_child(self, child: LevelType) -> bool {
        child.parent_levels().contains(&self)
    }

    pub fn is_exception_sentence(self) -> bool {
        matches!(
            self,
            LevelType::BeforeStaffSentence
                | LevelType::BeforeCustomerSentence
                | LevelType::AfterStaffSentence
                | LevelType::AfterCustomerSentence
        )
    }
}

impl PartialOrd for LevelType {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LevelType {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.code().cmp(&other.code())
    }
}

impl TryFrom<i32> for LevelType {
    type Error = LevelCodeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        use LevelType::*;
        let level = match code {
            0 => Call,
            1 => RuleGroup,
            10 => Rule,
            11 => SilenceRule,
            12 => SpeedRule,
            13 => InterposalRule,
            20 => ConversationFlow,
            30 => SentenceGroup,
            40 => Sentence,
            41 => BeforeStaffSentence,
            42 => BeforeCustomerSentence,
            43 => AfterStaffSentence,
            44 => AfterCustomerSentence,
            50 => Segment,
            51 => SilenceSegment,
            53 => InterposalSegment,
            60..=64 => SensitiveWord(SensitiveKind((code - 60) as u8)),
            other => return Err(LevelCodeError::UnknownLevel(other)),
        };
        Ok(level)
    }
}

impl From<LevelType> for i32 {
    fn from(level: LevelType) -> Self {
        level.code()
    }
}

/// Tri-state outcome stored on every credit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum CreditValid {
    #[default]
    Unactivated,
    NotMatched,
    Matched,
}

impl CreditValid {
    pub fn from_bool(valid: bool) -> Self {
        if valid {
            CreditValid::Matched
        } else {
            CreditValid::NotMatched
        }
    }

    pub fn is_matched(self) -> bool {
        self == CreditValid::Matched
    }
}

impl TryFrom<i32> for CreditValid {
    type Error = LevelCodeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(CreditValid::Unactivated),
            0 => Ok(CreditValid::NotMatched),
            1 => Ok(CreditValid::Matched),
            other => Err(LevelCodeError::UnknownValid(other)),
        }
    }
}

impl From<CreditValid> for i32 {
    fn from(v: CreditValid) -> Self {
        match v {
            CreditValid::Unactivated => -1,
            CreditValid::NotMatched => 0,
            CreditValid::Matched => 1,
        }
    }
}

/// Which rule family produced a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Whos {
    #[default]
    Conversation,
    Silence,
    Speed,
    Interposal,
}

impl TryFrom<i32> for Whos {
    type Error = LevelCodeError;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(Whos::Conversation),
            1 => Ok(Whos::Silence),
            2 => Ok(Whos::Speed),
            3 => Ok(Whos::Interposal),
            other => Err(LevelCodeError::UnknownWhos(other)),
        }
    }
}

impl From<Whos> for i32 {
    fn from(w: Whos) -> Self {
        w as i32
    }
}
