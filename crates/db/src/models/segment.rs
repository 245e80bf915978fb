use serde::{Deserialize, Serialize};

/// Sentence status reported by ASR for a successfully recognised sentence.
pub const STATUS_OK: i64 = 200;

/// Audio channel a segment came from. Silence and interposal are synthetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Left,
    Right,
    Silence,
    Interposal,
}

impl Channel {
    pub fn is_synthetic(self) -> bool {
        matches!(self, Channel::Silence | Channel::Interposal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionKind {
    Angry,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentEmotion {
    pub kind: EmotionKind,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "_id")]
    pub id: u64,
    pub call_id: u64,
    pub start: f64,
    pub end: f64,
    #[serde(default)]
    pub text: String,
    pub status: i64,
    pub channel: Channel,
    #[serde(default)]
    pub emotions: Vec<SegmentEmotion>,
}

impl Segment {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_ok(&self) -> bool {
        self.status == STATUS_OK
    }

    pub fn emotion(&self, kind: EmotionKind) -> Option<f64> {
        self.emotions.iter().find(|e| e.kind == kind).map(|e| e.score)
    }

    /// Gap filler carrying no text, only the channel marker.
    pub fn synthetic(call_id: u64, channel: Channel, start: f64, end: f64) -> Self {
        Self {
            id: 0,
            call_id,
            start,
            end,
            text: String::new(),
            status: STATUS_OK,
            channel,
            emotions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Staff,
    Customer,
    Silence,
    Interposal,
}

impl Speaker {
    pub fn is_party(self) -> bool {
        matches!(self, Speaker::Staff | Speaker::Customer)
    }
}

/// Which party sits on which recorded channel of a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelRoles {
    pub left: Speaker,
    pub right: Speaker,
}

impl Default for ChannelRoles {
    fn default() -> Self {
        Self {
            left: Speaker::Staff,
            right: Speaker::Customer,
        }
    }
}

impl ChannelRoles {
    /// Roles with the staff member on the given side.
    pub fn staff_on(channel: Channel) -> Self {
        match channel {
            Channel::Right => Self {
                left: Speaker::Customer,
                right: Speaker::Staff,
            },
            _ => Self::default(),
        }
    }

    pub fn speaker_for(&self, channel: Channel) -> Speaker {
        match channel {
            Channel::Left => self.left,
            Channel::Right => self.right,
            Channel::Silence => Speaker::Silence,
            Channel::Interposal => Speaker::Interposal,
        }
    }

    pub fn staff_channel(&self) -> Channel {
        if self.right == Speaker::Staff {
            Channel::Right
        } else {
            Channel::Left
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentWithSpeaker {
    #[serde(flatten)]
    pub segment: Segment,
    pub speaker: Speaker,
}

impl SegmentWithSpeaker {
    pub fn id(&self) -> u64 {
        self.segment.id
    }

    pub fn duration(&self) -> f64 {
        self.segment.duration()
    }
}
