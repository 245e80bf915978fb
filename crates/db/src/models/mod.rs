pub mod asr;
pub mod call_group;
pub mod credit;
pub mod rule;
pub mod segment;

pub use asr::{AsrChannel, AsrResponse, AsrSentence};
pub use call_group::CallGroup;
pub use credit::{CreditCallGroup, SegmentMatch, SimpleCredit};
pub use rule::{
    ConversationFlow, ConversationRule, CustomerException, GroupPosition, InterposalRule,
    PartyException, RuleGroup, RuleMethod, Sentence, SentenceGroup, SilenceException, SilenceRule, SpeedRule,
    StaffException,
};
pub use segment::{
    Channel, ChannelRoles, EmotionKind, STATUS_OK, Segment, SegmentEmotion, SegmentWithSpeaker,
    Speaker,
};
