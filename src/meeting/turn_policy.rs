//! # Turn Selection
//!
//! Which persona speaks next is a policy decision, kept behind a trait so
//! deployments can plug in their own ordering (weighted, moderator-driven,
//! audience-voted). The shipped default walks the roster round-robin and
//! never hands two consecutive persona turns to the same speaker.

use super::conversation::{Character, ConversationMessage, MessageKind};

/// Chooses the next speaking persona.
pub trait TurnPolicy: Send + Sync {
    /// Pick the speaker for the next persona turn. `roster` is never empty.
    fn next_speaker<'a>(
        &self,
        roster: &'a [Character],
        conversation: &[ConversationMessage],
    ) -> &'a Character;
}

/// Roster-order rotation. Human and injected messages do not advance the
/// rotation; only persona speech does.
pub struct RoundRobinPolicy;

impl TurnPolicy for RoundRobinPolicy {
    fn next_speaker<'a>(
        &self,
        roster: &'a [Character],
        conversation: &[ConversationMessage],
    ) -> &'a Character {
        let last_persona_speaker = conversation
            .iter()
            .rev()
            .find(|m| {
                matches!(
                    m.kind,
                    MessageKind::Utterance | MessageKind::Invitation | MessageKind::Summary
                )
            })
            .map(|m| m.speaker.as_str());

        match last_persona_speaker {
            None => &roster[0],
            Some(name) => {
                let last_index = roster.iter().position(|c| c.name == name).unwrap_or(0);
                &roster[(last_index + 1) % roster.len()]
            }
        }
    }
}
