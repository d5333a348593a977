use crate::state::Message;

/// Collapse a conversation into the topic string the prompts work from.
///
/// A single message is used verbatim; longer histories become a
/// `Role: content` transcript, one line per message.
pub fn get_research_topic(messages: &[Message]) -> String {
    if let [only] = messages {
        return only.content.clone();
    }

    messages
        .iter()
        .map(|m| format!("{}: {}\n", m.role.label(), m.content))
        .collect()
}
