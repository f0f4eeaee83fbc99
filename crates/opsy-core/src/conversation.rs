use opsy_model::{Message, Role};

/// Ordered turns of one run.  Owned by the agent loop; never shared.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new(task: impl Into<String>) -> Self {
        Self { messages: vec![Message::user(task)] }
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Text of the final assistant turn, if the run ended on one.
    pub fn final_answer(&self) -> Option<String> {
        self.messages
            .last()
            .filter(|m| m.role == Role::Assistant && m.tool_uses().is_empty())
            .and_then(Message::text)
    }

    /// Whether every tool-result turn answers exactly the tool uses of the
    /// assistant turn right before it.
    pub fn is_well_formed(&self) -> bool {
        self.messages.windows(2).all(|pair| {
            let results = pair[1].tool_result_ids();
            if results.is_empty() {
                return true;
            }
            let requested: Vec<&str> = pair[0].tool_uses().iter().map(|t| t.id.as_str()).collect();
            pair[0].role == Role::Assistant && requested == results
        })
    }
}
