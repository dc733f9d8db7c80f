/// A parsed line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    ListTopics,
    SetTopic(String),
    /// A topic command with nothing after the prefix.
    MissingTopicName,
    Publish,
    FreeQuery(String),
}

type Rule = fn(&str) -> Option<Command>;

/// Evaluated in order against the line with leading whitespace removed; first
/// match wins.
const GRAMMAR: &[Rule] = &[list_topics, change_topic, publish];

const TOPIC_PREFIXES: &[&str] = &["/topic ", "/ ", "/"];
const PUBLISH_TRIGGERS: &[&str] = &["I am done", "Publish"];

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Option<Command> {
    let input = line.trim();
    if input.is_empty() {
        return None;
    }
    // Topic prefixes end in a space, so trailing whitespace must survive.
    let head = line.trim_start();
    GRAMMAR
        .iter()
        .find_map(|rule| rule(head))
        .or_else(|| Some(Command::FreeQuery(line.to_string())))
}

fn list_topics(input: &str) -> Option<Command> {
    (input.trim_end() == "/list").then_some(Command::ListTopics)
}

fn change_topic(input: &str) -> Option<Command> {
    let candidate = TOPIC_PREFIXES
        .iter()
        .find_map(|prefix| input.strip_prefix(prefix))?
        .trim();
    if candidate.is_empty() {
        Some(Command::MissingTopicName)
    } else {
        Some(Command::SetTopic(candidate.to_string()))
    }
}

fn publish(input: &str) -> Option<Command> {
    PUBLISH_TRIGGERS
        .iter()
        .any(|t| input.contains(t))
        .then_some(Command::Publish)
}
