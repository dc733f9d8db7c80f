/// Query sent for a clipboard capture. The topic is fixed at composition time.
pub fn capture_query(topic: &str, raw: &str) -> String {
    format!("TOPIC: {topic} | Raw capture: '{raw}'. Save as-is.")
}

/// Query asking the agent to publish every note under `topic`.
pub fn publish_query(topic: &str) -> String {
    format!("I am done. Publish all research notes for the topic '{topic}' to Confluence.")
}
