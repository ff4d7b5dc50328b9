use shared::protocol::RosterEntry;

/// Derives mention suggestions from the unsent input text and a roster
/// snapshot. Purely computational; recomputed on every keystroke.
pub struct MentionResolver {
    local_username: String,
}

impl MentionResolver {
    pub fn new(local_username: impl Into<String>) -> Self {
        Self {
            local_username: local_username.into(),
        }
    }

    /// The partial token after the last `@`, provided that `@` sits inside
    /// the final whitespace-delimited word. No `@` means no suggestions.
    pub fn query_for<'a>(&self, input: &'a str) -> Option<&'a str> {
        let at = input.rfind('@')?;
        let tail = &input[at + 1..];
        if tail.contains(char::is_whitespace) {
            return None;
        }
        Some(tail)
    }

    /// Case-insensitive substring filter over the roster, preserving roster
    /// order. The local user is excluded unconditionally.
    pub fn candidates(&self, partial: &str, roster: &[RosterEntry]) -> Vec<RosterEntry> {
        let needle = partial.to_lowercase();
        roster
            .iter()
            .filter(|entry| entry.username != self.local_username)
            .filter(|entry| entry.username.to_lowercase().contains(&needle))
            .cloned()
            .collect()
    }

    /// Replaces from the triggering `@` to the end of the input with the
    /// selected username plus a single trailing space.
    pub fn complete(&self, input: &str, username: &str) -> String {
        let at = input.rfind('@').unwrap_or(input.len());
        format!("{}@{} ", &input[..at], username)
    }
}

#[cfg(test)]
#[path = "tests/mentions_tests.rs"]
mod tests;
