//! Slash-command tokenizer.

/// A parsed slash command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    /// Lowercased command name without the leading `/`.
    pub name: String,
    /// Whitespace-split arguments.
    pub args: Vec<String>,
    /// The argument region with its original spacing (for search terms and
    /// message text).
    pub raw_args: String,
}

impl ParsedCommand {
    /// The argument region after skipping the first `n` tokens, original
    /// spacing preserved.
    pub fn rest_after(&self, n: usize) -> String {
        let mut rest = self.raw_args.as_str();
        for _ in 0..n {
            rest = rest.trim_start();
            match rest.find(char::is_whitespace) {
                Some(end) => rest = &rest[end..],
                None => return String::new(),
            }
        }
        rest.trim_start().to_string()
    }
}

/// Parse raw input. Returns `None` when the trimmed input does not begin
/// with `/` (plain channel text).
pub fn parse(input: &str) -> Option<ParsedCommand> {
    let trimmed = input.trim();
    let without_slash = trimmed.strip_prefix('/')?;

    let mut tokens = without_slash.split_whitespace();
    let name = tokens.next().unwrap_or("").to_lowercase();
    let args: Vec<String> = tokens.map(str::to_string).collect();

    let raw_args = without_slash
        .trim_start()
        .strip_prefix(name.as_str())
        .or_else(|| {
            // The name was lowercased; skip the original spelling instead.
            let stripped = without_slash.trim_start();
            stripped
                .find(char::is_whitespace)
                .map(|end| &stripped[end..])
                .or(Some(""))
        })
        .unwrap_or("")
        .trim_start()
        .to_string();

    Some(ParsedCommand {
        name,
        args,
        raw_args,
    })
}
