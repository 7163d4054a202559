use regex::Regex;

/// Drops progress-bar lines from captured program output before it is
/// logged or mailed.
#[derive(Debug, Clone)]
pub struct ProgressFilter {
    pattern: Regex,
}

impl ProgressFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    pub fn strip(&self, text: &str) -> String {
        text.split('\n')
            .filter(|line| !self.pattern.is_match(line))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
