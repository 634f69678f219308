/// Comment markers recognised when no `--comment` flag is given.
pub const DEFAULT_COMMENT_MARKERS: [&str; 3] = [";", "*", "%"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    comment_markers: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            comment_markers: DEFAULT_COMMENT_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Replaces the whole marker set. Empty markers are dropped, since they
    /// would turn every line into a comment.
    pub fn with_comment_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Config {
            comment_markers: markers
                .into_iter()
                .map(Into::into)
                .filter(|marker: &String| !marker.is_empty())
                .collect(),
        }
    }

    pub fn comment_markers(&self) -> &[String] {
        &self.comment_markers
    }

    /// `line` is expected to be trimmed already.
    pub fn is_comment(&self, line: &str) -> bool {
        self.comment_markers
            .iter()
            .any(|marker| line.starts_with(marker.as_str()))
    }
}
