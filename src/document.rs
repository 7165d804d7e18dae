use serde::Deserialize;
use std::path::Path;

/// An editor text buffer as seen by the analyzer and the lens provider.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDocument {
    /// Stable document identity, used as the lens cache key.
    pub uri: String,
    pub file_path: String,
    #[serde(default = "default_language")]
    pub language_id: String,
    #[serde(default)]
    pub version: i64,
    pub text: String,
}

fn default_language() -> String {
    "csharp".to_string()
}

impl SourceDocument {
    pub fn new(file_path: impl Into<String>, version: i64, text: impl Into<String>) -> Self {
        let file_path = file_path.into();
        Self {
            uri: format!("file://{}", file_path.replace('\\', "/")),
            file_path,
            language_id: default_language(),
            version,
            text: text.into(),
        }
    }

    /// Reads a file from disk as a version-0 C# document.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let text = crate::util::read_to_string(path)?;
        Ok(Self::new(path.to_string_lossy().to_string(), 0, text))
    }

    /// Lines split on `\n`; a trailing `\r` stays on each line and is
    /// tolerated by every recognizer.
    pub fn lines(&self) -> Vec<&str> {
        self.text.split('\n').collect()
    }

    pub fn file_name(&self) -> &str {
        self.file_path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_handles_both_separators() {
        let doc = SourceDocument::new(r"C:\src\Api\UsersController.cs", 1, "");
        assert_eq!(doc.file_name(), "UsersController.cs");
        assert_eq!(doc.uri, "file://C:/src/Api/UsersController.cs");
    }

    #[test]
    fn lines_keep_empty_trailing_line() {
        let doc = SourceDocument::new("/a/B.cs", 1, "a\nb\n");
        assert_eq!(doc.lines(), vec!["a", "b", ""]);
    }
}
