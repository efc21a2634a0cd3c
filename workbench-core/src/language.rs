//! File extension → editor language id.

use crate::types::PLAIN_TEXT;

const EXTENSION_LANGUAGES: &[(&str, &str)] = &[
    ("cpp", "cpp"),
    ("cc", "cpp"),
    ("cxx", "cpp"),
    ("h", "cpp"),
    ("hpp", "cpp"),
    ("py", "python"),
    ("js", "javascript"),
    ("mjs", "javascript"),
    ("cjs", "javascript"),
    ("ts", "typescript"),
    ("tsx", "typescript"),
    ("html", "html"),
    ("htm", "html"),
    ("css", "css"),
    ("scss", "css"),
    ("sass", "css"),
    ("json", "json"),
    ("jsonc", "json"),
    ("md", "markdown"),
    ("markdown", "markdown"),
    ("sh", "shell"),
    ("bash", "shell"),
    ("yaml", "yaml"),
    ("yml", "yaml"),
];

/// Language id for `path`, falling back to [`PLAIN_TEXT`].
pub fn language_for_path(path: &str) -> &'static str {
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let Some((_, ext)) = file_name.rsplit_once('.') else {
        return PLAIN_TEXT;
    };
    let ext = ext.to_ascii_lowercase();
    EXTENSION_LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, language)| *language)
        .unwrap_or(PLAIN_TEXT)
}
